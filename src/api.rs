//! REST API for the chat service
//!
//! Every `/chat` route runs on behalf of the user carried in the signed
//! `user_session` cookie. The conversation id travels in the `session_id`
//! cookie.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::auth::{cookie_value, session_id_cookie, SessionSigner, SESSION_ID_COOKIE, USER_SESSION_COOKIE};
use crate::error::ChatError;
use crate::models::AuthUser;
use crate::service::ChatService;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub model: Option<String>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ChatService>,
    pub signer: SessionSigner,
}

/// =============================
/// Extractors
/// =============================

/// The user vouched for by the `user_session` cookie, if any. Rejection is
/// left to the service so that every route fails the same way.
pub struct CurrentUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<ApiState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let user = cookie_header(parts)
            .and_then(|cookies| cookie_value(cookies, USER_SESSION_COOKIE))
            .and_then(|value| state.signer.verify(value));

        if user.is_none() && cookie_header(parts).is_some() {
            warn!("Request without a valid user session");
        }

        Ok(CurrentUser(user))
    }
}

/// The `session_id` cookie, if present.
pub struct SessionCookie(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionCookie {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionCookie(
            cookie_header(parts)
                .and_then(|cookies| cookie_value(cookies, SESSION_ID_COOKIE))
                .map(str::to_string),
        ))
    }
}

fn cookie_header(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
}

/// =============================
/// Error Mapping
/// =============================

pub struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if !self.0.is_client_error() {
            error!(error = %self.0, "Request failed");
        }

        let (status, message) = match self.0 {
            ChatError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ChatError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ChatError::Agent(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get response from the chat agent".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (
            status,
            Json(json!({ "error": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}

fn with_session_cookie(mut response: Response, session_id: &str) -> Response {
    match HeaderValue::from_str(&session_id_cookie(session_id)) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "Session id is not a valid cookie value"),
    }
    response
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn chat_handler(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    SessionCookie(session_id): SessionCookie,
    body: Option<Json<ChatRequest>>,
) -> Result<Response, ApiError> {
    let request = body.map(|Json(req)| req).unwrap_or_default();

    let (session_id, issued) = match session_id {
        Some(id) => (id, false),
        None => (ChatService::new_session(), true),
    };

    let reply = state
        .service
        .chat(
            user.as_ref(),
            &session_id,
            request.message.as_deref(),
            request.model.as_deref(),
        )
        .await?;

    let response = Json(json!({ "content": reply.content })).into_response();
    if issued {
        info!(session_id = %session_id, "Issued new chat session");
        return Ok(with_session_cookie(response, &session_id));
    }
    Ok(response)
}

async fn new_chat(CurrentUser(user): CurrentUser) -> Result<Response, ApiError> {
    user.ok_or(ChatError::Unauthorized)?;

    let session_id = ChatService::new_session();
    info!(session_id = %session_id, "New chat session");

    let response = Json(json!({ "session_id": session_id })).into_response();
    Ok(with_session_cookie(response, &session_id))
}

async fn list_sessions(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    let sessions = state.service.sessions(user.as_ref()).await?;
    Ok(Json(sessions).into_response())
}

async fn session_history(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let history = state.service.history(user.as_ref(), &session_id).await?;
    Ok(Json(history).into_response())
}

async fn delete_session(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    state
        .service
        .delete_session(user.as_ref(), &session_id)
        .await?;
    Ok(Json(json!({ "success": true })).into_response())
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    let chat_routes = Router::new()
        .route("/chat", post(chat_handler))
        .route("/new_chat", post(new_chat))
        .route("/sessions", get(list_sessions))
        .route("/history/:session_id", get(session_history))
        .route("/delete_session/:session_id", get(delete_session));

    Router::new()
        .route("/health", get(health))
        .nest("/chat", chat_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(state: ApiState, port: u16) -> crate::Result<()> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
