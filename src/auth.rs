//! Signed user-session cookies
//!
//! The login flow lives outside this service. It hands the browser a
//! `user_session` cookie of the form `<hex(email)>.<hex(mac)>` where `mac` is
//! HMAC-SHA256 of the email under the shared session secret. This module
//! issues and verifies those values.

use crate::error::ChatError;
use crate::models::AuthUser;
use crate::Result;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const USER_SESSION_COOKIE: &str = "user_session";
pub const SESSION_ID_COOKIE: &str = "session_id";

/// HMAC type alias for session cookie signatures
type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SessionSigner {
    /// Keyed MAC, cloned fresh for every signature.
    mac: HmacSha256,
}

impl SessionSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| ChatError::Config(format!("Invalid session secret: {}", e)))?;
        Ok(Self { mac })
    }

    fn keyed(&self, email: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(email.as_bytes());
        mac
    }

    /// Cookie value asserting the given email.
    pub fn issue(&self, email: &str) -> String {
        let tag = self.keyed(email).finalize().into_bytes();
        format!("{}.{}", hex::encode(email), hex::encode(tag))
    }

    /// The user a cookie value vouches for, if its signature checks out.
    pub fn verify(&self, value: &str) -> Option<AuthUser> {
        let (email_hex, mac_hex) = value.split_once('.')?;
        let email = String::from_utf8(hex::decode(email_hex).ok()?).ok()?;
        let tag = hex::decode(mac_hex).ok()?;

        if email.is_empty() {
            return None;
        }
        // Constant-time comparison
        self.keyed(&email).verify_slice(&tag).ok()?;

        Some(AuthUser { email })
    }
}

/// Value of a cookie in a raw `Cookie` header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for the conversation session id.
pub fn session_id_cookie(session_id: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_ID_COOKIE, session_id)
}
