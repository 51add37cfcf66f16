//! Sign-in, roles and the signed `auth` session cookie.
//!
//! The identity provider only vouches for an email address. The role is decided
//! here: the configured admin address is `admin`, everyone else is `user`.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::api::AppState;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "auth";
const SESSION_DURATION_SECS: i64 = 7 * 24 * 3600;
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// `admin` iff `email` equals the configured admin address (ASCII case-insensitive).
pub fn role_for_email(email: &str, admin_email: &str) -> Role {
    let admin = admin_email.trim();
    if !admin.is_empty() && email.trim().eq_ignore_ascii_case(admin) {
        Role::Admin
    } else {
        Role::User
    }
}

pub fn identify(email: &str, admin_email: &str) -> Identity {
    Identity {
        email: email.trim().to_string(),
        role: role_for_email(email, admin_email),
    }
}

/// Turns a sign-in credential into a verified email address.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Verifies Google ID tokens via the tokeninfo endpoint.
pub struct GoogleIdentityProvider {
    client: Client,
    tokeninfo_url: String,
    client_id: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    email: Option<String>,
    // Google sends this as the string "true"/"false".
    email_verified: Option<String>,
    aud: Option<String>,
}

impl GoogleIdentityProvider {
    pub fn new(client_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            tokeninfo_url: GOOGLE_TOKENINFO_URL.to_string(),
            client_id,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_tokeninfo_url(mut self, url: impl Into<String>) -> Self {
        self.tokeninfo_url = url.into();
        self
    }

    fn check(&self, info: TokenInfo) -> Result<String> {
        if info.email_verified.as_deref() != Some("true") {
            return Err(anyhow!("google account email is not verified"));
        }
        if let Some(expected) = &self.client_id {
            if info.aud.as_deref() != Some(expected.as_str()) {
                return Err(anyhow!("google token issued for a different client"));
            }
        }
        info.email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| anyhow!("google token carries no email"))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<String> {
        let info: TokenInfo = self
            .client
            .get(&self.tokeninfo_url)
            .timeout(self.timeout)
            .query(&[("id_token", credential.trim())])
            .send()
            .await
            .context("google tokeninfo request")?
            .error_for_status()
            .context("google rejected the id token")?
            .json()
            .await
            .context("parsing google tokeninfo")?;
        self.check(info)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// Development provider: the credential *is* the email.
pub struct StaticIdentityProvider;

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, credential: &str) -> Result<String> {
        let email = credential.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                Ok(email.to_string())
            }
            _ => Err(anyhow!("not an email address")),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

// --- session cookie ----------------------------------------------------

/// Cookie value: `role|email|expiry|signature`.
pub fn create_session(identity: &Identity, secret: &str) -> String {
    create_session_with_expiry(
        identity,
        secret,
        chrono::Utc::now().timestamp() + SESSION_DURATION_SECS,
    )
}

fn create_session_with_expiry(identity: &Identity, secret: &str, expiry: i64) -> String {
    let payload = format!("{}|{}|{}", identity.role.as_str(), identity.email, expiry);
    let sig = sign(&payload, secret);
    format!("{payload}|{sig}")
}

/// `Set-Cookie` value for a fresh session. Adds `Secure` in release builds.
pub fn session_cookie(identity: &Identity, secret: &str) -> String {
    let value = create_session(identity, secret);
    let secure = if cfg!(debug_assertions) { "" } else { "; Secure" };
    format!(
        "{COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_DURATION_SECS}{secure}"
    )
}

pub fn clear_session_cookie() -> String {
    format!("{COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Check signature and expiry; returns the identity stored in the cookie.
pub fn verify_session(value: &str, secret: &str) -> Option<Identity> {
    let mut tail = value.rsplitn(3, '|');
    let sig = tail.next()?;
    let expiry_str = tail.next()?;
    let head = tail.next()?;
    let (role_str, email) = head.split_once('|')?;

    let payload = format!("{head}|{expiry_str}");
    if !constant_time_eq(sig.as_bytes(), sign(&payload, secret).as_bytes()) {
        return None;
    }

    let expiry: i64 = expiry_str.parse().ok()?;
    if chrono::Utc::now().timestamp() > expiry {
        return None;
    }

    Some(Identity {
        email: email.to_string(),
        role: Role::parse(role_str)?,
    })
}

fn sign(payload: &str, secret: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Value of cookie `name` in a `Cookie:` header.
pub fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

fn identity_from_parts(parts: &Parts, secret: &str) -> Option<Identity> {
    let cookie_header = parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    parse_cookie(cookie_header, COOKIE_NAME).and_then(|v| verify_session(v, secret))
}

// --- extractors --------------------------------------------------------

/// Signed-in user for HTML pages. Redirects to the login page otherwise.
pub struct Session(pub Identity);

impl FromRequestParts<AppState> for Session {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts, state.session_secret())
            .map(Session)
            .ok_or_else(|| Redirect::to("/").into_response())
    }
}

/// Signed-in user for JSON/export endpoints. 401 otherwise.
pub struct ApiSession(pub Identity);

impl ApiSession {
    pub fn require_admin(&self) -> Result<&Identity, ApiError> {
        if self.0.is_admin() {
            Ok(&self.0)
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

impl FromRequestParts<AppState> for ApiSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts, state.session_secret())
            .map(ApiSession)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Session if present; never rejects. Used by the login page.
pub struct MaybeSession(pub Option<Identity>);

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(identity_from_parts(parts, state.session_secret())))
    }
}
