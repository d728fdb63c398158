//! Access policies for the stream route.
//!
//! The dispatcher asks the policy before the catalog is consulted, so a
//! denied request never learns whether an identifier exists.

use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

/// Credentials a client presented with a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Credentials<'a> {
    /// Token from `Authorization: Bearer <token>`
    pub bearer: Option<&'a str>,
    /// Token from the `?token=` query parameter, for `<video src>` usage
    pub query_token: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    /// Collects credentials from request headers and the query token.
    pub fn from_request(headers: &'a HeaderMap, query_token: Option<&'a str>) -> Self {
        Self {
            bearer: extract_bearer_token(headers),
            query_token: query_token.filter(|token| !token.is_empty()),
        }
    }

    /// Presented token, preferring the header over the query string.
    pub fn token(&self) -> Option<&'a str> {
        self.bearer.or(self.query_token)
    }
}

/// Per-scheme `Authorization` parsing. The scheme name is case-insensitive.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let scheme = value.get(..7)?;
    if scheme.eq_ignore_ascii_case("bearer ") {
        Some(value[7..].trim()).filter(|token| !token.is_empty())
    } else {
        None
    }
}

/// Reasons a request is refused before content is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("credentials required")]
    MissingCredentials,

    #[error("credentials rejected")]
    InvalidCredentials,
}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        match self {
            AccessDenied::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Bearer realm=\"reel\"")],
                "Authentication required",
            )
                .into_response(),
            AccessDenied::InvalidCredentials => {
                (StatusCode::FORBIDDEN, "Access denied").into_response()
            }
        }
    }
}

/// Decides whether a request may stream a piece of content.
pub trait AccessPolicy: Send + Sync {
    /// Authorizes access to `content_id`.
    ///
    /// # Errors
    ///
    /// - `AccessDenied::MissingCredentials` - No usable credentials were presented
    /// - `AccessDenied::InvalidCredentials` - Credentials were presented but refused
    fn authorize(&self, credentials: &Credentials<'_>, content_id: &str)
    -> Result<(), AccessDenied>;
}

/// Open access; every request is authorized.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn authorize(&self, _: &Credentials<'_>, _: &str) -> Result<(), AccessDenied> {
        Ok(())
    }
}

/// Single shared token, accepted as a bearer header or `?token=` parameter.
#[derive(Clone)]
pub struct BearerTokenPolicy {
    token: String,
}

impl BearerTokenPolicy {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Compares without short-circuiting on the first differing byte.
    fn matches(&self, presented: &str) -> bool {
        presented.as_bytes().ct_eq(self.token.as_bytes()).unwrap_u8() == 1
    }
}

impl std::fmt::Debug for BearerTokenPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenPolicy")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl AccessPolicy for BearerTokenPolicy {
    fn authorize(&self, credentials: &Credentials<'_>, _: &str) -> Result<(), AccessDenied> {
        match credentials.token() {
            None => Err(AccessDenied::MissingCredentials),
            Some(presented) if self.matches(presented) => Ok(()),
            Some(_) => Err(AccessDenied::InvalidCredentials),
        }
    }
}
