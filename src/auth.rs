//! Bearer token authentication interceptors.
//!
//! [`Authenticate`] runs on every request and marks it with an
//! [`AuthenticatedUser`] when it carries a known token. It never rejects:
//! requests without credentials continue anonymously. [`Protect`] guards
//! individual routes and answers `403` for anonymous requests.

use crate::middleware::{Flow, Interceptor};
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Tokens accepted by [`Authenticate`].
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    tokens: HashSet<String>,
}

impl AuthConfig {
    /// Create a new AuthConfig from a list of tokens.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, String> {
        let mut valid_tokens = HashSet::new();
        for token in tokens {
            let trimmed = token.trim().to_string();
            if trimmed.is_empty() {
                return Err("Empty token value in configuration".to_string());
            }
            valid_tokens.insert(trimmed);
        }
        Ok(Self {
            tokens: valid_tokens,
        })
    }

    /// Whether any token is configured. Without one nobody can authenticate.
    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn verify(&self, provided: &str) -> bool {
        let mut found = false;
        for expected in &self.tokens {
            if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                found = true;
            }
        }
        found
    }
}

/// Identity attached to requests that presented a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Masked form of the token, safe to log.
    pub token_hint: String,
}

/// Attach an [`AuthenticatedUser`] when the bearer token is valid.
#[derive(Debug, Clone)]
pub struct Authenticate {
    config: Arc<AuthConfig>,
}

impl Authenticate {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }
}

impl Interceptor for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn intercept<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let Some(token) = extract_bearer_token(request) else {
                return Flow::Continue;
            };

            if self.config.verify(&token) {
                debug!(token_prefix = %mask_token(&token), "Request authenticated");
                request.extensions_mut().insert(AuthenticatedUser {
                    token_hint: mask_token(&token),
                });
            } else {
                warn!(token_prefix = %mask_token(&token), "Authentication failed: invalid token");
            }
            Flow::Continue
        })
    }
}

/// Only let authenticated requests through.
#[derive(Debug, Clone, Copy, Default)]
pub struct Protect;

impl Interceptor for Protect {
    fn name(&self) -> &'static str {
        "protect"
    }

    fn intercept<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Flow> {
        let authenticated = request.extensions().get::<AuthenticatedUser>().is_some();
        Box::pin(async move {
            if authenticated {
                Flow::Continue
            } else {
                Flow::Respond(StatusCode::FORBIDDEN.into_response())
            }
        })
    }
}

/// The token of an `Authorization: Bearer <token>` header, if present.
fn extract_bearer_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn mask_token(token: &str) -> String {
    match token.get(..3) {
        Some(prefix) if token.len() > 3 => format!("{prefix}***"),
        _ => "***".to_string(),
    }
}
