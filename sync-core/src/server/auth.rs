//! Bearer-token checks for the control endpoint

use std::collections::VecDeque;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::RwLock;
use tracing::debug;

use super::ServerState;
use crate::peer::Envelope;

/// Length of tokens handed out by `POST /auth/master-sync`
pub const TOKEN_LENGTH: usize = 32;

/// Issued tokens kept valid; issuing one more drops the oldest
pub const MAX_ISSUED_TOKENS: usize = 8;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// The most recent tokens issued to masters
#[derive(Debug, Default)]
pub struct TokenRegistry {
    issued: RwLock<VecDeque<String>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and remember a new random token
    pub fn issue(&self) -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let token: String = (0..TOKEN_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();

        let mut issued = self.issued.write();
        if issued.len() >= MAX_ISSUED_TOKENS {
            issued.pop_front();
        }
        issued.push_back(token.clone());
        token
    }

    pub fn contains(&self, token: &str) -> bool {
        self.issued.read().iter().any(|t| t == token)
    }

    pub fn len(&self) -> usize {
        self.issued.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.read().is_empty()
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No `Authorization: Bearer` header
    MissingToken,
    /// A token that is neither configured nor issued
    InvalidToken,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthRejection::MissingToken => (StatusCode::UNAUTHORIZED, "Missing bearer token"),
            AuthRejection::InvalidToken => (StatusCode::FORBIDDEN, "Invalid token"),
        };
        debug!("Request rejected: {}", message);
        (status, Json(Envelope::failure(message))).into_response()
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Extractor that only succeeds for a known bearer token
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

#[async_trait]
impl FromRequestParts<ServerState> for Authorized {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts).ok_or(AuthRejection::MissingToken)?;

        let configured = state
            .config
            .get()
            .role
            .slave()
            .and_then(|s| s.auth_token.clone())
            .filter(|t| !t.trim().is_empty());

        if configured.as_deref() == Some(token) || state.tokens.contains(token) {
            Ok(Authorized)
        } else {
            Err(AuthRejection::InvalidToken)
        }
    }
}
