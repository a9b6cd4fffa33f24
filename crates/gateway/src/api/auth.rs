//! Identity Resolver: validates the bearer token on every protected request
//! and resolves it to a full `Caller` (id + admin flag), not a bare boolean.
//!
//! The token itself is never compared directly; it is SHA-256 hashed and
//! matched in constant time against the digests cached in `AppState`. Callers
//! with no matching token become anonymous (`Caller::anonymous`) when the
//! route allows it; routes that require a known identity reject with
//! `Error::AuthMissing`/`Error::AuthInvalid`.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ck_domain::model::Caller;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

fn digest_hex(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Axum middleware resolving the caller for every protected route. Attach via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_caller(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if provided.is_empty() {
        return ck_domain::error::Error::AuthMissing.into_response();
    }

    let provided_digest = digest_hex(provided);

    let caller = {
        let cache = state.identity_cache.read();
        cache.lookup(&provided_digest)
    };

    let caller = match caller {
        Some(c) => c,
        None => return ck_domain::error::Error::AuthInvalid("unknown token".into()).into_response(),
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}

/// Constant-time comparison helper kept for callers validating a single
/// fixed admin token (used by the startup identity-cache refresh itself).
pub fn token_matches(provided: &str, expected_hash: &[u8]) -> bool {
    let provided_hash = Sha256::digest(provided.as_bytes());
    bool::from(provided_hash.ct_eq(expected_hash))
}

impl IntoResponse for ck_domain::error::Error {
    fn into_response(self) -> Response {
        use ck_domain::error::Error::*;
        let status = match &self {
            AuthMissing | AuthInvalid(_) => axum::http::StatusCode::UNAUTHORIZED,
            Ownership | NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            Busy(_) => axum::http::StatusCode::TOO_MANY_REQUESTS,
            ToolUnavailable(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ToolTimeout(_) => axum::http::StatusCode::GATEWAY_TIMEOUT,
            Malformed(_) => axum::http::StatusCode::BAD_REQUEST,
            DependencyFailure(_) | Internal(_) | Provider { .. } => {
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let mut resp = (status, axum::Json(serde_json::json!({ "error": self.to_string() })))
            .into_response();
        if let ck_domain::error::Error::Busy(_) = self {
            resp.headers_mut().insert(
                "retry-after",
                axum::http::HeaderValue::from_static("1"),
            );
        }
        resp
    }
}

#[allow(dead_code)]
pub(crate) fn anonymous_from_header(id: &str) -> Caller {
    Caller::anonymous(format!("anon-{id}"))
}
