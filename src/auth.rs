//! Bearer-token gate for the webhook admin surface.
//!
//! Endpoint management, logs, diagnostics, and manual retries all sit behind
//! this middleware; the internal event intake route does not. The token comes
//! from `RELAY_ADMIN_API_TOKEN` and when it is unset the gate is open, which
//! suits local development only.

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{error::ApiError, state::AppState};

pub async fn admin_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.admin_api_token else {
        return Ok(next.run(req).await);
    };

    let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let Some(provided) = header.and_then(bearer_token) else {
        return Err(ApiError::unauthorized(
            "missing or invalid Authorization header",
        ));
    };

    // Comparison is constant time so token length and prefix never leak.
    if !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        return Err(ApiError::unauthorized("invalid token"));
    }

    Ok(next.run(req).await)
}

/// Pulls the token out of a `Bearer <token>` header value. The scheme is
/// matched case-insensitively and surrounding whitespace is ignored.
fn bearer_token(value: &str) -> Option<&str> {
    let trimmed = value.trim_start();
    let (scheme, rest) = trimmed.split_at_checked(7)?;
    scheme
        .eq_ignore_ascii_case("bearer ")
        .then_some(rest.trim())
}

#[cfg(test)]
mod tests {
    use super::bearer_token;

    #[test]
    fn extracts_token_regardless_of_scheme_case() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("  BEARER  abc123  "), Some("abc123"));
    }

    #[test]
    fn rejects_other_schemes_and_bare_tokens() {
        assert_eq!(bearer_token("Basic abc123"), None);
        assert_eq!(bearer_token("abc123"), None);
        assert_eq!(bearer_token(""), None);
    }
}
