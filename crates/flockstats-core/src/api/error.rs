use thiserror::Error;

/// Failure of a single statistics request. The coordinator keeps these per
/// source; only `Unauthorized` changes how a whole batch is treated.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Statistics not visible to this account: {0}")]
    AccessDenied(String),

    #[error("Bearer token rejected - sign in again")]
    Unauthorized,

    #[error("No statistics at this endpoint: {0}")]
    NotFound(String),

    #[error("Statistics backend is throttling requests")]
    RateLimited,

    #[error("Statistics backend failed: {0}")]
    ServerError(String),

    #[error("Could not reach statistics backend: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Unexpected statistics payload: {0}")]
    InvalidResponse(String),
}

/// Response bodies quoted in errors are cut to this many bytes
const BODY_EXCERPT_BYTES: usize = 500;

impl ApiError {
    /// Leading part of `body`, cut on a char boundary
    fn excerpt(body: &str) -> String {
        if body.len() <= BODY_EXCERPT_BYTES {
            return body.to_string();
        }
        let cut = (0..=BODY_EXCERPT_BYTES)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
    }

    /// Map a non-success HTTP status (other than a retried 429) to an error
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            429 => ApiError::RateLimited,
            403 => ApiError::AccessDenied(Self::excerpt(body)),
            404 => ApiError::NotFound(Self::excerpt(body)),
            code if status.is_server_error() => {
                ApiError::ServerError(format!("HTTP {}: {}", code, Self::excerpt(body)))
            }
            _ => ApiError::InvalidResponse(format!("HTTP {}: {}", status, Self::excerpt(body))),
        }
    }

    /// True for failures that need the requester to sign in again
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Failures likely to clear up on the next refresh without intervention
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited | ApiError::ServerError(_) | ApiError::NetworkError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, "no"), ApiError::AccessDenied(_)));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, ""), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, ""), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::IM_A_TEAPOT, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_only_unauthorized_is_auth() {
        assert!(ApiError::Unauthorized.is_auth());
        assert!(!ApiError::AccessDenied("x".into()).is_auth());
        assert!(!ApiError::ServerError("x".into()).is_auth());
    }

    #[test]
    fn test_transient_failures() {
        assert!(ApiError::RateLimited.is_transient());
        assert!(ApiError::ServerError("x".into()).is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
        assert!(!ApiError::InvalidResponse("x".into()).is_transient());
        match ApiError::from_status(StatusCode::BAD_GATEWAY, "upstream down") {
            ApiError::ServerError(msg) => assert_eq!(msg, "HTTP 502: upstream down"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "é".repeat(400);
        match ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            ApiError::ServerError(msg) => {
                assert!(msg.contains("truncated, 800 total bytes"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
