use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Typed failure taxonomy for token issuance and verification.
///
/// `InvalidRequest` and `InvalidClient` carry the stable machine-readable
/// codes (`AUTH4xx` / `AUTH1xx`) the API contract promises; storage internals
/// never leak through any variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A required request field is missing or malformed. Raised before any
    /// storage call is made.
    #[error("{message}")]
    InvalidRequest {
        code: &'static str,
        message: String,
    },

    /// No matching principal, or the matched account is closed.
    #[error("{message}")]
    InvalidClient {
        code: &'static str,
        message: String,
    },

    /// Client authentication failed (unknown client or secret mismatch).
    #[error("{0}")]
    UnauthorizedClient(String),

    /// Bad signature, malformed token, or expired claims.
    #[error("{0}")]
    InvalidToken(String),

    /// Persistence failed after successful validation.
    #[error("{0}")]
    Server(String),
}

impl AuthError {
    pub fn invalid_request(code: &'static str, message: &str) -> Self {
        Self::InvalidRequest {
            code,
            message: message.to_string(),
        }
    }

    pub fn no_matched_user() -> Self {
        Self::InvalidClient {
            code: "AUTH101",
            message: "No matched user exist.".to_string(),
        }
    }

    pub fn closed_account() -> Self {
        Self::InvalidClient {
            code: "AUTH102",
            message: "This is a closed account.".to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { code, .. } | Self::InvalidClient { code, .. } => code,
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::InvalidToken(_) => "invalid_token",
            Self::Server(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::InvalidClient { .. } => StatusCode::BAD_REQUEST,
            Self::UnauthorizedClient(_) | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Builds a `{code, message}` error response. Handler-local validation codes
/// (`DATA4xx`, `SERVICEUSER4xx`) go through here too.
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = ErrorBody {
        code: code.to_string(),
        message: message.to_string(),
    };

    (status, Json(body)).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Server(message) = &self {
            tracing::error!("token request failed with server error: {message}");
        }

        error_response(self.status(), self.code(), &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        assert_eq!(AuthError::no_matched_user().code(), "AUTH101");
        assert_eq!(AuthError::closed_account().code(), "AUTH102");
        assert_eq!(
            AuthError::no_matched_user().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::invalid_request("AUTH406", "username is missing.").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::UnauthorizedClient("nope".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidToken("expired".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Server("fail to save token".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_is_the_message() {
        let err = AuthError::invalid_request("AUTH402", "grant_type is missing.");
        assert_eq!(err.to_string(), "grant_type is missing.");
        assert_eq!(
            AuthError::closed_account().to_string(),
            "This is a closed account."
        );
    }
}
