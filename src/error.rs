use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::response::Envelope;
use crate::validate::ErrorMap;

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

/// Enables verbose `error` fields on 500 envelopes. Set once at startup
/// from `APP_DEBUG`.
pub fn set_debug(enabled: bool) {
    DEBUG_MODE.store(enabled, Ordering::Relaxed);
}

fn debug_enabled() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

/// Static description of one fallible operation, used to build its 500
/// envelope: the machine code, the user-facing summary and the developer
/// elaboration.
#[derive(Debug)]
pub struct InternalOp {
    pub code: &'static str,
    pub message: &'static str,
    pub detail: &'static str,
}

pub mod ops {
    use super::InternalOp;

    pub static REGISTRATION: InternalOp = InternalOp {
        code: "REGISTRATION_ERROR",
        message: "Registration failed",
        detail: "An unexpected error occurred during registration",
    };
    pub static LOGIN: InternalOp = InternalOp {
        code: "LOGIN_ERROR",
        message: "Login failed",
        detail: "An unexpected error occurred during login",
    };
    pub static LOGOUT: InternalOp = InternalOp {
        code: "LOGOUT_ERROR",
        message: "Logout failed",
        detail: "An unexpected error occurred during logout",
    };
    pub static PROFILE: InternalOp = InternalOp {
        code: "PROFILE_ERROR",
        message: "Failed to retrieve profile",
        detail: "An unexpected error occurred while fetching profile",
    };
    pub static AUTH: InternalOp = InternalOp {
        code: "AUTH_ERROR",
        message: "Authentication failed",
        detail: "An unexpected error occurred during authentication",
    };
    pub static FETCH_ASSIGNMENTS: InternalOp = InternalOp {
        code: "FETCH_ASSIGNMENTS_ERROR",
        message: "Failed to retrieve assignments",
        detail: "An unexpected error occurred while fetching assignments",
    };
    pub static CREATE_ASSIGNMENT: InternalOp = InternalOp {
        code: "CREATE_ASSIGNMENT_ERROR",
        message: "Failed to create assignment",
        detail: "An unexpected error occurred while creating assignment",
    };
    pub static FETCH_ASSIGNMENT: InternalOp = InternalOp {
        code: "FETCH_ASSIGNMENT_ERROR",
        message: "Failed to retrieve assignment",
        detail: "An unexpected error occurred while fetching assignment",
    };
    pub static UPDATE_ASSIGNMENT: InternalOp = InternalOp {
        code: "UPDATE_ASSIGNMENT_ERROR",
        message: "Failed to update assignment",
        detail: "An unexpected error occurred while updating assignment",
    };
    pub static DELETE_ASSIGNMENT: InternalOp = InternalOp {
        code: "DELETE_ASSIGNMENT_ERROR",
        message: "Failed to delete assignment",
        detail: "An unexpected error occurred while deleting assignment",
    };
}

/// Every failure the API can report, each mapped to exactly one HTTP status
/// and `error_code`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(ErrorMap),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("no authenticated user found")]
    NotAuthenticated,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("access denied")]
    AccessDenied,
    #[error("invalid assignment id")]
    InvalidId,
    #[error("assignment not found")]
    AssignmentNotFound,
    #[error("{0} not found")]
    ModelNotFound(&'static str),
    #[error("resource not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("too many requests")]
    TooManyRequests,
    #[error("http error {0}")]
    Http(StatusCode),
    #[error("internal error")]
    Internal {
        op: &'static InternalOp,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    /// Adapter for `map_err` at the handler boundary: wraps any unexpected
    /// infrastructure failure into the operation's 500 envelope.
    pub fn internal(op: &'static InternalOp) -> impl FnOnce(anyhow::Error) -> ApiError {
        move |source| ApiError::Internal { op, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthenticated
            | ApiError::NotAuthenticated
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::AccessDenied => StatusCode::FORBIDDEN,
            ApiError::InvalidId => StatusCode::BAD_REQUEST,
            ApiError::AssignmentNotFound | ApiError::ModelNotFound(_) | ApiError::NotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Http(status) => *status,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::NotAuthenticated => "NOT_AUTHENTICATED",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::AccessDenied => "ACCESS_DENIED",
            ApiError::InvalidId => "INVALID_ID",
            ApiError::AssignmentNotFound => "ASSIGNMENT_NOT_FOUND",
            ApiError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiError::TooManyRequests => "TOO_MANY_REQUESTS",
            ApiError::Http(_) => "HTTP_ERROR",
            ApiError::Internal { op, .. } => op.code,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(_) => "Validation failed".into(),
            ApiError::Unauthenticated => "Unauthenticated".into(),
            ApiError::NotAuthenticated => "No authenticated user found".into(),
            ApiError::InvalidCredentials => "Invalid credentials".into(),
            ApiError::AccessDenied => "Access denied".into(),
            ApiError::InvalidId => "Invalid assignment ID".into(),
            ApiError::AssignmentNotFound => "Assignment not found".into(),
            ApiError::ModelNotFound(model) => format!("{model} not found"),
            ApiError::NotFound => "Resource not found".into(),
            ApiError::MethodNotAllowed => "Method not allowed".into(),
            ApiError::TooManyRequests => "Too many requests. Please try again later.".into(),
            ApiError::Http(status) => status
                .canonical_reason()
                .unwrap_or("HTTP error")
                .to_string(),
            ApiError::Internal { op, .. } => op.message.into(),
        }
    }

    fn from_status(status: StatusCode) -> ApiError {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthenticated,
            StatusCode::FORBIDDEN => ApiError::AccessDenied,
            StatusCode::NOT_FOUND => ApiError::NotFound,
            StatusCode::METHOD_NOT_ALLOWED => ApiError::MethodNotAllowed,
            StatusCode::TOO_MANY_REQUESTS => ApiError::TooManyRequests,
            other => ApiError::Http(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut envelope = Envelope::fail(self.message(), self.error_code());

        match self {
            ApiError::Validation(errors) => {
                envelope = envelope.errors(errors);
            }
            ApiError::Internal { op, source } => {
                error!(error = %source, code = op.code, "internal error");
                envelope = if debug_enabled() {
                    envelope.error(format!("{}: {source:#}", op.detail))
                } else {
                    envelope.error(op.detail)
                };
            }
            _ => {}
        }

        envelope.with_status(status)
    }
}

/// Top-level boundary: anything the framework produced on its own (plain
/// 405s, extractor rejections that bypass handlers) leaves here wrapped in
/// the same envelope shape as handler-produced failures. Responses that are
/// already JSON pass through untouched.
pub async fn normalize_errors(req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    let status = res.status();

    if !status.is_client_error() && !status.is_server_error() {
        return res;
    }

    let is_json = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if is_json {
        return res;
    }

    ApiError::from_status(status).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_and_code_always_agree() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                ApiError::Validation(ErrorMap::single("title", "The title field is required.")),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            (ApiError::NotAuthenticated, StatusCode::UNAUTHORIZED, "NOT_AUTHENTICATED"),
            (ApiError::InvalidCredentials, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            (ApiError::AccessDenied, StatusCode::FORBIDDEN, "ACCESS_DENIED"),
            (ApiError::InvalidId, StatusCode::BAD_REQUEST, "INVALID_ID"),
            (ApiError::AssignmentNotFound, StatusCode::NOT_FOUND, "ASSIGNMENT_NOT_FOUND"),
            (ApiError::ModelNotFound("User"), StatusCode::NOT_FOUND, "MODEL_NOT_FOUND"),
            (ApiError::NotFound, StatusCode::NOT_FOUND, "NOT_FOUND"),
            (ApiError::MethodNotAllowed, StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED"),
            (ApiError::TooManyRequests, StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS"),
            (ApiError::Http(StatusCode::BAD_GATEWAY), StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
        ];

        for (err, status, code) in cases {
            let res = err.into_response();
            assert_eq!(res.status(), status);
            let body = body_json(res).await;
            assert_eq!(body["success"], Value::Bool(false));
            assert_eq!(body["error_code"], Value::String(code.into()));
            assert!(body["message"].is_string());
        }
    }

    #[tokio::test]
    async fn validation_error_carries_field_map() {
        let err = ApiError::Validation(ErrorMap::single("email", "The email has already been taken."));
        let body = body_json(err.into_response()).await;
        assert_eq!(
            body["errors"]["email"][0],
            Value::String("The email has already been taken.".into())
        );
    }

    #[tokio::test]
    async fn internal_error_hides_detail_without_debug() {
        set_debug(false);
        let err = ApiError::internal(&ops::CREATE_ASSIGNMENT)(anyhow::anyhow!("pool timed out"));
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(res).await;
        assert_eq!(body["error_code"], Value::String("CREATE_ASSIGNMENT_ERROR".into()));
        let detail = body["error"].as_str().unwrap();
        assert!(!detail.contains("pool timed out"));
    }
}
