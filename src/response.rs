use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use serde_json::Value;

use crate::validate::ErrorMap;

/// Uniform top-level JSON wrapper used for every response, success or
/// failure. `error_code` is present exactly when `success` is false.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl Envelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            errors: None,
            error: None,
            error_code: None,
        }
    }

    pub fn fail(message: impl Into<String>, error_code: &'static str) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: None,
            error: None,
            error_code: Some(error_code),
        }
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn errors(mut self, errors: ErrorMap) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn error(mut self, detail: impl Into<String>) -> Self {
        self.error = Some(detail.into());
        self
    }

    pub fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}
