use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Uniform response wrapper. Serializes as `{status, data?, message?}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Success {
        data: Option<T>,
        message: Option<String>,
    },
    NotFound,
    Error(String),
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse::Success {
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        ApiResponse::Success {
            data: Some(data),
            message: Some(message.into()),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ApiResponse::Success { .. } => "success",
            ApiResponse::NotFound => "not_found",
            ApiResponse::Error(_) => "error",
        }
    }

    /// `not_found` is a body-level sentinel and still answers 200.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiResponse::Success { .. } | ApiResponse::NotFound => StatusCode::OK,
            ApiResponse::Error(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse::Success {
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ApiResponse::Error(message.into())
    }
}

impl<T: Serialize> Serialize for ApiResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("status", self.status())?;
        match self {
            ApiResponse::Success { data, message } => {
                if let Some(data) = data {
                    map.serialize_entry("data", data)?;
                }
                if let Some(message) = message {
                    map.serialize_entry("message", message)?;
                }
            }
            ApiResponse::NotFound => {}
            ApiResponse::Error(message) => map.serialize_entry("message", message)?,
        }
        map.end()
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}
