use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::error;

use crate::engine::{EngineError, CONFLICT_MESSAGE};

/// `{success: true, data, message}` with a chosen status.
pub struct ApiResponse {
    status: StatusCode,
    data: Value,
    message: String,
}

impl ApiResponse {
    /// 200 with `data` wrapped as `{key: data}`.
    pub fn ok(key: &str, data: impl Serialize, message: impl Into<String>) -> Result<Self, ApiError> {
        Self::keyed(StatusCode::OK, key, data, message)
    }

    pub fn created(
        key: &str,
        data: impl Serialize,
        message: impl Into<String>,
    ) -> Result<Self, ApiError> {
        Self::keyed(StatusCode::CREATED, key, data, message)
    }

    /// 200 with a message only.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            data: Value::Null,
            message: message.into(),
        }
    }

    /// 200 with `data` serialized as is.
    pub fn with_data(data: impl Serialize, message: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            status: StatusCode::OK,
            data: to_value(data)?,
            message: message.into(),
        })
    }

    fn keyed(
        status: StatusCode,
        key: &str,
        data: impl Serialize,
        message: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let mut wrapped = Map::new();
        wrapped.insert(key.to_string(), to_value(data)?);
        Ok(Self {
            status,
            data: Value::Object(wrapped),
            message: message.into(),
        })
    }
}

fn to_value(data: impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(data).map_err(|e| ApiError::Unexpected(e.to_string()))
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let body = json!({
            "success": true,
            "data": self.data,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Field name → messages, rendered under `data` of a validation error.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Every way a request can fail, already mapped to an HTTP status.
#[derive(Debug)]
pub enum ApiError {
    /// Body, path, or query could not be decoded at all.
    BadRequest(String),
    /// Well-formed request whose fields break the rules.
    Validation { message: String, errors: FieldErrors },
    Unauthenticated,
    Forbidden(String),
    NotFound(String),
    Conflict,
    Unexpected(String),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation {
            message: "Validation Error.".into(),
            errors,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation { .. } | ApiError::Conflict => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Invalid { field, reason } => {
                ApiError::field(field, format!("The {field} {reason}."))
            }
            EngineError::PlaceNotFound(_) => ApiError::NotFound("Place not found.".into()),
            EngineError::BookingNotFound(_) => ApiError::NotFound("Booking not found.".into()),
            EngineError::Forbidden(msg) => ApiError::Forbidden(format!("Unauthorized. {msg}.")),
            EngineError::Conflict(_) => ApiError::Conflict,
            EngineError::Unavailable(v) => {
                let mut errors = FieldErrors::new();
                errors.insert("availability".into(), vec![v.to_string()]);
                ApiError::Validation {
                    message: "The place is not available for the selected schedule.".into(),
                    errors,
                }
            }
            EngineError::LimitExceeded(msg) => ApiError::Validation {
                message: format!("Limit exceeded: {msg}."),
                errors: FieldErrors::new(),
            },
            EngineError::WalError(msg) => ApiError::Unexpected(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation { message, errors } if !errors.is_empty() => {
                json!({ "success": false, "message": message, "data": errors })
            }
            ApiError::Validation { message, .. }
            | ApiError::BadRequest(message)
            | ApiError::Forbidden(message)
            | ApiError::NotFound(message) => json!({ "success": false, "message": message }),
            ApiError::Unauthenticated => json!({ "success": false, "message": "Unauthenticated." }),
            ApiError::Conflict => json!({ "success": false, "message": CONFLICT_MESSAGE }),
            ApiError::Unexpected(message) => {
                error!("unexpected error: {message}");
                json!({ "success": false, "message": message })
            }
        };
        (status, Json(body)).into_response()
    }
}
