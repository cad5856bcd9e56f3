use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lambda_http::tracing;
use serde::{Deserialize, Serialize};
use utoipa::{PartialSchema, ToSchema};
use validator::ValidationErrors;

use crate::{images::ImageError, store::StoreError};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always false.
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip)]
    status: u16,
}

impl ErrorResponse {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: None,
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(self)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Image storage error: {0}")]
    Image(#[from] ImageError),
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JWT operation failed: {0}")]
    JWTError(#[from] jsonwebtoken::errors::Error),
    #[error("PasswordHash error: {0}")]
    PasswordHashError(#[from] scrypt::password_hash::Error),
    #[error("Invalid scrypt parameters: {0}")]
    ScryptParams(#[from] scrypt::errors::InvalidParams),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Image(ImageError::UnsupportedType(_)) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| FieldError {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({})", e.code)),
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

impl From<HandlerError> for ErrorResponse {
    fn from(value: HandlerError) -> Self {
        let status = value.status();
        let mut resp = match &value {
            HandlerError::Store(StoreError::Conflict(_)) => ErrorResponse::new(
                status,
                "The resource was modified by another request, please retry",
            ),
            _ if status.is_server_error() => {
                tracing::error!("Unhandled handler error: {}", value);
                ErrorResponse::new(status, "Internal server error")
            }
            _ => ErrorResponse::new(status, value.to_string()),
        };
        if let HandlerError::Validation(errors) = &value {
            resp.errors = Some(field_errors(errors));
        }
        resp
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

impl PartialSchema for HandlerError {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        ErrorResponse::schema()
    }
}

impl ToSchema for HandlerError {
    fn schemas(
        schemas: &mut Vec<(
            String,
            utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
        )>,
    ) {
        <ErrorResponse as ToSchema>::schemas(schemas);
    }
}

#[cfg(test)]
mod tests {
    use validator::ValidationError;

    use super::*;

    #[test]
    fn conflicts_map_to_409() {
        let err = HandlerError::Store(StoreError::Conflict("books/1".to_string()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(
            HandlerError::conflict("already reviewed").status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn validation_errors_are_listed_per_field() {
        let mut errors = ValidationErrors::new();
        let mut e = ValidationError::new("length");
        e.message = Some("Name must be between 2 and 50 characters".into());
        errors.add("name", e);
        errors.add("email", ValidationError::new("email"));

        let resp = ErrorResponse::from(HandlerError::Validation(errors));
        let fields = resp.errors.expect("field errors");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field, "email");
        assert_eq!(fields[0].message, "Invalid value (email)");
        assert_eq!(fields[1].message, "Name must be between 2 and 50 characters");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = HandlerError::Store(StoreError::Backend("connection reset".to_string()));
        let resp = ErrorResponse::from(err);
        assert_eq!(resp.message, "Internal server error");
    }
}
