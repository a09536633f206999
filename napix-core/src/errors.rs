use std::collections::BTreeMap;

use crate::http::response::{IntoResponse, Response};
use crate::http::{header, Json, StatusCode};

/// Helper to create a JSON error response with a standard `{ "error": message }` body.
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

/// A validation failure, either a bare message or a per-field map.
///
/// Field maps render as `{"field": "message", ...}` on the wire; bare
/// messages render as `{"error": "message"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Simple(String),
    Fields(BTreeMap<String, String>),
}

impl ValidationError {
    pub fn simple(message: impl Into<String>) -> Self {
        ValidationError::Simple(message.into())
    }

    /// A single-field error, the shape produced by schema validation.
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(name.into(), message.into());
        ValidationError::Fields(fields)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ValidationError::Simple(message) => serde_json::json!({ "error": message }),
            ValidationError::Fields(fields) => {
                serde_json::to_value(fields).unwrap_or(serde_json::Value::Null)
            }
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Simple(message) => f.write_str(message),
            ValidationError::Fields(fields) => {
                let mut first = true;
                for (name, message) in fields {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{name}: {message}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// The recoverable error kinds the dispatcher converts to HTTP responses.
///
/// Anything that is not one of these surfaces as an opaque 500, logged
/// server-side.
#[derive(Debug)]
pub enum HttpError {
    /// Schema, id, or body validation failed.
    BadRequest(ValidationError),
    /// A manager reported a missing resource.
    NotFound(String),
    /// Collision on create.
    Duplicate(String),
    /// The verb is not supported here; carries the advertised methods.
    MethodNotAllowed(Vec<&'static str>),
    /// Unknown `?format=`; carries the declared formats.
    NotAcceptable(Vec<String>),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::BadRequest(err) => {
                (StatusCode::BAD_REQUEST, Json(err.to_json())).into_response()
            }
            HttpError::NotFound(id) => {
                error_response(StatusCode::NOT_FOUND, format!("`{id}` not found"))
            }
            HttpError::Duplicate(id) => {
                error_response(StatusCode::CONFLICT, format!("`{id}` already exists"))
            }
            HttpError::MethodNotAllowed(allowed) => {
                let mut response = error_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Method not allowed",
                );
                if let Ok(value) = allowed.join(", ").parse() {
                    response.headers_mut().insert(header::ALLOW, value);
                }
                response
            }
            HttpError::NotAcceptable(formats) => error_response(
                StatusCode::NOT_ACCEPTABLE,
                format!("Cannot render this format; available formats: {}", formats.join(", ")),
            ),
            HttpError::Internal(message) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::BadRequest(err) => write!(f, "Bad Request: {err}"),
            HttpError::NotFound(id) => write!(f, "Not Found: {id}"),
            HttpError::Duplicate(id) => write!(f, "Conflict: {id}"),
            HttpError::MethodNotAllowed(allowed) => {
                write!(f, "Method Not Allowed (allow: {})", allowed.join(", "))
            }
            HttpError::NotAcceptable(formats) => {
                write!(f, "Not Acceptable (formats: {})", formats.join(", "))
            }
            HttpError::Internal(message) => write!(f, "Internal Error: {message}"),
        }
    }
}

impl std::error::Error for HttpError {}

impl From<ValidationError> for HttpError {
    fn from(err: ValidationError) -> Self {
        HttpError::BadRequest(err)
    }
}
