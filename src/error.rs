use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single conversion entry. Each variant is fatal for its entry
/// only; the batch runner records it and moves on.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("input file not found or unreadable: {}", .path.display())]
    InputNotFound { path: PathBuf },

    #[error("no candidate encoding could decode {} (tried: {})", .path.display(), .tried.join(", "))]
    EncodingExhausted { path: PathBuf, tried: Vec<String> },

    #[error("header row of {} has no usable columns", .path.display())]
    EmptyHeader { path: PathBuf },

    #[error("index column '{column}' does not exist in the table schema")]
    InvalidIndexColumn { column: String },

    #[error("cannot write {}: {message}", .path.display())]
    WriteFailure { path: PathBuf, message: String },

    #[error("malformed record in {} at line {line}: {message}", .path.display())]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

impl ConversionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::InputNotFound { .. } => "input_not_found",
            ConversionError::EncodingExhausted { .. } => "encoding_exhausted",
            ConversionError::EmptyHeader { .. } => "empty_header",
            ConversionError::InvalidIndexColumn { .. } => "invalid_index_column",
            ConversionError::WriteFailure { .. } => "write_failure",
            ConversionError::MalformedRecord { .. } => "malformed_record",
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ConversionError::WriteFailure {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ParseError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::IoError(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
