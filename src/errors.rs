use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::access::errors::AclError;

#[derive(Debug, Error, Diagnostic)]
pub enum CrmError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(crm::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(crm::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(crm::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(crm::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidAcl(#[from] AclError),

    #[error("Not found: {0}")]
    #[diagnostic(code(crm::not_found))]
    NotFound(String),

    #[error("Access denied")]
    #[diagnostic(code(crm::access_denied))]
    AccessDenied,

    #[error("Bad request: {0}")]
    #[diagnostic(code(crm::bad_request))]
    BadRequest(String),

    #[error("Data integrity fault: {0}")]
    #[diagnostic(
        code(crm::integrity),
        help("Every resource row must reference exactly one variant row of its own kind")
    )]
    Integrity(String),

    #[error("Password hashing failed: {0}")]
    #[diagnostic(code(crm::password))]
    Password(String),

    #[error("Commit rejected with {0} outstanding exception(s)")]
    #[diagnostic(code(crm::commit_rejected))]
    CommitRejected(usize),

    #[error("{0}")]
    #[diagnostic(code(crm::other))]
    Other(String),
}

impl CrmError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        CrmError::NotFound(what.to_string())
    }
}

impl From<argon2::password_hash::Error> for CrmError {
    fn from(value: argon2::password_hash::Error) -> Self {
        CrmError::Password(value.to_string())
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        match &self {
            // Unknown ids and denied ids look the same from the outside.
            CrmError::NotFound(_) | CrmError::AccessDenied => {
                tracing::debug!(error = %self, "Redirecting to safe default");
                Redirect::to("/").into_response()
            }
            CrmError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            _ => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
