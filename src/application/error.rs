use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{application::repos::RepoError, domain::error::DomainError, infra::error::InfraError};

/// Diagnostic detail for a failed request, attached to response extensions
/// so the logging middleware can emit it without leaking it to clients.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// An error ready to leave the HTTP boundary: a public message for the
/// client and a detailed report for the logs.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "message": self.public_message,
        }));
        let mut response = (self.status, body).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<RepoError> for HttpError {
    fn from(error: RepoError) -> Self {
        let source = "infra::http::repo_error_to_http";
        match &error {
            RepoError::NotFound => HttpError::new(
                source,
                StatusCode::NOT_FOUND,
                "Resource not found",
                "repository reported missing record",
            ),
            RepoError::Duplicate { .. } => HttpError::from_error(
                source,
                StatusCode::CONFLICT,
                "Resource already exists",
                &error,
            ),
            RepoError::InvalidInput { .. } => HttpError::from_error(
                source,
                StatusCode::BAD_REQUEST,
                "Request could not be processed",
                &error,
            ),
            RepoError::Timeout => HttpError::from_error(
                source,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
            RepoError::Persistence(_) | RepoError::Integrity { .. } => HttpError::from_error(
                source,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::NotFound { .. })
            | AppError::Repo(RepoError::NotFound)
            | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Repo(RepoError::InvalidInput { .. })
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Repo(RepoError::Duplicate { .. }) => StatusCode::CONFLICT,
            AppError::Repo(RepoError::Timeout) | AppError::Infra(InfraError::Database { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Infra(_)
            | AppError::Repo(_)
            | AppError::Domain(DomainError::Invariant { .. })
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::NotFound { .. })
            | AppError::Repo(RepoError::NotFound)
            | AppError::NotFound => "Resource not found",
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Repo(RepoError::InvalidInput { .. })
            | AppError::Validation(_) => "Request could not be processed",
            AppError::Repo(RepoError::Duplicate { .. }) => "Resource already exists",
            AppError::Repo(RepoError::Timeout) | AppError::Infra(InfraError::Database { .. }) => {
                "Service temporarily unavailable"
            }
            _ => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let body = Json(json!({
            "status": "error",
            "message": message,
        }));
        let mut response = (status, body).into_response();
        report.attach(&mut response);
        response
    }
}
