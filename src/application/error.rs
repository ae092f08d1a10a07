use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    domain::{error::DomainError, proxy::ProxyError},
    infra::error::InfraError,
};

use super::{metadata::MetadataError, search::SearchError};

/// Diagnostic chain attached to failing responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
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

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("caller is not authenticated")]
    Unauthorized,
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

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Domain(_)
            | AppError::Validation(_)
            | AppError::Proxy(_)
            | AppError::Metadata(MetadataError::Proxy(_))
            | AppError::Metadata(MetadataError::ImageHost(_)) => StatusCode::BAD_REQUEST,
            AppError::Infra(_)
            | AppError::Search(_)
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Metadata(err) if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Metadata(err) if err.upstream_status() == Some(404) => StatusCode::NOT_FOUND,
            AppError::Metadata(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to show to callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "Unauthorized",
            AppError::Search(_) => "Search failed",
            AppError::Proxy(_) | AppError::Metadata(MetadataError::Proxy(_)) => {
                "Invalid proxy configuration"
            }
            AppError::Metadata(MetadataError::ImageHost(_)) => "Image host not allowed",
            AppError::Domain(_) | AppError::Validation(_) => {
                "Request could not be processed"
            }
            AppError::Metadata(err) if err.upstream_status() == Some(404) => "Resource not found",
            AppError::Metadata(_) => "Upstream metadata request failed",
            AppError::Infra(_) | AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}
