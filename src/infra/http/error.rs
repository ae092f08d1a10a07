use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::error::{AppError, ErrorReport};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// JSON error response: `{ "error": "<public message>" }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(source: &'static str, status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            message,
            report: ErrorReport::from_message(source, status, message),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new("infra::http::auth", StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn from_app(source: &'static str, error: AppError) -> Self {
        let status = error.status_code();
        Self {
            status,
            message: error.public_message(),
            report: ErrorReport::from_error(source, status, &error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self::from_app("infra::http", error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.message.to_string(),
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
