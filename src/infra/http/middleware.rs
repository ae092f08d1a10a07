use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{application::error::ErrorReport, domain::identity::Identity};

use super::{AppState, error::ApiError};

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";
const LOG_TARGET: &str = "marquee::http::response";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolves the caller from `Authorization: Bearer` or `x-auth-token`.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let identity = extract_token(request.headers())
        .and_then(|token| state.identities.authenticate(&token));

    match identity {
        Some(identity) => {
            request.extensions_mut().insert(identity.clone());
            let mut response = next.run(request).await;
            response.extensions_mut().insert(identity);
            response
        }
        None => ApiError::unauthorized().into_response(),
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim);
    let header = headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);
    bearer
        .or(header)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Logs every response at debug and failures at warn/error with the attached [`ErrorReport`].
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let username = response
        .extensions()
        .get::<Identity>()
        .map(|identity| identity.username().to_string())
        .unwrap_or_default();

    if !status.is_client_error() && !status.is_server_error() {
        debug!(
            target_module = LOG_TARGET,
            status = status.as_u16(),
            method = %method,
            path,
            elapsed_ms,
            request_id,
            username,
            "request served"
        );
        return response;
    }

    let (source, chain) = response
        .extensions_mut()
        .remove::<ErrorReport>()
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let detail = chain
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");

    if status.is_server_error() {
        error!(
            target_module = LOG_TARGET,
            status = status.as_u16(),
            method = %method,
            path,
            elapsed_ms,
            request_id,
            username,
            source,
            detail,
            chain = ?chain,
            "request failed"
        );
    } else {
        warn!(
            target_module = LOG_TARGET,
            status = status.as_u16(),
            method = %method,
            path,
            elapsed_ms,
            request_id,
            username,
            source,
            detail,
            "request rejected"
        );
    }
    response
}
