use axum::{
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{ErrorKind, PipelineError};
use crate::AppState;

pub mod health;
pub mod onboarding;
pub mod swap;
pub mod wallet;

/// Error body returned by every control API route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    pub retryable: bool,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UserDeclined | ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Transient | ErrorKind::Failed => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Configuration | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
    }
}

pub fn api_error(error: PipelineError) -> ApiError {
    let kind = error.kind();
    (
        status_for(kind),
        Json(ErrorResponse {
            error: error.to_string(),
            kind,
            retryable: error.is_retryable(),
        }),
    )
}

/// Control API consumed by the UI
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/onboarding/progress", get(onboarding::get_progress))
        .route("/onboarding/check", post(onboarding::check_onboarding))
        .route("/onboarding/start", post(onboarding::start_onboarding))
        .route("/onboarding/retry/{key}", post(onboarding::retry_chain))
        .route("/wallet/chain", post(wallet::set_active_chain))
        .route("/wallet/select", post(wallet::select_safe))
        .route("/wallet/module-status", get(wallet::get_module_status))
        .route("/wallet/enable-module", post(wallet::enable_module))
        .route("/wallet/retry", post(wallet::retry_enable_module))
        .route("/swap/request", put(swap::set_request))
        .route("/swap/quote", post(swap::get_quote))
        .route("/swap/execute", post(swap::execute_swap))
        .route("/swap/state", get(swap::get_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            api_error(PipelineError::AlreadyRunning).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            api_error(PipelineError::UserRejected).0,
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let (status, Json(body)) = api_error(PipelineError::Network("reset".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.retryable);
        assert_eq!(body.kind, ErrorKind::Transient);
    }
}
