pub mod attachments;
pub mod health;

use std::sync::Arc;

use axum::{http::StatusCode, middleware, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use attachments_service::{AttachmentService, ServiceError};

use crate::auth::{auth_middleware, AuthConfig};

pub struct InnerAppState {
    pub service: AttachmentService,
    pub auth: Option<Arc<AuthConfig>>,
}

pub type AppState = Arc<InnerAppState>;

pub fn build_router(state: AppState) -> Router {
    let public = Router::new().merge(health::routes());

    let protected = Router::new()
        .merge(attachments::routes(state.service.limits().max_upload_bytes))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn error_response(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": msg.into() })))
}

pub(crate) fn to_error(e: ServiceError) -> ApiError {
    match &e {
        ServiceError::NotFound(_) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        ServiceError::Ambiguous(_) => error_response(StatusCode::CONFLICT, e.to_string()),
        ServiceError::Invalid(errors) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string(), "fields": errors.fields })),
        ),
        ServiceError::Forbidden(_) => error_response(StatusCode::FORBIDDEN, e.to_string()),
        ServiceError::Internal(_) => {
            tracing::error!(error = %e, "request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
