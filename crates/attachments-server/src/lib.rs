pub mod auth;
pub mod config;
mod routes;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use attachments_service::AttachmentService;
use tokio::net::TcpListener;

use auth::AuthConfig;
use routes::InnerAppState;

/// The full HTTP surface: health plus the attachment endpoints.
pub fn router(service: AttachmentService, auth: Option<Arc<AuthConfig>>) -> Router {
    routes::build_router(Arc::new(InnerAppState { service, auth }))
}

pub async fn serve(
    listener: TcpListener,
    service: AttachmentService,
    auth: Option<Arc<AuthConfig>>,
) -> Result<()> {
    let app = router(service, auth);
    axum::serve(listener, app).await?;
    Ok(())
}
