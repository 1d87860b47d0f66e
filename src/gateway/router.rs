//! HTTP router

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    response::Response,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::pipeline::Gatekeeper;

/// Create the router.
///
/// There are no fixed routes: every method and path reaches the gatekeeper,
/// which owns the allow-list.
pub fn create_router(gatekeeper: Arc<Gatekeeper>) -> Router {
    Router::new()
        .fallback(gatekeeper_handler)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(gatekeeper)
}

async fn gatekeeper_handler(State(gatekeeper): State<Arc<Gatekeeper>>, request: Request) -> Response {
    gatekeeper.handle(request).await
}
