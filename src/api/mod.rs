//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and `/ws` sit
//! at the root. Webhook ingress shares the trace and CORS layers but not
//! the request timeout, since a deferred acknowledgement must never turn
//! into a 408.

pub mod dto;
pub mod handlers;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::ws_handler;

/// OpenAPI document for the relay's HTTP surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "webhook-relay",
        description = "Relays signed webhook callbacks to pub/sub subscribers and records delivery latency."
    ),
    paths(
        handlers::channel::create_channel,
        handlers::channel::get_channel,
        handlers::channel::update_channel,
        handlers::event::post_event,
        handlers::event::post_channel_event,
        handlers::presentation::post_presentation,
        handlers::presentation::get_presentation,
        handlers::system::health_handler,
    ),
    tags(
        (name = "Channels", description = "Webhook channel registration"),
        (name = "Webhooks", description = "Public webhook ingress"),
        (name = "Presentations", description = "Short-lived presentation callbacks"),
        (name = "System", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

/// Builds the API router for every REST endpoint except webhook ingress.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the full application: REST routes, the `/ws` endpoint, API docs
/// and the HTTP middleware stack.
pub fn build_app(state: AppState) -> Router {
    let router = Router::new()
        .merge(build_router())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    );

    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout,
        ))
        .merge(Router::new().nest("/api/v1", handlers::event::routes()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
