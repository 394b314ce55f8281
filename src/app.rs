use axum::{http::HeaderName, http::HeaderValue, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::clock::SharedClock;
use crate::config::Settings;
use crate::evaluation::EvaluationEngine;
use crate::lifecycle::{AwardCoordinator, BidLifecycle, TenderLifecycle};
use crate::routes;
use crate::services::{AiClient, Summarizer};
use crate::store::ProcurementStore;

/// Header name for request ID
pub const X_REQUEST_ID: &str = "x-request-id";

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn ProcurementStore>,
    pub tenders: TenderLifecycle,
    pub bids: BidLifecycle,
    pub awards: AwardCoordinator,
    pub engine: EvaluationEngine,
    /// Present only when the AI narrative service is configured; used for
    /// health checks.
    pub ai_client: Option<AiClient>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ProcurementStore>,
        summarizer: Arc<dyn Summarizer>,
        ai_client: Option<AiClient>,
        clock: SharedClock,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            tenders: TenderLifecycle::new(store.clone(), clock.clone()),
            bids: BidLifecycle::new(store.clone(), clock.clone()),
            awards: AwardCoordinator::new(store.clone(), clock.clone()),
            engine: EvaluationEngine::new(summarizer, clock),
            store,
            ai_client,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(&state.settings);

    // Build trace layer (use DEBUG for spans to reduce overhead at INFO level)
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    // Request ID layers
    let request_id_header = HeaderName::from_static(X_REQUEST_ID);
    let set_request_id = SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid);
    let propagate_request_id = PropagateRequestIdLayer::new(request_id_header);

    // Build router (routes at root level, no /api prefix)
    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // In dev mode, use longer preflight cache to reduce OPTIONS requests
    let max_age = if settings.env.is_dev() {
        // Cache preflight for 24 hours in development
        std::time::Duration::from_secs(86400)
    } else {
        // 1 hour in production
        std::time::Duration::from_secs(3600)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static(X_REQUEST_ID),
            axum::http::HeaderName::from_static(crate::auth::context::X_USER_ID),
            axum::http::HeaderName::from_static(crate::auth::context::X_COMPANY_ID),
            axum::http::HeaderName::from_static(crate::auth::context::X_USER_ROLE),
        ]))
        .allow_credentials(true)
        .max_age(max_age)
}
