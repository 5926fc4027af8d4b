pub mod api_client;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod reports;
pub mod routes;
pub mod security_parser;
pub mod state;
pub mod transform;
pub mod xirr_engine;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();
    base.allow_origin(parsed)
}

pub fn app(state: state::AppState) -> Router {
    let cors = cors_layer(&state.config().cors_allow);
    Router::new()
        .merge(routes::router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
