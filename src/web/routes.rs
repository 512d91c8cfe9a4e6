use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Data intake
        .route("/upload", post(handlers::api::upload_file))
        // Natural-language querying
        .route("/generate-sql", post(handlers::api::generate_sql))
        .route("/predict", post(handlers::api::generate_sql))
        .route("/execute-sql/{session_id}", post(handlers::api::execute_sql))
        // Sessions
        .route("/sessions", get(handlers::api::list_sessions))
        .route("/schema/{session_id}", get(handlers::api::get_schema))
        .route("/schemas/{session_id}", get(handlers::api::get_schema))
        .route("/session/{session_id}", delete(handlers::api::delete_session))
        // Providers and status
        .route("/providers", get(handlers::api::list_providers))
        .route("/providers/test", post(handlers::api::test_providers))
        .route("/health", get(handlers::api::health))
}
