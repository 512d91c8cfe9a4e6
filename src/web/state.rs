use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::LlmManager;
use crate::query::QueryPipeline;
use crate::session::SessionStore;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub sessions: Arc<SessionStore>,
    pub llm_manager: Arc<LlmManager>,
    pub pipeline: QueryPipeline,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, sessions: Arc<SessionStore>, llm_manager: Arc<LlmManager>) -> Self {
        let pipeline = QueryPipeline::new(
            Arc::clone(&sessions),
            Arc::clone(&llm_manager),
            config.sessions.sample_rows,
        );

        Self {
            config,
            sessions,
            llm_manager,
            pipeline,
            startup_time: chrono::Utc::now(),
        }
    }
}
