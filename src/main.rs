use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use nl_sql::config::{AppConfig, CliArgs};
use nl_sql::llm::LlmManager;
use nl_sql::session::{SessionStore, spawn_sweeper};
use nl_sql::util::logging::init_tracing;
use nl_sql::web::{self, state::AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    init_tracing();

    let args = CliArgs::parse();

    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let data_dir = PathBuf::from(&config.sessions.data_dir);
    if !data_dir.exists() {
        info!("Creating data directory: {}", data_dir.display());
        std::fs::create_dir_all(&data_dir)?;
    }

    let sessions = Arc::new(SessionStore::new(data_dir));
    if let Err(e) = sessions.remove_orphans() {
        warn!("Failed to clean data directory: {}", e);
    }

    info!("Initializing LLM providers");
    let llm_manager = Arc::new(LlmManager::from_config(&config.llm)?);

    let _sweeper = spawn_sweeper(
        Arc::clone(&sessions),
        Duration::from_secs(config.sessions.ttl_secs),
        Duration::from_secs(config.sessions.sweep_interval_secs),
    );

    let web_config = config.web.clone();
    let app_state = Arc::new(AppState::new(config, sessions, llm_manager));

    info!("Starting NL-SQL server on {}:{}", web_config.host, web_config.port);
    match web::run_server(web_config, app_state).await {
        Ok(()) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
