use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

/// Credentials and endpoint for one hosted provider. Unset fields fall back to
/// the provider's built-in defaults.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub fallback_order: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub openai: ProviderConfig,
    pub deepinfra: ProviderConfig,
    pub anthropic: ProviderConfig,
    // Keyless; only enabled when api_url is set
    pub ollama: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub data_dir: String,
    /// Idle seconds before a session is swept. 0 disables expiry.
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub sample_rows: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub sessions: SessionConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory for per-session database files
    #[arg(long)]
    pub data_dir: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = ["config.toml", "config/config.toml", "/etc/nl-sql/config.toml"];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NLSQL__WEB__PORT=9000, NLSQL__LLM__FALLBACK_ORDER=anthropic,openai
        config_builder = config_builder.add_source(
            Environment::with_prefix("NLSQL")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("web.cors_origins")
                .with_list_parse_key("llm.fallback_order")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        config.llm.apply_env_credentials(|name| std::env::var(name).ok());

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(data_dir) = &args.data_dir {
            config.sessions.data_dir = data_dir.clone();
        }

        Ok(config)
    }
}

impl LlmConfig {
    /// Overlays the conventional provider variables (`OPENAI_API_KEY` and
    /// friends). Blank values are ignored so an empty `.env` entry does not
    /// enable a provider.
    pub fn apply_env_credentials<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_blank("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(key) = non_blank("DEEPINFRA_API_KEY") {
            self.deepinfra.api_key = Some(key);
        }
        if let Some(key) = non_blank("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(key);
        }
        if let Some(url) = non_blank("OLLAMA_API_URL") {
            self.ollama.api_url = Some(url);
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 50 * 1024 * 1024,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            fallback_order: ["openai", "deepinfra", "anthropic", "ollama"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            temperature: 0.1,
            max_tokens: 500,
            request_timeout_secs: 60,
            openai: ProviderConfig::default(),
            deepinfra: ProviderConfig::default(),
            anthropic: ProviderConfig::default(),
            ollama: ProviderConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: "temp".to_string(),
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 300,
            sample_rows: 3,
        }
    }
}
