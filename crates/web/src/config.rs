use analysis::{LlmConfig, LlmType};
use clap::Parser;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line and environment settings for the server.
#[derive(Debug, Clone, Parser)]
#[command(name = "gutenberg-analyzer", version, about = "Fetch and analyze Project Gutenberg books")]
pub struct Args {
    /// API key for the LLM provider
    #[arg(long, env = "LLM_TOKEN", hide_env_values = true)]
    pub llm_token: String,

    /// LLM provider: openai, groq or samba
    #[arg(long, env = "LLM_TYPE", default_value = "openai")]
    pub llm_type: LlmType,

    /// Analysis requests allowed per client IP per minute
    #[arg(
        long,
        env = "REQUEST_PER_MINUTE",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub request_per_minute: u32,

    /// Override the provider's API base URL
    #[arg(long, env = "LLM_ENDPOINT")]
    pub llm_endpoint: Option<String>,

    /// Override the provider's model name
    #[arg(long, env = "LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Concurrent requests to the LLM provider
    #[arg(long, env = "LLM_MAX_CONCURRENCY", default_value_t = 3)]
    pub llm_max_concurrency: usize,

    /// Completion budget for analysis answers
    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = analysis::DEFAULT_MAX_TOKENS)]
    pub llm_max_tokens: u32,

    #[arg(long = "database", env = "DATABASE_PATH", default_value = "books.db")]
    pub database_path: PathBuf,

    #[arg(long = "bind", env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    pub bind_addr: SocketAddr,

    #[arg(long = "gutenberg-url", env = "GUTENBERG_BASE_URL", default_value = catalog::DEFAULT_BASE_URL)]
    pub gutenberg_url: String,

    /// Timeout for outbound HTTP requests
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

/// Validated runtime configuration.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub llm_type: LlmType,
    #[serde(skip_serializing)]
    pub llm_token: String,
    pub llm_endpoint: Option<String>,
    pub llm_model: Option<String>,
    pub llm_max_concurrency: usize,
    pub llm_max_tokens: u32,
    pub request_per_minute: u32,
    pub database_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub gutenberg_url: String,
    pub request_timeout_secs: u64,
    pub log_json: bool,
}

impl From<Args> for AppConfig {
    fn from(args: Args) -> Self {
        Self {
            llm_type: args.llm_type,
            llm_token: args.llm_token,
            llm_endpoint: args.llm_endpoint.filter(|s| !s.trim().is_empty()),
            llm_model: args.llm_model.filter(|s| !s.trim().is_empty()),
            llm_max_concurrency: args.llm_max_concurrency.max(1),
            llm_max_tokens: args.llm_max_tokens,
            request_per_minute: args.request_per_minute,
            database_path: args.database_path,
            bind_addr: args.bind_addr,
            gutenberg_url: args.gutenberg_url,
            request_timeout_secs: args.request_timeout_secs,
            log_json: args.log_json,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            endpoint: self.llm_endpoint.clone(),
            model: self.llm_model.clone(),
            max_concurrency: self.llm_max_concurrency,
            timeout: self.request_timeout(),
            ..LlmConfig::new(self.llm_type, self.llm_token.clone())
        }
    }
}
