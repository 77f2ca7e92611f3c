//! Runtime configuration for chat-relay.
//!
//! Every option can come from the command line or the environment (a `.env`
//! file is loaded first by the binary). The parsed [`Cli`] is turned into an
//! immutable [`Config`] once at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::completion::client::GenerationDefaults;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "chat-relay", about = "Streaming relay for OpenAI-compatible chat completions")]
pub struct Cli {
    /// Credential for the upstream provider.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Default model when a request does not name one.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-3.5-turbo")]
    pub model: String,

    /// Default max-token ceiling when a request does not set one.
    #[arg(long, env = "MAX_TOKENS", default_value_t = 1000)]
    pub max_tokens: u32,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub base_url: String,

    /// Upstream timeout in seconds (connect, and whole call for non-streaming requests).
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Delay between streamed fragments, in milliseconds (0 = off).
    #[arg(long, env = "STREAM_PACING_MS", default_value_t = 10)]
    pub pacing_ms: u64,

    /// Bind host.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory with the frontend (`index.html` and assets).
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Upstream provider configuration.
    pub upstream: UpstreamConfig,

    /// Generation defaults and stream pacing.
    pub generation: GenerationConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Served at `/` (its `index.html`) and under `/static`.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl ServerConfig {
    /// `host:port` as passed to the listener.
    pub fn bind_addr(&self) -> String {
        match self.host.parse::<std::net::IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }
}

/// Upstream provider settings.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: None,
        }
    }
}

/// Generation defaults.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub default_model: String,
    pub default_max_tokens: u32,
    pub pacing: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-3.5-turbo".to_string(),
            default_max_tokens: 1000,
            pacing: Duration::from_millis(10),
        }
    }
}

impl GenerationConfig {
    pub fn defaults(&self) -> GenerationDefaults {
        GenerationDefaults {
            model: self.default_model.clone(),
            max_tokens: self.default_max_tokens,
        }
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            server: ServerConfig {
                host: cli.host,
                port: cli.port,
                static_dir: cli.static_dir,
            },
            upstream: UpstreamConfig {
                api_key: cli.api_key.filter(|key| !key.trim().is_empty()),
                base_url: cli.base_url,
                timeout: cli.timeout_secs.map(Duration::from_secs),
            },
            generation: GenerationConfig {
                default_model: cli.model,
                default_max_tokens: cli.max_tokens,
                pacing: Duration::from_millis(cli.pacing_ms),
            },
        }
    }
}
