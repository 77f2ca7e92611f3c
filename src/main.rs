use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use chat_relay::completion::client::CompletionClient;
use chat_relay::completion::openai::OpenAiBackend;
use chat_relay::config::{Cli, Config};
use chat_relay::server::chat_api::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "chat_relay=debug,tower_http=debug"
    } else {
        "chat_relay=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("chat-relay v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from(cli));

    info!(
        model = %config.generation.default_model,
        max_tokens = config.generation.default_max_tokens,
        pacing_ms = config.generation.pacing.as_millis() as u64,
        upstream = %config.upstream.base_url,
        static_dir = %config.server.static_dir.display(),
        "Configuration loaded"
    );

    if config.upstream.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; upstream calls will be rejected");
    }

    // Build the completion client.
    let backend = OpenAiBackend::new(&config.upstream)?;
    let client = CompletionClient::new(Arc::new(backend), config.generation.defaults())
        .with_pacing(config.generation.pacing);

    let state = Arc::new(AppState {
        client,
        config: config.clone(),
    });

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
