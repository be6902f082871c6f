mod agent;
mod backend;
mod config;
mod dispatch;
mod error;
mod http_client;
mod image_client;
mod invoker;
mod prompts;
mod resolver;
mod server;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use config::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gamify_agent=debug")),
        )
        .init();

    tracing::info!("Gamify agent service starting...");

    let config = AgentConfig::load();
    if config.llm_api_key.is_none() {
        // Lenient startup: keep serving and fail analysis requests lazily
        // so the CRUD surface of the deployment stays usable.
        tracing::error!(
            "No model credential configured (GEMINI_API_KEY / LLM_API_KEY); \
             analysis requests will fail until one is set"
        );
    }
    tracing::info!("Backend API: {}", config.backend_api_url);
    tracing::info!("Model API: {}", config.llm_api_url);

    let agent = agent::AgentService::new(&config);
    server::serve(&config, agent).await
}
