use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use seopilot::anthropic::AnthropicClient;
use seopilot::config::Config;
use seopilot::engine::EngineClient;
use seopilot::server::{AppState, router};

/// SEOPILOT — assistente SEO conversacional sobre o motor Just-Magic.
#[derive(Debug, Parser)]
#[command(name = "seopilot", version, about)]
struct Cli {
    /// Caminho para o arquivo de configuração TOML.
    #[arg(long, default_value = "seopilot.toml")]
    config: PathBuf,

    /// Porta HTTP (sobrepõe o arquivo de configuração).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_from(&cli.config)?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    if config.anthropic_api_key.is_empty() {
        tracing::warn!("ANTHROPIC_API_KEY is not configured; chat turns will fail");
    }
    if config.engine_api_key.is_empty() {
        tracing::warn!("JUSTMAGIC_API_KEY is not configured; analysis tools will fail");
    }

    let state = AppState::new(
        AnthropicClient::new(config.anthropic_api_key.clone()),
        EngineClient::new(config.engine_api_key.clone()),
        &config,
    );
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    tracing::info!("starting seopilot on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from(["seopilot", "--config", "custom.toml", "--port", "9000"]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.port, Some(9000));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
