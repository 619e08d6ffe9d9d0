//! slircbot - sandboxed module host for IRC bots.

use slircbot::config::{Config, validation};
use slircbot::{Client, Exit, http, metrics};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        server = %config.server.address,
        nick = %config.identity.nick,
        modules = config.modules.len(),
        "Starting slircbot"
    );

    metrics::init();
    let client = Client::from_config(&config).await?;

    // The status endpoint is optional.
    if let Some(port) = config.bot.metrics_port {
        let bind = config.bot.metrics_bind;
        let directory = client.registry().directory().clone();
        tokio::spawn(async move {
            http::run_http_server(bind, port, directory).await;
        });
    }
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    match client.run(shutdown).await? {
        Exit::Shutdown => info!("Shut down cleanly"),
        Exit::Disconnected => info!("Disconnected by server"),
    }
    Ok(())
}
