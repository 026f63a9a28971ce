use anyhow::{Context, Result};
use flow_gateway::{config, server};
use tracing::info;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// JSON logs. `RUST_LOG` directives win over the configured level.
fn init_tracing(configured_level: &str) -> Result<()> {
    configured_level.parse::<LevelFilter>().with_context(|| {
        format!(
            "Invalid log level: '{configured_level}'. Valid levels: error, warn, info, debug, trace"
        )
    })?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_level));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // No subscriber exists yet, so startup failures go to stderr.
    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.server.logs.level) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }

    info!(
        mode = ?config.prediction.mode,
        development = config.server.development,
        flows = config.flows.len(),
        "Starting flow gateway"
    );

    server::run(config).await?;
    Ok(())
}
