mod types;

pub use types::*;

use crate::{Error, Result};
use std::env;
use std::path::Path;
use tracing::{debug, warn};

pub async fn load() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

    let mut config = load_from(&config_path).await?;
    config.apply_env_overrides();

    Ok(config)
}

/// Reads and validates a config file without applying environment overrides.
pub async fn load_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    debug!("Loading configuration from: {}", path.display());

    let config_str = tokio::fs::read_to_string(path).await?;
    parse(&config_str)
}

pub fn parse(config_str: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(config_str)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// `MODE` selects the deployment mode and `ENVIRONMENT=development`
    /// turns on development mode.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(mode) = env::var("MODE") {
            match mode.parse() {
                Ok(mode) => self.prediction.mode = mode,
                Err(e) => warn!("Ignoring MODE override: {}", e),
            }
        }

        if let Ok(environment) = env::var("ENVIRONMENT") {
            self.server.development = environment.eq_ignore_ascii_case("development");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prediction.timeout_ms == 0 {
            return Err(Error::config("prediction.timeout_ms must be greater than zero"));
        }

        if self.engine.base_url.trim().is_empty() {
            return Err(Error::config("engine.base_url must not be empty"));
        }

        let limits = std::iter::once(&self.rate_limit)
            .chain(self.flows.iter().filter_map(|f| f.rate_limit.as_ref()));
        for limit in limits {
            if limit.max_requests > 0 && limit.window_secs == 0 {
                return Err(Error::config("rate_limit.window_secs must be greater than zero"));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for flow in &self.flows {
            if !seen.insert(flow.id.as_str()) {
                return Err(Error::config(format!("Duplicate flow id: {}", flow.id)));
            }
        }

        Ok(())
    }
}
