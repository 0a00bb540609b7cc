//! Launcher binary for Simscope.
//!
//! Serves one reference model over the session server.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `simscope.yaml` (defaults if missing)
//! 2. Initialize structured logging (tracing)
//! 3. Declare the selected model's parameters
//! 4. Serve sessions until `Ctrl-C`

mod error;

use std::path::Path;
use std::sync::Arc;

use simscope_core::config::{LoggingConfig, SimscopeConfig};
use simscope_models::{Counter, Life, ReferenceModel, Turtle};
use simscope_server::{AppState, ServerConfig, start_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::DemoError;

/// Default configuration file, relative to the working directory.
const CONFIG_PATH: &str = "simscope.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the model is unknown,
/// or the server fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("simscope starting");
    if from_file {
        info!(path = CONFIG_PATH, "Configuration loaded");
    } else {
        info!("Config file not found, using defaults");
    }
    info!(
        model = config.demo.model,
        n_sims = config.session.n_sims,
        max_steps = config.session.max_steps,
        port = config.server.port,
        "Configuration resolved"
    );

    // 3-4. Declare the model and serve.
    let key = config.demo.model.as_str();
    match key {
        k if k == Counter::KEY => serve_model::<Counter>(&config).await?,
        k if k == Life::KEY => serve_model::<Life>(&config).await?,
        k if k == Turtle::KEY => serve_model::<Turtle>(&config).await?,
        other => {
            return Err(DemoError::UnknownModel {
                name: other.to_owned(),
                known: simscope_models::KEYS.join(", "),
            }
            .into());
        }
    }

    info!("simscope stopped");
    Ok(())
}

/// Load configuration from [`CONFIG_PATH`], falling back to defaults
/// (with environment overrides) when the file does not exist.
fn load_config() -> Result<(SimscopeConfig, bool), DemoError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        let config = SimscopeConfig::from_file(config_path)?;
        Ok((config, true))
    } else {
        let mut config = SimscopeConfig::default();
        config.server.apply_env_overrides();
        Ok((config, false))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Build server state for `M` and serve it.
async fn serve_model<M: ReferenceModel>(config: &SimscopeConfig) -> Result<(), DemoError> {
    let registry = simscope_models::registry::<M>(config.session.n_sims, config.demo.seed)?;
    let name = config.demo.name.as_deref().unwrap_or(M::NAME);
    let description = config.demo.description.as_deref().unwrap_or(M::DESCRIPTION);

    let state = Arc::new(
        AppState::<M>::new(name, registry, config.session.clone())
            .with_description(description)
            .with_charts(M::charts()),
    );
    info!(
        model = M::KEY,
        params = state.registry().specs().len(),
        "Model registered"
    );

    start_server(&ServerConfig::from(&config.server), state).await?;
    Ok(())
}
