//! Error types for the launcher binary.

/// Top-level error for the launcher.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: simscope_core::config::ConfigError,
    },

    /// A model's parameter declarations were rejected.
    #[error("parameter error: {source}")]
    Params {
        /// The underlying registry error.
        #[from]
        source: simscope_core::ParamError,
    },

    /// The session server failed to start or stopped with an error.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: simscope_server::ServerError,
    },

    /// `demo.model` names no known model.
    #[error("unknown model '{name}' (expected one of: {known})")]
    UnknownModel {
        /// The configured key.
        name: String,
        /// Comma-separated list of valid keys.
        known: String,
    },
}
