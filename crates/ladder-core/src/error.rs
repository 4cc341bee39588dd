//! Error types for Ladder Core

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    // Catalog errors
    #[error("Invalid content URL: {0}")]
    InvalidUrl(String),

    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Failed to fetch catalog: {0}")]
    CatalogFetch(String),

    #[error("Catalog has no usable {kind} variant")]
    EmptyCatalog { kind: &'static str },

    // Engine errors
    #[error("Engine failed to open {uri}: {reason}")]
    EngineOpen { uri: String, reason: String },

    #[error("Engine error: {0}")]
    Engine(String),

    // Probe errors (never surfaced as a session error)
    #[error("Bandwidth probe failed: {0}")]
    BandwidthProbe(String),

    // Session errors
    #[error("Session already disposed")]
    AlreadyDisposed,

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Catalog without any video-only variant
    pub fn no_video() -> Self {
        Error::EmptyCatalog { kind: "video" }
    }

    /// Catalog without any audio-only variant
    pub fn no_audio() -> Self {
        Error::EmptyCatalog { kind: "audio" }
    }

    /// Returns true if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::CatalogFetch(_)
                | Error::BandwidthProbe(_)
                | Error::Network(_)
                | Error::EngineOpen { .. }
        )
    }

    /// Returns the error code used in log records
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::NotFound(_) => "NOT_FOUND",
            Error::CatalogFetch(_) => "CATALOG_FETCH",
            Error::EmptyCatalog { .. } => "EMPTY_CATALOG",
            Error::EngineOpen { .. } => "ENGINE_OPEN",
            Error::Engine(_) => "ENGINE",
            Error::BandwidthProbe(_) => "BANDWIDTH_PROBE",
            Error::AlreadyDisposed => "DISPOSED",
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO",
            Error::Json(_) => "JSON",
        }
    }
}
