//! Error types for the voltcache engine
//!
//! Nothing in the engine is fatal to the host application. Public cache
//! lookups swallow these errors into "absent" plus a log line; the variants
//! surface only from explicit write paths (`put`, `clear_all`, backends) and
//! from the animation driver state machine.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the caching engine
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Persistent Store Errors
    // =========================================================================
    /// Key/value backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded into the requested kind
    #[error("Record '{key}' could not be decoded: {reason}")]
    RecordDecode { key: String, reason: String },

    // =========================================================================
    // Asset & Render Errors
    // =========================================================================
    /// Raw asset missing from asset storage
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// Image decode failed
    #[error("Failed to decode asset '{name}': {reason}")]
    Decode { name: String, reason: String },

    /// Rasterization of a draw buffer failed
    #[error("Rasterization of '{key}' failed: {reason}")]
    Rasterize { key: String, reason: String },

    // =========================================================================
    // Telemetry Errors
    // =========================================================================
    /// Animation driver asked to make an illegal state transition
    #[error("Invalid animation transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
