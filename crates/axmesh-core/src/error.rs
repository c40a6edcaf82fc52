//! Error types for axmesh
//!
//! Ingestion never fails; these errors belong to the edges around it
//! (parsing identifiers handed in by a UI, validating a persisted snapshot).

use thiserror::Error;

/// Top-level error type for axmesh
#[derive(Debug, Error)]
pub enum AxmeshError {
    #[error("Callsign error: {0}")]
    Callsign(#[from] CallsignError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Errors related to station identifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallsignError {
    #[error("Empty callsign")]
    Empty,

    #[error("Invalid callsign base: {0}")]
    InvalidBase(String),

    #[error("Invalid SSID: {0}")]
    InvalidSsid(String),
}

/// Errors raised when validating a persisted topology snapshot
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("Snapshot is stale: {age_secs}s old, limit {max_age_secs}s")]
    Stale { age_secs: i64, max_age_secs: u64 },

    #[error("Snapshot config hash mismatch: expected {expected}, got {actual}")]
    ConfigMismatch { expected: String, actual: String },

    #[error("Snapshot local callsign mismatch: expected {expected}, got {actual}")]
    LocalMismatch { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Snapshot encoding error: {0}")]
    Encoding(String),
}

/// Result type for axmesh operations
pub type AxmeshResult<T> = Result<T, AxmeshError>;
