//! Simulation errors

use axmesh_core::{CallsignError, SnapshotError};
use thiserror::Error;

/// Errors from the simulation host and its persistence
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid callsign: {0}")]
    Callsign(#[from] CallsignError),

    #[error("Station {0} is not part of the mesh")]
    UnknownStation(String),

    #[error("Snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Engine host has stopped")]
    HostClosed,
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;
