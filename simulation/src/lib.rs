//! # Axmesh Simulation
//!
//! Drives the topology engine with synthetic packet-radio traffic.
//!
//! ## Overview
//!
//! A radio mesh is the ground truth: stations, who hears whom, and how
//! reliably. One station is a passive monitor running the engine. The
//! traffic generator plays beacons, direct frames and digipeated frames
//! over a shared channel and records only what the monitor decodes, so the
//! engine sees exactly what a real listener would: lost frames, collisions,
//! and digipeater repeats flagged as duplicates.
//!
//! ## Architecture
//!
//! - **Topology** (`topology.rs`): mesh construction (ring, line, star, full, random)
//! - **Traffic** (`traffic.rs`): seeded channel model and capture log
//! - **Host** (`host.rs`): tokio actor that owns an engine
//! - **Persist** (`persist.rs`): JSON snapshot store, packet log, resume
//! - **Scenarios** (`scenarios.rs`): monitor and crash/resume runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use axmesh_simulation::{ScenarioOptions, MeshShape, run_monitor_scenario};
//!
//! let options = ScenarioOptions {
//!     stations: 6,
//!     shape: MeshShape::Star,
//!     ..ScenarioOptions::default()
//! };
//! let report = run_monitor_scenario(&options).await?;
//! println!("{}", report.summary());
//! ```

pub mod error;
pub mod host;
pub mod persist;
pub mod scenarios;
pub mod topology;
pub mod traffic;

pub use error::{SimError, SimResult};
pub use host::{EngineCommand, EngineHandle, spawn_engine};
pub use persist::{PacketLog, ResumeReport, SnapshotStore, resume};
pub use scenarios::{
    NeighborAccuracy, ResumeOutcome, ScenarioOptions, ScenarioReport, run_monitor_scenario,
    run_resume_scenario,
};
pub use topology::{MeshBuilder, MeshShape, RadioMesh, from_edges, station_call};
pub use traffic::{ChannelStats, TrafficConfig, TrafficGenerator};
