//! # Axmesh Routing
//!
//! Passive topology inference and link-quality estimation for AX.25
//! packet-radio meshes.
//!
//! The engine listens to every frame heard on a shared channel and works
//! out, without sending anything, which stations are one hop away, which
//! are reachable through digipeaters, and how good each directional link
//! is.
//!
//! ## Core Components
//!
//! - [`LinkQualityEstimator`]: Time-scaled EWMA delivery estimates and ETX per directional link
//! - [`freshness`]: Plateau-then-smoothstep decay applied to every reported quality
//! - [`TopologyInference`]: Turns observations into neighbor and route records under an [`OperatingMode`]
//! - [`RouteSelector`]: Sticky per-destination route choice with hysteresis
//! - [`TopologyEngine`]: Facade owning all of the above, plus tombstones and snapshots
//!
//! ## Operating Modes
//!
//! 1. **Classic**: Neighbors from direct traffic, routes only from broadcasts
//! 2. **Inference**: Neighbors and routes inferred from overheard traffic only
//! 3. **Hybrid**: Both
//!
//! Link statistics are collected in every mode.
//!
//! ## Lifecycle
//!
//! Records past their TTL are tombstoned: they read as quality 0 and drop
//! out of `current_*` queries but keep their state. A qualifying
//! observation within the grace period revives them where they left off;
//! after it they are removed. Transitions are computed from timestamps, so
//! results do not depend on how often [`TopologyEngine::sweep`] runs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use axmesh_core::{Callsign, FrameClass, ObservedPacket};
//! use axmesh_routing::TopologyEngine;
//!
//! let mut engine = TopologyEngine::with_defaults(Callsign::parse("N0CALL")?);
//!
//! let packet = ObservedPacket::new("K9XYZ", "K5DST", FrameClass::Data).with_via(["DIGI1*"]);
//! let outcome = engine.observe_packet(&packet, heard_at, false);
//!
//! for neighbor in engine.current_neighbors() {
//!     println!("{} q={}", neighbor.call, neighbor.quality);
//! }
//! if let Some(route) = engine.preferred_route(&Callsign::parse("K9XYZ")?) {
//!     println!("via {}", route.origin);
//! }
//! ```

pub mod classify;
pub mod config;
pub mod engine;
pub mod evidence;
pub mod freshness;
pub mod inference;
pub mod infrastructure;
pub mod lifecycle;
pub mod link_quality;
pub mod selector;
pub mod snapshot;
pub mod table;

// Re-export main types
pub use classify::ClassifiedObservation;
pub use config::{CapacityConfig, ConfigWarning, EngineConfig};
pub use engine::{EngineStats, ReplaySummary, RestoreSummary, SweepReport, TopologyEngine};
pub use evidence::{EvidenceWeights, EvidenceWindow, ObservationSample};
pub use freshness::{Decaying, FreshnessConfig, FreshnessStatus};
pub use inference::{BroadcastSummary, InferenceConfig, TopologyInference, TopologyUpdate};
pub use infrastructure::{InfrastructureConfig, InfrastructureFilter};
pub use lifecycle::{Lifecycle, LifecycleConfig, SweepCounts};
pub use link_quality::{LinkEstimator, LinkKey, LinkQualityConfig, LinkQualityEstimator};
pub use selector::{Preference, RouteSelector, Selection, SelectorConfig};
pub use snapshot::{LoggedPacket, ReplayPolicy, SnapshotPolicy, TopologySnapshot};
pub use table::TopologyTable;

// Re-export core types for convenience
pub use axmesh_core::{
    Callsign, FrameClass, LinkStatRecord, NeighborInfo, ObservationOutcome, ObservedPacket,
    OperatingMode, PacketId, RouteInfo,
};
