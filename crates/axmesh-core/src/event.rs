//! Ingestion outcomes
//!
//! Ingestion never fails. Every observed packet is either applied (possibly
//! with some record updates declined) or rejected by a guardrail before
//! anything was touched. Both are success outcomes for the caller; the
//! detail is there for diagnostics and tests.

use serde::{Deserialize, Serialize};

use crate::identity::Callsign;

/// Why a packet was rejected without any state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// An address did not parse as a callsign
    InvalidCallsign(String),
    /// The packet claims to come from the local station
    FromLocal,
    /// Source and destination are the same station
    SelfLoop,
    /// The local station appears in the via path (we relayed it)
    LocalInPath,
    /// The source appears in its own via path
    SourceInPath,
    /// The via path revisits a hop after collapsing repeats
    PathLoop(Callsign),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCallsign(raw) => write!(f, "invalid callsign {:?}", raw),
            Self::FromLocal => write!(f, "source is the local station"),
            Self::SelfLoop => write!(f, "source equals destination"),
            Self::LocalInPath => write!(f, "local station in via path"),
            Self::SourceInPath => write!(f, "source in its own via path"),
            Self::PathLoop(hop) => write!(f, "via path revisits {}", hop),
        }
    }
}

/// How a packet relates to the local station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficKind {
    /// Sent straight to the local station with no digipeaters
    Direct,
    /// Between two other stations, heard without digipeaters
    ThirdParty,
    /// Carried through one or more digipeaters
    Digipeated,
}

/// What the topology write path did with one candidate record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyChange {
    /// A new record was created
    Created,
    /// An existing record gained quality
    Reinforced,
    /// Inside the evidence cadence: recency refreshed, not counted
    Refreshed,
    /// A tombstoned record came back with its retained state
    Revived,
    /// Counted toward a pending candidate that is not yet a record
    Pending,
    /// The operating mode does not allow this kind of record
    Gated,
    /// The identity is infrastructure or otherwise excluded
    Excluded,
    /// Duplicates never reinforce topology
    Duplicate,
}

/// Result of feeding one packet to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationOutcome {
    /// Link statistics were updated; topology changes are listed
    Applied {
        /// How the packet relates to the local station
        kind: TrafficKind,
        /// Effect on the neighbor record, if one was considered
        neighbor: Option<TopologyChange>,
        /// Effect on the route record, if one was considered
        route: Option<TopologyChange>,
    },
    /// Rejected by a guardrail; nothing changed
    Rejected(RejectReason),
}

impl ObservationOutcome {
    /// Whether the packet was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Whether the packet was rejected
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The rejection reason, if any
    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Rejected(reason) => Some(reason),
            Self::Applied { .. } => None,
        }
    }

    /// The neighbor change, if the packet was applied and one was considered
    pub fn neighbor_change(&self) -> Option<TopologyChange> {
        match self {
            Self::Applied { neighbor, .. } => *neighbor,
            Self::Rejected(_) => None,
        }
    }

    /// The route change, if the packet was applied and one was considered
    pub fn route_change(&self) -> Option<TopologyChange> {
        match self {
            Self::Applied { route, .. } => *route,
            Self::Rejected(_) => None,
        }
    }
}
