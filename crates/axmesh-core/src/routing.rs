//! Topology records exposed by the engine
//!
//! These are the read-side views: a [`NeighborInfo`] is a station heard
//! one hop away, a [`RouteInfo`] is a way to reach a station that is not a
//! neighbor, and a [`LinkStatRecord`] is the exported state of one
//! directional link estimator.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Callsign;

/// Engine operating mode
///
/// Gates which observations may create topology records. Link statistics
/// are collected in every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OperatingMode {
    /// Neighbors from direct traffic, routes only from announcements
    Classic,
    /// Neighbors and routes inferred from overheard traffic only
    Inference,
    /// Both of the above
    #[default]
    Hybrid,
}

impl OperatingMode {
    /// Whether direct traffic to the local station may create neighbors
    pub fn allows_direct(&self) -> bool {
        matches!(self, Self::Classic | Self::Hybrid)
    }

    /// Whether overheard third-party traffic may create records
    pub fn allows_inference(&self) -> bool {
        matches!(self, Self::Inference | Self::Hybrid)
    }

    /// Whether authoritative route announcements are accepted
    pub fn allows_broadcast(&self) -> bool {
        matches!(self, Self::Classic | Self::Hybrid)
    }
}

impl Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classic => write!(f, "classic"),
            Self::Inference => write!(f, "inference"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// How a neighbor became known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeighborSource {
    /// Heard transmitting directly to the local station
    Classic,
    /// Inferred from overheard third-party or digipeated traffic
    Inferred,
}

/// How a route became known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteSource {
    /// Announced by a neighbor's routing broadcast
    Broadcast,
    /// Inferred from the via path of overheard traffic
    Inferred,
}

/// A station one hop away
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborInfo {
    /// The neighbor's callsign
    pub call: Callsign,
    /// Quality 0..=255 (freshness-adjusted in query results)
    pub quality: u8,
    /// Last time a reinforcing observation arrived
    pub last_seen: DateTime<Utc>,
    /// Number of times this neighbor was tombstoned and later revived
    pub obsolescence_count: u32,
    /// How the neighbor became known
    pub source_type: NeighborSource,
}

/// A way to reach a station that is not a neighbor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Station this route reaches
    pub destination: Callsign,
    /// First hop toward the destination
    pub origin: Callsign,
    /// Quality 0..=255 (freshness-adjusted in query results)
    pub quality: u8,
    /// Hops from the local station toward the destination, first hop first
    pub path: Vec<Callsign>,
    /// Last time the route was reinforced
    pub last_updated: DateTime<Utc>,
    /// How the route became known
    pub source_type: RouteSource,
}

impl RouteInfo {
    /// Create a route announcement entry as carried in a routing broadcast
    ///
    /// `path` lists the hops after the announcing station; the engine
    /// prepends the announcer when it ingests the broadcast.
    pub fn announced(
        destination: Callsign,
        quality: u8,
        path: Vec<Callsign>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let origin = path.first().cloned().unwrap_or_else(|| destination.clone());
        Self {
            destination,
            origin,
            quality,
            path,
            last_updated: timestamp,
            source_type: RouteSource::Broadcast,
        }
    }

    /// Number of hops including the final one to the destination
    pub fn hop_count(&self) -> usize {
        self.path.len() + 1
    }
}

/// Exported state of one directional link estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStatRecord {
    /// Transmitting station
    pub from_call: Callsign,
    /// Receiving station
    pub to_call: Callsign,
    /// Link quality 0..=255 at export time
    pub quality: u8,
    /// Time of the last observation on this link
    pub last_updated: DateTime<Utc>,
    /// Forward delivery probability estimate
    pub df_estimate: f64,
    /// Reverse delivery probability estimate
    pub dr_estimate: f64,
    /// Observations flagged as duplicates or retries
    pub duplicate_count: u64,
    /// All observations on this link
    pub observation_count: u64,
    /// Whether reverse evidence was ever seen (otherwise `dr_estimate` is the prior)
    #[serde(default)]
    pub reverse_observed: bool,
    /// Smoothed gap between observations, seconds
    #[serde(default)]
    pub avg_inter_arrival_secs: Option<f64>,
    /// Set when the link was exported while tombstoned
    #[serde(default)]
    pub tombstoned_since: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    #[test]
    fn test_mode_gates() {
        assert!(OperatingMode::Classic.allows_direct());
        assert!(!OperatingMode::Classic.allows_inference());
        assert!(OperatingMode::Classic.allows_broadcast());

        assert!(!OperatingMode::Inference.allows_direct());
        assert!(OperatingMode::Inference.allows_inference());
        assert!(!OperatingMode::Inference.allows_broadcast());

        assert!(OperatingMode::Hybrid.allows_direct());
        assert!(OperatingMode::Hybrid.allows_inference());
        assert!(OperatingMode::Hybrid.allows_broadcast());
    }

    #[test]
    fn test_announced_route() {
        let now = Utc::now();
        let route = RouteInfo::announced(call("K9XYZ"), 200, vec![call("DIGI1")], now);
        assert_eq!(route.origin, call("DIGI1"));
        assert_eq!(route.hop_count(), 2);
        assert_eq!(route.source_type, RouteSource::Broadcast);
    }

    #[test]
    fn test_link_stat_record_defaults_on_import() {
        let json = r#"{
            "from_call": "K1ABC",
            "to_call": "N0CALL",
            "quality": 120,
            "last_updated": "2024-05-01T12:00:00Z",
            "df_estimate": 0.7,
            "dr_estimate": 0.99,
            "duplicate_count": 2,
            "observation_count": 40
        }"#;
        let record: LinkStatRecord = serde_json::from_str(json).unwrap();
        assert!(!record.reverse_observed);
        assert!(record.avg_inter_arrival_secs.is_none());
        assert!(record.tombstoned_since.is_none());
        assert_eq!(record.observation_count, 40);
    }
}
