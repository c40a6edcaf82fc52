//! Persistence contract
//!
//! A [`TopologySnapshot`] captures everything the engine needs to resume:
//! the stored neighbor and route states (tombstones included), link
//! statistics, pending candidates and route preferences. It carries the
//! configuration hash and the id of the last packet it covers, so a host
//! can check it still applies and replay the packets logged after it.
//!
//! The engine never does I/O; hosts pick the storage. [`TopologySnapshot::to_bytes`]
//! gives a compact postcard encoding, and the type is plain serde for
//! anything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use axmesh_core::{Callsign, LinkStatRecord, ObservedPacket, OperatingMode, PacketId, SnapshotError};

use crate::freshness::secs_between;
use crate::lifecycle::Lifecycle;
use crate::selector::Preference;
use crate::table::{NeighborEntry, PendingCandidate, RouteEntry};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Format version
    pub version: u32,
    /// Station the snapshot was taken for
    pub local: Callsign,
    /// Operating mode at export time
    #[serde(default)]
    pub mode: OperatingMode,
    /// Neighbor states, sorted by callsign
    pub neighbors: Vec<Lifecycle<NeighborEntry>>,
    /// Route states, sorted by destination then origin
    pub routes: Vec<Lifecycle<RouteEntry>>,
    /// Link statistics, sorted by from then to
    pub link_stats: Vec<LinkStatRecord>,
    /// Inferred records still collecting observations
    #[serde(default)]
    pub candidates: Vec<PendingCandidate>,
    /// Preferred origin per destination
    #[serde(default)]
    pub preferences: Vec<Preference>,
    /// Last packet applied before the snapshot was taken
    pub last_packet_id: Option<PacketId>,
    /// [`EngineConfig::config_hash`](crate::config::EngineConfig::config_hash) at export time
    pub config_hash: String,
    /// Export time
    pub snapshot_timestamp: DateTime<Utc>,
    /// Engine clock at export time
    #[serde(default)]
    pub clock: Option<DateTime<Utc>>,
    /// Last lifecycle sweep
    #[serde(default)]
    pub last_sweep: Option<DateTime<Utc>>,
}

impl TopologySnapshot {
    /// Seconds between the snapshot and `now`, never negative
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        secs_between(now, self.snapshot_timestamp).max(0.0)
    }

    /// Check that this snapshot may be restored
    ///
    /// Fails when the format is unknown, it was taken for another station,
    /// under another configuration, or `max_age_secs` or more ago.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        expected_hash: &str,
        local: &Callsign,
        max_age_secs: u64,
    ) -> Result<(), SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        if self.local != *local {
            return Err(SnapshotError::LocalMismatch {
                expected: local.to_string(),
                actual: self.local.to_string(),
            });
        }
        if self.config_hash != expected_hash {
            return Err(SnapshotError::ConfigMismatch {
                expected: expected_hash.to_string(),
                actual: self.config_hash.clone(),
            });
        }
        let age = self.age_secs(now);
        if age >= max_age_secs as f64 {
            return Err(SnapshotError::Stale {
                age_secs: age as i64,
                max_age_secs,
            });
        }
        Ok(())
    }

    /// Number of stored records of every kind
    pub fn record_count(&self) -> usize {
        self.neighbors.len() + self.routes.len() + self.link_stats.len() + self.candidates.len()
    }

    /// Compact binary encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        postcard::to_allocvec(self).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }

    /// Decode a snapshot written by [`to_bytes`](Self::to_bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        postcard::from_bytes(bytes).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }
}

/// Snapshot acceptance and replay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    /// Snapshots this old or older are discarded, seconds
    /// Default: 3600
    pub max_snapshot_age_secs: u64,

    /// Which logged packets to replay after a restore
    pub replay: ReplayPolicy,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            max_snapshot_age_secs: 3600,
            replay: ReplayPolicy::default(),
        }
    }
}

/// One entry of a host's packet capture log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedPacket {
    /// Sequence id in the log
    pub id: PacketId,
    /// When the packet was heard
    pub timestamp: DateTime<Utc>,
    /// The packet as observed
    pub packet: ObservedPacket,
    /// Whether the link layer flagged it as a duplicate or retry
    #[serde(default)]
    pub is_duplicate: bool,
}

/// Which logged packets to replay after restoring a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPolicy {
    /// Only packets heard within this many seconds of now
    /// Default: 3600
    pub max_window_secs: Option<f64>,

    /// At most this many packets, keeping the newest
    /// Default: 10000
    pub max_packets: Option<usize>,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        Self {
            max_window_secs: Some(3600.0),
            max_packets: Some(10_000),
        }
    }
}

impl ReplayPolicy {
    /// Replay everything after the snapshot
    pub fn unbounded() -> Self {
        Self {
            max_window_secs: None,
            max_packets: None,
        }
    }

    /// Packets to replay, in id order
    ///
    /// Keeps packets logged after `after`, heard inside the window ending
    /// at `now`, then the newest `max_packets` of those.
    pub fn select<'a>(
        &self,
        log: &'a [LoggedPacket],
        after: Option<PacketId>,
        now: DateTime<Utc>,
    ) -> Vec<&'a LoggedPacket> {
        let mut selected: Vec<&LoggedPacket> = log
            .iter()
            .filter(|entry| after.is_none_or(|last| entry.id > last))
            .filter(|entry| {
                self.max_window_secs
                    .is_none_or(|window| secs_between(now, entry.timestamp) <= window)
            })
            .collect();
        selected.sort_by_key(|entry| entry.id);

        if let Some(max) = self.max_packets {
            let excess = selected.len().saturating_sub(max);
            selected.drain(..excess);
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axmesh_core::FrameClass;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn local() -> Callsign {
        Callsign::parse("N0CALL").unwrap()
    }

    fn empty_snapshot() -> TopologySnapshot {
        TopologySnapshot {
            version: SNAPSHOT_VERSION,
            local: local(),
            mode: OperatingMode::Hybrid,
            neighbors: Vec::new(),
            routes: Vec::new(),
            link_stats: Vec::new(),
            candidates: Vec::new(),
            preferences: Vec::new(),
            last_packet_id: Some(PacketId(42)),
            config_hash: "abc".to_string(),
            snapshot_timestamp: t0(),
            clock: Some(t0()),
            last_sweep: None,
        }
    }

    fn log(count: u64) -> Vec<LoggedPacket> {
        (1..=count)
            .map(|i| LoggedPacket {
                id: PacketId(i),
                timestamp: t0() + Duration::seconds(i as i64 * 60),
                packet: ObservedPacket::new("K1ABC", "N0CALL", FrameClass::Data),
                is_duplicate: false,
            })
            .collect()
    }

    #[test]
    fn test_validate_accepts_fresh_matching_snapshot() {
        let snapshot = empty_snapshot();
        let now = t0() + Duration::seconds(3599);
        assert!(snapshot.validate(now, "abc", &local(), 3600).is_ok());
        // Clock skew reads as age zero
        assert!(snapshot.validate(t0() - Duration::seconds(10), "abc", &local(), 3600).is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let snapshot = empty_snapshot();
        assert!(matches!(
            snapshot.validate(t0() + Duration::seconds(3600), "abc", &local(), 3600),
            Err(SnapshotError::Stale { age_secs: 3600, max_age_secs: 3600 })
        ));
        assert!(matches!(
            snapshot.validate(t0(), "other", &local(), 3600),
            Err(SnapshotError::ConfigMismatch { .. })
        ));
        assert!(matches!(
            snapshot.validate(t0(), "abc", &Callsign::parse("K9XYZ").unwrap(), 3600),
            Err(SnapshotError::LocalMismatch { .. })
        ));

        let mut future = empty_snapshot();
        future.version = SNAPSHOT_VERSION + 1;
        assert!(matches!(
            future.validate(t0(), "abc", &local(), 3600),
            Err(SnapshotError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let snapshot = empty_snapshot();
        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(TopologySnapshot::from_bytes(&bytes).unwrap(), snapshot);
        assert!(matches!(
            TopologySnapshot::from_bytes(&[0xFF, 0xFF]),
            Err(SnapshotError::Encoding(_))
        ));
    }

    #[test]
    fn test_replay_after_last_id() {
        let log = log(10);
        let selected = ReplayPolicy::unbounded().select(&log, Some(PacketId(7)), t0());
        let ids: Vec<u64> = selected.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![8, 9, 10]);

        let everything = ReplayPolicy::unbounded().select(&log, None, t0());
        assert_eq!(everything.len(), 10);
    }

    #[test]
    fn test_replay_window_and_cap() {
        let log = log(10);
        let now = t0() + Duration::seconds(600);

        let windowed = ReplayPolicy {
            max_window_secs: Some(180.0),
            max_packets: None,
        };
        let ids: Vec<u64> = windowed.select(&log, None, now).iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![7, 8, 9, 10]);

        let capped = ReplayPolicy {
            max_window_secs: None,
            max_packets: Some(2),
        };
        let ids: Vec<u64> = capped.select(&log, Some(PacketId(3)), now).iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![9, 10]);
    }
}
