//! Topology write path
//!
//! Decides which neighbor and route records an accepted observation earns,
//! given the operating mode:
//!
//! - **Direct** traffic (to the local station, no digipeaters) earns a
//!   classic neighbor in Classic and Hybrid modes
//! - **Third-party** traffic heard without digipeaters earns an inferred
//!   neighbor for the source in Inference and Hybrid modes
//! - **Digipeated** traffic earns an inferred neighbor for the first via
//!   hop and an inferred route to the source through the via chain, in
//!   Inference and Hybrid modes
//! - **Route broadcasts** earn announced routes in Classic and Hybrid modes
//!
//! Observations closer together than the evidence window refresh recency
//! without counting. Inferred records only come into being after enough
//! counted observations, tracked as pending candidates. Duplicates never
//! reinforce anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use axmesh_core::{
    Callsign, NeighborInfo, NeighborSource, OperatingMode, RouteInfo, RouteSource, TopologyChange,
    TrafficKind,
};

use crate::classify::{ClassifiedObservation, path_is_clean};
use crate::freshness::secs_between;
use crate::infrastructure::InfrastructureFilter;
use crate::lifecycle::Lifecycle;
use crate::table::{CandidateKey, NeighborEntry, PendingCandidate, RouteEntry, TopologyTable};

/// Topology inference configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Starting quality of a neighbor heard directly
    /// Default: 80
    pub neighbor_base_quality: u8,

    /// Starting quality of an inferred neighbor or route
    /// Default: 60
    pub inferred_base_quality: u8,

    /// Quality gained per counted observation, saturating at 255
    /// Default: 20
    pub reinforcement_increment: u8,

    /// Observations closer than this to the last counted one only refresh
    /// recency, seconds
    /// Default: 5
    pub evidence_window_secs: f64,

    /// Counted observations needed before an inferred record exists
    /// Default: 2
    pub min_inferred_observations: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            neighbor_base_quality: 80,
            inferred_base_quality: 60,
            reinforcement_increment: 20,
            evidence_window_secs: 5.0,
            min_inferred_observations: 2,
        }
    }
}

/// What the write path did with one observation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyUpdate {
    /// Effect on the neighbor record, if one was considered
    pub neighbor: Option<TopologyChange>,
    /// Effect on the route record, if one was considered
    pub route: Option<TopologyChange>,
}

impl TopologyUpdate {
    /// Whether the route record's quality or recency changed
    pub fn route_touched(&self) -> bool {
        matches!(
            self.route,
            Some(
                TopologyChange::Created
                    | TopologyChange::Reinforced
                    | TopologyChange::Refreshed
                    | TopologyChange::Revived
            )
        )
    }
}

/// Outcome of one routing broadcast
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastSummary {
    /// Entries turned into routes
    pub accepted: usize,
    /// Entries skipped by the guardrails or the mode
    pub skipped: usize,
    /// Destinations whose routes changed
    pub destinations: Vec<Callsign>,
}

/// Inference write path over a [`TopologyTable`]
#[derive(Debug, Clone)]
pub struct TopologyInference {
    local: Callsign,
    config: InferenceConfig,
    filter: InfrastructureFilter,
    table: TopologyTable,
}

impl TopologyInference {
    /// Create a write path over an empty table
    pub fn new(
        local: Callsign,
        config: InferenceConfig,
        filter: InfrastructureFilter,
        table: TopologyTable,
    ) -> Self {
        Self {
            local,
            config,
            filter,
            table,
        }
    }

    /// The underlying table
    pub fn table(&self) -> &TopologyTable {
        &self.table
    }

    /// Mutable access to the underlying table
    pub fn table_mut(&mut self) -> &mut TopologyTable {
        &mut self.table
    }

    /// The infrastructure filter in use
    pub fn filter(&self) -> &InfrastructureFilter {
        &self.filter
    }

    /// Apply one accepted observation
    pub fn apply(&mut self, observation: &ClassifiedObservation, mode: OperatingMode) -> TopologyUpdate {
        let now = observation.timestamp;
        let from = &observation.from;

        match observation.kind {
            TrafficKind::Direct => {
                let neighbor = if !mode.allows_direct() {
                    TopologyChange::Gated
                } else if self.filter.is_infrastructure(from) {
                    TopologyChange::Excluded
                } else if observation.is_duplicate {
                    TopologyChange::Duplicate
                } else {
                    self.reinforce_neighbor(from, NeighborSource::Classic, now)
                };
                TopologyUpdate {
                    neighbor: Some(neighbor),
                    route: None,
                }
            }
            TrafficKind::ThirdParty => {
                let neighbor = if !mode.allows_inference() {
                    TopologyChange::Gated
                } else if self.filter.is_infrastructure(from) {
                    TopologyChange::Excluded
                } else if observation.is_duplicate {
                    TopologyChange::Duplicate
                } else {
                    self.reinforce_neighbor(from, NeighborSource::Inferred, now)
                };
                TopologyUpdate {
                    neighbor: Some(neighbor),
                    route: None,
                }
            }
            TrafficKind::Digipeated => {
                let Some(first_hop) = observation.first_hop() else {
                    return TopologyUpdate::default();
                };
                if !mode.allows_inference() {
                    return TopologyUpdate {
                        neighbor: Some(TopologyChange::Gated),
                        route: Some(TopologyChange::Gated),
                    };
                }

                // An unresolved alias as first hop says nothing about who relayed it
                if self.filter.is_infrastructure(first_hop) {
                    return TopologyUpdate {
                        neighbor: Some(TopologyChange::Excluded),
                        route: Some(TopologyChange::Excluded),
                    };
                }
                if observation.is_duplicate {
                    return TopologyUpdate {
                        neighbor: Some(TopologyChange::Duplicate),
                        route: Some(TopologyChange::Duplicate),
                    };
                }

                let neighbor = self.reinforce_neighbor(first_hop, NeighborSource::Inferred, now);
                let route = if self.filter.is_infrastructure(from) {
                    TopologyChange::Excluded
                } else {
                    let path: Vec<Callsign> = observation
                        .via
                        .iter()
                        .filter(|hop| !self.filter.is_infrastructure(hop))
                        .cloned()
                        .collect();
                    self.reinforce_route(from, first_hop, path, now)
                };
                TopologyUpdate {
                    neighbor: Some(neighbor),
                    route: Some(route),
                }
            }
        }
    }

    /// Apply a routing broadcast from a neighbor
    ///
    /// Each entry becomes a broadcast route with the announcer as origin,
    /// its path prefixed with the announcer, and its quality scaled by the
    /// announcer's own quality. Bad entries are skipped one by one.
    pub fn apply_broadcast(
        &mut self,
        from: &Callsign,
        quality: u8,
        announced: &[RouteInfo],
        timestamp: DateTime<Utc>,
        mode: OperatingMode,
    ) -> BroadcastSummary {
        let mut summary = BroadcastSummary::default();
        if !mode.allows_broadcast() || *from == self.local || self.filter.is_infrastructure(from) {
            summary.skipped = announced.len();
            debug!(from = %from, mode = %mode, entries = announced.len(), "broadcast ignored");
            return summary;
        }

        for entry in announced {
            let destination = &entry.destination;
            let mut path = Vec::with_capacity(entry.path.len() + 1);
            path.push(from.clone());
            path.extend(entry.path.iter().cloned());

            let usable = *destination != self.local
                && destination != from
                && !self.filter.is_infrastructure(destination)
                && !path.contains(destination)
                && path_is_clean(&path, &self.local, &self.filter);
            if !usable {
                summary.skipped += 1;
                continue;
            }

            let scaled = scale_quality(entry.quality, quality);
            self.upsert_broadcast_route(destination, from, path, scaled, timestamp);
            summary.accepted += 1;
            if !summary.destinations.contains(destination) {
                summary.destinations.push(destination.clone());
            }
        }

        debug!(
            from = %from,
            accepted = summary.accepted,
            skipped = summary.skipped,
            "broadcast applied"
        );
        summary
    }

    fn within_cadence(&self, last_counted: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        secs_between(now, last_counted) < self.config.evidence_window_secs
    }

    fn reinforce_neighbor(&mut self, call: &Callsign, source: NeighborSource, now: DateTime<Utc>) -> TopologyChange {
        self.table.settle_neighbor(call, now);

        if let Some(state) = self.table.take_neighbor(call) {
            let revived = state.is_tombstoned();
            let mut entry = state.into_record();
            let change = if revived {
                entry.info.obsolescence_count += 1;
                self.count_neighbor(&mut entry, now);
                TopologyChange::Revived
            } else if self.within_cadence(entry.last_counted, now) {
                entry.info.last_seen = entry.info.last_seen.max(now);
                TopologyChange::Refreshed
            } else {
                self.count_neighbor(&mut entry, now);
                TopologyChange::Reinforced
            };
            if source == NeighborSource::Classic {
                entry.info.source_type = NeighborSource::Classic;
            }
            debug!(
                call = %call,
                quality = entry.info.quality,
                change = ?change,
                "neighbor updated"
            );
            self.table.put_neighbor(Lifecycle::Live(entry), now);
            return change;
        }

        let base = match source {
            NeighborSource::Classic => self.config.neighbor_base_quality,
            NeighborSource::Inferred => {
                if self
                    .advance_candidate(CandidateKey::Neighbor(call.clone()), Vec::new(), now)
                    .is_none()
                {
                    return TopologyChange::Pending;
                }
                self.config.inferred_base_quality
            }
        };

        let entry = NeighborEntry {
            info: NeighborInfo {
                call: call.clone(),
                quality: base,
                last_seen: now,
                obsolescence_count: 0,
                source_type: source,
            },
            last_counted: now,
            reinforcements: 1,
        };
        debug!(call = %call, source = ?source, quality = base, "neighbor created");
        self.table.put_neighbor(Lifecycle::Live(entry), now);
        TopologyChange::Created
    }

    fn count_neighbor(&self, entry: &mut NeighborEntry, now: DateTime<Utc>) {
        entry.info.quality = entry
            .info
            .quality
            .saturating_add(self.config.reinforcement_increment);
        entry.info.last_seen = entry.info.last_seen.max(now);
        entry.last_counted = now;
        entry.reinforcements += 1;
    }

    fn reinforce_route(
        &mut self,
        destination: &Callsign,
        origin: &Callsign,
        path: Vec<Callsign>,
        now: DateTime<Utc>,
    ) -> TopologyChange {
        self.table.settle_route(destination, origin, now);

        if let Some(state) = self.table.take_route(destination, origin) {
            let revived = state.is_tombstoned();
            let mut entry = state.into_record();
            entry.info.path = path;
            let change = if revived {
                self.count_route(&mut entry, now);
                TopologyChange::Revived
            } else if self.within_cadence(entry.last_counted, now) {
                entry.info.last_updated = entry.info.last_updated.max(now);
                TopologyChange::Refreshed
            } else {
                self.count_route(&mut entry, now);
                TopologyChange::Reinforced
            };
            debug!(
                destination = %destination,
                origin = %origin,
                quality = entry.info.quality,
                change = ?change,
                "route updated"
            );
            self.table.put_route(Lifecycle::Live(entry), now);
            return change;
        }

        let key = CandidateKey::Route {
            destination: destination.clone(),
            origin: origin.clone(),
        };
        let Some(candidate) = self.advance_candidate(key, path, now) else {
            return TopologyChange::Pending;
        };

        let entry = RouteEntry {
            info: RouteInfo {
                destination: destination.clone(),
                origin: origin.clone(),
                quality: self.config.inferred_base_quality,
                path: candidate.path,
                last_updated: now,
                source_type: RouteSource::Inferred,
            },
            last_counted: now,
            reinforcements: 1,
        };
        debug!(destination = %destination, origin = %origin, "inferred route created");
        self.table.put_route(Lifecycle::Live(entry), now);
        TopologyChange::Created
    }

    fn count_route(&self, entry: &mut RouteEntry, now: DateTime<Utc>) {
        entry.info.quality = entry
            .info
            .quality
            .saturating_add(self.config.reinforcement_increment);
        entry.info.last_updated = entry.info.last_updated.max(now);
        entry.last_counted = now;
        entry.reinforcements += 1;
    }

    fn upsert_broadcast_route(
        &mut self,
        destination: &Callsign,
        origin: &Callsign,
        path: Vec<Callsign>,
        quality: u8,
        now: DateTime<Utc>,
    ) {
        self.table.settle_route(destination, origin, now);
        self.table.take_candidate(&CandidateKey::Route {
            destination: destination.clone(),
            origin: origin.clone(),
        });

        let entry = match self.table.take_route(destination, origin) {
            Some(state) => {
                let mut entry = state.into_record();
                entry.info.quality = quality;
                entry.info.path = path;
                entry.info.last_updated = entry.info.last_updated.max(now);
                entry.info.source_type = RouteSource::Broadcast;
                entry.last_counted = now;
                entry.reinforcements += 1;
                entry
            }
            None => RouteEntry {
                info: RouteInfo {
                    destination: destination.clone(),
                    origin: origin.clone(),
                    quality,
                    path,
                    last_updated: now,
                    source_type: RouteSource::Broadcast,
                },
                last_counted: now,
                reinforcements: 1,
            },
        };
        self.table.put_route(Lifecycle::Live(entry), now);
    }

    /// Count an observation toward a candidate; returns it once it qualifies
    fn advance_candidate(
        &mut self,
        key: CandidateKey,
        path: Vec<Callsign>,
        now: DateTime<Utc>,
    ) -> Option<PendingCandidate> {
        let needed = self.config.min_inferred_observations.max(1);
        let window = self.config.evidence_window_secs;

        let ready = match self.table.candidate_mut(&key) {
            Some(candidate) => {
                candidate.last_seen = candidate.last_seen.max(now);
                if !path.is_empty() {
                    candidate.path = path;
                }
                if secs_between(now, candidate.last_counted) >= window {
                    candidate.count += 1;
                    candidate.last_counted = now;
                }
                candidate.count >= needed
            }
            None => {
                let candidate = PendingCandidate {
                    key: key.clone(),
                    path,
                    count: 1,
                    last_counted: now,
                    last_seen: now,
                };
                if needed <= 1 {
                    return Some(candidate);
                }
                self.table.put_candidate(candidate);
                false
            }
        };

        if ready {
            self.table.take_candidate(&key)
        } else {
            None
        }
    }
}

/// Scale an announced quality by the announcer's quality
fn scale_quality(announced: u8, announcer: u8) -> u8 {
    ((announced as u32 * announcer as u32 + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use axmesh_core::{FrameClass, ObservedPacket};
    use chrono::{Duration, TimeZone};

    use crate::classify::classify;
    use crate::config::CapacityConfig;
    use crate::lifecycle::LifecycleConfig;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    fn inference() -> TopologyInference {
        TopologyInference::new(
            call("N0CALL"),
            InferenceConfig::default(),
            InfrastructureFilter::default(),
            TopologyTable::new(LifecycleConfig::default(), CapacityConfig::default(), 300.0),
        )
    }

    fn observe(
        inf: &mut TopologyInference,
        packet: ObservedPacket,
        ts: DateTime<Utc>,
        mode: OperatingMode,
    ) -> TopologyUpdate {
        let obs = classify(&packet, ts, false, &call("N0CALL")).unwrap();
        inf.apply(&obs, mode)
    }

    fn direct(from: &str) -> ObservedPacket {
        ObservedPacket::new(from, "N0CALL", FrameClass::Data)
    }

    fn digi(from: &str, to: &str, via: &[&str]) -> ObservedPacket {
        ObservedPacket::new(from, to, FrameClass::Data).with_via(via.iter().copied())
    }

    #[test]
    fn test_direct_creates_classic_neighbor() {
        let mut inf = inference();
        let update = observe(&mut inf, direct("K1ABC"), t0(), OperatingMode::Classic);
        assert_eq!(update.neighbor, Some(TopologyChange::Created));
        let state = inf.table().neighbor(&call("K1ABC")).unwrap();
        assert_eq!(state.record().info.quality, 80);
        assert_eq!(state.record().info.source_type, NeighborSource::Classic);
    }

    #[test]
    fn test_cadence_refreshes_without_counting() {
        let mut inf = inference();
        observe(&mut inf, direct("K1ABC"), t0(), OperatingMode::Hybrid);
        let update = observe(&mut inf, direct("K1ABC"), at(2), OperatingMode::Hybrid);
        assert_eq!(update.neighbor, Some(TopologyChange::Refreshed));
        let entry = inf.table().neighbor(&call("K1ABC")).unwrap().record().clone();
        assert_eq!(entry.info.quality, 80);
        assert_eq!(entry.info.last_seen, at(2));

        let update = observe(&mut inf, direct("K1ABC"), at(6), OperatingMode::Hybrid);
        assert_eq!(update.neighbor, Some(TopologyChange::Reinforced));
        assert_eq!(inf.table().neighbor(&call("K1ABC")).unwrap().record().info.quality, 100);
    }

    #[test]
    fn test_quality_saturates() {
        let mut inf = inference();
        for i in 0..20 {
            observe(&mut inf, direct("K1ABC"), at(i * 10), OperatingMode::Classic);
        }
        assert_eq!(inf.table().neighbor(&call("K1ABC")).unwrap().record().info.quality, 255);
    }

    #[test]
    fn test_inferred_needs_two_counted_observations() {
        let mut inf = inference();
        let packet = digi("K9XYZ", "K2DEF", &["DIGI1", "DIGI2"]);

        let first = observe(&mut inf, packet.clone(), t0(), OperatingMode::Inference);
        assert_eq!(first.neighbor, Some(TopologyChange::Pending));
        assert_eq!(first.route, Some(TopologyChange::Pending));

        // Inside the evidence window: still pending
        let burst = observe(&mut inf, packet.clone(), at(1), OperatingMode::Inference);
        assert_eq!(burst.neighbor, Some(TopologyChange::Pending));
        assert!(inf.table().neighbor(&call("DIGI1")).is_none());

        let second = observe(&mut inf, packet, at(10), OperatingMode::Inference);
        assert_eq!(second.neighbor, Some(TopologyChange::Created));
        assert_eq!(second.route, Some(TopologyChange::Created));

        let route = inf.table().route(&call("K9XYZ"), &call("DIGI1")).unwrap().record().clone();
        assert_eq!(route.info.quality, 60);
        assert_eq!(route.info.path, vec![call("DIGI1"), call("DIGI2")]);
        assert_eq!(route.info.source_type, RouteSource::Inferred);
        assert_eq!(inf.table().pending_count(), 0);
    }

    #[test]
    fn test_mode_gating() {
        let mut inf = inference();
        let update = observe(&mut inf, digi("K9XYZ", "K2DEF", &["DIGI1"]), t0(), OperatingMode::Classic);
        assert_eq!(update.neighbor, Some(TopologyChange::Gated));
        assert_eq!(update.route, Some(TopologyChange::Gated));

        let update = observe(&mut inf, direct("K1ABC"), t0(), OperatingMode::Inference);
        assert_eq!(update.neighbor, Some(TopologyChange::Gated));

        let update = observe(
            &mut inf,
            ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Beacon),
            t0(),
            OperatingMode::Classic,
        );
        assert_eq!(update.neighbor, Some(TopologyChange::Gated));
        assert_eq!(inf.table().neighbor_count(), 0);
        assert_eq!(inf.table().pending_count(), 0);
    }

    #[test]
    fn test_third_party_infers_source_without_route() {
        let mut inf = inference();
        let packet = ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data);
        observe(&mut inf, packet.clone(), t0(), OperatingMode::Hybrid);
        let update = observe(&mut inf, packet, at(10), OperatingMode::Hybrid);
        assert_eq!(update.neighbor, Some(TopologyChange::Created));
        assert_eq!(update.route, None);
        assert_eq!(
            inf.table().neighbor(&call("K1ABC")).unwrap().record().info.source_type,
            NeighborSource::Inferred
        );
    }

    #[test]
    fn test_alias_first_hop_is_excluded() {
        let mut inf = inference();
        let update = observe(
            &mut inf,
            digi("K9XYZ", "APRS", &["WIDE1-1", "WIDE2-1"]),
            t0(),
            OperatingMode::Hybrid,
        );
        assert_eq!(update.neighbor, Some(TopologyChange::Excluded));
        assert_eq!(update.route, Some(TopologyChange::Excluded));
        assert_eq!(inf.table().pending_count(), 0);
    }

    #[test]
    fn test_unused_aliases_stripped_from_path() {
        let mut inf = inference();
        let packet = digi("K9XYZ", "APRS", &["DIGI1", "WIDE2-1"]);
        observe(&mut inf, packet.clone(), t0(), OperatingMode::Hybrid);
        observe(&mut inf, packet, at(10), OperatingMode::Hybrid);
        let route = inf.table().route(&call("K9XYZ"), &call("DIGI1")).unwrap();
        assert_eq!(route.record().info.path, vec![call("DIGI1")]);
    }

    #[test]
    fn test_infrastructure_source_never_becomes_identity() {
        let mut inf = inference();
        let update = observe(&mut inf, direct("BEACON"), t0(), OperatingMode::Hybrid);
        assert_eq!(update.neighbor, Some(TopologyChange::Excluded));
        assert_eq!(inf.table().neighbor_count(), 0);
    }

    #[test]
    fn test_duplicates_never_reinforce() {
        let mut inf = inference();
        observe(&mut inf, direct("K1ABC"), t0(), OperatingMode::Classic);
        let obs = classify(&direct("K1ABC"), at(60), true, &call("N0CALL")).unwrap();
        let update = inf.apply(&obs, OperatingMode::Classic);
        assert_eq!(update.neighbor, Some(TopologyChange::Duplicate));
        let entry = inf.table().neighbor(&call("K1ABC")).unwrap().record().clone();
        assert_eq!(entry.info.quality, 80);
        assert_eq!(entry.info.last_seen, t0());
    }

    #[test]
    fn test_revival_keeps_state_and_counts_obsolescence() {
        let mut inf = inference();
        for i in 0..3 {
            observe(&mut inf, direct("K1ABC"), at(i * 10), OperatingMode::Classic);
        }
        inf.table_mut().sweep(at(20 + 1800));
        assert!(inf.table().neighbor(&call("K1ABC")).unwrap().is_tombstoned());

        let update = observe(&mut inf, direct("K1ABC"), at(2000), OperatingMode::Classic);
        assert_eq!(update.neighbor, Some(TopologyChange::Revived));
        let entry = inf.table().neighbor(&call("K1ABC")).unwrap().record().clone();
        assert_eq!(entry.info.obsolescence_count, 1);
        assert_eq!(entry.info.quality, 140);
        assert_eq!(entry.reinforcements, 4);
    }

    #[test]
    fn test_revival_without_sweep() {
        let mut inf = inference();
        observe(&mut inf, direct("K1ABC"), t0(), OperatingMode::Classic);
        // Expired but never swept; the write path settles it first
        let update = observe(&mut inf, direct("K1ABC"), at(2500), OperatingMode::Classic);
        assert_eq!(update.neighbor, Some(TopologyChange::Revived));
    }

    #[test]
    fn test_classic_upgrades_inferred_neighbor() {
        let mut inf = inference();
        let heard = ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data);
        observe(&mut inf, heard.clone(), t0(), OperatingMode::Hybrid);
        observe(&mut inf, heard, at(10), OperatingMode::Hybrid);
        observe(&mut inf, direct("K1ABC"), at(20), OperatingMode::Hybrid);
        assert_eq!(
            inf.table().neighbor(&call("K1ABC")).unwrap().record().info.source_type,
            NeighborSource::Classic
        );
    }

    #[test]
    fn test_broadcast_routes() {
        let mut inf = inference();
        let announced = vec![
            RouteInfo::announced(call("K9XYZ"), 200, vec![call("DIGI2")], t0()),
            // Skipped: destination is the local station
            RouteInfo::announced(call("N0CALL"), 255, vec![], t0()),
            // Skipped: destination is the announcer
            RouteInfo::announced(call("NODE1"), 255, vec![], t0()),
            // Skipped: path through the local station
            RouteInfo::announced(call("K8AAA"), 255, vec![call("N0CALL")], t0()),
            // Skipped: path loops
            RouteInfo::announced(call("K7BBB"), 255, vec![call("D1"), call("D2"), call("D1")], t0()),
            // Skipped: infrastructure destination
            RouteInfo::announced(call("CQ"), 255, vec![], t0()),
            RouteInfo::announced(call("K6CCC"), 255, vec![], t0()),
        ];
        let summary = inf.apply_broadcast(&call("NODE1"), 128, &announced, t0(), OperatingMode::Hybrid);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.skipped, 5);

        let route = inf.table().route(&call("K9XYZ"), &call("NODE1")).unwrap().record().clone();
        assert_eq!(route.info.source_type, RouteSource::Broadcast);
        assert_eq!(route.info.path, vec![call("NODE1"), call("DIGI2")]);
        assert_eq!(route.info.quality, 100);
    }

    #[test]
    fn test_broadcast_ignored_in_inference_mode() {
        let mut inf = inference();
        let announced = vec![RouteInfo::announced(call("K9XYZ"), 200, vec![], t0())];
        let summary = inf.apply_broadcast(&call("NODE1"), 200, &announced, t0(), OperatingMode::Inference);
        assert_eq!(summary.accepted, 0);
        assert_eq!(inf.table().route_count(), 0);
    }

    #[test]
    fn test_scale_quality() {
        assert_eq!(scale_quality(255, 255), 255);
        assert_eq!(scale_quality(200, 128), 100);
        assert_eq!(scale_quality(0, 255), 0);
    }
}
