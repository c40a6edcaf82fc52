//! The topology engine facade
//!
//! [`TopologyEngine`] owns the four components and is the only type hosts
//! need. It is a single-writer state machine: mutations take `&mut self`,
//! queries take `&self`, and all time comes from the timestamps callers
//! pass in.
//!
//! ## Ingestion
//!
//! 1. Normalize and guard the packet ([`classify`]); a rejection changes nothing
//! 2. Advance the engine clock (never backwards)
//! 3. Fold link evidence into the `(from, to)` estimator
//! 4. Run the topology write path under the current mode
//! 5. Re-run route selection for a destination whose routes changed
//! 6. Sweep lifecycles if `sweep_interval_secs` of packet time have passed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use axmesh_core::{
    Callsign, LinkStatRecord, NeighborInfo, ObservationOutcome, ObservedPacket, OperatingMode,
    PacketId, RouteInfo, SnapshotError,
};

use crate::classify::{classify, path_is_clean};
use crate::config::EngineConfig;
use crate::freshness::{Decaying, FreshnessStatus, freshness_display, secs_between};
use crate::inference::{BroadcastSummary, TopologyInference};
use crate::infrastructure::InfrastructureFilter;
use crate::lifecycle::{Lifecycle, SweepCounts};
use crate::link_quality::{LinkKey, LinkQualityEstimator};
use crate::selector::{Preference, RouteSelector, Selection};
use crate::snapshot::{LoggedPacket, SNAPSHOT_VERSION, TopologySnapshot};
use crate::table::{NeighborEntry, RouteEntry, TopologyTable};

/// Result of one lifecycle sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Link estimators tombstoned and removed
    pub links: SweepCounts,
    /// Neighbor and route records tombstoned and removed
    pub topology: SweepCounts,
    /// Destinations whose preferred route changed
    pub reselected: usize,
}

/// Result of restoring a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Neighbor records loaded
    pub neighbors: usize,
    /// Route records loaded
    pub routes: usize,
    /// Link estimators loaded
    pub links: usize,
    /// Records dropped by the guardrails
    pub skipped: usize,
}

/// Result of replaying logged packets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Packets applied
    pub applied: usize,
    /// Packets rejected by the guardrails
    pub rejected: usize,
    /// Id of the last packet replayed
    pub last_packet_id: Option<PacketId>,
}

/// Record counts for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Neighbor records, tombstoned included
    pub neighbors: usize,
    /// Route records, tombstoned included
    pub routes: usize,
    /// Destinations with at least one route record
    pub destinations: usize,
    /// Link estimators, tombstoned included
    pub links: usize,
    /// Live link estimators
    pub live_links: usize,
    /// Inferred records still collecting observations
    pub pending: usize,
}

/// Passive topology inference and link-quality engine
#[derive(Debug, Clone)]
pub struct TopologyEngine {
    local: Callsign,
    config: EngineConfig,
    config_hash: String,
    mode: OperatingMode,
    links: LinkQualityEstimator,
    topology: TopologyInference,
    selector: RouteSelector,
    clock: Option<DateTime<Utc>>,
    last_sweep: Option<DateTime<Utc>>,
}

impl TopologyEngine {
    /// Create an engine for `local` with the given configuration and mode
    pub fn new(local: Callsign, config: EngineConfig, mode: OperatingMode) -> Self {
        for warning in config.validate() {
            warn!(local = %local, warning = %warning, "questionable engine configuration");
        }

        let plateau = config.freshness.plateau_secs;
        let links = LinkQualityEstimator::new(
            config.link.clone(),
            config.evidence.clone(),
            plateau,
            &config.capacity,
        );
        let table = TopologyTable::new(config.lifecycle.clone(), config.capacity.clone(), plateau);
        let topology = TopologyInference::new(
            local.clone(),
            config.inference.clone(),
            InfrastructureFilter::new(&config.infrastructure),
            table,
        );
        let selector = RouteSelector::new(config.selector.clone());
        let config_hash = config.config_hash();

        Self {
            local,
            config,
            config_hash,
            mode,
            links,
            topology,
            selector,
            clock: None,
            last_sweep: None,
        }
    }

    /// Create an engine with default configuration in hybrid mode
    pub fn with_defaults(local: Callsign) -> Self {
        Self::new(local, EngineConfig::default(), OperatingMode::Hybrid)
    }

    /// The local station
    pub fn local(&self) -> &Callsign {
        &self.local
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fingerprint of the configuration
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    /// Current operating mode
    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Change the operating mode
    ///
    /// Existing records stay; the mode only gates what new observations
    /// may create.
    pub fn set_mode(&mut self, mode: OperatingMode) {
        if mode != self.mode {
            info!(local = %self.local, from = %self.mode, to = %mode, "operating mode changed");
            self.mode = mode;
        }
    }

    /// Latest timestamp seen, if any
    pub fn clock(&self) -> Option<DateTime<Utc>> {
        self.clock
    }

    /// Time used by the clock-relative queries
    ///
    /// Before any packet arrives nothing has decayed yet, so the earliest
    /// representable time stands in.
    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn advance_clock(&mut self, timestamp: DateTime<Utc>) {
        self.clock = Some(self.clock.map_or(timestamp, |clock| clock.max(timestamp)));
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Feed one heard packet to the engine
    ///
    /// Never fails: degenerate packets come back as
    /// [`ObservationOutcome::Rejected`] with no state touched.
    pub fn observe_packet(
        &mut self,
        packet: &ObservedPacket,
        timestamp: DateTime<Utc>,
        is_duplicate: bool,
    ) -> ObservationOutcome {
        let observation = match classify(packet, timestamp, is_duplicate, &self.local) {
            Ok(observation) => observation,
            Err(reason) => {
                debug!(packet = %packet, reason = %reason, "packet rejected");
                return ObservationOutcome::Rejected(reason);
            }
        };

        self.advance_clock(timestamp);
        self.links.apply(&observation);
        let update = self.topology.apply(&observation, self.mode);

        if update.route_touched() {
            self.reselect(&observation.from, timestamp);
        }

        debug!(
            packet = %packet,
            kind = ?observation.kind,
            neighbor = ?update.neighbor,
            route = ?update.route,
            duplicate = is_duplicate,
            "packet applied"
        );

        self.maybe_sweep(timestamp);

        ObservationOutcome::Applied {
            kind: observation.kind,
            neighbor: update.neighbor,
            route: update.route,
        }
    }

    /// Apply a routing broadcast heard from `from`
    ///
    /// `quality` is the local view of the announcer; each announced
    /// quality is scaled by it.
    pub fn broadcast_routes(
        &mut self,
        from: &Callsign,
        quality: u8,
        announced: &[RouteInfo],
        timestamp: DateTime<Utc>,
    ) -> BroadcastSummary {
        self.advance_clock(timestamp);
        let summary = self
            .topology
            .apply_broadcast(from, quality, announced, timestamp, self.mode);
        for destination in &summary.destinations {
            self.reselect(destination, timestamp);
        }
        self.maybe_sweep(timestamp);
        summary
    }

    /// Load link statistics exported earlier
    ///
    /// Records sent from the local station or looping to themselves are
    /// skipped. The clock moves up to the newest imported record so the
    /// clock-relative queries decay them. Returns the number imported.
    pub fn import_link_stats(&mut self, records: &[LinkStatRecord]) -> usize {
        let imported = self.links.import(records, &self.local);
        let newest = records
            .iter()
            .filter(|r| r.from_call != self.local && r.from_call != r.to_call)
            .map(|r| r.last_updated)
            .max();
        if let Some(newest) = newest {
            self.advance_clock(newest);
        }
        debug!(imported, skipped = records.len() - imported, "link statistics imported");
        imported
    }

    /// Replace all state with a snapshot
    ///
    /// The snapshot must be for this station and configuration; its age is
    /// the host's call (see [`TopologySnapshot::validate`]). Records that
    /// would break the identity invariants are dropped.
    pub fn restore(&mut self, snapshot: TopologySnapshot) -> Result<RestoreSummary, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        if snapshot.local != self.local {
            return Err(SnapshotError::LocalMismatch {
                expected: self.local.to_string(),
                actual: snapshot.local.to_string(),
            });
        }
        if snapshot.config_hash != self.config_hash {
            return Err(SnapshotError::ConfigMismatch {
                expected: self.config_hash.clone(),
                actual: snapshot.config_hash,
            });
        }

        let filter = self.topology.filter().clone();
        let local = self.local.clone();
        let total = snapshot.neighbors.len() + snapshot.routes.len() + snapshot.link_stats.len();

        let neighbors: Vec<Lifecycle<NeighborEntry>> = snapshot
            .neighbors
            .into_iter()
            .filter(|state| {
                let call = &state.record().info.call;
                *call != local && !filter.is_infrastructure(call)
            })
            .collect();
        let routes: Vec<Lifecycle<RouteEntry>> = snapshot
            .routes
            .into_iter()
            .filter(|state| {
                let info = &state.record().info;
                info.destination != local
                    && !filter.is_infrastructure(&info.destination)
                    && info.path.first() == Some(&info.origin)
                    && !info.path.contains(&info.destination)
                    && path_is_clean(&info.path, &local, &filter)
            })
            .collect();

        let now = snapshot.clock.unwrap_or(snapshot.snapshot_timestamp);
        let summary_neighbors = neighbors.len();
        let summary_routes = routes.len();

        self.topology
            .table_mut()
            .load(neighbors, routes, snapshot.candidates, now);
        self.links.clear();
        let imported_links = self.links.import(&snapshot.link_stats, &self.local);
        self.selector.load(snapshot.preferences);
        let table = self.topology.table();
        self.selector.retain(|destination| table.has_destination(destination));

        self.mode = snapshot.mode;
        self.clock = Some(now);
        self.last_sweep = snapshot.last_sweep;

        let summary = RestoreSummary {
            neighbors: summary_neighbors,
            routes: summary_routes,
            links: imported_links,
            skipped: total - summary_neighbors - summary_routes - imported_links,
        };
        info!(
            local = %self.local,
            neighbors = summary.neighbors,
            routes = summary.routes,
            links = summary.links,
            skipped = summary.skipped,
            last_packet = ?snapshot.last_packet_id,
            "snapshot restored"
        );
        Ok(summary)
    }

    /// Re-apply logged packets, typically those after a restored snapshot
    pub fn replay<'a>(&mut self, packets: impl IntoIterator<Item = &'a LoggedPacket>) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        for entry in packets {
            let outcome = self.observe_packet(&entry.packet, entry.timestamp, entry.is_duplicate);
            if outcome.is_applied() {
                summary.applied += 1;
            } else {
                summary.rejected += 1;
            }
            summary.last_packet_id = Some(entry.id);
        }
        debug!(
            applied = summary.applied,
            rejected = summary.rejected,
            last_packet = ?summary.last_packet_id,
            "replay complete"
        );
        summary
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tombstone and remove expired records, then re-run route selection
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        let links = self.links.sweep(now);
        let topology = self.topology.table_mut().sweep(now);

        let table = self.topology.table();
        self.selector.retain(|destination| table.has_destination(destination));

        let destinations: Vec<Callsign> = self.topology.table().destinations().cloned().collect();
        let reselected = destinations
            .iter()
            .filter(|destination| {
                matches!(
                    self.reselect(destination, now),
                    Selection::Adopted(_) | Selection::Switched { .. } | Selection::Cleared
                )
            })
            .count();

        self.last_sweep = Some(self.last_sweep.map_or(now, |last| last.max(now)));

        let report = SweepReport {
            links,
            topology,
            reselected,
        };
        if !report.links.is_empty() || !report.topology.is_empty() {
            debug!(
                links_tombstoned = report.links.tombstoned,
                links_removed = report.links.removed,
                records_tombstoned = report.topology.tombstoned,
                records_removed = report.topology.removed,
                reselected = report.reselected,
                "lifecycle sweep"
            );
        }
        report
    }

    fn maybe_sweep(&mut self, timestamp: DateTime<Utc>) {
        match self.last_sweep {
            None => self.last_sweep = Some(timestamp),
            Some(last) if secs_between(timestamp, last) >= self.config.lifecycle.sweep_interval_secs => {
                self.sweep(timestamp);
            }
            Some(_) => {}
        }
    }

    fn reselect(&mut self, destination: &Callsign, now: DateTime<Utc>) -> Selection {
        let candidates = self.topology.table().route_candidates(destination, now);
        self.selector.select(destination, &candidates, now)
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Live neighbors at the engine clock, sorted by callsign
    pub fn current_neighbors(&self) -> Vec<NeighborInfo> {
        self.current_neighbors_at(self.now())
    }

    /// Live neighbors at `now`
    pub fn current_neighbors_at(&self, now: DateTime<Utc>) -> Vec<NeighborInfo> {
        self.topology.table().current_neighbors(now)
    }

    /// Every neighbor record, tombstoned ones at quality 0
    pub fn all_neighbors(&self) -> Vec<NeighborInfo> {
        self.topology.table().all_neighbors(self.now())
    }

    /// Live routes at the engine clock, sorted by destination then origin
    pub fn current_routes(&self) -> Vec<RouteInfo> {
        self.current_routes_at(self.now())
    }

    /// Live routes at `now`
    pub fn current_routes_at(&self, now: DateTime<Utc>) -> Vec<RouteInfo> {
        self.topology.table().current_routes(now)
    }

    /// Live routes to one destination, sorted by origin
    pub fn routes_to(&self, destination: &Callsign) -> Vec<RouteInfo> {
        self.topology.table().routes_to(destination, self.now())
    }

    /// The route to use for a destination
    pub fn preferred_route(&self, destination: &Callsign) -> Option<RouteInfo> {
        self.preferred_route_at(destination, self.now())
    }

    /// The route to use for a destination at `now`
    ///
    /// The selector's preference while it is live, otherwise the best live
    /// route (lowest origin on ties).
    pub fn preferred_route_at(&self, destination: &Callsign, now: DateTime<Utc>) -> Option<RouteInfo> {
        let routes = self.topology.table().routes_to(destination, now);
        if let Some(pref) = self.selector.preferred(destination) {
            if let Some(route) = routes.iter().find(|route| route.origin == pref.origin) {
                return Some(route.clone());
            }
        }
        routes
            .into_iter()
            .max_by(|a, b| a.quality.cmp(&b.quality).then_with(|| b.origin.cmp(&a.origin)))
    }

    /// Current route preferences, sorted by destination
    pub fn preferences(&self) -> impl Iterator<Item = &Preference> + '_ {
        self.selector.preferences()
    }

    /// Quality of the `from -> to` link at the engine clock
    pub fn link_quality(&self, from: &Callsign, to: &Callsign) -> u8 {
        self.link_quality_at(from, to, self.now())
    }

    /// Quality of the `from -> to` link at `now`
    pub fn link_quality_at(&self, from: &Callsign, to: &Callsign, now: DateTime<Utc>) -> u8 {
        self.links.quality(&LinkKey::new(from.clone(), to.clone()), now)
    }

    /// Goodness of the `from -> to` link at the engine clock
    pub fn link_goodness(&self, from: &Callsign, to: &Callsign) -> f64 {
        self.links.goodness(&LinkKey::new(from.clone(), to.clone()), self.now())
    }

    /// ETX of the `from -> to` link, if it is live
    pub fn link_etx(&self, from: &Callsign, to: &Callsign) -> Option<f64> {
        self.links.etx(&LinkKey::new(from.clone(), to.clone()))
    }

    /// All link statistics at the engine clock, sorted by `(from, to)`
    pub fn export_link_stats(&self) -> Vec<LinkStatRecord> {
        self.links.export(self.now())
    }

    /// Capture the engine state
    pub fn export_snapshot(&self, last_packet_id: Option<PacketId>, now: DateTime<Utc>) -> TopologySnapshot {
        let table = self.topology.table();
        TopologySnapshot {
            version: SNAPSHOT_VERSION,
            local: self.local.clone(),
            mode: self.mode,
            neighbors: table.neighbor_states(),
            routes: table.route_states(),
            link_stats: self.links.export(now),
            candidates: table.candidates(),
            preferences: self.selector.preferences().cloned().collect(),
            last_packet_id,
            config_hash: self.config_hash.clone(),
            snapshot_timestamp: now,
            clock: self.clock,
            last_sweep: self.last_sweep,
        }
    }

    /// Record counts
    pub fn stats(&self) -> EngineStats {
        let table = self.topology.table();
        EngineStats {
            neighbors: table.neighbor_count(),
            routes: table.route_count(),
            destinations: table.destinations().count(),
            links: self.links.len(),
            live_links: self.links.live_count(),
            pending: table.pending_count(),
        }
    }

    // ------------------------------------------------------------------
    // Freshness
    // ------------------------------------------------------------------

    /// Freshness of a neighbor record at the engine clock
    pub fn neighbor_freshness(&self, info: &NeighborInfo) -> f64 {
        let ttl = self.topology.table().neighbor_ttl_secs(info.source_type);
        info.freshness(self.now(), ttl, self.config.freshness.plateau_secs)
    }

    /// Freshness of a route record at the engine clock
    pub fn route_freshness(&self, info: &RouteInfo) -> f64 {
        let ttl = self.topology.table().route_ttl_secs(info.source_type);
        info.freshness(self.now(), ttl, self.config.freshness.plateau_secs)
    }

    /// Freshness of an exported link record at the engine clock
    pub fn link_freshness(&self, record: &LinkStatRecord) -> f64 {
        let ttl = self.links.record_ttl_secs(record);
        record.freshness(self.now(), ttl, self.config.freshness.plateau_secs)
    }

    /// Display band and percentage text for a freshness value
    pub fn describe_freshness(freshness: f64) -> (FreshnessStatus, String) {
        (FreshnessStatus::from_freshness(freshness), freshness_display(freshness))
    }
}
