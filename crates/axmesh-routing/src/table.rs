//! Topology table
//!
//! The [`TopologyTable`] stores neighbor and route records, the candidates
//! that are not yet records, and enforces the memory bounds. It knows how
//! long each kind of record lives but not how records are earned; that is
//! the inference write path's job.
//!
//! Stored qualities are never decayed. Every read view applies freshness
//! at the time of the read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use axmesh_core::{Callsign, NeighborInfo, NeighborSource, RouteInfo, RouteSource};

use crate::config::CapacityConfig;
use crate::freshness::{apply_freshness, freshness, secs_between};
use crate::lifecycle::{Lifecycle, LifecycleConfig, SweepCounts, settle_entry, sweep_map};

/// Stored neighbor state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEntry {
    /// The record, with undecayed quality
    pub info: NeighborInfo,
    /// Last observation that counted as reinforcement
    pub last_counted: DateTime<Utc>,
    /// Observations that counted as reinforcement
    pub reinforcements: u64,
}

/// Stored route state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// The record, with undecayed quality
    pub info: RouteInfo,
    /// Last observation that counted as reinforcement
    pub last_counted: DateTime<Utc>,
    /// Observations that counted as reinforcement
    pub reinforcements: u64,
}

/// What a pending candidate would become
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CandidateKey {
    /// An inferred neighbor
    Neighbor(Callsign),
    /// An inferred route
    Route {
        /// Destination of the route
        destination: Callsign,
        /// First hop of the route
        origin: Callsign,
    },
}

/// An inferred record still collecting observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCandidate {
    /// What it would become
    pub key: CandidateKey,
    /// Latest observed path (routes only)
    pub path: Vec<Callsign>,
    /// Counted observations so far
    pub count: u32,
    /// Last counted observation
    pub last_counted: DateTime<Utc>,
    /// Last observation of any kind
    pub last_seen: DateTime<Utc>,
}

/// Neighbor, route and candidate storage
#[derive(Debug, Clone)]
pub struct TopologyTable {
    lifecycle: LifecycleConfig,
    capacity: CapacityConfig,
    plateau_secs: f64,
    neighbors: BTreeMap<Callsign, Lifecycle<NeighborEntry>>,
    routes: BTreeMap<Callsign, BTreeMap<Callsign, Lifecycle<RouteEntry>>>,
    pending: BTreeMap<CandidateKey, PendingCandidate>,
}

impl TopologyTable {
    /// Create an empty table
    pub fn new(lifecycle: LifecycleConfig, capacity: CapacityConfig, plateau_secs: f64) -> Self {
        Self {
            lifecycle,
            capacity,
            plateau_secs,
            neighbors: BTreeMap::new(),
            routes: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// TTL of a neighbor record
    pub fn neighbor_ttl_secs(&self, source: NeighborSource) -> f64 {
        neighbor_ttl(&self.lifecycle, source)
    }

    /// TTL of a route record
    pub fn route_ttl_secs(&self, source: RouteSource) -> f64 {
        route_ttl(&self.lifecycle, source)
    }

    /// TTL of a pending candidate
    pub fn candidate_ttl_secs(&self) -> f64 {
        self.lifecycle.inferred_route_half_life_secs
    }

    // ------------------------------------------------------------------
    // Read views
    // ------------------------------------------------------------------

    /// A neighbor's stored state
    pub fn neighbor(&self, call: &Callsign) -> Option<&Lifecycle<NeighborEntry>> {
        self.neighbors.get(call)
    }

    /// A route's stored state
    pub fn route(&self, destination: &Callsign, origin: &Callsign) -> Option<&Lifecycle<RouteEntry>> {
        self.routes.get(destination).and_then(|routes| routes.get(origin))
    }

    /// A pending candidate
    pub fn candidate(&self, key: &CandidateKey) -> Option<&PendingCandidate> {
        self.pending.get(key)
    }

    /// Neighbor as seen at `now`: freshness applied, zero if tombstoned
    pub fn neighbor_view(&self, state: &Lifecycle<NeighborEntry>, now: DateTime<Utc>) -> NeighborInfo {
        let mut info = state.record().info.clone();
        info.quality = state.quality_with(|entry| {
            let ttl = self.neighbor_ttl_secs(entry.info.source_type);
            apply_freshness(entry.info.quality, freshness(now, entry.info.last_seen, ttl, self.plateau_secs))
        });
        info
    }

    /// Route as seen at `now`: freshness applied, zero if tombstoned
    pub fn route_view(&self, state: &Lifecycle<RouteEntry>, now: DateTime<Utc>) -> RouteInfo {
        let mut info = state.record().info.clone();
        info.quality = state.quality_with(|entry| {
            let ttl = self.route_ttl_secs(entry.info.source_type);
            apply_freshness(entry.info.quality, freshness(now, entry.info.last_updated, ttl, self.plateau_secs))
        });
        info
    }

    /// Live neighbors whose evidence has not expired, sorted by callsign
    pub fn current_neighbors(&self, now: DateTime<Utc>) -> Vec<NeighborInfo> {
        self.neighbors
            .values()
            .filter(|state| state.is_live())
            .map(|state| self.neighbor_view(state, now))
            .filter(|info| info.quality > 0)
            .collect()
    }

    /// Every neighbor including tombstoned ones, which read as quality 0
    pub fn all_neighbors(&self, now: DateTime<Utc>) -> Vec<NeighborInfo> {
        self.neighbors
            .values()
            .map(|state| self.neighbor_view(state, now))
            .collect()
    }

    /// Live routes to one destination whose evidence has not expired
    pub fn routes_to(&self, destination: &Callsign, now: DateTime<Utc>) -> Vec<RouteInfo> {
        self.routes
            .get(destination)
            .into_iter()
            .flat_map(|routes| routes.values())
            .filter(|state| state.is_live())
            .map(|state| self.route_view(state, now))
            .filter(|info| info.quality > 0)
            .collect()
    }

    /// All live routes, sorted by destination then origin
    pub fn current_routes(&self, now: DateTime<Utc>) -> Vec<RouteInfo> {
        self.routes
            .keys()
            .flat_map(|destination| self.routes_to(destination, now))
            .collect()
    }

    /// `(origin, quality)` of each usable route to a destination
    pub fn route_candidates(&self, destination: &Callsign, now: DateTime<Utc>) -> Vec<(Callsign, u8)> {
        self.routes_to(destination, now)
            .into_iter()
            .map(|route| (route.origin, route.quality))
            .collect()
    }

    /// Destinations with at least one route record
    pub fn destinations(&self) -> impl Iterator<Item = &Callsign> + '_ {
        self.routes.keys()
    }

    /// Whether any route record exists for a destination
    pub fn has_destination(&self, destination: &Callsign) -> bool {
        self.routes.contains_key(destination)
    }

    /// Number of neighbor records, tombstoned included
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Number of route records, tombstoned included
    pub fn route_count(&self) -> usize {
        self.routes.values().map(|routes| routes.len()).sum()
    }

    /// Number of pending candidates
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Apply a neighbor's lifecycle at `now`, returning whether it exists
    pub fn settle_neighbor(&mut self, call: &Callsign, now: DateTime<Utc>) -> bool {
        let lifecycle = &self.lifecycle;
        settle_entry(&mut self.neighbors, call, now, |entry| {
            let ttl = neighbor_ttl(lifecycle, entry.info.source_type);
            (entry.info.last_seen, ttl, lifecycle.grace_secs(ttl))
        })
    }

    /// Apply a route's lifecycle at `now`, returning whether it exists
    pub fn settle_route(&mut self, destination: &Callsign, origin: &Callsign, now: DateTime<Utc>) -> bool {
        let lifecycle = &self.lifecycle;
        let Some(routes) = self.routes.get_mut(destination) else {
            return false;
        };
        let exists = settle_entry(routes, origin, now, |entry| {
            let ttl = route_ttl(lifecycle, entry.info.source_type);
            (entry.info.last_updated, ttl, lifecycle.grace_secs(ttl))
        });
        if routes.is_empty() {
            self.routes.remove(destination);
        }
        exists
    }

    /// Remove a neighbor for modification
    pub fn take_neighbor(&mut self, call: &Callsign) -> Option<Lifecycle<NeighborEntry>> {
        self.neighbors.remove(call)
    }

    /// Store a neighbor, evicting another if at capacity
    pub fn put_neighbor(&mut self, state: Lifecycle<NeighborEntry>, now: DateTime<Utc>) {
        let call = state.record().info.call.clone();
        if !self.neighbors.contains_key(&call) && self.neighbors.len() >= self.capacity.max_neighbors.max(1) {
            self.evict_neighbor(now);
        }
        self.neighbors.insert(call, state);
    }

    /// Remove a route for modification
    pub fn take_route(&mut self, destination: &Callsign, origin: &Callsign) -> Option<Lifecycle<RouteEntry>> {
        let routes = self.routes.get_mut(destination)?;
        let state = routes.remove(origin);
        if routes.is_empty() {
            self.routes.remove(destination);
        }
        state
    }

    /// Store a route, evicting others if at capacity
    pub fn put_route(&mut self, state: Lifecycle<RouteEntry>, now: DateTime<Utc>) {
        let destination = state.record().info.destination.clone();
        let origin = state.record().info.origin.clone();

        if !self.routes.contains_key(&destination) && self.routes.len() >= self.capacity.max_destinations.max(1) {
            self.evict_destination(now);
        }

        let max_per_destination = self.capacity.max_routes_per_destination.max(1);
        let full = self
            .routes
            .get(&destination)
            .is_some_and(|routes| !routes.contains_key(&origin) && routes.len() >= max_per_destination);
        if full {
            self.evict_route(&destination, now);
        }

        self.routes.entry(destination).or_default().insert(origin, state);
    }

    /// Mutable access to a pending candidate
    pub fn candidate_mut(&mut self, key: &CandidateKey) -> Option<&mut PendingCandidate> {
        self.pending.get_mut(key)
    }

    /// Store a new pending candidate, evicting the stalest if at capacity
    pub fn put_candidate(&mut self, candidate: PendingCandidate) {
        if !self.pending.contains_key(&candidate.key) && self.pending.len() >= self.capacity.max_pending_candidates.max(1) {
            let stalest = self
                .pending
                .values()
                .min_by(|a, b| a.last_seen.cmp(&b.last_seen).then_with(|| a.key.cmp(&b.key)))
                .map(|c| c.key.clone());
            if let Some(key) = stalest {
                self.pending.remove(&key);
            }
        }
        self.pending.insert(candidate.key.clone(), candidate);
    }

    /// Remove a pending candidate
    pub fn take_candidate(&mut self, key: &CandidateKey) -> Option<PendingCandidate> {
        self.pending.remove(key)
    }

    /// Tombstone and remove expired records, drop abandoned candidates
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepCounts {
        let lifecycle = &self.lifecycle;
        let mut counts = sweep_map(&mut self.neighbors, now, |entry| {
            let ttl = neighbor_ttl(lifecycle, entry.info.source_type);
            (entry.info.last_seen, ttl, lifecycle.grace_secs(ttl))
        });

        for routes in self.routes.values_mut() {
            counts.absorb(sweep_map(routes, now, |entry| {
                let ttl = route_ttl(lifecycle, entry.info.source_type);
                (entry.info.last_updated, ttl, lifecycle.grace_secs(ttl))
            }));
        }
        self.routes.retain(|_, routes| !routes.is_empty());

        let candidate_ttl = self.candidate_ttl_secs();
        let before = self.pending.len();
        self.pending
            .retain(|_, c| secs_between(now, c.last_seen) < candidate_ttl);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(dropped, "abandoned candidates dropped");
        }

        counts
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Stored neighbor states, sorted by callsign
    pub fn neighbor_states(&self) -> Vec<Lifecycle<NeighborEntry>> {
        self.neighbors.values().cloned().collect()
    }

    /// Stored route states, sorted by destination then origin
    pub fn route_states(&self) -> Vec<Lifecycle<RouteEntry>> {
        self.routes
            .values()
            .flat_map(|routes| routes.values().cloned())
            .collect()
    }

    /// Pending candidates, sorted by key
    pub fn candidates(&self) -> Vec<PendingCandidate> {
        self.pending.values().cloned().collect()
    }

    /// Replace the table contents with persisted state
    pub fn load(
        &mut self,
        neighbors: Vec<Lifecycle<NeighborEntry>>,
        routes: Vec<Lifecycle<RouteEntry>>,
        candidates: Vec<PendingCandidate>,
        now: DateTime<Utc>,
    ) {
        self.clear();
        for state in neighbors {
            self.put_neighbor(state, now);
        }
        for state in routes {
            self.put_route(state, now);
        }
        for candidate in candidates {
            self.put_candidate(candidate);
        }
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.neighbors.clear();
        self.routes.clear();
        self.pending.clear();
    }

    // ------------------------------------------------------------------
    // Eviction: tombstoned first, then lowest quality, then oldest
    // ------------------------------------------------------------------

    fn evict_neighbor(&mut self, now: DateTime<Utc>) {
        let victim = self
            .neighbors
            .iter()
            .min_by_key(|(call, state)| {
                let view = self.neighbor_view(state, now);
                (state.is_live(), view.quality, view.last_seen, (*call).clone())
            })
            .map(|(call, _)| call.clone());
        if let Some(call) = victim {
            debug!(call = %call, "neighbor evicted at capacity");
            self.neighbors.remove(&call);
        }
    }

    fn evict_route(&mut self, destination: &Callsign, now: DateTime<Utc>) {
        let victim = self.routes.get(destination).and_then(|routes| {
            routes
                .iter()
                .min_by_key(|(origin, state)| {
                    let view = self.route_view(state, now);
                    (state.is_live(), view.quality, view.last_updated, (*origin).clone())
                })
                .map(|(origin, _)| origin.clone())
        });
        if let Some(origin) = victim {
            debug!(destination = %destination, origin = %origin, "route evicted at capacity");
            if let Some(routes) = self.routes.get_mut(destination) {
                routes.remove(&origin);
            }
        }
    }

    fn evict_destination(&mut self, now: DateTime<Utc>) {
        let victim = self
            .routes
            .iter()
            .min_by_key(|(destination, routes)| {
                let any_live = routes.values().any(|s| s.is_live());
                let best = routes
                    .values()
                    .map(|s| self.route_view(s, now).quality)
                    .max()
                    .unwrap_or(0);
                let newest = routes.values().map(|s| s.record().info.last_updated).max();
                (any_live, best, newest, (*destination).clone())
            })
            .map(|(destination, _)| destination.clone());
        if let Some(destination) = victim {
            debug!(destination = %destination, "destination evicted at capacity");
            self.routes.remove(&destination);
        }
    }
}

fn neighbor_ttl(lifecycle: &LifecycleConfig, source: NeighborSource) -> f64 {
    match source {
        NeighborSource::Classic => lifecycle.neighbor_ttl_secs,
        NeighborSource::Inferred => lifecycle.inferred_route_half_life_secs,
    }
}

fn route_ttl(lifecycle: &LifecycleConfig, source: RouteSource) -> f64 {
    match source {
        RouteSource::Broadcast => lifecycle.route_ttl_secs,
        RouteSource::Inferred => lifecycle.inferred_route_half_life_secs,
    }
}
