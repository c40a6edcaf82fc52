//! Record lifecycle: live, tombstoned, removed
//!
//! A record whose evidence has run out is not deleted straight away. It is
//! tombstoned for a grace window, during which it reads as zero quality
//! but keeps its last state, so a station that comes back on the air
//! resumes where it left off. Past the grace window it is removed.
//!
//! Transition times are derived from evidence timestamps, not from when a
//! sweep happens to run: a record tombstones at `last_evidence + ttl` and
//! is removed at `tombstoned_since + grace`. Sweeping late therefore gives
//! the same table as sweeping on time.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::freshness::secs_between;

/// Lifecycle timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// TTL of neighbors heard directly, seconds
    /// Default: 1800
    pub neighbor_ttl_secs: f64,

    /// TTL of announced routes, seconds
    /// Default: 1800
    pub route_ttl_secs: f64,

    /// TTL of inferred neighbors and routes, seconds
    /// Default: 1800
    pub inferred_route_half_life_secs: f64,

    /// Grace window as a multiple of the record's TTL
    /// Default: 2.0
    pub tombstone_window_multiplier: f64,

    /// Packet-time interval between automatic sweeps, seconds
    /// Default: 30
    pub sweep_interval_secs: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            neighbor_ttl_secs: 1800.0,
            route_ttl_secs: 1800.0,
            inferred_route_half_life_secs: 1800.0,
            tombstone_window_multiplier: 2.0,
            sweep_interval_secs: 30.0,
        }
    }
}

impl LifecycleConfig {
    /// Grace window for a record with the given TTL
    pub fn grace_secs(&self, ttl_secs: f64) -> f64 {
        ttl_secs * self.tombstone_window_multiplier.max(0.0)
    }
}

/// A record that can be tombstoned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lifecycle<T> {
    /// Contributing to queries
    Live(T),
    /// Expired; reads as zero quality until revived or removed
    Tombstoned {
        /// When the record stopped contributing
        since: DateTime<Utc>,
        /// State kept for revival
        retained: T,
    },
}

impl<T> Lifecycle<T> {
    /// Whether the record is live
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// Whether the record is tombstoned
    pub fn is_tombstoned(&self) -> bool {
        matches!(self, Self::Tombstoned { .. })
    }

    /// The record if live
    pub fn live(&self) -> Option<&T> {
        match self {
            Self::Live(record) => Some(record),
            Self::Tombstoned { .. } => None,
        }
    }

    /// The record regardless of state
    pub fn record(&self) -> &T {
        match self {
            Self::Live(record) => record,
            Self::Tombstoned { retained, .. } => retained,
        }
    }

    /// Mutable access to the record regardless of state
    pub fn record_mut(&mut self) -> &mut T {
        match self {
            Self::Live(record) => record,
            Self::Tombstoned { retained, .. } => retained,
        }
    }

    /// When the record was tombstoned
    pub fn tombstoned_since(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Live(_) => None,
            Self::Tombstoned { since, .. } => Some(*since),
        }
    }

    /// Quality through the lifecycle: zero while tombstoned
    pub fn quality_with(&self, quality: impl FnOnce(&T) -> u8) -> u8 {
        match self {
            Self::Live(record) => quality(record),
            Self::Tombstoned { .. } => 0,
        }
    }

    /// Tombstone a live record; a tombstoned record keeps its original time
    pub fn into_tombstoned(self, since: DateTime<Utc>) -> Self {
        match self {
            Self::Live(retained) => Self::Tombstoned { since, retained },
            tombstoned => tombstoned,
        }
    }

    /// Bring the record back to life with its retained state
    pub fn into_live(self) -> Self {
        Self::Live(self.into_record())
    }

    /// Consume and return the record
    pub fn into_record(self) -> T {
        match self {
            Self::Live(record) => record,
            Self::Tombstoned { retained, .. } => retained,
        }
    }
}

/// What should happen to a record at a given time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Nothing changes
    Keep,
    /// The record expired at the given time
    Tombstone(DateTime<Utc>),
    /// The grace window has passed
    Remove,
}

/// Decide the transition for one record
///
/// A live record whose TTL ran out long enough ago to also exhaust its
/// grace window is removed directly.
pub fn transition_at<T>(
    state: &Lifecycle<T>,
    last_evidence: DateTime<Utc>,
    ttl_secs: f64,
    grace_secs: f64,
    now: DateTime<Utc>,
) -> Transition {
    match state {
        Lifecycle::Live(_) => {
            if secs_between(now, last_evidence) < ttl_secs {
                return Transition::Keep;
            }
            let since = last_evidence + secs_to_duration(ttl_secs);
            if secs_between(now, since) >= grace_secs {
                Transition::Remove
            } else {
                Transition::Tombstone(since)
            }
        }
        Lifecycle::Tombstoned { since, .. } => {
            if secs_between(now, *since) >= grace_secs {
                Transition::Remove
            } else {
                Transition::Keep
            }
        }
    }
}

/// Counts of what a sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepCounts {
    /// Records newly tombstoned
    pub tombstoned: usize,
    /// Records removed
    pub removed: usize,
}

impl SweepCounts {
    /// Fold another set of counts into this one
    pub fn absorb(&mut self, other: SweepCounts) {
        self.tombstoned += other.tombstoned;
        self.removed += other.removed;
    }

    /// Whether the sweep changed anything
    pub fn is_empty(&self) -> bool {
        self.tombstoned == 0 && self.removed == 0
    }
}

/// Apply lifecycle transitions to every record in a map
///
/// `timing` returns `(last_evidence, ttl_secs, grace_secs)` for a record.
pub fn sweep_map<K, T>(
    map: &mut BTreeMap<K, Lifecycle<T>>,
    now: DateTime<Utc>,
    timing: impl Fn(&T) -> (DateTime<Utc>, f64, f64),
) -> SweepCounts
where
    K: Ord + Clone,
{
    let mut counts = SweepCounts::default();
    let decisions: Vec<(K, Transition)> = map
        .iter()
        .filter_map(|(key, state)| {
            let (last, ttl, grace) = timing(state.record());
            match transition_at(state, last, ttl, grace, now) {
                Transition::Keep => None,
                transition => Some((key.clone(), transition)),
            }
        })
        .collect();

    for (key, transition) in decisions {
        match transition {
            Transition::Keep => {}
            Transition::Tombstone(since) => {
                if let Some(state) = map.remove(&key) {
                    map.insert(key, state.into_tombstoned(since));
                    counts.tombstoned += 1;
                }
            }
            Transition::Remove => {
                if map.remove(&key).is_some() {
                    counts.removed += 1;
                }
            }
        }
    }
    counts
}

/// Settle one record's lifecycle at `now`, returning whether it still exists
pub fn settle_entry<K, T>(
    map: &mut BTreeMap<K, Lifecycle<T>>,
    key: &K,
    now: DateTime<Utc>,
    timing: impl Fn(&T) -> (DateTime<Utc>, f64, f64),
) -> bool
where
    K: Ord + Clone,
{
    let transition = match map.get(key) {
        None => return false,
        Some(state) => {
            let (last, ttl, grace) = timing(state.record());
            transition_at(state, last, ttl, grace, now)
        }
    };

    match transition {
        Transition::Keep => true,
        Transition::Tombstone(since) => {
            if let Some(state) = map.remove(key) {
                map.insert(key.clone(), state.into_tombstoned(since));
            }
            true
        }
        Transition::Remove => {
            map.remove(key);
            false
        }
    }
}

/// Longest duration the engine will ever add to a timestamp
const MAX_SPAN_MILLIS: f64 = 100.0 * 365.0 * 86_400_000.0;

/// Convert fractional seconds to a chrono duration, capped at a century
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::zero();
    }
    Duration::milliseconds((secs * 1000.0).min(MAX_SPAN_MILLIS) as i64)
}
