//! Link-quality estimation
//!
//! One [`LinkEstimator`] per directional `(from, to)` pair tracks forward
//! and reverse delivery probabilities as time-scaled EWMAs:
//!
//! ```text
//! alpha    = 1 - exp(-dt / H)
//! estimate = (1 - alpha) * estimate + alpha * evidence
//! ETX      = 1 / (max(df, floor) * max(dr, floor))
//! quality  = round(255 / ETX)
//! ```
//!
//! `dt` is the time since the link's previous observation of any kind, so
//! a burst of frames moves the estimate little and a frame after a long
//! silence moves it a lot. The forward estimate starts at a neutral cold
//! start; the reverse estimate reads as a near-perfect prior until reverse
//! evidence actually arrives.
//!
//! Each link also keeps a smoothed inter-arrival time. Links that are heard
//! rarely get a longer effective TTL, so a beacon every twenty minutes does
//! not make its link flap between live and tombstoned.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use axmesh_core::{Callsign, LinkStatRecord};

use crate::classify::ClassifiedObservation;
use crate::config::CapacityConfig;
use crate::evidence::{Evidence, EvidenceWeights, EvidenceWindow, ObservationSample};
use crate::freshness::{apply_freshness, freshness, secs_between};
use crate::lifecycle::{Lifecycle, SweepCounts, settle_entry, sweep_map};

/// Link estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkQualityConfig {
    /// EWMA time constant of the forward estimate, seconds
    /// Default: 1800
    pub forward_half_life_secs: f64,

    /// EWMA time constant of the reverse estimate, seconds
    /// Default: 1800
    pub reverse_half_life_secs: f64,

    /// Forward estimate of a link on its first observation
    /// Default: 0.5
    pub cold_start: f64,

    /// Reverse estimate of a link that has never shown reverse evidence
    /// Default: 0.99
    pub unobserved_reverse: f64,

    /// Lower bound applied to df and dr before computing ETX
    /// Default: 0.05
    pub etx_floor: f64,

    /// Upper bound on ETX
    /// Default: 20.0
    pub max_etx: f64,

    /// Smoothing factor of the inter-arrival average
    /// Default: 0.3
    pub inter_arrival_alpha: f64,

    /// Shortest effective TTL, seconds
    /// Default: 1800
    pub base_ttl_secs: f64,

    /// Effective TTL as a multiple of the average gap
    /// Default: 6.0
    pub ttl_multiplier: f64,

    /// Longest effective TTL, seconds
    /// Default: 7200
    pub max_ttl_secs: f64,

    /// Samples kept per link in the evidence window
    /// Default: 200
    pub window_capacity: usize,
}

impl Default for LinkQualityConfig {
    fn default() -> Self {
        Self {
            forward_half_life_secs: 1800.0,
            reverse_half_life_secs: 1800.0,
            cold_start: 0.5,
            unobserved_reverse: 0.99,
            etx_floor: 0.05,
            max_etx: 20.0,
            inter_arrival_alpha: 0.3,
            base_ttl_secs: 1800.0,
            ttl_multiplier: 6.0,
            max_ttl_secs: 7200.0,
            window_capacity: 200,
        }
    }
}

/// Weights of the goodness score
const GOODNESS_DF: f64 = 0.30;
const GOODNESS_DR: f64 = 0.30;
const GOODNESS_ETX: f64 = 0.30;
const GOODNESS_CLEAN: f64 = 0.10;

/// A directional link
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkKey {
    /// Transmitting station
    pub from: Callsign,
    /// Receiving station
    pub to: Callsign,
}

impl LinkKey {
    /// Create a link key
    pub fn new(from: Callsign, to: Callsign) -> Self {
        Self { from, to }
    }
}

impl std::fmt::Display for LinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

fn ewma_alpha(dt_secs: f64, half_life_secs: f64) -> f64 {
    if half_life_secs <= 0.0 {
        return 1.0;
    }
    1.0 - (-dt_secs.max(0.0) / half_life_secs).exp()
}

/// Estimator state of one directional link
#[derive(Debug, Clone)]
pub struct LinkEstimator {
    df: f64,
    /// `None` until reverse evidence arrives
    dr: Option<f64>,
    last_observed: Option<DateTime<Utc>>,
    avg_gap_secs: Option<f64>,
    duplicate_count: u64,
    observation_count: u64,
    window: EvidenceWindow,
}

impl LinkEstimator {
    /// Create an estimator that has seen nothing
    pub fn new(config: &LinkQualityConfig) -> Self {
        Self {
            df: config.cold_start,
            dr: None,
            last_observed: None,
            avg_gap_secs: None,
            duplicate_count: 0,
            observation_count: 0,
            window: EvidenceWindow::new(config.window_capacity),
        }
    }

    /// Fold one observation into the estimates
    pub fn observe(
        &mut self,
        config: &LinkQualityConfig,
        timestamp: DateTime<Utc>,
        evidence: Evidence,
        is_duplicate: bool,
    ) {
        let dt = match self.last_observed {
            Some(previous) => {
                let gap = secs_between(timestamp, previous).max(0.0);
                if gap > 0.0 {
                    let a = config.inter_arrival_alpha.clamp(0.0, 1.0);
                    self.avg_gap_secs = Some(match self.avg_gap_secs {
                        Some(avg) => a * gap + (1.0 - a) * avg,
                        None => gap,
                    });
                }
                gap
            }
            None => {
                self.df = config.cold_start;
                0.0
            }
        };

        if let Some(weight) = evidence.forward {
            let alpha = ewma_alpha(dt, config.forward_half_life_secs);
            self.df = ((1.0 - alpha) * self.df + alpha * weight).clamp(0.0, 1.0);
        }
        if let Some(weight) = evidence.reverse {
            let prior = self.dr.unwrap_or(config.unobserved_reverse);
            let alpha = ewma_alpha(dt, config.reverse_half_life_secs);
            self.dr = Some(((1.0 - alpha) * prior + alpha * weight).clamp(0.0, 1.0));
        }

        self.observation_count += 1;
        if is_duplicate {
            self.duplicate_count += 1;
        }
        self.last_observed = Some(match self.last_observed {
            Some(previous) if previous > timestamp => previous,
            _ => timestamp,
        });

        self.window.push(ObservationSample {
            timestamp,
            forward_weight: evidence.forward,
            reverse_weight: evidence.reverse,
            is_duplicate,
        });
        if let Some(last) = self.last_observed {
            let span = crate::lifecycle::secs_to_duration(self.effective_ttl_secs(config));
            self.window.advance(last - span);
        }

        trace!(
            df = self.df,
            dr = self.dr.unwrap_or(config.unobserved_reverse),
            dt_secs = dt,
            "link estimate updated"
        );
    }

    /// Forward delivery estimate
    pub fn df(&self) -> f64 {
        self.df
    }

    /// Reverse delivery estimate, the prior until reverse evidence arrives
    pub fn dr(&self, config: &LinkQualityConfig) -> f64 {
        self.dr.unwrap_or(config.unobserved_reverse)
    }

    /// Whether reverse evidence was ever seen
    pub fn reverse_observed(&self) -> bool {
        self.dr.is_some()
    }

    /// Expected transmission count, in `[1, max_etx]`
    pub fn etx(&self, config: &LinkQualityConfig) -> f64 {
        let floor = config.etx_floor.max(f64::MIN_POSITIVE);
        let df = self.df.max(floor);
        let dr = self.dr(config).max(floor);
        (1.0 / (df * dr)).clamp(1.0, config.max_etx.max(1.0))
    }

    /// Stored quality, before freshness
    pub fn raw_quality(&self, config: &LinkQualityConfig) -> u8 {
        (255.0 / self.etx(config)).round().clamp(0.0, 255.0) as u8
    }

    /// TTL adapted to how often this link is heard
    pub fn effective_ttl_secs(&self, config: &LinkQualityConfig) -> f64 {
        let adaptive = self
            .avg_gap_secs
            .map(|gap| (config.ttl_multiplier * gap).min(config.max_ttl_secs))
            .unwrap_or(0.0);
        config.base_ttl_secs.max(adaptive)
    }

    /// Time of the latest observation
    pub fn last_observed(&self) -> Option<DateTime<Utc>> {
        self.last_observed
    }

    /// Freshness at `now`
    pub fn freshness(&self, config: &LinkQualityConfig, plateau_secs: f64, now: DateTime<Utc>) -> f64 {
        match self.last_observed {
            Some(last) => freshness(now, last, self.effective_ttl_secs(config), plateau_secs),
            None => 0.0,
        }
    }

    /// Reported quality at `now`
    pub fn quality_at(&self, config: &LinkQualityConfig, plateau_secs: f64, now: DateTime<Utc>) -> u8 {
        apply_freshness(self.raw_quality(config), self.freshness(config, plateau_secs, now))
    }

    /// Ranking score at `now` in `[0, 1]`
    ///
    /// Rewards clean delivery in both directions and penalizes duplicate
    /// bursts. Never fed back into ETX.
    pub fn goodness_at(&self, config: &LinkQualityConfig, plateau_secs: f64, now: DateTime<Utc>) -> f64 {
        let score = GOODNESS_DF * self.df
            + GOODNESS_DR * self.dr(config)
            + GOODNESS_ETX * (1.0 / self.etx(config))
            + GOODNESS_CLEAN * (1.0 - self.window.duplicate_fraction());
        (score * self.freshness(config, plateau_secs, now)).clamp(0.0, 1.0)
    }

    /// Observations flagged as duplicates
    pub fn duplicate_count(&self) -> u64 {
        self.duplicate_count
    }

    /// All observations
    pub fn observation_count(&self) -> u64 {
        self.observation_count
    }

    /// Recent observations
    pub fn window(&self) -> &EvidenceWindow {
        &self.window
    }

    fn to_record(&self, key: &LinkKey, config: &LinkQualityConfig, quality: u8) -> Option<LinkStatRecord> {
        Some(LinkStatRecord {
            from_call: key.from.clone(),
            to_call: key.to.clone(),
            quality,
            last_updated: self.last_observed?,
            df_estimate: self.df,
            dr_estimate: self.dr(config),
            duplicate_count: self.duplicate_count,
            observation_count: self.observation_count,
            reverse_observed: self.dr.is_some(),
            avg_inter_arrival_secs: self.avg_gap_secs,
            tombstoned_since: None,
        })
    }

    fn from_record(record: &LinkStatRecord, config: &LinkQualityConfig) -> Self {
        // Records written without the flag: a reverse estimate that differs
        // from the prior can only have come from evidence
        let reverse_observed = record.reverse_observed
            || (record.dr_estimate - config.unobserved_reverse).abs() > f64::EPSILON;
        Self {
            df: record.df_estimate.clamp(0.0, 1.0),
            dr: reverse_observed.then(|| record.dr_estimate.clamp(0.0, 1.0)),
            last_observed: Some(record.last_updated),
            avg_gap_secs: record.avg_inter_arrival_secs.filter(|gap| gap.is_finite() && *gap > 0.0),
            duplicate_count: record.duplicate_count,
            observation_count: record.observation_count,
            window: EvidenceWindow::new(config.window_capacity),
        }
    }
}

/// All link estimators, keyed by directional link
#[derive(Debug, Clone)]
pub struct LinkQualityEstimator {
    config: LinkQualityConfig,
    weights: EvidenceWeights,
    plateau_secs: f64,
    max_links: usize,
    links: BTreeMap<LinkKey, Lifecycle<LinkEstimator>>,
}

impl LinkQualityEstimator {
    /// Create an empty estimator
    pub fn new(
        config: LinkQualityConfig,
        weights: EvidenceWeights,
        plateau_secs: f64,
        capacity: &CapacityConfig,
    ) -> Self {
        Self {
            config,
            weights,
            plateau_secs,
            max_links: capacity.max_links.max(1),
            links: BTreeMap::new(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(
            LinkQualityConfig::default(),
            EvidenceWeights::default(),
            crate::freshness::FreshnessConfig::default().plateau_secs,
            &CapacityConfig::default(),
        )
    }

    /// Estimator configuration
    pub fn config(&self) -> &LinkQualityConfig {
        &self.config
    }

    /// Write path for a classified observation
    ///
    /// Always the literal `(from, to)` direction, whatever the mode.
    pub fn apply(&mut self, observation: &ClassifiedObservation) {
        let evidence = self
            .weights
            .evidence_for(observation.class, observation.is_duplicate);
        let link = LinkKey::new(observation.from.clone(), observation.to.clone());
        self.observe(
            &link,
            observation.timestamp,
            evidence.forward,
            evidence.reverse,
            observation.is_duplicate,
        );
    }

    /// Fold evidence into one link, creating or reviving it as needed
    pub fn observe(
        &mut self,
        link: &LinkKey,
        timestamp: DateTime<Utc>,
        forward: Option<f64>,
        reverse: Option<f64>,
        is_duplicate: bool,
    ) {
        self.settle(link, timestamp);

        let state = match self.links.remove(link) {
            Some(state) => {
                if state.is_tombstoned() {
                    debug!(link = %link, "link revived");
                }
                state.into_live()
            }
            None => {
                self.make_room(timestamp);
                debug!(link = %link, "link created");
                Lifecycle::Live(LinkEstimator::new(&self.config))
            }
        };

        let mut estimator = state.into_record();
        estimator.observe(&self.config, timestamp, Evidence { forward, reverse }, is_duplicate);
        self.links.insert(link.clone(), Lifecycle::Live(estimator));
    }

    /// Reported quality of a link at `now`; 0 if unknown or tombstoned
    pub fn quality(&self, link: &LinkKey, now: DateTime<Utc>) -> u8 {
        self.links
            .get(link)
            .map(|state| state.quality_with(|e| e.quality_at(&self.config, self.plateau_secs, now)))
            .unwrap_or(0)
    }

    /// Goodness of a link at `now`; 0.0 if unknown or tombstoned
    pub fn goodness(&self, link: &LinkKey, now: DateTime<Utc>) -> f64 {
        self.links
            .get(link)
            .and_then(|state| state.live())
            .map(|e| e.goodness_at(&self.config, self.plateau_secs, now))
            .unwrap_or(0.0)
    }

    /// ETX of a live link
    pub fn etx(&self, link: &LinkKey) -> Option<f64> {
        self.links
            .get(link)
            .and_then(|state| state.live())
            .map(|e| e.etx(&self.config))
    }

    /// A link's estimator and lifecycle state
    pub fn get(&self, link: &LinkKey) -> Option<&Lifecycle<LinkEstimator>> {
        self.links.get(link)
    }

    /// Number of links, tombstoned included
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no link is known
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of live links
    pub fn live_count(&self) -> usize {
        self.links.values().filter(|s| s.is_live()).count()
    }

    /// Export every link, sorted by `(from, to)`
    pub fn export(&self, now: DateTime<Utc>) -> Vec<LinkStatRecord> {
        self.links
            .iter()
            .filter_map(|(key, state)| {
                let quality = state.quality_with(|e| e.quality_at(&self.config, self.plateau_secs, now));
                let mut record = state.record().to_record(key, &self.config, quality)?;
                record.tombstoned_since = state.tombstoned_since();
                Some(record)
            })
            .collect()
    }

    /// Replace links with imported records
    ///
    /// The stored EWMA state carries on from the record; nothing is
    /// re-seeded. Returns the number of records imported.
    pub fn import(&mut self, records: &[LinkStatRecord], local: &Callsign) -> usize {
        let mut imported = 0;
        for record in records {
            if record.from_call == *local || record.from_call == record.to_call {
                continue;
            }
            let key = LinkKey::new(record.from_call.clone(), record.to_call.clone());
            let estimator = LinkEstimator::from_record(record, &self.config);
            let state = match record.tombstoned_since {
                Some(since) => Lifecycle::Tombstoned {
                    since,
                    retained: estimator,
                },
                None => Lifecycle::Live(estimator),
            };
            if !self.links.contains_key(&key) {
                self.make_room(record.last_updated);
            }
            self.links.insert(key, state);
            imported += 1;
        }
        imported
    }

    /// TTL governing an exported record's freshness
    pub fn record_ttl_secs(&self, record: &LinkStatRecord) -> f64 {
        let adaptive = record
            .avg_inter_arrival_secs
            .map(|gap| (self.config.ttl_multiplier * gap).min(self.config.max_ttl_secs))
            .unwrap_or(0.0);
        self.config.base_ttl_secs.max(adaptive)
    }

    /// Drop every link
    pub fn clear(&mut self) {
        self.links.clear();
    }

    /// Tombstone and remove expired links
    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepCounts {
        let config = &self.config;
        sweep_map(&mut self.links, now, |e| Self::timing(config, e, now))
    }

    fn settle(&mut self, link: &LinkKey, now: DateTime<Utc>) {
        let config = &self.config;
        settle_entry(&mut self.links, link, now, |e| Self::timing(config, e, now));
    }

    /// `(last_evidence, ttl, grace)` of a link; both windows are the effective TTL
    fn timing(config: &LinkQualityConfig, estimator: &LinkEstimator, now: DateTime<Utc>) -> (DateTime<Utc>, f64, f64) {
        let ttl = estimator.effective_ttl_secs(config);
        (estimator.last_observed.unwrap_or(now), ttl, ttl)
    }

    /// Evict one link if at capacity: tombstoned first, then lowest quality, then oldest
    fn make_room(&mut self, now: DateTime<Utc>) {
        if self.links.len() < self.max_links {
            return;
        }
        let victim = self
            .links
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                let rank = |s: &Lifecycle<LinkEstimator>| {
                    (
                        s.is_live(),
                        s.quality_with(|e| e.quality_at(&self.config, self.plateau_secs, now)),
                        s.record().last_observed,
                    )
                };
                rank(a).cmp(&rank(b)).then_with(|| ka.cmp(kb))
            })
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            debug!(link = %key, "link evicted at capacity");
            self.links.remove(&key);
        }
    }
}
