//! Freshness: how much a record's last evidence is still worth
//!
//! Freshness is a pure function of elapsed time, a TTL and a plateau:
//!
//! - Up to the plateau it falls linearly from 1.0 to [`PLATEAU_FLOOR`]
//! - Between the plateau and the TTL it follows a smoothstep from the
//!   floor down to 0.0
//! - At or past the TTL it is 0.0
//!
//! The curve is continuous, monotonically non-increasing and bounded to
//! `[0, 1]`. Stored qualities are never decayed in place; freshness is
//! applied whenever a quality is read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use axmesh_core::{LinkStatRecord, NeighborInfo, RouteInfo};

/// Freshness at the end of the plateau
pub const PLATEAU_FLOOR: f64 = 0.95;

/// Freshness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// Length of the gentle initial decline, seconds
    /// Default: 300
    pub plateau_secs: f64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            plateau_secs: 300.0,
        }
    }
}

/// Seconds from `earlier` to `later`, negative if `later` is before `earlier`
pub fn secs_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// Freshness in `[0, 1]` of evidence last seen at `last_seen`
pub fn freshness(now: DateTime<Utc>, last_seen: DateTime<Utc>, ttl_secs: f64, plateau_secs: f64) -> f64 {
    freshness_after(secs_between(now, last_seen), ttl_secs, plateau_secs)
}

/// Freshness after `elapsed_secs` of silence
pub fn freshness_after(elapsed_secs: f64, ttl_secs: f64, plateau_secs: f64) -> f64 {
    if elapsed_secs.is_nan() || elapsed_secs <= 0.0 {
        return 1.0;
    }
    if elapsed_secs >= ttl_secs {
        return 0.0;
    }

    let plateau = plateau_secs.max(0.0);
    if elapsed_secs <= plateau {
        return 1.0 - (1.0 - PLATEAU_FLOOR) * (elapsed_secs / plateau);
    }

    let u = ((elapsed_secs - plateau) / (ttl_secs - plateau)).clamp(0.0, 1.0);
    let smooth = u * u * (3.0 - 2.0 * u);
    (PLATEAU_FLOOR * (1.0 - smooth)).clamp(0.0, 1.0)
}

/// Freshness scaled to 0..=255
pub fn freshness_255(now: DateTime<Utc>, last_seen: DateTime<Utc>, ttl_secs: f64, plateau_secs: f64) -> u8 {
    (freshness(now, last_seen, ttl_secs, plateau_secs) * 255.0).round() as u8
}

/// Scale a stored quality by a freshness factor
pub fn apply_freshness(quality: u8, freshness: f64) -> u8 {
    (quality as f64 * freshness.clamp(0.0, 1.0)).round() as u8
}

/// Freshness as a whole percentage
pub fn freshness_percent(freshness: f64) -> u8 {
    (freshness.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Coarse freshness band for display, taken on the rounded percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FreshnessStatus {
    /// 90% and above
    Fresh,
    /// 50% to 89%
    Recent,
    /// 1% to 49%
    Stale,
    /// 0%
    Expired,
}

impl FreshnessStatus {
    /// Band a freshness value
    pub fn from_freshness(freshness: f64) -> Self {
        match freshness_percent(freshness) {
            90..=u8::MAX => Self::Fresh,
            50..=89 => Self::Recent,
            1..=49 => Self::Stale,
            0 => Self::Expired,
        }
    }
}

impl std::fmt::Display for FreshnessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Recent => write!(f, "recent"),
            Self::Stale => write!(f, "stale"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Freshness rendered as a percentage, e.g. `"87%"`
pub fn freshness_display(freshness: f64) -> String {
    format!("{}%", freshness_percent(freshness))
}

/// A record whose evidence decays with time
pub trait Decaying {
    /// When the last reinforcing evidence arrived
    fn last_evidence(&self) -> DateTime<Utc>;

    /// Freshness of this record at `now`
    fn freshness(&self, now: DateTime<Utc>, ttl_secs: f64, plateau_secs: f64) -> f64 {
        freshness(now, self.last_evidence(), ttl_secs, plateau_secs)
    }

    /// Freshness of this record at `now`, scaled to 0..=255
    fn freshness_255(&self, now: DateTime<Utc>, ttl_secs: f64, plateau_secs: f64) -> u8 {
        freshness_255(now, self.last_evidence(), ttl_secs, plateau_secs)
    }

    /// Display band at `now`
    fn freshness_status(&self, now: DateTime<Utc>, ttl_secs: f64, plateau_secs: f64) -> FreshnessStatus {
        FreshnessStatus::from_freshness(self.freshness(now, ttl_secs, plateau_secs))
    }

    /// Percentage text at `now`
    fn freshness_display(&self, now: DateTime<Utc>, ttl_secs: f64, plateau_secs: f64) -> String {
        freshness_display(self.freshness(now, ttl_secs, plateau_secs))
    }
}

impl Decaying for NeighborInfo {
    fn last_evidence(&self) -> DateTime<Utc> {
        self.last_seen
    }
}

impl Decaying for RouteInfo {
    fn last_evidence(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

impl Decaying for LinkStatRecord {
    fn last_evidence(&self) -> DateTime<Utc> {
        self.last_updated
    }
}
