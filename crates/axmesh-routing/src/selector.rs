//! Sticky route selection
//!
//! Keeps one preferred origin per destination and only switches when a
//! challenger is clearly better for long enough to matter:
//!
//! - The challenger's quality must reach `incumbent × (1 + margin)`
//! - At least `hold` seconds must have passed since the last switch
//! - Ties always favor the incumbent
//!
//! When the incumbent disappears (tombstoned, removed or decayed to zero)
//! the best remaining route is adopted at once. Qualities passed in are
//! expected to be freshness-adjusted already.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use axmesh_core::Callsign;

use crate::freshness::secs_between;

/// Selector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Fraction by which a challenger must beat the incumbent; 0 disables
    /// Default: 0.12
    pub hysteresis_margin: f64,

    /// Minimum time between switches for one destination, seconds
    /// Default: 120
    pub hysteresis_hold_secs: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            hysteresis_margin: 0.12,
            hysteresis_hold_secs: 120.0,
        }
    }
}

/// The preferred route to one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    /// Destination
    pub destination: Callsign,
    /// Preferred first hop
    pub origin: Callsign,
    /// When this origin became preferred
    pub switched_at: DateTime<Utc>,
}

/// What a selection pass decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// No usable route and no previous preference
    None,
    /// The incumbent stays
    Kept(Callsign),
    /// No incumbent (or it vanished); the best route was adopted
    Adopted(Callsign),
    /// A challenger cleared the margin and the hold time
    Switched {
        /// Previous origin
        from: Callsign,
        /// New origin
        to: Callsign,
    },
    /// The last usable route went away
    Cleared,
}

impl Selection {
    /// The origin preferred after this pass
    pub fn origin(&self) -> Option<&Callsign> {
        match self {
            Self::Kept(origin) | Self::Adopted(origin) => Some(origin),
            Self::Switched { to, .. } => Some(to),
            Self::None | Self::Cleared => None,
        }
    }
}

/// Per-destination sticky preference
#[derive(Debug, Clone, Default)]
pub struct RouteSelector {
    config: SelectorConfig,
    preferred: BTreeMap<Callsign, Preference>,
}

impl RouteSelector {
    /// Create a selector with no preferences
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            preferred: BTreeMap::new(),
        }
    }

    /// Current preference for a destination
    pub fn preferred(&self, destination: &Callsign) -> Option<&Preference> {
        self.preferred.get(destination)
    }

    /// All preferences, sorted by destination
    pub fn preferences(&self) -> impl Iterator<Item = &Preference> + '_ {
        self.preferred.values()
    }

    /// Re-evaluate one destination against its usable routes
    ///
    /// `candidates` are `(origin, quality)` pairs with quality already
    /// freshness-adjusted; zero-quality entries are ignored.
    pub fn select(
        &mut self,
        destination: &Callsign,
        candidates: &[(Callsign, u8)],
        now: DateTime<Utc>,
    ) -> Selection {
        let usable: Vec<&(Callsign, u8)> = candidates.iter().filter(|(_, q)| *q > 0).collect();
        let incumbent = self.preferred.get(destination).and_then(|pref| {
            usable
                .iter()
                .find(|(origin, _)| *origin == pref.origin)
                .map(|(origin, quality)| (origin.clone(), *quality, pref.switched_at))
        });

        // Best challenger: highest quality, incumbent first on ties, then callsign order
        let best = usable
            .iter()
            .max_by(|(oa, qa), (ob, qb)| {
                let a_inc = incumbent.as_ref().is_some_and(|(o, _, _)| o == oa);
                let b_inc = incumbent.as_ref().is_some_and(|(o, _, _)| o == ob);
                qa.cmp(qb)
                    .then(a_inc.cmp(&b_inc))
                    .then_with(|| ob.cmp(oa))
            })
            .map(|(origin, quality)| (origin.clone(), *quality));

        let Some((best_origin, best_quality)) = best else {
            return if self.preferred.remove(destination).is_some() {
                debug!(destination = %destination, "preferred route cleared");
                Selection::Cleared
            } else {
                Selection::None
            };
        };

        let Some((incumbent_origin, incumbent_quality, switched_at)) = incumbent else {
            self.preferred.insert(
                destination.clone(),
                Preference {
                    destination: destination.clone(),
                    origin: best_origin.clone(),
                    switched_at: now,
                },
            );
            debug!(
                destination = %destination,
                origin = %best_origin,
                quality = best_quality,
                "preferred route adopted"
            );
            return Selection::Adopted(best_origin);
        };

        if best_origin == incumbent_origin {
            return Selection::Kept(incumbent_origin);
        }

        let threshold = incumbent_quality as f64 * (1.0 + self.config.hysteresis_margin);
        let margin_cleared = best_quality as f64 >= threshold && best_quality > incumbent_quality;
        let hold_elapsed = secs_between(now, switched_at) >= self.config.hysteresis_hold_secs;

        if margin_cleared && hold_elapsed {
            self.preferred.insert(
                destination.clone(),
                Preference {
                    destination: destination.clone(),
                    origin: best_origin.clone(),
                    switched_at: now,
                },
            );
            debug!(
                destination = %destination,
                from = %incumbent_origin,
                to = %best_origin,
                incumbent_quality,
                challenger_quality = best_quality,
                "preferred route switched"
            );
            Selection::Switched {
                from: incumbent_origin,
                to: best_origin,
            }
        } else {
            Selection::Kept(incumbent_origin)
        }
    }

    /// Drop preferences for destinations that no longer exist
    pub fn retain(&mut self, mut keep: impl FnMut(&Callsign) -> bool) {
        self.preferred.retain(|destination, _| keep(destination));
    }

    /// Replace all preferences
    pub fn load(&mut self, preferences: Vec<Preference>) {
        self.preferred = preferences
            .into_iter()
            .map(|pref| (pref.destination.clone(), pref))
            .collect();
    }

    /// Drop all preferences
    pub fn clear(&mut self) {
        self.preferred.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    fn pair(origin: &str, quality: u8) -> (Callsign, u8) {
        (call(origin), quality)
    }

    #[test]
    fn test_adopts_best_immediately() {
        let mut selector = RouteSelector::new(SelectorConfig::default());
        let dest = call("K9XYZ");
        let selection = selector.select(&dest, &[pair("D1", 100), pair("D2", 150)], t0());
        assert_eq!(selection, Selection::Adopted(call("D2")));
        assert_eq!(selector.preferred(&dest).unwrap().switched_at, t0());
    }

    #[test]
    fn test_small_improvement_does_not_switch() {
        let mut selector = RouteSelector::new(SelectorConfig::default());
        let dest = call("K9XYZ");
        selector.select(&dest, &[pair("A1", 200)], t0());
        // 210 < 200 x 1.12 = 224
        let selection = selector.select(&dest, &[pair("A1", 200), pair("B1", 210)], at(600));
        assert_eq!(selection, Selection::Kept(call("A1")));
    }

    #[test]
    fn test_large_improvement_waits_for_hold() {
        let mut selector = RouteSelector::new(SelectorConfig::default());
        let dest = call("K9XYZ");
        selector.select(&dest, &[pair("A1", 200)], t0());

        let early = selector.select(&dest, &[pair("A1", 200), pair("B1", 230)], at(60));
        assert_eq!(early, Selection::Kept(call("A1")));

        let later = selector.select(&dest, &[pair("A1", 200), pair("B1", 230)], at(120));
        assert_eq!(
            later,
            Selection::Switched {
                from: call("A1"),
                to: call("B1")
            }
        );
        assert_eq!(selector.preferred(&dest).unwrap().switched_at, at(120));
    }

    #[test]
    fn test_ties_favor_incumbent() {
        let config = SelectorConfig {
            hysteresis_margin: 0.0,
            hysteresis_hold_secs: 0.0,
        };
        let mut selector = RouteSelector::new(config);
        let dest = call("K9XYZ");
        selector.select(&dest, &[pair("B1", 100)], t0());
        let selection = selector.select(&dest, &[pair("A1", 100), pair("B1", 100)], at(10));
        assert_eq!(selection, Selection::Kept(call("B1")));

        // With the margin disabled any strict improvement switches
        let selection = selector.select(&dest, &[pair("A1", 101), pair("B1", 100)], at(20));
        assert_eq!(selection.origin(), Some(&call("A1")));
    }

    #[test]
    fn test_missing_incumbent_adopts_without_hold() {
        let mut selector = RouteSelector::new(SelectorConfig::default());
        let dest = call("K9XYZ");
        selector.select(&dest, &[pair("A1", 200), pair("B1", 100)], t0());
        let selection = selector.select(&dest, &[pair("A1", 0), pair("B1", 100)], at(1));
        assert_eq!(selection, Selection::Adopted(call("B1")));
    }

    #[test]
    fn test_cleared_when_no_routes() {
        let mut selector = RouteSelector::new(SelectorConfig::default());
        let dest = call("K9XYZ");
        assert_eq!(selector.select(&dest, &[], t0()), Selection::None);
        selector.select(&dest, &[pair("A1", 50)], t0());
        assert_eq!(selector.select(&dest, &[], at(5)), Selection::Cleared);
        assert!(selector.preferred(&dest).is_none());
    }

    #[test]
    fn test_retain_and_load() {
        let mut selector = RouteSelector::new(SelectorConfig::default());
        selector.select(&call("D1"), &[pair("A1", 50)], t0());
        selector.select(&call("D2"), &[pair("A1", 50)], t0());
        selector.retain(|d| d.base() == "D1");
        assert_eq!(selector.preferences().count(), 1);

        let saved: Vec<Preference> = selector.preferences().cloned().collect();
        let mut restored = RouteSelector::new(SelectorConfig::default());
        restored.load(saved);
        assert_eq!(restored.preferred(&call("D1")).unwrap().origin, call("A1"));
    }
}
