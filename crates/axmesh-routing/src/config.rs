//! Engine configuration
//!
//! [`EngineConfig`] groups the per-component configurations. Every field
//! has a documented default; [`EngineConfig::validate`] reports settings
//! that are legal but probably wrong, and [`EngineConfig::config_hash`]
//! fingerprints the whole thing so a persisted snapshot is only reused
//! under the configuration that produced it.

use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceWeights;
use crate::freshness::FreshnessConfig;
use crate::inference::InferenceConfig;
use crate::infrastructure::InfrastructureConfig;
use crate::lifecycle::LifecycleConfig;
use crate::link_quality::LinkQualityConfig;
use crate::selector::SelectorConfig;

/// Memory bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Maximum neighbor records, tombstoned included
    /// Default: 512
    pub max_neighbors: usize,

    /// Maximum destinations with route records
    /// Default: 1024
    pub max_destinations: usize,

    /// Maximum routes kept per destination
    /// Default: 4
    pub max_routes_per_destination: usize,

    /// Maximum link estimators
    /// Default: 2048
    pub max_links: usize,

    /// Maximum inferred records waiting for enough observations
    /// Default: 512
    pub max_pending_candidates: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            max_neighbors: 512,
            max_destinations: 1024,
            max_routes_per_destination: 4,
            max_links: 2048,
            max_pending_candidates: 512,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Link estimator
    pub link: LinkQualityConfig,
    /// Evidence weight per frame class
    pub evidence: EvidenceWeights,
    /// Freshness curve
    pub freshness: FreshnessConfig,
    /// Topology inference
    pub inference: InferenceConfig,
    /// Route selection hysteresis
    pub selector: SelectorConfig,
    /// TTLs and tombstones
    pub lifecycle: LifecycleConfig,
    /// Memory bounds
    pub capacity: CapacityConfig,
    /// Infrastructure filter lists
    pub infrastructure: InfrastructureConfig,
}

impl EngineConfig {
    /// Preset for a quiet channel where stations are heard rarely
    ///
    /// Longer memories and a wider plateau so an hourly beacon keeps its
    /// station on the map.
    pub fn quiet_channel() -> Self {
        Self {
            link: LinkQualityConfig {
                forward_half_life_secs: 3600.0,
                reverse_half_life_secs: 3600.0,
                base_ttl_secs: 3600.0,
                max_ttl_secs: 14400.0,
                ..LinkQualityConfig::default()
            },
            freshness: FreshnessConfig {
                plateau_secs: 600.0,
            },
            lifecycle: LifecycleConfig {
                neighbor_ttl_secs: 3600.0,
                route_ttl_secs: 3600.0,
                inferred_route_half_life_secs: 3600.0,
                ..LifecycleConfig::default()
            },
            ..Self::default()
        }
    }

    /// Preset for a busy channel with many stations and frequent retries
    ///
    /// Faster estimates, stricter inference and a wider switching margin.
    pub fn busy_channel() -> Self {
        Self {
            link: LinkQualityConfig {
                forward_half_life_secs: 900.0,
                reverse_half_life_secs: 900.0,
                base_ttl_secs: 900.0,
                max_ttl_secs: 3600.0,
                ..LinkQualityConfig::default()
            },
            freshness: FreshnessConfig {
                plateau_secs: 120.0,
            },
            inference: InferenceConfig {
                evidence_window_secs: 10.0,
                min_inferred_observations: 3,
                ..InferenceConfig::default()
            },
            selector: SelectorConfig {
                hysteresis_margin: 0.15,
                ..SelectorConfig::default()
            },
            lifecycle: LifecycleConfig {
                neighbor_ttl_secs: 900.0,
                route_ttl_secs: 900.0,
                inferred_route_half_life_secs: 900.0,
                ..LifecycleConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate the configuration, returning any warnings
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let link = &self.link;

        if link.forward_half_life_secs <= 0.0 || link.reverse_half_life_secs <= 0.0 {
            warnings.push(ConfigWarning::NonPositiveHalfLife);
        }
        if !(0.0..=1.0).contains(&link.cold_start) || !(0.0..=1.0).contains(&link.unobserved_reverse) {
            warnings.push(ConfigWarning::PriorOutOfRange);
        }
        if link.etx_floor <= 0.0 || link.etx_floor > 1.0 {
            warnings.push(ConfigWarning::EtxFloorOutOfRange);
        }
        if link.max_etx < 1.0 {
            warnings.push(ConfigWarning::MaxEtxBelowOne);
        }
        if link.max_ttl_secs < link.base_ttl_secs {
            warnings.push(ConfigWarning::MaxTtlBelowBaseTtl);
        }
        if link.window_capacity == 0 {
            warnings.push(ConfigWarning::ZeroWindowCapacity);
        }

        if self.evidence.all().iter().any(|w| !(0.0..=1.0).contains(w)) {
            warnings.push(ConfigWarning::WeightOutOfRange);
        }

        // The smoothstep region collapses when a TTL does not exceed the plateau
        let plateau = self.freshness.plateau_secs;
        let lifecycle = &self.lifecycle;
        if [
            link.base_ttl_secs,
            lifecycle.neighbor_ttl_secs,
            lifecycle.route_ttl_secs,
            lifecycle.inferred_route_half_life_secs,
        ]
        .iter()
        .any(|ttl| *ttl <= plateau)
        {
            warnings.push(ConfigWarning::TtlNotAbovePlateau);
        }

        if self.inference.min_inferred_observations == 0 {
            warnings.push(ConfigWarning::ZeroMinObservations);
        }
        if self.selector.hysteresis_margin < 0.0 {
            warnings.push(ConfigWarning::NegativeHysteresisMargin);
        }

        let capacity = &self.capacity;
        if [
            capacity.max_neighbors,
            capacity.max_destinations,
            capacity.max_routes_per_destination,
            capacity.max_links,
            capacity.max_pending_candidates,
        ]
        .contains(&0)
        {
            warnings.push(ConfigWarning::ZeroCapacity);
        }

        warnings
    }

    /// Check if configuration is valid (no warnings)
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Fingerprint of the configuration: blake3 over its postcard encoding
    pub fn config_hash(&self) -> String {
        let bytes = match postcard::to_allocvec(self) {
            Ok(bytes) => bytes,
            Err(_) => format!("{:?}", self).into_bytes(),
        };
        hex::encode(blake3::hash(&bytes).as_bytes())
    }
}

/// Configuration warnings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// An EWMA time constant is zero or negative
    NonPositiveHalfLife,
    /// Cold start or reverse prior outside `[0, 1]`
    PriorOutOfRange,
    /// ETX floor outside `(0, 1]`
    EtxFloorOutOfRange,
    /// ETX ceiling below 1
    MaxEtxBelowOne,
    /// Adaptive TTL ceiling below its floor
    MaxTtlBelowBaseTtl,
    /// Evidence window cannot hold anything
    ZeroWindowCapacity,
    /// An evidence weight outside `[0, 1]`
    WeightOutOfRange,
    /// A TTL does not exceed the freshness plateau
    TtlNotAbovePlateau,
    /// Inferred records would be created without any observation
    ZeroMinObservations,
    /// Negative hysteresis margin makes routes flap
    NegativeHysteresisMargin,
    /// A capacity bound is zero
    ZeroCapacity,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::NonPositiveHalfLife => write!(f, "EWMA half-life must be positive"),
            ConfigWarning::PriorOutOfRange => {
                write!(f, "cold_start and unobserved_reverse must lie in [0, 1]")
            }
            ConfigWarning::EtxFloorOutOfRange => write!(f, "etx_floor must lie in (0, 1]"),
            ConfigWarning::MaxEtxBelowOne => write!(f, "max_etx is below 1.0"),
            ConfigWarning::MaxTtlBelowBaseTtl => write!(f, "max_ttl_secs is below base_ttl_secs"),
            ConfigWarning::ZeroWindowCapacity => write!(f, "window_capacity is zero"),
            ConfigWarning::WeightOutOfRange => write!(f, "evidence weights must lie in [0, 1]"),
            ConfigWarning::TtlNotAbovePlateau => {
                write!(f, "a TTL is not longer than the freshness plateau")
            }
            ConfigWarning::ZeroMinObservations => write!(f, "min_inferred_observations is zero"),
            ConfigWarning::NegativeHysteresisMargin => write!(f, "hysteresis_margin is negative"),
            ConfigWarning::ZeroCapacity => write!(f, "a capacity bound is zero"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EngineConfig::default();
        assert!(config.is_valid(), "{:?}", config.validate());
    }

    #[test]
    fn test_presets_valid() {
        assert!(EngineConfig::quiet_channel().is_valid());
        assert!(EngineConfig::busy_channel().is_valid());
    }

    #[test]
    fn test_documented_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.link.cold_start, 0.5);
        assert_eq!(config.link.unobserved_reverse, 0.99);
        assert_eq!(config.link.max_etx, 20.0);
        assert_eq!(config.freshness.plateau_secs, 300.0);
        assert_eq!(config.inference.evidence_window_secs, 5.0);
        assert_eq!(config.inference.min_inferred_observations, 2);
        assert_eq!(config.selector.hysteresis_margin, 0.12);
        assert_eq!(config.selector.hysteresis_hold_secs, 120.0);
        assert_eq!(config.lifecycle.tombstone_window_multiplier, 2.0);
        assert_eq!(config.capacity.max_routes_per_destination, 4);
    }

    #[test]
    fn test_invalid_settings_warn() {
        let mut config = EngineConfig::default();
        config.link.max_ttl_secs = 10.0;
        config.freshness.plateau_secs = 5000.0;
        config.selector.hysteresis_margin = -0.1;
        config.capacity.max_links = 0;
        config.evidence.data = 1.5;

        let warnings = config.validate();
        assert!(warnings.contains(&ConfigWarning::MaxTtlBelowBaseTtl));
        assert!(warnings.contains(&ConfigWarning::TtlNotAbovePlateau));
        assert!(warnings.contains(&ConfigWarning::NegativeHysteresisMargin));
        assert!(warnings.contains(&ConfigWarning::ZeroCapacity));
        assert!(warnings.contains(&ConfigWarning::WeightOutOfRange));
    }

    #[test]
    fn test_config_hash_tracks_changes() {
        let a = EngineConfig::default();
        let b = EngineConfig::default();
        assert_eq!(a.config_hash(), b.config_hash());
        assert_eq!(a.config_hash().len(), 64);

        let mut c = EngineConfig::default();
        c.infrastructure.ignore.insert("NODE1".to_string());
        assert_ne!(a.config_hash(), c.config_hash());
        assert_ne!(a.config_hash(), EngineConfig::busy_channel().config_hash());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = EngineConfig::busy_channel();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.config_hash(), config.config_hash());
    }
}
