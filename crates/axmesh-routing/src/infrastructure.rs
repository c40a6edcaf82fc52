//! Infrastructure filter
//!
//! Some addresses on an AX.25 channel are not stations: APRS path aliases
//! (`WIDE2-2`), broadcast destinations (`CQ`, `BEACON`, `ID`), bulletin
//! groups (`BLN3`). Traffic to or through them still counts as link
//! evidence, but they never become neighbors or routes.
//!
//! Matching order: the allow-list (tactical aliases the operator wants to
//! keep) wins, then the user ignore set, then the fixed deny-list. Entries
//! in either user list match either a whole callsign (`NODE1-3`) or, when
//! given without SSID, every SSID of that base.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use axmesh_core::Callsign;

/// Base callsigns that are never stations
const DENY_EXACT: &[&str] = &["ID", "BEACON", "MAIL", "CQ", "QST", "NODES", "BBS", "ALL"];

/// Alias families; the base may carry one trailing digit (`WIDE2`, `TRACE7`)
const DENY_FAMILIES: &[&str] = &["WIDE", "TRACE", "RELAY", "ECHO", "GATE", "APRS"];

/// Bulletin prefix; the base may carry one trailing character (`BLN1`, `BLNA`)
const DENY_BULLETIN: &str = "BLN";

/// User-tunable parts of the filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureConfig {
    /// Addresses treated as infrastructure in addition to the fixed list
    pub ignore: BTreeSet<String>,
    /// Addresses never treated as infrastructure
    ///
    /// Tactical aliases are local to each network, so none ship built in;
    /// operators list the ones their nodes answer to.
    pub allow: BTreeSet<String>,
}

/// Decides whether an address is infrastructure
#[derive(Debug, Clone, Default)]
pub struct InfrastructureFilter {
    ignore: BTreeSet<String>,
    allow: BTreeSet<String>,
}

impl InfrastructureFilter {
    /// Build a filter from configuration, normalizing entries to upper case
    pub fn new(config: &InfrastructureConfig) -> Self {
        let normalize = |set: &BTreeSet<String>| {
            set.iter()
                .map(|entry| entry.trim().to_ascii_uppercase())
                .filter(|entry| !entry.is_empty())
                .collect()
        };
        Self {
            ignore: normalize(&config.ignore),
            allow: normalize(&config.allow),
        }
    }

    /// Whether `call` is infrastructure
    pub fn is_infrastructure(&self, call: &Callsign) -> bool {
        if Self::listed(&self.allow, call) {
            return false;
        }
        if Self::listed(&self.ignore, call) {
            return true;
        }
        is_fixed_infrastructure(call.base())
    }

    fn listed(set: &BTreeSet<String>, call: &Callsign) -> bool {
        if set.is_empty() {
            return false;
        }
        set.contains(&call.to_string()) || set.contains(call.base())
    }
}

/// Whether a base callsign is on the fixed deny-list
pub fn is_fixed_infrastructure(base: &str) -> bool {
    if DENY_EXACT.contains(&base) {
        return true;
    }

    let family_match = DENY_FAMILIES.iter().any(|family| match base.strip_prefix(family) {
        Some(rest) => rest.is_empty() || (rest.len() == 1 && rest.chars().all(|c| c.is_ascii_digit())),
        None => false,
    });
    if family_match {
        return true;
    }

    match base.strip_prefix(DENY_BULLETIN) {
        Some(rest) => rest.len() <= 1,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    #[test]
    fn test_fixed_list() {
        let filter = InfrastructureFilter::default();
        for addr in [
            "ID", "BEACON", "MAIL", "CQ", "QST", "NODES", "BBS", "ALL", "WIDE1-1", "WIDE2-2",
            "WIDE", "TRACE3-3", "RELAY", "ECHO", "GATE", "APRS", "BLN", "BLN1", "BLNA",
        ] {
            assert!(filter.is_infrastructure(&call(addr)), "{} should be infrastructure", addr);
        }
    }

    #[test]
    fn test_real_stations_pass() {
        let filter = InfrastructureFilter::default();
        for addr in ["K1ABC", "N0CALL-7", "WIDEAB", "IDAHO", "CQ1ABC", "ALLEN", "APRSXY", "BLN1AB"] {
            assert!(!filter.is_infrastructure(&call(addr)), "{} should be a station", addr);
        }
    }

    #[test]
    fn test_ssid_ignored_for_fixed_list() {
        let filter = InfrastructureFilter::default();
        assert!(filter.is_infrastructure(&call("BEACON-5")));
        assert!(filter.is_infrastructure(&call("ID-15")));
    }

    #[test]
    fn test_ignore_set() {
        let config = InfrastructureConfig {
            ignore: ["node1-3".to_string(), "GW".to_string()].into_iter().collect(),
            allow: BTreeSet::new(),
        };
        let filter = InfrastructureFilter::new(&config);
        assert!(filter.is_infrastructure(&call("NODE1-3")));
        assert!(!filter.is_infrastructure(&call("NODE1-4")));
        assert!(filter.is_infrastructure(&call("GW-9")));
    }

    #[test]
    fn test_allow_list_wins() {
        let config = InfrastructureConfig {
            ignore: ["RELAY".to_string()].into_iter().collect(),
            allow: ["RELAY".to_string(), "ECHO-1".to_string()].into_iter().collect(),
        };
        let filter = InfrastructureFilter::new(&config);
        assert!(!filter.is_infrastructure(&call("RELAY")));
        assert!(!filter.is_infrastructure(&call("ECHO-1")));
        assert!(filter.is_infrastructure(&call("ECHO-2")));
    }
}
