//! Normalization and guardrails
//!
//! Turns an [`ObservedPacket`] into a [`ClassifiedObservation`] that both
//! write paths consume, or rejects it. A rejected packet leaves the engine
//! untouched: no link evidence, no topology.

use chrono::{DateTime, Utc};

use axmesh_core::{Callsign, FrameClass, ObservedPacket, RejectReason, TrafficKind};

use crate::infrastructure::InfrastructureFilter;

/// A packet that passed the guardrails, with normalized addresses
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedObservation {
    /// When the packet was heard
    pub timestamp: DateTime<Utc>,
    /// Source
    pub from: Callsign,
    /// Destination
    pub to: Callsign,
    /// Via path with consecutive repeats collapsed
    pub via: Vec<Callsign>,
    /// Frame classification
    pub class: FrameClass,
    /// Duplicate or retry of an earlier frame
    pub is_duplicate: bool,
    /// Relation to the local station
    pub kind: TrafficKind,
}

impl ClassifiedObservation {
    /// First via hop, if the packet was digipeated
    pub fn first_hop(&self) -> Option<&Callsign> {
        self.via.first()
    }
}

fn parse(raw: &str) -> Result<Callsign, RejectReason> {
    Callsign::parse(raw).map_err(|_| RejectReason::InvalidCallsign(raw.to_string()))
}

/// Collapse consecutive repeats (`A,A,B` becomes `A,B`)
pub fn collapse_path(path: Vec<Callsign>) -> Vec<Callsign> {
    let mut collapsed: Vec<Callsign> = Vec::with_capacity(path.len());
    for hop in path {
        if collapsed.last() != Some(&hop) {
            collapsed.push(hop);
        }
    }
    collapsed
}

/// First hop that appears twice in a path
pub fn find_loop(path: &[Callsign]) -> Option<&Callsign> {
    path.iter()
        .enumerate()
        .find(|&(i, hop)| path[..i].contains(hop))
        .map(|(_, hop)| hop)
}

/// Normalize a packet and apply the guardrails
pub fn classify(
    packet: &ObservedPacket,
    timestamp: DateTime<Utc>,
    is_duplicate: bool,
    local: &Callsign,
) -> Result<ClassifiedObservation, RejectReason> {
    let from = parse(&packet.from)?;
    let to = parse(&packet.to)?;
    let via = packet
        .via
        .iter()
        .map(|raw| parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    if from == *local {
        return Err(RejectReason::FromLocal);
    }
    if from == to {
        return Err(RejectReason::SelfLoop);
    }
    if via.contains(local) {
        return Err(RejectReason::LocalInPath);
    }

    let via = collapse_path(via);
    if via.contains(&from) {
        return Err(RejectReason::SourceInPath);
    }
    if let Some(hop) = find_loop(&via) {
        return Err(RejectReason::PathLoop(hop.clone()));
    }

    let kind = if !via.is_empty() {
        TrafficKind::Digipeated
    } else if to == *local {
        TrafficKind::Direct
    } else {
        TrafficKind::ThirdParty
    };

    Ok(ClassifiedObservation {
        timestamp,
        from,
        to,
        via,
        class: packet.class,
        is_duplicate,
        kind,
    })
}

/// Whether an announced path is usable: no local hop, no loop, not via
/// infrastructure
pub fn path_is_clean(path: &[Callsign], local: &Callsign, filter: &InfrastructureFilter) -> bool {
    !path.contains(local) && find_loop(path).is_none() && !path.iter().any(|hop| filter.is_infrastructure(hop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn local() -> Callsign {
        Callsign::parse("N0CALL").unwrap()
    }

    fn run(packet: ObservedPacket) -> Result<ClassifiedObservation, RejectReason> {
        classify(&packet, t0(), false, &local())
    }

    #[test]
    fn test_kinds() {
        let direct = run(ObservedPacket::new("K1ABC", "n0call", FrameClass::Data)).unwrap();
        assert_eq!(direct.kind, TrafficKind::Direct);

        let heard = run(ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data)).unwrap();
        assert_eq!(heard.kind, TrafficKind::ThirdParty);

        let digi = run(ObservedPacket::new("K1ABC", "N0CALL", FrameClass::Data).with_via(["DIGI1*"]))
            .unwrap();
        assert_eq!(digi.kind, TrafficKind::Digipeated);
        assert_eq!(digi.first_hop().map(|c| c.to_string()), Some("DIGI1".to_string()));
    }

    #[test]
    fn test_guardrails() {
        assert!(matches!(
            run(ObservedPacket::new("BAD CALL", "K2DEF", FrameClass::Data)),
            Err(RejectReason::InvalidCallsign(_))
        ));
        assert!(matches!(
            run(ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data).with_via(["", "X"])),
            Err(RejectReason::InvalidCallsign(_))
        ));
        assert_eq!(
            run(ObservedPacket::new("N0CALL", "K2DEF", FrameClass::Data)),
            Err(RejectReason::FromLocal)
        );
        assert_eq!(
            run(ObservedPacket::new("K1ABC", "k1abc-0", FrameClass::Data)),
            Err(RejectReason::SelfLoop)
        );
        assert_eq!(
            run(ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data).with_via(["DIGI1", "N0CALL*"])),
            Err(RejectReason::LocalInPath)
        );
        assert_eq!(
            run(ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data).with_via(["DIGI1", "K1ABC"])),
            Err(RejectReason::SourceInPath)
        );
        let looped = run(
            ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data).with_via(["D1", "D2", "D1"]),
        );
        assert_eq!(
            looped,
            Err(RejectReason::PathLoop(Callsign::parse("D1").unwrap()))
        );
    }

    #[test]
    fn test_consecutive_repeats_are_not_loops() {
        let obs = run(
            ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data).with_via(["D1", "D1*", "D2", "D2"]),
        )
        .unwrap();
        let hops: Vec<String> = obs.via.iter().map(|c| c.to_string()).collect();
        assert_eq!(hops, vec!["D1", "D2"]);
    }

    #[test]
    fn test_path_is_clean() {
        let filter = InfrastructureFilter::default();
        let hops = |list: &[&str]| -> Vec<Callsign> {
            list.iter().map(|s| Callsign::parse(s).unwrap()).collect()
        };
        assert!(path_is_clean(&hops(&["D1", "D2"]), &local(), &filter));
        assert!(!path_is_clean(&hops(&["D1", "N0CALL"]), &local(), &filter));
        assert!(!path_is_clean(&hops(&["D1", "D2", "D1"]), &local(), &filter));
        assert!(!path_is_clean(&hops(&["WIDE2-1"]), &local(), &filter));
    }
}
