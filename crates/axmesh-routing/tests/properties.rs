//! Property tests for axmesh-routing
//!
//! Bounds that must hold whatever the channel throws at the engine.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use axmesh_core::{Callsign, FrameClass, ObservedPacket, OperatingMode};
use axmesh_routing::freshness::{freshness_after, freshness_255};
use axmesh_routing::{LinkQualityConfig, TopologyEngine};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn local() -> Callsign {
    Callsign::parse("N0CALL").unwrap()
}

/// Addresses drawn from a small pool so packets collide, loop and name
/// the local station often, with some garbage mixed in
fn address() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => Just("N0CALL".to_string()),
        8 => prop::sample::select(vec!["K1ABC", "K2DEF", "W3GHI", "DIGI1", "DIGI2", "K1ABC-7"])
            .prop_map(str::to_string),
        2 => prop::sample::select(vec!["WIDE1-1", "WIDE2-2", "BEACON", "ID", "RELAY"])
            .prop_map(str::to_string),
        1 => "[A-Z0-9*-]{0,9}",
    ]
}

fn frame_class() -> impl Strategy<Value = FrameClass> {
    prop_oneof![
        Just(FrameClass::Data),
        Just(FrameClass::Beacon),
        Just(FrameClass::RoutingBroadcast),
        Just(FrameClass::Connection),
        any::<bool>().prop_map(|progress| FrameClass::Ack { progress }),
        Just(FrameClass::Unknown),
    ]
}

fn packet() -> impl Strategy<Value = ObservedPacket> {
    (address(), address(), prop::collection::vec(address(), 0..4), frame_class())
        .prop_map(|(from, to, via, class)| ObservedPacket::new(from, to, class).with_via(via))
}

fn mode() -> impl Strategy<Value = OperatingMode> {
    prop_oneof![
        Just(OperatingMode::Classic),
        Just(OperatingMode::Inference),
        Just(OperatingMode::Hybrid),
    ]
}

/// Packets with non-decreasing gaps in seconds and a duplicate flag
fn traffic() -> impl Strategy<Value = Vec<(ObservedPacket, u32, bool)>> {
    prop::collection::vec((packet(), 0u32..400, prop::bool::weighted(0.1)), 1..120)
}

proptest! {
    #[test]
    fn freshness_stays_in_unit_interval(elapsed in -1e6f64..1e7, ttl in 1.0f64..1e5, plateau in 0.0f64..1e4) {
        let f = freshness_after(elapsed, ttl, plateau);
        prop_assert!((0.0..=1.0).contains(&f));
    }

    #[test]
    fn freshness_never_increases_with_age(a in 0.0f64..1e5, b in 0.0f64..1e5, ttl in 1.0f64..1e5, plateau in 0.0f64..1e4) {
        let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(freshness_after(later, ttl, plateau) <= freshness_after(earlier, ttl, plateau) + 1e-12);
    }

    #[test]
    fn freshness_is_full_at_zero_and_empty_at_ttl(ttl in 600.0f64..1e5) {
        let now = t0();
        prop_assert_eq!(freshness_255(now, now, ttl, 300.0), 255);
        let expired = now + Duration::milliseconds((ttl * 1000.0).ceil() as i64);
        prop_assert_eq!(freshness_255(expired, now, ttl, 300.0), 0);
    }

    #[test]
    fn identity_invariants_survive_adversarial_traffic(traffic in traffic(), mode in mode()) {
        let mut engine = TopologyEngine::with_defaults(local());
        engine.set_mode(mode);

        let mut now = t0();
        for (packet, gap, duplicate) in &traffic {
            now += Duration::seconds(*gap as i64);
            let _ = engine.observe_packet(packet, now, *duplicate);
        }

        let local = local();
        for neighbor in engine.all_neighbors() {
            prop_assert_ne!(&neighbor.call, &local);
        }
        for route in engine.current_routes() {
            prop_assert_ne!(&route.destination, &local);
            prop_assert!(!route.path.contains(&local));
            prop_assert!(!route.path.contains(&route.destination));
            for (i, hop) in route.path.iter().enumerate() {
                prop_assert!(!route.path[..i].contains(hop), "loop in {:?}", route.path);
            }
        }
        for link in engine.export_link_stats() {
            prop_assert_ne!(&link.from_call, &local);
            prop_assert_ne!(&link.from_call, &link.to_call);
            prop_assert!((0.0..=1.0).contains(&link.df_estimate));
            prop_assert!((0.0..=1.0).contains(&link.dr_estimate));
        }
    }

    #[test]
    fn link_metrics_stay_bounded(traffic in traffic()) {
        let mut engine = TopologyEngine::with_defaults(local());
        let max_etx = LinkQualityConfig::default().max_etx;

        let mut now = t0();
        for (packet, gap, duplicate) in &traffic {
            now += Duration::seconds(*gap as i64);
            let _ = engine.observe_packet(packet, now, *duplicate);
        }

        for link in engine.export_link_stats() {
            if let Some(etx) = engine.link_etx(&link.from_call, &link.to_call) {
                prop_assert!((1.0..=max_etx).contains(&etx), "etx {} out of range", etx);
            }
            let goodness = engine.link_goodness(&link.from_call, &link.to_call);
            prop_assert!((0.0..=1.0).contains(&goodness));
            prop_assert!(link.duplicate_count <= link.observation_count);
        }
    }

    #[test]
    fn same_traffic_same_state(traffic in traffic()) {
        let mut a = TopologyEngine::with_defaults(local());
        let mut b = TopologyEngine::with_defaults(local());

        let mut now = t0();
        for (packet, gap, duplicate) in &traffic {
            now += Duration::seconds(*gap as i64);
            let outcome_a = a.observe_packet(packet, now, *duplicate);
            let outcome_b = b.observe_packet(packet, now, *duplicate);
            prop_assert_eq!(outcome_a, outcome_b);
        }
        prop_assert_eq!(a.export_snapshot(None, now), b.export_snapshot(None, now));
    }
}
