//! Stress tests for axmesh-routing
//!
//! These tests push the engine past its memory bounds and through long
//! captures to check that it stays bounded and keeps its invariants.

use std::time::Instant;

use chrono::{DateTime, Duration, TimeZone, Utc};

use axmesh_core::{Callsign, FrameClass, ObservedPacket, OperatingMode, RouteInfo};
use axmesh_routing::{CapacityConfig, EngineConfig, TopologyEngine};

// Test helpers
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn station(i: usize) -> String {
    format!("K{}A{}", i % 10, i / 10)
}

fn digi(i: usize) -> String {
    format!("DIGI{}", i % 40)
}

fn small_engine() -> TopologyEngine {
    let config = EngineConfig {
        capacity: CapacityConfig {
            max_neighbors: 32,
            max_destinations: 64,
            max_routes_per_destination: 2,
            max_links: 128,
            max_pending_candidates: 16,
        },
        ..EngineConfig::default()
    };
    TopologyEngine::new(Callsign::parse("N0CALL").unwrap(), config, OperatingMode::Hybrid)
}

#[test]
fn test_bounds_hold_under_many_stations() {
    let mut engine = small_engine();

    for i in 0..5_000usize {
        let ts = t0() + Duration::seconds(i as i64 * 2);
        let from = station(i % 700);
        let packet = match i % 3 {
            0 => ObservedPacket::new(from.as_str(), "N0CALL", FrameClass::Data),
            1 => ObservedPacket::new(from.as_str(), "K9XYZ", FrameClass::Beacon),
            _ => ObservedPacket::new(from.as_str(), "K9XYZ", FrameClass::Data).with_via([digi(i)]),
        };
        engine.observe_packet(&packet, ts, false);

        let stats = engine.stats();
        assert!(stats.neighbors <= 32, "neighbors {}", stats.neighbors);
        assert!(stats.destinations <= 64, "destinations {}", stats.destinations);
        assert!(stats.routes <= 64 * 2, "routes {}", stats.routes);
        assert!(stats.links <= 128, "links {}", stats.links);
        assert!(stats.pending <= 16, "pending {}", stats.pending);
    }

    for route in engine.current_routes() {
        assert!(engine.routes_to(&route.destination).len() <= 2);
    }
}

#[test]
fn test_broadcast_flood_stays_bounded() {
    let mut engine = small_engine();
    let node = Callsign::parse("NODE1").unwrap();

    for round in 0..50i64 {
        let ts = t0() + Duration::seconds(round * 60);
        let announced: Vec<RouteInfo> = (0..200usize)
            .map(|i| {
                let destination = Callsign::parse(&station(i + round as usize * 7)).unwrap();
                RouteInfo::announced(destination, (i % 255) as u8, Vec::new(), ts)
            })
            .collect();
        engine.broadcast_routes(&node, 200, &announced, ts);
        assert!(engine.stats().destinations <= 64);
    }
}

#[test]
fn test_long_capture_throughput() {
    const PACKET_COUNT: usize = 20_000;

    let mut engine = TopologyEngine::with_defaults(Callsign::parse("N0CALL").unwrap());
    let packets: Vec<ObservedPacket> = (0..PACKET_COUNT)
        .map(|i| {
            let from = station(i % 150);
            match i % 4 {
                0 => ObservedPacket::new(from.as_str(), "N0CALL", FrameClass::Data),
                1 => ObservedPacket::new("K9XYZ", from.as_str(), FrameClass::Ack { progress: i % 8 == 1 }),
                2 => ObservedPacket::new(from.as_str(), "K9XYZ", FrameClass::Data)
                    .with_via([digi(i), "WIDE2-1".to_string()]),
                _ => ObservedPacket::new(from.as_str(), "BEACON", FrameClass::Beacon),
            }
        })
        .collect();

    let start = Instant::now();
    for (i, packet) in packets.iter().enumerate() {
        let ts = t0() + Duration::seconds(i as i64);
        engine.observe_packet(packet, ts, i % 17 == 0);
    }
    let elapsed = start.elapsed();
    println!("Observed {} packets in {:?}", PACKET_COUNT, elapsed);

    let stats = engine.stats();
    println!("Final state: {:?}", stats);
    assert!(stats.neighbors > 0);
    assert!(stats.destinations > 0);
    assert!(!engine.current_routes().is_empty());

    // Everything heard in the last minute is still fresh
    for neighbor in engine.current_neighbors() {
        assert!(neighbor.quality > 0);
    }
}

#[test]
fn test_snapshot_of_full_engine_roundtrips() {
    let mut engine = small_engine();
    for i in 0..2_000usize {
        let ts = t0() + Duration::seconds(i as i64 * 3);
        let packet = ObservedPacket::new(station(i % 90).as_str(), "K9XYZ", FrameClass::Data).with_via([digi(i)]);
        engine.observe_packet(&packet, ts, false);
    }

    let now = engine.clock().unwrap();
    let snapshot = engine.export_snapshot(None, now);
    let bytes = snapshot.to_bytes().unwrap();
    println!("Snapshot of {} records is {} bytes", snapshot.record_count(), bytes.len());

    let mut restored = small_engine();
    restored
        .restore(axmesh_routing::TopologySnapshot::from_bytes(&bytes).unwrap())
        .unwrap();
    assert_eq!(restored.current_routes(), engine.current_routes());
    assert_eq!(restored.stats(), engine.stats());
}
