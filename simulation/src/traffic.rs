//! Seeded traffic generator
//!
//! Plays a shared 1200 baud channel over a [`RadioMesh`] and records what a
//! passive monitor station would hear. Every station except the monitor
//! transmits beacons, direct frames to a neighbor, and frames digipeated
//! along the shortest path to a distant station. The monitor decodes a
//! transmission when the transmitter is in range, the link delivers it, and
//! it did not start while the channel was still busy. Repeats of a frame it
//! already decoded are flagged as duplicates.

use axmesh_core::{Callsign, FrameClass, ObservedPacket, PacketId, RouteInfo};
use axmesh_routing::LoggedPacket;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::topology::RadioMesh;

/// Traffic mix and channel parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// RNG seed; the same seed over the same mesh gives the same capture
    pub seed: u64,
    /// Time of the first transmission
    pub start: DateTime<Utc>,
    /// Mean gap between transmissions, seconds (exponential)
    pub mean_gap_secs: f64,
    /// Share of transmissions that are beacons
    pub beacon_ratio: f64,
    /// Share of non-beacon frames sent digipeated to a distant station
    pub digipeat_ratio: f64,
    /// Share of non-beacon frames addressed to the monitor
    pub to_monitor_ratio: f64,
    /// Share of direct frames that are acknowledgements
    pub ack_ratio: f64,
    /// Channel bit rate
    pub baud: u32,
    /// Transmitter keying time, milliseconds
    pub tx_delay_ms: i64,
    /// Typical frame length on air, bytes
    pub frame_bytes: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            start: Utc
                .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            mean_gap_secs: 20.0,
            beacon_ratio: 0.2,
            digipeat_ratio: 0.4,
            to_monitor_ratio: 0.1,
            ack_ratio: 0.25,
            baud: 1200,
            tx_delay_ms: 100,
            frame_bytes: 80,
        }
    }
}

impl TrafficConfig {
    /// Time one frame occupies the channel
    pub fn frame_duration(&self) -> Duration {
        let bits = (self.frame_bytes * 8) as i64;
        let on_air_ms = bits * 1000 / i64::from(self.baud.max(1));
        Duration::milliseconds(on_air_ms + self.tx_delay_ms)
    }
}

/// Channel counters since the generator started
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Frames put on air, digipeater repeats included
    pub transmissions: u64,
    /// Transmissions the monitor decoded
    pub heard: u64,
    /// In-range transmissions the monitor failed to decode
    pub lost: u64,
    /// Transmissions that started while the channel was busy
    pub collisions: u64,
    /// Decoded repeats of a frame already heard
    pub duplicates: u64,
}

/// Generates the capture log a monitor station would record
pub struct TrafficGenerator {
    mesh: RadioMesh,
    monitor: Callsign,
    senders: Vec<Callsign>,
    config: TrafficConfig,
    rng: StdRng,
    clock: DateTime<Utc>,
    busy_until: DateTime<Utc>,
    next_id: PacketId,
    stats: ChannelStats,
}

impl TrafficGenerator {
    /// Generator for `monitor`, which must be a station of `mesh`
    pub fn new(mesh: RadioMesh, monitor: Callsign, config: TrafficConfig) -> SimResult<Self> {
        if !mesh.contains(&monitor) {
            return Err(SimError::UnknownStation(monitor.to_string()));
        }
        let senders = mesh.stations().filter(|s| **s != monitor).cloned().collect();
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            clock: config.start,
            busy_until: config.start,
            next_id: PacketId(1),
            stats: ChannelStats::default(),
            mesh,
            monitor,
            senders,
            config,
        })
    }

    pub fn mesh(&self) -> &RadioMesh {
        &self.mesh
    }

    pub fn monitor(&self) -> &Callsign {
        &self.monitor
    }

    /// Time of the latest transmission
    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// At least `count` decoded packets, or fewer if the monitor hears
    /// almost nothing
    pub fn generate(&mut self, count: usize) -> Vec<LoggedPacket> {
        let mut heard = Vec::with_capacity(count);
        let max_transmissions = count.saturating_mul(50).max(100);
        let mut attempts = 0;
        while heard.len() < count && attempts < max_transmissions {
            heard.extend(self.transmit());
            attempts += 1;
        }
        debug!(
            monitor = %self.monitor,
            heard = heard.len(),
            transmissions = self.stats.transmissions,
            collisions = self.stats.collisions,
            "traffic generated"
        );
        heard
    }

    /// One frame and its digipeater repeats, as decoded by the monitor
    pub fn transmit(&mut self) -> Vec<LoggedPacket> {
        let Some(sender) = self.senders.choose(&mut self.rng).cloned() else {
            return Vec::new();
        };

        let gap = -self.config.mean_gap_secs * (1.0 - self.rng.random::<f64>()).ln();
        self.clock += Duration::milliseconds(((gap * 1000.0).round() as i64).max(1));

        let (packet, transmitters) = self.compose(&sender);
        let duration = self.config.frame_duration();
        let mut start = self.clock;
        let mut decoded = Vec::new();

        for (i, transmitter) in transmitters.iter().enumerate() {
            // Digipeaters wait for a clear channel; the originator does not
            if i > 0 {
                start = start.max(self.busy_until);
            }
            let collided = start < self.busy_until;
            self.busy_until = start + duration;
            self.stats.transmissions += 1;
            if collided {
                self.stats.collisions += 1;
            }

            let in_range = self.mesh.are_connected(transmitter, &self.monitor);
            if !in_range {
                continue;
            }
            let delivered = self.rng.random::<f64>() < self.mesh.delivery(transmitter, &self.monitor);
            if collided || !delivered {
                self.stats.lost += 1;
                continue;
            }

            let is_duplicate = !decoded.is_empty();
            self.stats.heard += 1;
            if is_duplicate {
                self.stats.duplicates += 1;
            }
            trace!(id = %self.next_id, via = %transmitter, packet = %packet, is_duplicate, "decoded");
            decoded.push(LoggedPacket {
                id: self.next_id,
                timestamp: start,
                packet: packet.clone(),
                is_duplicate,
            });
            self.next_id = self.next_id.next();
        }

        self.clock = self.clock.max(start);
        decoded
    }

    /// Route table a random neighbor of the monitor would broadcast at `at`
    pub fn broadcast(&mut self, at: DateTime<Utc>) -> Option<(Callsign, Vec<RouteInfo>)> {
        let neighbors: Vec<&Callsign> = self.mesh.neighbors(&self.monitor).collect();
        let node = (*neighbors.choose(&mut self.rng)?).clone();
        let routes = self
            .mesh
            .announcements(&node, at)
            .into_iter()
            .filter(|route| route.destination != self.monitor && !route.path.contains(&self.monitor))
            .collect();
        Some((node, routes))
    }

    /// Pick a frame for `sender` and the stations that put it on air
    fn compose(&mut self, sender: &Callsign) -> (ObservedPacket, Vec<Callsign>) {
        let from = sender.to_string();

        if self.rng.random::<f64>() >= self.config.beacon_ratio {
            if self.rng.random::<f64>() < self.config.to_monitor_ratio
                && self.mesh.are_connected(sender, &self.monitor)
            {
                let packet = ObservedPacket::new(from, self.monitor.to_string(), FrameClass::Data);
                return (packet, vec![sender.clone()]);
            }

            if self.rng.random::<f64>() < self.config.digipeat_ratio {
                if let Some(path) = self.distant_path(sender) {
                    let hops = &path[1..path.len() - 1];
                    let packet = ObservedPacket::new(from, path[path.len() - 1].to_string(), FrameClass::Data)
                        .with_via(hops.iter().map(|hop| hop.to_string()));
                    return (packet, path[..path.len() - 1].to_vec());
                }
            }

            let peers: Vec<&Callsign> = self
                .mesh
                .neighbors(sender)
                .filter(|n| **n != self.monitor)
                .collect();
            if let Some(peer) = peers.choose(&mut self.rng) {
                let class = if self.rng.random::<f64>() < self.config.ack_ratio {
                    FrameClass::Ack {
                        progress: self.rng.random_bool(0.5),
                    }
                } else {
                    FrameClass::Data
                };
                let packet = ObservedPacket::new(from, peer.to_string(), class);
                return (packet, vec![sender.clone()]);
            }
        }

        let packet = if self.rng.random_bool(0.5) {
            ObservedPacket::new(from, "BEACON", FrameClass::Beacon).with_via(["WIDE2-1"])
        } else {
            ObservedPacket::new(from, "ID", FrameClass::Beacon)
        };
        (packet, vec![sender.clone()])
    }

    /// Path to a random station two or more hops away, not relayed by the monitor
    fn distant_path(&mut self, sender: &Callsign) -> Option<Vec<Callsign>> {
        let candidates: Vec<Vec<Callsign>> = self
            .senders
            .iter()
            .filter(|dest| *dest != sender)
            .filter_map(|dest| self.mesh.shortest_path_avoiding(sender, dest, Some(&self.monitor)))
            .filter(|path| path.len() >= 3)
            .collect();
        candidates.choose(&mut self.rng).cloned()
    }
}
