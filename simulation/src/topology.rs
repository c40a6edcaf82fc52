//! Radio mesh topologies for the traffic generator
//!
//! A [`RadioMesh`] is the ground truth the engine tries to infer: which
//! stations can hear each other, and how reliably. Builders cover the
//! usual shapes:
//! - Ring: each station hears its two neighbors
//! - Line: a chain of digipeaters
//! - Star: one hilltop digipeater heard by everyone
//! - Full: every station hears every other
//! - Random: configurable hearing probability
//! - Custom: built from an edge list

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use axmesh_core::{Callsign, RouteInfo};
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::{SimError, SimResult};

/// Delivery probability used by the deterministic builders
pub const DEFAULT_DELIVERY: f64 = 0.9;

/// Largest mesh the builders name stations for
pub const MAX_STATIONS: usize = 100;

/// Callsign for the i-th generated station
pub fn station_call(index: usize) -> SimResult<Callsign> {
    if index >= MAX_STATIONS {
        return Err(SimError::UnknownStation(format!("station #{}", index)));
    }
    Ok(Callsign::parse(&format!("K{}SIM", index))?)
}

/// Stations and the RF links between them
///
/// Links are symmetric; each carries the probability that a frame sent
/// over it is decoded by the far end.
#[derive(Debug, Clone, Default)]
pub struct RadioMesh {
    adjacency: BTreeMap<Callsign, BTreeSet<Callsign>>,
    delivery: BTreeMap<(Callsign, Callsign), f64>,
}

fn link_key(a: &Callsign, b: &Callsign) -> (Callsign, Callsign) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl RadioMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a station with no links
    pub fn add_station(&mut self, call: Callsign) {
        self.adjacency.entry(call).or_default();
    }

    /// Link two stations; relinking updates the delivery probability
    pub fn connect(&mut self, a: &Callsign, b: &Callsign, delivery: f64) {
        if a == b {
            return;
        }
        self.adjacency.entry(a.clone()).or_default().insert(b.clone());
        self.adjacency.entry(b.clone()).or_default().insert(a.clone());
        self.delivery.insert(link_key(a, b), delivery.clamp(0.0, 1.0));
    }

    pub fn contains(&self, call: &Callsign) -> bool {
        self.adjacency.contains_key(call)
    }

    /// Stations within RF range of `call`
    pub fn neighbors(&self, call: &Callsign) -> impl Iterator<Item = &Callsign> + '_ {
        self.adjacency.get(call).into_iter().flatten()
    }

    pub fn are_connected(&self, a: &Callsign, b: &Callsign) -> bool {
        self.adjacency.get(a).is_some_and(|n| n.contains(b))
    }

    /// Delivery probability between two stations, 0 when out of range
    pub fn delivery(&self, a: &Callsign, b: &Callsign) -> f64 {
        self.delivery.get(&link_key(a, b)).copied().unwrap_or(0.0)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Callsign> + '_ {
        self.adjacency.keys()
    }

    pub fn station_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn link_count(&self) -> usize {
        self.delivery.len()
    }

    /// Fewest-hop path from `from` to `to`, both ends included
    ///
    /// Ties go to the lexicographically smallest path so runs repeat.
    pub fn shortest_path(&self, from: &Callsign, to: &Callsign) -> Option<Vec<Callsign>> {
        self.shortest_path_avoiding(from, to, None)
    }

    /// Fewest-hop path that never relays through `avoid`
    pub fn shortest_path_avoiding(
        &self,
        from: &Callsign,
        to: &Callsign,
        avoid: Option<&Callsign>,
    ) -> Option<Vec<Callsign>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        let mut previous: BTreeMap<Callsign, Callsign> = BTreeMap::new();
        let mut seen: BTreeSet<Callsign> = BTreeSet::from([from.clone()]);
        let mut queue = VecDeque::from([from.clone()]);

        while let Some(current) = queue.pop_front() {
            if current == *to {
                let mut path = vec![current];
                while let Some(prev) = path.last().and_then(|hop| previous.get(hop)) {
                    path.push(prev.clone());
                }
                path.reverse();
                return Some(path);
            }
            for next in self.neighbors(&current) {
                if Some(next) == avoid && next != to {
                    continue;
                }
                if seen.insert(next.clone()) {
                    previous.insert(next.clone(), current.clone());
                    queue.push_back(next.clone());
                }
            }
        }
        None
    }

    /// Route table `node` would announce in a routing broadcast
    ///
    /// One entry per station reachable from `node`. Quality is the end-to-end delivery
    /// probability scaled to 0..=255; paths exclude `node` and the
    /// destination.
    pub fn announcements(&self, node: &Callsign, timestamp: DateTime<Utc>) -> Vec<RouteInfo> {
        self.stations()
            .filter(|dest| *dest != node)
            .filter_map(|dest| {
                let path = self.shortest_path(node, dest)?;
                let delivery: f64 = path
                    .windows(2)
                    .map(|hop| self.delivery(&hop[0], &hop[1]))
                    .product();
                let quality = (delivery * 255.0).round().clamp(0.0, 255.0) as u8;
                let hops = path[1..path.len() - 1].to_vec();
                Some(RouteInfo::announced(dest.clone(), quality, hops, timestamp))
            })
            .collect()
    }

    /// Print a simple ASCII view of the mesh
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Radio Mesh:\n");
        output.push_str(&format!("  Stations: {}\n", self.station_count()));
        output.push_str(&format!("  Links: {}\n\n", self.link_count()));

        for (call, neighbors) in &self.adjacency {
            let heard: Vec<String> = neighbors
                .iter()
                .map(|n| format!("{} ({:.0}%)", n, self.delivery(call, n) * 100.0))
                .collect();
            output.push_str(&format!("  {} -> [{}]\n", call, heard.join(", ")));
        }
        output
    }
}

/// Shape of a generated mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshShape {
    Ring,
    Line,
    Star,
    Full,
    Random,
}

impl std::str::FromStr for MeshShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ring" => Ok(Self::Ring),
            "line" => Ok(Self::Line),
            "star" => Ok(Self::Star),
            "full" => Ok(Self::Full),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown topology: {}", other)),
        }
    }
}

/// Builder for generated meshes named `K0SIM`, `K1SIM`, ...
pub struct MeshBuilder {
    stations: Vec<Callsign>,
    delivery: f64,
}

impl MeshBuilder {
    /// Builder for `count` stations (at most [`MAX_STATIONS`])
    pub fn new(count: usize) -> SimResult<Self> {
        let stations = (0..count).map(station_call).collect::<SimResult<Vec<_>>>()?;
        Ok(Self {
            stations,
            delivery: DEFAULT_DELIVERY,
        })
    }

    /// Delivery probability for every link the builder creates
    pub fn with_delivery(mut self, delivery: f64) -> Self {
        self.delivery = delivery;
        self
    }

    fn empty(&self) -> RadioMesh {
        let mut mesh = RadioMesh::new();
        for call in &self.stations {
            mesh.add_station(call.clone());
        }
        mesh
    }

    pub fn build(self, shape: MeshShape, connection_probability: f64, rng: &mut impl Rng) -> RadioMesh {
        match shape {
            MeshShape::Ring => self.ring(),
            MeshShape::Line => self.line(),
            MeshShape::Star => self.star(),
            MeshShape::Full => self.full(),
            MeshShape::Random => self.random(connection_probability, rng),
        }
    }

    /// K0SIM - K1SIM - ... - K0SIM
    pub fn ring(self) -> RadioMesh {
        let mut mesh = self.empty();
        let n = self.stations.len();
        if n < 2 {
            return mesh;
        }
        for i in 0..n {
            mesh.connect(&self.stations[i], &self.stations[(i + 1) % n], self.delivery);
        }
        mesh
    }

    /// K0SIM - K1SIM - K2SIM - ...
    pub fn line(self) -> RadioMesh {
        let mut mesh = self.empty();
        for pair in self.stations.windows(2) {
            mesh.connect(&pair[0], &pair[1], self.delivery);
        }
        mesh
    }

    /// K0SIM in the center, heard by all others
    pub fn star(self) -> RadioMesh {
        let mut mesh = self.empty();
        if let Some((center, rest)) = self.stations.split_first() {
            for call in rest {
                mesh.connect(center, call, self.delivery);
            }
        }
        mesh
    }

    pub fn full(self) -> RadioMesh {
        let mut mesh = self.empty();
        for (i, a) in self.stations.iter().enumerate() {
            for b in &self.stations[i + 1..] {
                mesh.connect(a, b, self.delivery);
            }
        }
        mesh
    }

    /// Each pair linked with the given probability, delivery drawn from 0.5..1.0
    ///
    /// Isolated stations are linked to a random other station so every
    /// station is heard by someone.
    pub fn random(self, connection_probability: f64, rng: &mut impl Rng) -> RadioMesh {
        let mut mesh = self.empty();
        let n = self.stations.len();

        for i in 0..n {
            for j in (i + 1)..n {
                if rng.random::<f64>() < connection_probability {
                    let delivery = rng.random_range(0.5..1.0);
                    mesh.connect(&self.stations[i], &self.stations[j], delivery);
                }
            }
        }

        if n > 1 {
            for i in 0..n {
                if mesh.neighbors(&self.stations[i]).next().is_none() {
                    let other = (i + rng.random_range(1..n)) % n;
                    let delivery = rng.random_range(0.5..1.0);
                    mesh.connect(&self.stations[i], &self.stations[other], delivery);
                }
            }
        }
        mesh
    }
}

/// Build a mesh from `(a, b, delivery)` edges
pub fn from_edges(edges: &[(&str, &str, f64)]) -> SimResult<RadioMesh> {
    let mut mesh = RadioMesh::new();
    for (a, b, delivery) in edges {
        mesh.connect(&Callsign::parse(a)?, &Callsign::parse(b)?, *delivery);
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    #[test]
    fn test_ring_topology() {
        let mesh = MeshBuilder::new(4).unwrap().ring();
        assert_eq!(mesh.station_count(), 4);
        assert_eq!(mesh.link_count(), 4);
        assert!(mesh.are_connected(&call("K0SIM"), &call("K1SIM")));
        assert!(mesh.are_connected(&call("K3SIM"), &call("K0SIM")));
        assert!(!mesh.are_connected(&call("K0SIM"), &call("K2SIM")));
    }

    #[test]
    fn test_star_and_full() {
        let star = MeshBuilder::new(5).unwrap().star();
        assert_eq!(star.link_count(), 4);
        assert_eq!(star.neighbors(&call("K0SIM")).count(), 4);

        let full = MeshBuilder::new(5).unwrap().full();
        assert_eq!(full.link_count(), 10);
    }

    #[test]
    fn test_too_many_stations() {
        assert!(MeshBuilder::new(MAX_STATIONS + 1).is_err());
    }

    #[test]
    fn test_random_mesh_has_no_isolated_stations() {
        let mut rng = StdRng::seed_from_u64(7);
        let mesh = MeshBuilder::new(20).unwrap().random(0.05, &mut rng);
        for station in mesh.stations() {
            assert!(mesh.neighbors(station).next().is_some(), "{} isolated", station);
        }
    }

    #[test]
    fn test_shortest_path() {
        let mesh = MeshBuilder::new(5).unwrap().line();
        let path = mesh.shortest_path(&call("K0SIM"), &call("K3SIM")).unwrap();
        assert_eq!(path, vec![call("K0SIM"), call("K1SIM"), call("K2SIM"), call("K3SIM")]);
        assert_eq!(mesh.shortest_path(&call("K0SIM"), &call("K0SIM")).unwrap().len(), 1);
        assert!(mesh.shortest_path(&call("K0SIM"), &call("W9NOT")).is_none());

        let ring = MeshBuilder::new(6).unwrap().ring();
        let around = ring
            .shortest_path_avoiding(&call("K0SIM"), &call("K2SIM"), Some(&call("K1SIM")))
            .unwrap();
        assert_eq!(around.len(), 5);
        assert!(!around.contains(&call("K1SIM")));
    }

    #[test]
    fn test_announcements() {
        let mesh = from_edges(&[("DIGI", "K1ABC", 0.5), ("K1ABC", "K2DEF", 1.0)]).unwrap();
        let now = Utc::now();
        let routes = mesh.announcements(&call("DIGI"), now);
        assert_eq!(routes.len(), 2);

        let far = routes.iter().find(|r| r.destination == call("K2DEF")).unwrap();
        assert_eq!(far.path, vec![call("K1ABC")]);
        assert_eq!(far.quality, 128);

        let near = routes.iter().find(|r| r.destination == call("K1ABC")).unwrap();
        assert!(near.path.is_empty());
    }
}
