//! Pre-defined simulation scenarios
//!
//! Each scenario builds a mesh, generates what the monitor station hears,
//! runs it through an engine and reports how close the inferred topology
//! came to the mesh it was generated from.

use std::path::Path;

use axmesh_core::{Callsign, NeighborInfo, OperatingMode, RouteInfo};
use axmesh_logging::{StationContextGuard, StationRole, station_span};
use axmesh_routing::{EngineConfig, EngineStats, SnapshotPolicy, TopologyEngine};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::info;

use crate::error::SimResult;
use crate::host::{DEFAULT_QUEUE, spawn_engine};
use crate::persist::{PacketLog, ResumeReport, SnapshotStore, resume};
use crate::topology::{MeshBuilder, MeshShape, RadioMesh, station_call};
use crate::traffic::{ChannelStats, TrafficConfig, TrafficGenerator};

/// Knobs shared by the scenarios
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub stations: usize,
    pub shape: MeshShape,
    /// Link probability for [`MeshShape::Random`]
    pub connection_probability: f64,
    /// Decoded packets to generate
    pub packets: usize,
    pub seed: u64,
    pub mode: OperatingMode,
    /// Index of the monitor station in the mesh
    pub monitor: usize,
    /// Feed a neighbor's routing broadcast every this many packets (0 = never)
    pub broadcast_every: usize,
    pub config: EngineConfig,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            stations: 8,
            shape: MeshShape::Ring,
            connection_probability: 0.3,
            packets: 500,
            seed: 1,
            mode: OperatingMode::Hybrid,
            monitor: 0,
            broadcast_every: 100,
            config: EngineConfig::default(),
        }
    }
}

impl ScenarioOptions {
    pub fn build_mesh(&self) -> SimResult<RadioMesh> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(MeshBuilder::new(self.stations)?.build(self.shape, self.connection_probability, &mut rng))
    }

    fn generator(&self) -> SimResult<TrafficGenerator> {
        let monitor = station_call(self.monitor)?;
        let config = TrafficConfig {
            seed: self.seed,
            ..TrafficConfig::default()
        };
        TrafficGenerator::new(self.build_mesh()?, monitor, config)
    }

    fn engine(&self, monitor: &Callsign) -> TopologyEngine {
        TopologyEngine::new(monitor.clone(), self.config.clone(), self.mode)
    }
}

/// Inferred neighbors compared with the mesh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NeighborAccuracy {
    /// Stations actually in range of the monitor
    pub in_range: usize,
    /// Of those, how many the engine lists as neighbors
    pub found: usize,
    /// Neighbors the engine lists that are not in range
    pub spurious: usize,
}

impl NeighborAccuracy {
    fn measure(mesh: &RadioMesh, monitor: &Callsign, neighbors: &[NeighborInfo]) -> Self {
        let in_range = mesh.neighbors(monitor).count();
        let found = neighbors
            .iter()
            .filter(|n| mesh.are_connected(monitor, &n.call))
            .count();
        Self {
            in_range,
            found,
            spurious: neighbors.len() - found,
        }
    }
}

/// Outcome of a monitor run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub monitor: Callsign,
    pub mode: OperatingMode,
    pub mesh_stations: usize,
    pub mesh_links: usize,
    pub packets: usize,
    pub channel: ChannelStats,
    pub engine: EngineStats,
    pub accuracy: NeighborAccuracy,
    pub neighbors: Vec<NeighborInfo>,
    pub routes: Vec<RouteInfo>,
}

impl ScenarioReport {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Monitor {} ({} mode) on {} stations / {} links\n",
            self.monitor, self.mode, self.mesh_stations, self.mesh_links
        ));
        out.push_str(&format!(
            "  Heard {} packets: {} transmissions, {} lost, {} collisions, {} duplicates\n",
            self.packets,
            self.channel.transmissions,
            self.channel.lost,
            self.channel.collisions,
            self.channel.duplicates
        ));
        out.push_str(&format!(
            "  Neighbors: {}/{} in range found, {} spurious\n",
            self.accuracy.found, self.accuracy.in_range, self.accuracy.spurious
        ));
        for n in &self.neighbors {
            out.push_str(&format!("    {:<9} q={:<3} {:?}\n", n.call.to_string(), n.quality, n.source_type));
        }
        out.push_str(&format!("  Routes ({} destinations):\n", self.engine.destinations));
        for r in &self.routes {
            let path: Vec<String> = r.path.iter().map(|hop| hop.to_string()).collect();
            out.push_str(&format!(
                "    {:<9} via [{}] q={:<3} {:?}\n",
                r.destination.to_string(),
                path.join(","),
                r.quality,
                r.source_type
            ));
        }
        out
    }
}

/// Listen to a generated mesh through the async host
pub async fn run_monitor_scenario(options: &ScenarioOptions) -> SimResult<ScenarioReport> {
    let mut generator = options.generator()?;
    let monitor = generator.monitor().clone();
    info!(
        monitor = %monitor,
        stations = options.stations,
        shape = ?options.shape,
        mode = %options.mode,
        "=== Running monitor scenario ==="
    );

    let (handle, task) = spawn_engine(options.engine(&monitor), StationRole::Simulated, DEFAULT_QUEUE);
    let log = generator.generate(options.packets);

    for (i, entry) in log.iter().enumerate() {
        handle.observe(entry.clone()).await?;
        if options.broadcast_every > 0 && (i + 1) % options.broadcast_every == 0 {
            if let Some((from, routes)) = generator.broadcast(entry.timestamp) {
                let quality = (generator.mesh().delivery(&from, &monitor) * 255.0).round() as u8;
                handle.broadcast(from, quality, routes, entry.timestamp).await?;
            }
        }
    }
    handle.sweep(generator.clock()).await?;

    let neighbors = handle.neighbors().await?;
    let report = ScenarioReport {
        monitor: monitor.clone(),
        mode: options.mode,
        mesh_stations: generator.mesh().station_count(),
        mesh_links: generator.mesh().link_count(),
        packets: log.len(),
        channel: generator.stats().clone(),
        engine: handle.stats().await?,
        accuracy: NeighborAccuracy::measure(generator.mesh(), &monitor, &neighbors),
        neighbors,
        routes: handle.routes().await?,
    };
    drop(handle);
    let _ = task.await;
    Ok(report)
}

/// Outcome of the crash-and-resume run
#[derive(Debug, Clone, Serialize)]
pub struct ResumeOutcome {
    pub resume: ResumeReport,
    /// Packets the first run saw before its snapshot
    pub before_snapshot: usize,
    /// Packets logged after the snapshot
    pub after_snapshot: usize,
    /// The resumed engine agrees with one that never stopped
    pub matches_uninterrupted: bool,
}

/// Run, snapshot halfway, keep logging, then resume from `dir`
///
/// The restart happens right after the last logged packet, so the snapshot
/// is as old as the second half of the capture; `policy` must allow that.
pub async fn run_resume_scenario(
    dir: &Path,
    options: &ScenarioOptions,
    policy: &SnapshotPolicy,
) -> SimResult<ResumeOutcome> {
    let mut generator = options.generator()?;
    let monitor = generator.monitor().clone();
    let store = SnapshotStore::open(dir)?;
    let log = PacketLog::open(dir)?;
    info!(monitor = %monitor, dir = %dir.display(), "=== Running resume scenario ===");

    let first = generator.generate(options.packets / 2);
    let second = generator.generate(options.packets - first.len().min(options.packets));

    let (handle, task) = spawn_engine(options.engine(&monitor), StationRole::Live, DEFAULT_QUEUE);
    for entry in &first {
        handle.observe(entry.clone()).await?;
    }
    log.append(&first)?;
    let snapshot_time = first.last().map(|p| p.timestamp).unwrap_or(generator.clock());
    store.save(&handle.snapshot(snapshot_time).await?)?;

    // Packets keep reaching the log after the last snapshot
    for entry in &second {
        handle.observe(entry.clone()).await?;
    }
    log.append(&second)?;
    let uninterrupted_routes = handle.routes().await?;
    let uninterrupted_neighbors = handle.neighbors().await?;
    drop(handle);
    let _ = task.await;

    let now = second.last().map(|p| p.timestamp).unwrap_or(snapshot_time);
    let mut resumed = options.engine(&monitor);
    let report = {
        let _guard = StationContextGuard::new(&monitor, StationRole::Replay);
        let _span = station_span().entered();
        resume(&mut resumed, &store, &log, policy, now)?
    };

    let matches = resumed.current_routes() == uninterrupted_routes
        && resumed.current_neighbors() == uninterrupted_neighbors;
    info!(matches, replayed = report.replayed, "resume scenario complete");

    Ok(ResumeOutcome {
        resume: report,
        before_snapshot: first.len(),
        after_snapshot: second.len(),
        matches_uninterrupted: matches,
    })
}
