//! Async host for a topology engine
//!
//! The engine is single-writer and synchronous. A host that receives
//! packets from several tasks (a KISS reader, a timer, a query API) puts
//! it behind one actor task: commands arrive over an mpsc channel and
//! queries answer over a oneshot.

use axmesh_core::{
    Callsign, LinkStatRecord, NeighborInfo, ObservationOutcome, OperatingMode, PacketId, RouteInfo,
};
use axmesh_logging::{StationContextGuard, StationRole, station_span};
use axmesh_routing::{
    BroadcastSummary, EngineStats, LoggedPacket, SweepReport, TopologyEngine, TopologySnapshot,
};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info};

use crate::error::{SimError, SimResult};

/// Default command queue depth
pub const DEFAULT_QUEUE: usize = 256;

/// Requests the engine task serves
#[derive(Debug)]
pub enum EngineCommand {
    Observe {
        packet: LoggedPacket,
        reply: oneshot::Sender<ObservationOutcome>,
    },
    Broadcast {
        from: Callsign,
        quality: u8,
        routes: Vec<RouteInfo>,
        timestamp: DateTime<Utc>,
        reply: oneshot::Sender<BroadcastSummary>,
    },
    SetMode(OperatingMode),
    Sweep {
        now: DateTime<Utc>,
        reply: oneshot::Sender<SweepReport>,
    },
    Neighbors {
        reply: oneshot::Sender<Vec<NeighborInfo>>,
    },
    Routes {
        reply: oneshot::Sender<Vec<RouteInfo>>,
    },
    PreferredRoute {
        destination: Callsign,
        reply: oneshot::Sender<Option<RouteInfo>>,
    },
    LinkStats {
        reply: oneshot::Sender<Vec<LinkStatRecord>>,
    },
    Snapshot {
        now: DateTime<Utc>,
        reply: oneshot::Sender<TopologySnapshot>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
}

/// Cloneable handle to a running engine task
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

/// Start the engine task
///
/// The task runs until every handle is dropped, then hands the engine
/// back through the join handle.
pub fn spawn_engine(
    engine: TopologyEngine,
    role: StationRole,
    queue: usize,
) -> (EngineHandle, JoinHandle<TopologyEngine>) {
    let (tx, rx) = mpsc::channel(queue.max(1));
    let span = {
        let _guard = StationContextGuard::new(engine.local(), role);
        station_span()
    };
    let task = tokio::spawn(run(engine, rx).instrument(span));
    (EngineHandle { tx }, task)
}

async fn run(mut engine: TopologyEngine, mut rx: mpsc::Receiver<EngineCommand>) -> TopologyEngine {
    info!(local = %engine.local(), mode = %engine.mode(), "engine host started");
    let mut last_packet_id: Option<PacketId> = None;
    let mut handled = 0u64;

    while let Some(command) = rx.recv().await {
        handled += 1;
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            EngineCommand::Observe { packet, reply } => {
                let outcome = engine.observe_packet(&packet.packet, packet.timestamp, packet.is_duplicate);
                last_packet_id = Some(packet.id);
                let _ = reply.send(outcome);
            }
            EngineCommand::Broadcast {
                from,
                quality,
                routes,
                timestamp,
                reply,
            } => {
                let _ = reply.send(engine.broadcast_routes(&from, quality, &routes, timestamp));
            }
            EngineCommand::SetMode(mode) => engine.set_mode(mode),
            EngineCommand::Sweep { now, reply } => {
                let _ = reply.send(engine.sweep(now));
            }
            EngineCommand::Neighbors { reply } => {
                let _ = reply.send(engine.current_neighbors());
            }
            EngineCommand::Routes { reply } => {
                let _ = reply.send(engine.current_routes());
            }
            EngineCommand::PreferredRoute { destination, reply } => {
                let _ = reply.send(engine.preferred_route(&destination));
            }
            EngineCommand::LinkStats { reply } => {
                let _ = reply.send(engine.export_link_stats());
            }
            EngineCommand::Snapshot { now, reply } => {
                let _ = reply.send(engine.export_snapshot(last_packet_id, now));
            }
            EngineCommand::Stats { reply } => {
                let _ = reply.send(engine.stats());
            }
        }
    }

    debug!(handled, "engine host stopped");
    engine
}

impl EngineHandle {
    async fn send(&self, command: EngineCommand) -> SimResult<()> {
        self.tx.send(command).await.map_err(|_| SimError::HostClosed)
    }

    async fn ask<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> EngineCommand) -> SimResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| SimError::HostClosed)
    }

    /// Feed one logged packet
    pub async fn observe(&self, packet: LoggedPacket) -> SimResult<ObservationOutcome> {
        self.ask(|reply| EngineCommand::Observe { packet, reply }).await
    }

    /// Feed a routing broadcast
    pub async fn broadcast(
        &self,
        from: Callsign,
        quality: u8,
        routes: Vec<RouteInfo>,
        timestamp: DateTime<Utc>,
    ) -> SimResult<BroadcastSummary> {
        self.ask(|reply| EngineCommand::Broadcast {
            from,
            quality,
            routes,
            timestamp,
            reply,
        })
        .await
    }

    pub async fn set_mode(&self, mode: OperatingMode) -> SimResult<()> {
        self.send(EngineCommand::SetMode(mode)).await
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> SimResult<SweepReport> {
        self.ask(|reply| EngineCommand::Sweep { now, reply }).await
    }

    pub async fn neighbors(&self) -> SimResult<Vec<NeighborInfo>> {
        self.ask(|reply| EngineCommand::Neighbors { reply }).await
    }

    pub async fn routes(&self) -> SimResult<Vec<RouteInfo>> {
        self.ask(|reply| EngineCommand::Routes { reply }).await
    }

    pub async fn preferred_route(&self, destination: Callsign) -> SimResult<Option<RouteInfo>> {
        self.ask(|reply| EngineCommand::PreferredRoute { destination, reply })
            .await
    }

    pub async fn link_stats(&self) -> SimResult<Vec<LinkStatRecord>> {
        self.ask(|reply| EngineCommand::LinkStats { reply }).await
    }

    /// Snapshot tagged with the last packet this host fed the engine
    pub async fn snapshot(&self, now: DateTime<Utc>) -> SimResult<TopologySnapshot> {
        self.ask(|reply| EngineCommand::Snapshot { now, reply }).await
    }

    pub async fn stats(&self) -> SimResult<EngineStats> {
        self.ask(|reply| EngineCommand::Stats { reply }).await
    }
}
