//! Snapshot store and packet log
//!
//! The engine keeps no files of its own. This module is the host-side
//! persistence collaborator: it writes the engine's snapshot as JSON, keeps
//! the capture log as JSON lines, and on startup restores the snapshot and
//! replays the packets logged after it.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use axmesh_core::PacketId;
use axmesh_routing::{LoggedPacket, SnapshotPolicy, TopologyEngine, TopologySnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SimResult;

const SNAPSHOT_FILE: &str = "snapshot.json";
const PACKET_LOG_FILE: &str = "packets.jsonl";

/// Snapshot file in a state directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store under `dir`, created if missing
    pub fn open(dir: impl AsRef<Path>) -> SimResult<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            path: dir.as_ref().join(SNAPSHOT_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot, replacing any previous one
    ///
    /// Writes a temporary file and renames it so a crash never leaves a
    /// half-written snapshot.
    pub fn save(&self, snapshot: &TopologySnapshot) -> SimResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        info!(
            path = %self.path.display(),
            records = snapshot.record_count(),
            last_packet = ?snapshot.last_packet_id,
            "snapshot saved"
        );
        Ok(())
    }

    /// The stored snapshot, if there is one
    pub fn load(&self) -> SimResult<Option<TopologySnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&self.path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }
}

/// Append-only capture log, one [`LoggedPacket`] per line
#[derive(Debug, Clone)]
pub struct PacketLog {
    path: PathBuf,
}

impl PacketLog {
    /// Log under `dir`, created if missing
    pub fn open(dir: impl AsRef<Path>) -> SimResult<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            path: dir.as_ref().join(PACKET_LOG_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append packets to the log
    pub fn append<'a>(&self, packets: impl IntoIterator<Item = &'a LoggedPacket>) -> SimResult<usize> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let mut written = 0;
        for packet in packets {
            serde_json::to_writer(&mut writer, packet)?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }

    /// Every packet in the log
    ///
    /// A torn last line (a crash mid-append) is skipped with a warning;
    /// malformed lines elsewhere are errors.
    pub fn read_all(&self) -> SimResult<Vec<LoggedPacket>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
        let last = lines.len().saturating_sub(1);

        let mut packets = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(packet) => packets.push(packet),
                Err(e) if i == last => {
                    warn!(path = %self.path.display(), line = i + 1, error = %e, "skipping torn log entry");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(packets)
    }

    /// Id of the newest packet in the log
    pub fn last_id(&self) -> SimResult<Option<PacketId>> {
        Ok(self.read_all()?.iter().map(|p| p.id).max())
    }
}

/// How the engine was brought back up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumeReport {
    /// A snapshot was found and restored
    pub restored: bool,
    /// A snapshot was found but discarded
    pub discarded: Option<String>,
    /// Packets replayed from the log
    pub replayed: usize,
    /// Replayed packets the engine rejected
    pub rejected: usize,
    /// Newest packet the engine has seen
    pub last_packet_id: Option<PacketId>,
}

/// Restore the stored snapshot into `engine` and replay the log after it
///
/// A missing, stale or mismatched snapshot is not an error: the engine
/// starts cold and replays the log from the beginning under `policy`.
pub fn resume(
    engine: &mut TopologyEngine,
    store: &SnapshotStore,
    log: &PacketLog,
    policy: &SnapshotPolicy,
    now: DateTime<Utc>,
) -> SimResult<ResumeReport> {
    let mut report = ResumeReport::default();
    let mut after = None;

    if let Some(snapshot) = store.load()? {
        let checked = snapshot
            .validate(now, engine.config_hash(), engine.local(), policy.max_snapshot_age_secs)
            .and_then(|()| {
                let last = snapshot.last_packet_id;
                engine.restore(snapshot).map(|_| last)
            });
        match checked {
            Ok(last) => {
                report.restored = true;
                after = last;
            }
            Err(e) => {
                warn!(path = %store.path().display(), error = %e, "snapshot discarded, starting cold");
                report.discarded = Some(e.to_string());
            }
        }
    }

    let packets = log.read_all()?;
    let selected = policy.replay.select(&packets, after, now);
    let summary = engine.replay(selected);

    report.replayed = summary.applied + summary.rejected;
    report.rejected = summary.rejected;
    report.last_packet_id = summary.last_packet_id.or(after);
    info!(
        local = %engine.local(),
        restored = report.restored,
        replayed = report.replayed,
        last_packet = ?report.last_packet_id,
        "engine resumed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axmesh_core::{Callsign, FrameClass, ObservedPacket};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn logged(id: u64, secs: i64) -> LoggedPacket {
        LoggedPacket {
            id: PacketId(id),
            timestamp: t0() + Duration::seconds(secs),
            packet: ObservedPacket::new("K1ABC", "K2DEF", FrameClass::Data).with_via(["DIGI1"]),
            is_duplicate: false,
        }
    }

    fn engine() -> TopologyEngine {
        TopologyEngine::with_defaults(Callsign::parse("N0CALL").unwrap())
    }

    #[test]
    fn test_packet_log_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let log = PacketLog::open(dir.path()).unwrap();
        let packets: Vec<LoggedPacket> = (1..=5).map(|i| logged(i, i as i64 * 10)).collect();

        assert_eq!(log.append(&packets[..3]).unwrap(), 3);
        assert_eq!(log.append(&packets[3..]).unwrap(), 2);
        assert_eq!(log.read_all().unwrap(), packets);
        assert_eq!(log.last_id().unwrap(), Some(PacketId(5)));
    }

    #[test]
    fn test_torn_last_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = PacketLog::open(dir.path()).unwrap();
        log.append(&[logged(1, 0)]).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"{\"id\":2,\"timest").unwrap();

        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SnapshotStore::open(dir.path()).unwrap().load().unwrap().is_none());
        assert!(PacketLog::open(dir.path()).unwrap().read_all().unwrap().is_empty());
    }

    #[test]
    fn test_resume_restores_then_replays_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let log = PacketLog::open(dir.path()).unwrap();
        let packets: Vec<LoggedPacket> = (1..=6).map(|i| logged(i, i as i64 * 30)).collect();
        log.append(&packets).unwrap();

        let mut original = engine();
        original.replay(&packets[..4]);
        store
            .save(&original.export_snapshot(Some(PacketId(4)), packets[3].timestamp))
            .unwrap();
        original.replay(&packets[4..]);

        let mut resumed = engine();
        let now = packets[5].timestamp;
        let report = resume(&mut resumed, &store, &log, &SnapshotPolicy::default(), now).unwrap();

        assert!(report.restored);
        assert_eq!(report.replayed, 2);
        assert_eq!(report.last_packet_id, Some(PacketId(6)));
        assert_eq!(resumed.current_routes(), original.current_routes());
        assert_eq!(resumed.current_neighbors(), original.current_neighbors());
    }

    #[test]
    fn test_stale_snapshot_starts_cold() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let log = PacketLog::open(dir.path()).unwrap();
        let packets: Vec<LoggedPacket> = (1..=3).map(|i| logged(i, i as i64)).collect();
        log.append(&packets).unwrap();

        let mut original = engine();
        original.replay(&packets);
        store.save(&original.export_snapshot(Some(PacketId(3)), t0())).unwrap();

        let mut resumed = engine();
        let now = t0() + Duration::hours(2);
        let policy = SnapshotPolicy {
            replay: axmesh_routing::ReplayPolicy::unbounded(),
            ..SnapshotPolicy::default()
        };
        let report = resume(&mut resumed, &store, &log, &policy, now).unwrap();

        assert!(!report.restored);
        assert!(report.discarded.is_some());
        assert_eq!(report.replayed, 3);
    }

    #[test]
    fn test_snapshot_for_other_station_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let log = PacketLog::open(dir.path()).unwrap();

        let other = TopologyEngine::with_defaults(Callsign::parse("W9XYZ").unwrap());
        store.save(&other.export_snapshot(None, t0())).unwrap();

        let mut resumed = engine();
        let report = resume(&mut resumed, &store, &log, &SnapshotPolicy::default(), t0()).unwrap();
        assert!(!report.restored);
        assert_eq!(report.replayed, 0);
    }
}
