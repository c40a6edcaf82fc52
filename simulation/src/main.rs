//! axmesh simulator
//!
//! Generates packet-radio traffic over a synthetic mesh and shows what the
//! passive topology engine makes of it.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;

use axmesh_core::OperatingMode;
use axmesh_logging::{AxmeshSubscriberBuilder, FileConfig, LogConfig};
use axmesh_routing::{EngineConfig, ReplayPolicy, SnapshotPolicy};
use axmesh_simulation::{MeshBuilder, MeshShape, ScenarioOptions, run_monitor_scenario, run_resume_scenario};

#[derive(Parser)]
#[command(
    name = "axmesh-sim",
    about = "Passive AX.25 topology inference over a simulated radio mesh",
    version
)]
struct Cli {
    /// Enable verbose, human-readable logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSONL logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Classic,
    Inference,
    Hybrid,
}

impl From<Mode> for OperatingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Classic => OperatingMode::Classic,
            Mode::Inference => OperatingMode::Inference,
            Mode::Hybrid => OperatingMode::Hybrid,
        }
    }
}

#[derive(clap::Args)]
struct MeshArgs {
    /// Type of topology: ring, line, star, full, random
    #[arg(short, long, default_value = "ring")]
    topology: MeshShape,

    /// Number of stations (max 100); the monitor is K0SIM
    #[arg(short, long, default_value = "8")]
    stations: usize,

    /// Link probability for the random topology
    #[arg(short = 'p', long, default_value = "0.3")]
    connection_prob: f64,

    /// RNG seed for the mesh and the traffic
    #[arg(long, default_value = "1")]
    seed: u64,
}

#[derive(clap::Args)]
struct RunArgs {
    #[command(flatten)]
    mesh: MeshArgs,

    /// Decoded packets to generate
    #[arg(short = 'n', long, default_value = "500")]
    packets: usize,

    /// Engine operating mode
    #[arg(short, long, value_enum, default_value = "hybrid")]
    mode: Mode,

    /// Feed a neighbor's routing broadcast every N packets (0 = never)
    #[arg(long, default_value = "100")]
    broadcast_every: usize,

    /// Engine configuration as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn options(&self) -> anyhow::Result<ScenarioOptions> {
        let config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str::<EngineConfig>(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        Ok(ScenarioOptions {
            stations: self.mesh.stations,
            shape: self.mesh.topology,
            connection_probability: self.mesh.connection_prob,
            packets: self.packets,
            seed: self.mesh.seed,
            mode: self.mode.into(),
            monitor: 0,
            broadcast_every: self.broadcast_every,
            config,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Listen to a generated mesh and report the inferred topology
    Scenario(RunArgs),

    /// Build and print a mesh
    Topology(MeshArgs),

    /// Run, snapshot halfway, keep logging, then restore and replay
    Resume {
        #[command(flatten)]
        run: RunArgs,

        /// State directory for the snapshot and packet log
        #[arg(short, long, default_value = "./axmesh-state")]
        dir: PathBuf,

        /// Oldest snapshot to accept, seconds
        #[arg(long, default_value = "86400")]
        max_age: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Reports go to stdout; keep the JSONL console quiet unless asked
    let mut log_config = if cli.verbose {
        LogConfig::development()
    } else {
        LogConfig {
            default_level: "warn".to_string(),
            ..LogConfig::default()
        }
    };
    if let Some(dir) = &cli.log_dir {
        log_config.file = Some(FileConfig {
            directory: dir.clone(),
            ..FileConfig::default()
        });
    }
    let _log_guard = AxmeshSubscriberBuilder::new().with_config(log_config).init();

    match cli.command {
        Commands::Scenario(run) => {
            let report = run_monitor_scenario(&run.options()?).await?;
            if run.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
        }
        Commands::Topology(args) => {
            let mut rng = StdRng::seed_from_u64(args.seed);
            let mesh = MeshBuilder::new(args.stations)?.build(args.topology, args.connection_prob, &mut rng);
            println!("{}", mesh.visualize());
        }
        Commands::Resume { run, dir, max_age } => {
            let policy = SnapshotPolicy {
                max_snapshot_age_secs: max_age,
                replay: ReplayPolicy::unbounded(),
            };
            // The packet log is append-only; a reused directory would mix two captures
            if dir.read_dir().map(|mut d| d.next().is_some()).unwrap_or(false) {
                anyhow::bail!("state directory {} is not empty", dir.display());
            }
            let outcome = run_resume_scenario(&dir, &run.options()?, &policy).await?;
            if run.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!(
                    "Snapshot after {} packets, {} more logged before restart",
                    outcome.before_snapshot, outcome.after_snapshot
                );
                match &outcome.resume.discarded {
                    Some(reason) => println!("  Snapshot discarded: {}", reason),
                    None => println!("  Snapshot restored"),
                }
                println!(
                    "  Replayed {} packets ({} rejected), last {:?}",
                    outcome.resume.replayed, outcome.resume.rejected, outcome.resume.last_packet_id
                );
                println!("  Matches uninterrupted run: {}", outcome.matches_uninterrupted);
            }
        }
    }

    Ok(())
}
