//! CLI for the raceknot engine.
//!
//! Works on recorded trace files (JSON `TraceLog` or the execution
//! layer's text dump).
//!
//! # Usage
//!
//! ```bash
//! # Align two traces and save them with common-path contexts
//! raceknot align --traces run.txt --output aligned.json
//!
//! # List the knots of a trace pair
//! raceknot excavate --traces run.txt
//!
//! # Plan every novel round, keeping signal across invocations
//! raceknot plan --traces run.txt --signal seen.hex --all --output plans/
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use raceknot::candidate::BarrierKind;
use raceknot::cover;
use raceknot::ledger::Ledger;
use raceknot::pipeline::{Pipeline, PipelineConfig, PipelineError};
use raceknot::report::{format_excavation, format_plan};
use raceknot::signal::Signal;
use raceknot_trace::TraceLog;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "raceknot")]
#[command(about = "Race excavation and interleaving planning over access traces")]
#[command(version)]
struct Cli {
    /// Pipeline configuration (JSON).  Missing fields take defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align a trace pair onto one logical clock.
    Align {
        /// Trace file with exactly two serials.
        #[arg(short, long)]
        traces: PathBuf,

        /// Where to write the aligned trace log (JSON).
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Excavate and list knots.
    Excavate {
        #[arg(short, long)]
        traces: PathBuf,

        /// Write the excavation as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the knots in the flat u32 cover encoding.
        #[arg(long = "cover")]
        print_cover: bool,
    },

    /// Plan schedules and flush vectors for novel knots.
    Plan {
        #[arg(short, long)]
        traces: PathBuf,

        /// Random seed (overrides the config file).
        #[arg(short, long)]
        seed: Option<u64>,

        /// Barrier under test.
        #[arg(short, long, value_enum)]
        barrier: Option<Barrier>,

        /// Hex signal file of already planned knots; updated on exit.
        #[arg(long)]
        signal: Option<PathBuf>,

        /// Keep planning until no novel knot is schedulable.
        #[arg(long)]
        all: bool,

        /// Directory for plan-N.json files.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Barrier {
    Store,
    Load,
}

impl From<Barrier> for BarrierKind {
    fn from(b: Barrier) -> Self {
        match b {
            Barrier::Store => BarrierKind::Store,
            Barrier::Load => BarrierKind::Load,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Align { traces, output } => {
            let log = load_traces(&traces)?;
            if log.serials.len() != 2 {
                eprintln!(
                    "Error: align needs two serials, {} has {}",
                    traces.display(),
                    log.serials.len()
                );
                std::process::exit(1);
            }
            let pipeline = Pipeline::new(config);
            let (a, b) = pipeline.align(&log.serials[0], &log.serials[1]);
            let aligned = TraceLog::new(format!("{} (aligned)", log.label), vec![a, b]);
            aligned.save(&output)?;
            info!("aligned traces written to {}", output.display());
        }

        Commands::Excavate {
            traces,
            output,
            print_cover,
        } => {
            let log = load_traces(&traces)?;
            let excavation = Pipeline::new(config).analyze(&log.serials)?;
            println!("{}", format_excavation(&excavation));
            if print_cover {
                let words: Vec<String> = cover::serialize(&excavation.knots)?
                    .iter()
                    .map(|w| format!("{:#x}", w))
                    .collect();
                println!("{}", words.join(" "));
            }
            if let Some(path) = output {
                fs::write(&path, serde_json::to_string_pretty(&excavation)?)?;
                info!("excavation written to {}", path.display());
            }
        }

        Commands::Plan {
            traces,
            seed,
            barrier,
            signal,
            all,
            output,
        } => {
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(barrier) = barrier {
                config.barrier = barrier.into();
            }

            let ledger = Ledger::new();
            if let Some(path) = &signal {
                if path.exists() {
                    let seen = Signal::from_hex(&fs::read_to_string(path)?)?;
                    info!("loaded {} known hashes from {}", seen.len(), path.display());
                    ledger.merge_max(&seen);
                }
            }
            if let Some(dir) = &output {
                fs::create_dir_all(dir)?;
            }

            let log = load_traces(&traces)?;
            let mut pipeline = Pipeline::new(config);
            let excavation = pipeline.analyze(&log.serials)?;

            let mut planned = 0;
            while let Some(plan) = pipeline.plan(&excavation.knots, &ledger) {
                println!("{}", format_plan(&plan));
                if let Some(dir) = &output {
                    plan.save(&dir.join(format!("plan-{}.json", planned)))?;
                }
                planned += 1;
                if !all {
                    break;
                }
            }
            if planned == 0 {
                println!("No novel schedulable knots.");
            }

            if let Some(path) = &signal {
                fs::write(path, ledger.max_signal().to_hex())?;
            }
            let stats = ledger.snapshot();
            info!("{} plans, {} known hashes", planned, stats.max);
        }
    }
    Ok(())
}

fn load_traces(path: &Path) -> Result<TraceLog, PipelineError> {
    let log = TraceLog::load_any(path)?;
    info!(
        "loaded {} serials ({} accesses) from {}",
        log.serials.len(),
        log.len(),
        path.display()
    );
    Ok(log)
}
