use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::builtins;
use crate::config::Config;
use crate::loader::{self, NativeRegistry};
use crate::procs::Arguments;
use crate::runtime::Runtime;
use crate::scheduler::Scheduler;
use crate::value::Value;

#[derive(Parser)]
#[command(name = "dream")]
#[command(about = "Dream - run compiled worlds on the cooperative proc engine", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a compiled world and run its entry proc until nothing is left to resume
    Run {
        /// Compiled world (JSON)
        world: PathBuf,

        /// Global proc to start
        #[arg(short = 'e', long = "entry", default_value = "main")]
        entry: String,

        /// Stop after this many ticks (overrides config)
        #[arg(long = "max-ticks")]
        max_ticks: Option<u64>,
    },

    /// Load a compiled world and list its types and global procs
    Check {
        /// Compiled world (JSON)
        world: PathBuf,
    },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { world, entry, max_ticks } => {
            let max_ticks = max_ticks.or(config.max_ticks);
            let mut rt = load(&config, &world)?;
            run_world(&config, &mut rt, &entry, max_ticks)
        }
        Commands::Check { world } => {
            let rt = load(&config, &world)?;

            let mut types: Vec<_> = rt.objects().types().map(|t| t.type_path().to_string()).collect();
            types.sort();
            let mut procs: Vec<_> = rt.global_procs().map(|(name, _)| name.to_string()).collect();
            procs.sort();

            println!("{} types, {} global procs", types.len(), procs.len());
            for path in types {
                println!("  type {path}");
            }
            for name in procs {
                println!("  proc {name}");
            }
            Ok(())
        }
    }
}

fn load(config: &Config, world: &Path) -> Result<Runtime> {
    let mut natives = NativeRegistry::new();
    builtins::register(&mut natives);

    let mut rt = Runtime::new(config);
    builtins::install(&mut rt);
    loader::load_world_file(&mut rt, world, &natives)?;
    Ok(rt)
}

/// Drive ticks on the current thread until the scheduler is idle.
fn run_world(config: &Config, rt: &mut Runtime, entry: &str, max_ticks: Option<u64>) -> Result<()> {
    let entry_proc = rt
        .global_proc(entry)
        .with_context(|| format!("Entry proc '{entry}' not found"))?;

    let mut scheduler = Scheduler::new();
    scheduler.call_async(
        rt,
        &entry_proc,
        None,
        Arguments::default(),
        None,
        Some(Box::new(|_: &mut Runtime, value: Value| {
            info!(result = %value, "entry proc returned")
        })),
    );

    let tick_length = Duration::from_millis(config.tick_ms.max(1));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build tick driver")?;

    runtime.block_on(async {
        let mut interval = tokio::time::interval(tick_length);
        while !scheduler.is_idle() {
            if !scheduler.has_sleepers() {
                // Nothing here can wake an external wait
                warn!(waiting = scheduler.pending(), "only external waits left, stopping");
                break;
            }

            interval.tick().await;
            scheduler.tick(rt);

            if max_ticks.is_some_and(|max| scheduler.current_tick() >= max) {
                warn!(pending = scheduler.pending(), "tick limit reached");
                break;
            }
        }
    });

    info!(ticks = scheduler.current_tick(), "world idle");
    Ok(())
}
