//! CLI interface for Dunning.
//!
//! Every subcommand is non-interactive: arguments in, report out.
//! Reports and listings go to stdout; logs go to stderr.

mod format;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jiff::{Zoned, civil::Date};

use crate::config::Config;
use crate::dispatch::ChannelDispatcher;
use crate::engine::Engine;
use crate::model::ObligationId;
use crate::schedule;
use crate::source::{JsonFileSource, ObligationSource};
use crate::storage::Storage;
use crate::trigger;

use format::{format_planned, format_record, format_report, format_window};

/// Dunning: remind once before the due date, warn once after it.
#[derive(Debug, Parser)]
#[command(name = "dunning", version, after_long_help = USAGE_HELP)]
pub struct Cli {
    /// Config file. Defaults to `$DUNNING_CONFIG`, then `~/.dunning/config.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const USAGE_HELP: &str = r"Typical use:
  dunning window 2024-03-15                      # when would notices go out?
  dunning preview --obligations actas.json       # what would today's tick do?
  dunning tick --obligations actas.json          # run one tick now
  dunning schedule                               # tick now and daily at schedule.at
  dunning ledger --obligation 42                 # every attempt recorded for 42

Re-running a tick is always safe: a notice already sent is never sent again.";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one tick: send every notice that is due and record the outcomes.
    ///
    /// Exits non-zero if any outcome could not be recorded.
    Tick {
        /// Obligation snapshot (JSON). Defaults to `obligations` in the config.
        #[arg(long)]
        obligations: Option<PathBuf>,

        /// Evaluate as if today were this date (YYYY-MM-DD).
        #[arg(long)]
        today: Option<Date>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show what a tick would decide, without sending or recording anything.
    Preview {
        /// Obligation snapshot (JSON). Defaults to `obligations` in the config.
        #[arg(long)]
        obligations: Option<PathBuf>,

        /// Evaluate as if today were this date (YYYY-MM-DD).
        #[arg(long)]
        today: Option<Date>,
    },

    /// Tick now, then every day at the configured time. Runs until killed.
    Schedule {
        /// Obligation snapshot (JSON). Defaults to `obligations` in the config.
        #[arg(long)]
        obligations: Option<PathBuf>,
    },

    /// Print the trigger dates for a due date under the configured policy.
    Window {
        /// Due date (YYYY-MM-DD).
        due_date: Date,
    },

    /// List recorded notice attempts.
    Ledger {
        /// Only show attempts for this obligation.
        #[arg(long)]
        obligation: Option<String>,

        /// Print one JSON record per line.
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli, config: &Config) -> Result<(), String> {
    match cli.command {
        Command::Tick {
            obligations,
            today,
            json,
        } => cmd_tick(config, obligations, today, json),
        Command::Preview { obligations, today } => cmd_preview(config, obligations, today),
        Command::Schedule { obligations } => cmd_schedule(config, obligations),
        Command::Window { due_date } => {
            cmd_window(config, due_date);
            Ok(())
        }
        Command::Ledger { obligation, json } => cmd_ledger(config, obligation, json),
    }
}

fn open_storage(config: &Config) -> Result<Storage, String> {
    let path = config
        .ledger_path()
        .ok_or("could not determine home directory for the ledger")?;
    Storage::open(&path).map_err(|e| format!("failed to open ledger {}: {e}", path.display()))
}

fn build_engine(config: &Config) -> Result<Engine<Storage, ChannelDispatcher>, String> {
    let storage = open_storage(config)?;
    let dispatcher = ChannelDispatcher::from_config(config);
    Ok(Engine::new(storage, dispatcher, config.policy.clone())
        .with_workers(config.schedule.workers))
}

/// The snapshot source: `--obligations` if given, else the configured path.
fn resolve_source(config: &Config, explicit: Option<PathBuf>) -> Result<JsonFileSource, String> {
    explicit
        .or_else(|| config.obligations.clone())
        .map(JsonFileSource::new)
        .ok_or_else(|| {
            "no obligation snapshot: pass --obligations <path> or set `obligations` in the config"
                .to_string()
        })
}

/// The current instant, moved to `today` when one is given.
fn resolve_now(today: Option<Date>) -> Result<Zoned, String> {
    let now = Zoned::now();
    match today {
        Some(date) => now
            .with()
            .date(date)
            .build()
            .map_err(|e| format!("invalid --today {date}: {e}")),
        None => Ok(now),
    }
}

fn cmd_tick(
    config: &Config,
    obligations: Option<PathBuf>,
    today: Option<Date>,
    json: bool,
) -> Result<(), String> {
    let source = resolve_source(config, obligations)?;
    let engine = build_engine(config)?;
    let now = resolve_now(today)?;

    let report = engine
        .tick_from_source(&now, &source)
        .map_err(|e| format!("tick skipped: {e}"))?;

    if json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("failed to serialize report: {e}"))?;
        println!("{json}");
    } else {
        print!("{}", format_report(&report));
    }

    if report.ledger_failures.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "{} notice outcome(s) could not be recorded in {}",
            report.ledger_failures.len(),
            engine.ledger().path().display()
        ))
    }
}

fn cmd_preview(
    config: &Config,
    obligations: Option<PathBuf>,
    today: Option<Date>,
) -> Result<(), String> {
    let source = resolve_source(config, obligations)?;
    let engine = build_engine(config)?;
    let today = resolve_now(today)?.date();

    let obligations = source
        .load()
        .map_err(|e| format!("failed to load obligations: {e}"))?;
    let planned = engine
        .preview(today, &obligations)
        .map_err(|e| format!("failed to read ledger: {e}"))?;

    println!("Preview for {today} ({} obligations)", obligations.len());
    for plan in &planned {
        println!("{}", format_planned(plan));
    }
    Ok(())
}

fn cmd_schedule(config: &Config, obligations: Option<PathBuf>) -> Result<(), String> {
    let source = resolve_source(config, obligations)?;
    let engine = build_engine(config)?;
    eprintln!(
        "Ticking now and daily at {}. Obligations from {}, ledger at {}.",
        config.schedule.at,
        source.path().display(),
        engine.ledger().path().display()
    );
    schedule::run(&engine, &source, config.schedule.at)
}

fn cmd_window(config: &Config, due_date: Date) {
    let window = trigger::compute_window(due_date, &config.policy);
    print!("{}", format_window(due_date, &window, config.policy.catch_up_days));
}

fn cmd_ledger(config: &Config, obligation: Option<String>, json: bool) -> Result<(), String> {
    let storage = open_storage(config)?;
    let filter = obligation.map(ObligationId::new);
    let records = storage
        .load_notices(filter.as_ref())
        .map_err(|e| format!("failed to read ledger: {e}"))?;

    if records.is_empty() && !json {
        println!("No notices recorded");
        return Ok(());
    }

    for record in &records {
        if json {
            let line = serde_json::to_string(record)
                .map_err(|e| format!("failed to serialize record: {e}"))?;
            println!("{line}");
        } else {
            println!("{}", format_record(record));
        }
    }
    Ok(())
}
