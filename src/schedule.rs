//! Daily scheduling: one tick at startup, then one per day at a fixed time.
//!
//! A failed tick is logged and the loop carries on. Nothing is remembered
//! between ticks; the ledger decides what still needs sending.

use std::{thread, time::Duration};

use jiff::{Zoned, civil::Time};
use tracing::{error, info};

use crate::dispatch::Dispatcher;
use crate::engine::Engine;
use crate::source::ObligationSource;
use crate::storage::Ledger;

/// Longest single sleep, so clock changes and suspends are noticed promptly.
const MAX_NAP: Duration = Duration::from_secs(60);

/// The first moment strictly after `now` whose wall-clock time is `at`.
pub fn next_run(now: &Zoned, at: Time) -> Result<Zoned, jiff::Error> {
    let tz = now.time_zone().clone();
    let today = now.date().to_datetime(at).to_zoned(tz.clone())?;
    if today > *now {
        return Ok(today);
    }
    now.date().tomorrow()?.to_datetime(at).to_zoned(tz)
}

/// Runs one tick now, logging its outcome.
pub fn run_once<L, D>(engine: &Engine<L, D>, source: &impl ObligationSource)
where
    L: Ledger + Sync,
    D: Dispatcher + Sync,
{
    // The source error is already logged by the engine.
    if let Ok(report) = engine.tick_from_source(&Zoned::now(), source) {
        for failure in &report.ledger_failures {
            error!(
                obligation = %failure.obligation_id,
                kind = %failure.kind,
                error = %failure.error,
                "notice outcome not recorded"
            );
        }
    }
}

/// Ticks at startup and then every day at `at`, forever.
///
/// Only returns if the next run time cannot be computed.
pub fn run<L, D>(
    engine: &Engine<L, D>,
    source: &impl ObligationSource,
    at: Time,
) -> Result<(), String>
where
    L: Ledger + Sync,
    D: Dispatcher + Sync,
{
    info!(at = %at, "scheduler started");
    loop {
        run_once(engine, source);

        let next = next_run(&Zoned::now(), at)
            .map_err(|e| format!("failed to compute next run: {e}"))?;
        info!(next = %next, "next tick scheduled");
        sleep_until(&next);
    }
}

fn sleep_until(target: &Zoned) {
    loop {
        let now = Zoned::now();
        if now >= *target {
            return;
        }
        let remaining = target.timestamp().as_second() - now.timestamp().as_second();
        let nap = u64::try_from(remaining).unwrap_or(1).max(1);
        thread::sleep(Duration::from_secs(nap).min(MAX_NAP));
    }
}
