//! The deduplication engine: decide, dispatch, record.
//!
//! Each tick evaluates every `(obligation, kind)` pair once:
//!
//! ```text
//! exempt?            → Suppressed     (no ledger row, ever)
//! already Sent?      → AlreadyIssued  (no-op)
//! trigger ≤ today ≤ trigger + catch-up
//!                    → Due            (dispatch, then append every attempt)
//! before trigger     → NotYetDue
//! after catch-up     → Missed         (abandoned)
//! ```
//!
//! The ledger is the only state carried between ticks. A tick killed halfway
//! leaves nothing behind but the rows it already appended.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
    thread,
};

use jiff::{Timestamp, ToSpan, Zoned, civil::Date};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Policy;
use crate::dispatch::Dispatcher;
use crate::model::{
    Channel, ChannelAttempt, Decision, LedgerFailure, NoticeKey, NoticeKind, NoticeRecord,
    Obligation, ObligationId, Outcome, TickReport,
};
use crate::source::{ObligationSource, SourceError};
use crate::storage::{self, Ledger};
use crate::trigger;

/// Whether an obligation is exempt from all notices under `policy`.
pub fn is_exempt(obligation: &Obligation, policy: &Policy) -> bool {
    policy.suppress_non_positive && !obligation.has_balance()
}

/// Where `(obligation, kind)` stands on `today`, given the kinds already issued.
pub fn decide(
    obligation: &Obligation,
    kind: NoticeKind,
    issued: &HashSet<NoticeKind>,
    today: Date,
    policy: &Policy,
) -> Decision {
    if is_exempt(obligation, policy) {
        return Decision::Suppressed;
    }
    let trigger = trigger::compute_window(obligation.due_date, policy).trigger(kind);
    if issued.contains(&kind) {
        return Decision::AlreadyIssued;
    }

    let last_chance = trigger.saturating_add(i64::from(policy.catch_up_days).days());
    if today < trigger {
        Decision::NotYetDue { trigger }
    } else if today > last_chance {
        Decision::Missed { trigger }
    } else {
        Decision::Due { trigger }
    }
}

/// A decision computed without acting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planned {
    pub obligation_id: ObligationId,
    pub kind: NoticeKind,
    pub decision: Decision,
}

/// Per-obligation locks serializing the read-check-dispatch-append sequence.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<ObligationId, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn lock_for(&self, id: &ObligationId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.clone()).or_default())
    }
}

/// Facts shared by every evaluation within one tick.
struct Tick {
    id: Uuid,
    now: Timestamp,
    today: Date,
}

/// Runs ticks against a ledger and a dispatcher.
pub struct Engine<L, D> {
    ledger: L,
    dispatcher: D,
    policy: Policy,
    workers: usize,
    locks: KeyLocks,
}

impl<L, D> Engine<L, D>
where
    L: Ledger + Sync,
    D: Dispatcher + Sync,
{
    pub fn new(ledger: L, dispatcher: D, policy: Policy) -> Self {
        Self {
            ledger,
            dispatcher,
            policy,
            workers: 1,
            locks: KeyLocks::default(),
        }
    }

    /// Spreads each tick's obligations over `workers` threads.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Loads a snapshot from `source` and runs a tick on it.
    ///
    /// When the source is unavailable nothing is dispatched or written.
    pub fn tick_from_source(
        &self,
        now: &Zoned,
        source: &impl ObligationSource,
    ) -> Result<TickReport, SourceError> {
        let obligations = source
            .load()
            .inspect_err(|e| error!(error = %e, "obligation source unavailable, skipping tick"))?;
        Ok(self.run_tick(now, &obligations))
    }

    /// Evaluates every obligation for both kinds and sends whatever is due.
    ///
    /// `now` is the only clock the engine reads: its date decides what is due
    /// and its instant stamps every ledger row. Safe to repeat any number of
    /// times on the same day.
    pub fn run_tick(&self, now: &Zoned, obligations: &[Obligation]) -> TickReport {
        let tick = Tick {
            id: Uuid::new_v4(),
            now: now.timestamp(),
            today: now.date(),
        };
        info!(
            tick = %tick.id,
            date = %tick.today,
            obligations = obligations.len(),
            "tick started"
        );

        let mut report = TickReport::new(tick.id, tick.now, tick.today);
        let workers = self.workers.min(obligations.len()).max(1);

        if workers == 1 {
            for obligation in obligations {
                self.process(&tick, obligation, &mut report);
            }
        } else {
            let tick = &tick;
            let per_worker = obligations.len().div_ceil(workers);
            let partials: Vec<TickReport> = thread::scope(|scope| {
                let handles: Vec<_> = obligations
                    .chunks(per_worker)
                    .map(|chunk| {
                        scope.spawn(move || {
                            let mut part = TickReport::new(tick.id, tick.now, tick.today);
                            for obligation in chunk {
                                self.process(tick, obligation, &mut part);
                            }
                            part
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .filter_map(|handle| match handle.join() {
                        Ok(part) => Some(part),
                        Err(_) => {
                            error!(
                                tick = %tick.id,
                                "worker panicked, its obligations were not reported"
                            );
                            None
                        }
                    })
                    .collect()
            });
            for part in partials {
                report.absorb(part);
            }
        }

        info!(
            tick = %report.tick_id,
            sent = report.total_sent(),
            reminders = report.reminder.sent,
            overdue = report.overdue.sent,
            ledger_failures = report.ledger_failures.len(),
            "tick finished"
        );
        report
    }

    /// Computes what a tick on `today` would do, without dispatching or writing.
    pub fn preview(
        &self,
        today: Date,
        obligations: &[Obligation],
    ) -> storage::Result<Vec<Planned>> {
        let mut planned = Vec::with_capacity(obligations.len() * NoticeKind::ALL.len());
        for obligation in obligations {
            let issued = if is_exempt(obligation, &self.policy) {
                HashSet::new()
            } else {
                self.ledger.issued_kinds(&obligation.id)?
            };
            for kind in NoticeKind::ALL {
                planned.push(Planned {
                    obligation_id: obligation.id.clone(),
                    kind,
                    decision: decide(obligation, kind, &issued, today, &self.policy),
                });
            }
        }
        Ok(planned)
    }

    fn process(&self, tick: &Tick, obligation: &Obligation, report: &mut TickReport) {
        report.obligations += 1;

        if is_exempt(obligation, &self.policy) {
            debug!(obligation = %obligation.id, "exempt, no notices");
            for kind in NoticeKind::ALL {
                report.counts_mut(kind).exempt += 1;
            }
            return;
        }

        let lock = self.locks.lock_for(&obligation.id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let issued = match self.ledger.issued_kinds(&obligation.id) {
            Ok(issued) => issued,
            Err(e) => {
                error!(obligation = %obligation.id, error = %e, "failed to read ledger");
                self.record_unreadable(tick, obligation, &e.to_string(), report);
                return;
            }
        };

        for kind in NoticeKind::ALL {
            match decide(obligation, kind, &issued, tick.today, &self.policy) {
                Decision::Suppressed => report.counts_mut(kind).exempt += 1,
                Decision::AlreadyIssued => report.counts_mut(kind).already_issued += 1,
                Decision::NotYetDue { .. } => report.counts_mut(kind).out_of_window += 1,
                Decision::Missed { trigger } => {
                    debug!(
                        obligation = %obligation.id,
                        %kind,
                        %trigger,
                        "catch-up window closed, abandoned"
                    );
                    report.counts_mut(kind).out_of_window += 1;
                }
                Decision::Due { trigger } => {
                    debug!(obligation = %obligation.id, %kind, %trigger, "due");
                    self.fire(tick, obligation, kind, report);
                }
            }
        }
    }

    /// Without knowing what was issued nothing may be sent. Kinds that would be
    /// due are reported as ledger failures; the rest are counted as usual.
    fn record_unreadable(
        &self,
        tick: &Tick,
        obligation: &Obligation,
        error: &str,
        report: &mut TickReport,
    ) {
        for kind in NoticeKind::ALL {
            match decide(obligation, kind, &HashSet::new(), tick.today, &self.policy) {
                Decision::Due { .. } => {
                    report.counts_mut(kind).failed += 1;
                    report.ledger_failures.push(LedgerFailure {
                        obligation_id: obligation.id.clone(),
                        kind,
                        error: error.to_string(),
                    });
                }
                Decision::Suppressed => report.counts_mut(kind).exempt += 1,
                _ => report.counts_mut(kind).out_of_window += 1,
            }
        }
    }

    /// Dispatches one notice and appends every attempt in one write.
    fn fire(
        &self,
        tick: &Tick,
        obligation: &Obligation,
        kind: NoticeKind,
        report: &mut TickReport,
    ) {
        let key = NoticeKey::new(obligation.id.clone(), kind);

        let mut attempts = self.dispatcher.dispatch(obligation, kind);
        if attempts.is_empty() {
            attempts.push(ChannelAttempt::skipped(Channel::Batch, None, "no channel attempted"));
        }
        let delivered = attempts.iter().any(|a| a.outcome == Outcome::Sent);
        let records: Vec<NoticeRecord> = attempts
            .into_iter()
            .map(|attempt| NoticeRecord::from_attempt(tick.now, tick.id, &key, attempt))
            .collect();

        match self.ledger.append_all(&records) {
            Ok(()) if delivered => {
                report.counts_mut(kind).sent += 1;
                info!(obligation = %key.obligation_id, %kind, "notice sent");
            }
            Ok(()) => {
                report.counts_mut(kind).failed += 1;
                warn!(
                    obligation = %key.obligation_id,
                    %kind,
                    attempts = records.len(),
                    "notice not delivered, will retry while in window"
                );
            }
            Err(e) => {
                report.counts_mut(kind).failed += 1;
                error!(
                    obligation = %key.obligation_id,
                    %kind,
                    delivered,
                    error = %e,
                    "failed to record notice outcome"
                );
                report.ledger_failures.push(LedgerFailure {
                    obligation_id: key.obligation_id,
                    kind,
                    error: e.to_string(),
                });
            }
        }
    }
}
