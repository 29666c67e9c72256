//! Tick report types: what a tick decided and what it did.

use jiff::{Timestamp, civil::Date};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{NoticeKind, ObligationId};

/// Where one `(obligation, kind)` pair stands on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Decision {
    /// The obligation is exempt; nothing is ever sent for it.
    Suppressed,

    /// A notice of this kind was already delivered.
    AlreadyIssued,

    /// The trigger date is still ahead.
    NotYetDue { trigger: Date },

    /// Today falls inside the catch-up window of the trigger date.
    Due { trigger: Date },

    /// The catch-up window closed without a delivery. Abandoned.
    Missed { trigger: Date },
}

/// Per-kind tallies for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindCounts {
    pub sent: usize,
    pub exempt: usize,
    pub already_issued: usize,
    pub out_of_window: usize,

    /// Due but not delivered: every channel failed or was skipped,
    /// or the ledger could not be read or written.
    pub failed: usize,
}

impl KindCounts {
    fn merge(&mut self, other: &Self) {
        self.sent += other.sent;
        self.exempt += other.exempt;
        self.already_issued += other.already_issued;
        self.out_of_window += other.out_of_window;
        self.failed += other.failed;
    }
}

/// A ledger read or write that failed while processing one obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFailure {
    pub obligation_id: ObligationId,
    pub kind: NoticeKind,
    pub error: String,
}

/// Summary of one tick, returned to whoever invoked it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub tick_id: Uuid,
    pub started_at: Timestamp,
    pub date: Date,
    pub obligations: usize,
    pub reminder: KindCounts,
    pub overdue: KindCounts,
    pub ledger_failures: Vec<LedgerFailure>,
}

impl TickReport {
    pub fn new(tick_id: Uuid, started_at: Timestamp, date: Date) -> Self {
        Self {
            tick_id,
            started_at,
            date,
            obligations: 0,
            reminder: KindCounts::default(),
            overdue: KindCounts::default(),
            ledger_failures: Vec::new(),
        }
    }

    pub fn counts(&self, kind: NoticeKind) -> &KindCounts {
        match kind {
            NoticeKind::Reminder => &self.reminder,
            NoticeKind::Overdue => &self.overdue,
        }
    }

    pub fn counts_mut(&mut self, kind: NoticeKind) -> &mut KindCounts {
        match kind {
            NoticeKind::Reminder => &mut self.reminder,
            NoticeKind::Overdue => &mut self.overdue,
        }
    }

    /// Total notices delivered across both kinds.
    pub fn total_sent(&self) -> usize {
        self.reminder.sent + self.overdue.sent
    }

    /// Folds a worker's partial report into this one.
    pub fn absorb(&mut self, other: Self) {
        self.obligations += other.obligations;
        self.reminder.merge(&other.reminder);
        self.overdue.merge(&other.overdue);
        self.ledger_failures.extend(other.ledger_failures);
    }
}
