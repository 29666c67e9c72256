//! Core data model for Dunning.
//!
//! Obligations come in from the outside world on every tick and are never
//! persisted here. Notice records are the only state the engine owns, and
//! they live in the ledger.

mod notice;
mod obligation;
mod report;

pub use notice::{Channel, ChannelAttempt, NoticeKey, NoticeKind, NoticeRecord, Outcome};
pub use obligation::{Obligation, ObligationId, Recipients};
pub use report::{Decision, KindCounts, LedgerFailure, TickReport};
