//! Notice types: what kind of notice, where it went, and how it ended.
//!
//! A `NoticeRecord` is one ledger row. Records are never edited once
//! written; the ledger only grows.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ObligationId;

/// The two notices an obligation can receive, each at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    /// Sent shortly before the due date.
    Reminder,

    /// Sent after the grace period once the due date has passed.
    Overdue,
}

impl NoticeKind {
    pub const ALL: [Self; 2] = [Self::Reminder, Self::Overdue];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reminder => "reminder",
            Self::Overdue => "overdue",
        }
    }
}

/// Where a notice attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Email,
    Messaging,

    /// The outcome applies to the notice as a whole, not to one channel.
    Batch,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Messaging => "messaging",
            Self::Batch => "batch",
        }
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// Delivered. Only this outcome marks a kind as issued.
    Sent,

    /// Deliberately not attempted (no destination, channel not configured).
    Skipped,

    /// Attempted and failed. Retried on a later tick while in window.
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Error returned when a stored label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: {value:?}")]
pub struct UnknownLabel {
    what: &'static str,
    value: String,
}

macro_rules! impl_labels {
    ($ty:ty, $what:literal, [$($variant:ident),+]) => {
        impl FromStr for $ty {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == <$ty>::$variant.as_str() {
                        return Ok(<$ty>::$variant);
                    }
                )+
                Err(UnknownLabel {
                    what: $what,
                    value: s.to_string(),
                })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }
    };
}

impl_labels!(NoticeKind, "notice kind", [Reminder, Overdue]);
impl_labels!(Channel, "channel", [Email, Messaging, Batch]);
impl_labels!(Outcome, "outcome", [Sent, Skipped, Failed]);

/// Deduplication key: one obligation, one kind of notice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoticeKey {
    pub obligation_id: ObligationId,
    pub kind: NoticeKind,
}

impl NoticeKey {
    pub fn new(obligation_id: ObligationId, kind: NoticeKind) -> Self {
        Self {
            obligation_id,
            kind,
        }
    }
}

/// The result of one channel attempt, as reported by a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAttempt {
    pub channel: Channel,

    /// The address or phone number tried, when there was one.
    pub destination: Option<String>,

    pub outcome: Outcome,

    /// Free-text detail: error message, skip reason, or empty on success.
    pub detail: String,
}

impl ChannelAttempt {
    pub fn sent(channel: Channel, destination: impl Into<String>) -> Self {
        Self {
            channel,
            destination: Some(destination.into()),
            outcome: Outcome::Sent,
            detail: String::new(),
        }
    }

    pub fn failed(
        channel: Channel,
        destination: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            destination,
            outcome: Outcome::Failed,
            detail: detail.into(),
        }
    }

    pub fn skipped(
        channel: Channel,
        destination: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            destination,
            outcome: Outcome::Skipped,
            detail: detail.into(),
        }
    }
}

/// One row of the notice ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeRecord {
    pub recorded_at: Timestamp,

    /// The tick that produced this row.
    pub tick_id: Uuid,

    pub obligation_id: ObligationId,
    pub kind: NoticeKind,
    pub channel: Channel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    pub outcome: Outcome,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl NoticeRecord {
    /// Builds the ledger row for a channel attempt.
    pub fn from_attempt(
        recorded_at: Timestamp,
        tick_id: Uuid,
        key: &NoticeKey,
        attempt: ChannelAttempt,
    ) -> Self {
        Self {
            recorded_at,
            tick_id,
            obligation_id: key.obligation_id.clone(),
            kind: key.kind,
            channel: attempt.channel,
            destination: attempt.destination,
            outcome: attempt.outcome,
            detail: attempt.detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_back_to_variants() {
        for kind in NoticeKind::ALL {
            assert_eq!(kind.as_str().parse::<NoticeKind>().unwrap(), kind);
        }
        assert_eq!("batch".parse::<Channel>().unwrap(), Channel::Batch);
        assert_eq!("failed".parse::<Outcome>().unwrap(), Outcome::Failed);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = "Enviado".parse::<Outcome>().unwrap_err();
        assert_eq!(err.to_string(), "unknown outcome: \"Enviado\"");
    }

    #[test]
    fn keys_with_same_parts_are_equal() {
        // Ids that would collide once concatenated with a kind suffix stay distinct.
        let a = NoticeKey::new("7_overdue".into(), NoticeKind::Reminder);
        let b = NoticeKey::new("7".into(), NoticeKind::Overdue);
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
