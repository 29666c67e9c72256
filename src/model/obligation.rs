//! Obligation types: one debt or inspection record awaiting notice.

use std::fmt;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

/// Stable identifier of an obligation, unique across the whole snapshot.
///
/// Sources that number their records write the number as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObligationId(String);

impl ObligationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObligationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObligationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An obligation requiring eventual notice.
///
/// Built fresh from the source snapshot on every tick. The engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obligation {
    pub id: ObligationId,

    /// The obligation is in default after this date.
    pub due_date: Date,

    /// Amount still owed. `None` when the source could not resolve it.
    #[serde(default)]
    pub amount_due: Option<f64>,

    /// Name of the party the notice is addressed to.
    pub holder: String,

    /// Tax identifier printed next to the holder's name, when known.
    #[serde(default)]
    pub tax_id: Option<String>,

    #[serde(default)]
    pub recipients: Recipients,
}

impl Obligation {
    /// Whether there is a positive amount to collect.
    ///
    /// An absent amount is treated like zero: there is nothing to remind about.
    pub fn has_balance(&self) -> bool {
        self.amount_due.is_some_and(|amount| amount > 0.0)
    }
}

/// Delivery endpoints for an obligation. Every endpoint may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipients {
    #[serde(default)]
    pub email: Option<String>,

    /// Phone numbers as the source wrote them; normalized at dispatch time.
    #[serde(default)]
    pub phones: Vec<String>,
}

impl Recipients {
    pub fn is_empty(&self) -> bool {
        self.email.as_deref().is_none_or(|e| e.trim().is_empty())
            && self.phones.iter().all(|p| p.trim().is_empty())
    }
}
