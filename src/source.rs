//! Obligation sources: where each tick's snapshot comes from.
//!
//! A source must hand over the complete current set of obligations on
//! every call. Nothing is cached between ticks.

use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};

use crate::model::{Obligation, ObligationId};

/// Errors that make a snapshot unavailable. The whole tick is skipped.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid obligations in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate obligation id {0}")]
    DuplicateId(ObligationId),
}

/// Supplies a fresh obligation snapshot.
pub trait ObligationSource {
    fn load(&self) -> Result<Vec<Obligation>, SourceError>;
}

/// Reads obligations from a JSON file holding an array of records.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObligationSource for JsonFileSource {
    fn load(&self) -> Result<Vec<Obligation>, SourceError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        let obligations: Vec<Obligation> =
            serde_json::from_str(&contents).map_err(|source| SourceError::Json {
                path: self.path.clone(),
                source,
            })?;
        ensure_unique(&obligations)?;
        Ok(obligations)
    }
}

/// Ids are the ledger join key; a snapshot with a repeated id is rejected whole.
fn ensure_unique(obligations: &[Obligation]) -> Result<(), SourceError> {
    let mut seen = HashSet::with_capacity(obligations.len());
    for obligation in obligations {
        if !seen.insert(&obligation.id) {
            return Err(SourceError::DuplicateId(obligation.id.clone()));
        }
    }
    Ok(())
}
