//! Cardinal profiles - a single voting agent and its ballot history

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConclaveError;
use crate::storage::write_json_atomic;

/// One ballot in a cardinal's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Round the ballot was cast in
    pub round: u32,
    /// Name of the cardinal voted for
    pub voted_for: String,
}

/// A single voting cardinal
///
/// Identity, biography and leaning are fixed for the lifetime of the
/// simulation. Only the voting history grows, one record per round.
#[derive(Debug)]
pub struct Cardinal {
    /// Unique name, the only key used across the simulation
    pub name: String,
    /// Biographical text, loaded once
    pub bio: String,
    /// -1.0 (very conservative) to 1.0 (very liberal)
    pub political_leaning: f64,
    /// Where the history snapshot is persisted
    history_path: PathBuf,
    /// Ballots cast so far, oldest first
    voting_history: RwLock<Vec<VoteRecord>>,
}

impl Cardinal {
    /// Build a cardinal from already-loaded parts
    pub fn new(
        name: impl Into<String>,
        bio: impl Into<String>,
        political_leaning: f64,
        history_path: impl Into<PathBuf>,
        voting_history: Vec<VoteRecord>,
    ) -> Self {
        Self {
            name: name.into(),
            bio: bio.into(),
            political_leaning,
            history_path: history_path.into(),
            voting_history: RwLock::new(voting_history),
        }
    }

    /// Load a cardinal's bio and existing history from disk
    ///
    /// A missing bio is fatal. A missing history file means the cardinal
    /// has not voted yet.
    pub fn load(
        name: &str,
        bio_path: &Path,
        history_path: &Path,
        political_leaning: f64,
    ) -> Result<Self, ConclaveError> {
        let bio = fs::read_to_string(bio_path).map_err(|source| ConclaveError::ProfileLoad {
            name: name.to_string(),
            path: bio_path.to_path_buf(),
            source,
        })?;
        let history = load_history(history_path)?;

        debug!(
            cardinal = %name,
            votes = history.len(),
            leaning = political_leaning,
            "Loaded cardinal profile"
        );

        Ok(Self::new(name, bio, political_leaning, history_path, history))
    }

    /// Snapshot of the voting history
    pub fn voting_history(&self) -> Vec<VoteRecord> {
        self.voting_history.read().clone()
    }

    /// Most recent ballot, if any
    pub fn last_vote(&self) -> Option<VoteRecord> {
        self.voting_history.read().last().cloned()
    }

    /// Number of ballots cast
    pub fn votes_cast(&self) -> usize {
        self.voting_history.read().len()
    }

    /// Path of the persisted history
    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Record a ballot and persist the complete history before returning
    ///
    /// The file is rewritten with the full snapshot. If the write fails the
    /// in-memory history is left as it was.
    pub fn append_vote(&self, round: u32, voted_for: &str) -> Result<(), ConclaveError> {
        let mut history = self.voting_history.write();

        if let Some(last) = history.last() {
            if round <= last.round {
                return Err(ConclaveError::HistoryOutOfOrder {
                    cardinal: self.name.clone(),
                    last: last.round,
                    attempted: round,
                });
            }
        }

        history.push(VoteRecord {
            round,
            voted_for: voted_for.to_string(),
        });

        if let Err(e) = write_json_atomic(&self.history_path, history.as_slice()) {
            history.pop();
            return Err(e);
        }

        debug!(cardinal = %self.name, round, voted_for, "Persisted vote");
        Ok(())
    }

    /// Forget every ballot and persist an empty history
    pub fn reset_history(&self) -> Result<(), ConclaveError> {
        let mut history = self.voting_history.write();
        write_json_atomic(&self.history_path, &Vec::<VoteRecord>::new())?;
        history.clear();

        info!(cardinal = %self.name, "Cleared voting history");
        Ok(())
    }
}

fn load_history(path: &Path) -> Result<Vec<VoteRecord>, ConclaveError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConclaveError::persistence(path, e)),
    };

    serde_json::from_slice(&bytes).map_err(|source| ConclaveError::CorruptHistory {
        path: path.to_path_buf(),
        source,
    })
}

/// Shared handle to a cardinal
#[derive(Clone)]
pub struct CardinalHandle {
    inner: Arc<Cardinal>,
}

impl CardinalHandle {
    pub fn new(cardinal: Cardinal) -> Self {
        Self {
            inner: Arc::new(cardinal),
        }
    }
}

impl std::ops::Deref for CardinalHandle {
    type Target = Cardinal;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::fmt::Debug for CardinalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cardinal")
            .field("name", &self.inner.name)
            .field("political_leaning", &self.inner.political_leaning)
            .field("votes_cast", &self.inner.votes_cast())
            .finish()
    }
}
