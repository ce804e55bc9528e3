//! Round ledger - durable per-round vote tallies

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConclaveError;
use crate::storage::write_json_atomic;

/// Votes needed to win with `roster_size` electors: floor(2n/3) + 1
pub const fn supermajority_threshold(roster_size: usize) -> usize {
    roster_size * 2 / 3 + 1
}

/// Vote counts for one round, in the order candidates first received a vote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tally(IndexMap<String, usize>);

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one vote for `candidate`
    pub fn record(&mut self, candidate: &str) {
        *self.0.entry(candidate.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, candidate: &str) -> usize {
        self.0.get(candidate).copied().unwrap_or(0)
    }

    /// Total ballots counted
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Candidates with their counts, in first-vote order
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Number of distinct candidates that received a vote
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First candidate, in first-vote order, whose count reaches `threshold`
    pub fn first_reaching(&self, threshold: usize) -> Option<&str> {
        self.iter()
            .find(|(_, count)| *count >= threshold)
            .map(|(name, _)| name)
    }

    /// Candidates by descending count; ties keep first-vote order
    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tally {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for vote in iter {
            tally.record(vote.as_ref());
        }
        tally
    }
}

/// Result of one completed round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round_number: u32,
    pub votes: Tally,
    pub winner: Option<String>,
}

impl RoundOutcome {
    /// Build an outcome, electing the first candidate that reaches the
    /// supermajority for `roster_size` electors
    pub fn from_tally(round_number: u32, votes: Tally, roster_size: usize) -> Self {
        let winner = votes
            .first_reaching(supermajority_threshold(roster_size))
            .map(str::to_string);
        Self {
            round_number,
            votes,
            winner,
        }
    }
}

/// Directory of `round_{n}_results.json` files, one per round
pub struct RoundLedger {
    dir: PathBuf,
}

impl RoundLedger {
    /// Open a ledger rooted at `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConclaveError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ConclaveError::persistence(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, round_number: u32) -> PathBuf {
        self.dir.join(format!("round_{round_number}_results.json"))
    }

    /// Store an outcome, replacing any earlier one for the same round
    pub fn save(&self, outcome: &RoundOutcome) -> Result<(), ConclaveError> {
        let path = self.path_for(outcome.round_number);
        write_json_atomic(&path, outcome)?;
        debug!(round = outcome.round_number, path = %path.display(), "Saved round outcome");
        Ok(())
    }

    /// Outcome of `round_number`, if recorded
    pub fn get(&self, round_number: u32) -> Result<Option<RoundOutcome>, ConclaveError> {
        let path = self.path_for(round_number);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConclaveError::persistence(&path, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ConclaveError::persistence(&path, std::io::Error::new(ErrorKind::InvalidData, e)))
    }

    /// Outcome with the highest round number on disk
    ///
    /// Gaps in the numbering are fine; this is a max over what exists.
    pub fn latest(&self) -> Result<Option<RoundOutcome>, ConclaveError> {
        match self.round_numbers()?.into_iter().max() {
            Some(n) => self.get(n),
            None => Ok(None),
        }
    }

    /// Every round number with a stored outcome, unordered
    pub fn round_numbers(&self) -> Result<Vec<u32>, ConclaveError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| ConclaveError::persistence(&self.dir, e))?;

        let mut rounds = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConclaveError::persistence(&self.dir, e))?;
            if let Some(n) = entry.file_name().to_str().and_then(parse_round_file_name) {
                rounds.push(n);
            }
        }
        Ok(rounds)
    }

    /// Remove every stored outcome
    pub fn clear(&self) -> Result<(), ConclaveError> {
        let rounds = self.round_numbers()?;
        for n in &rounds {
            let path = self.path_for(*n);
            fs::remove_file(&path).map_err(|e| ConclaveError::persistence(&path, e))?;
        }
        info!(dir = %self.dir.display(), removed = rounds.len(), "Cleared round ledger");
        Ok(())
    }
}

fn parse_round_file_name(name: &str) -> Option<u32> {
    name.strip_prefix("round_")?
        .strip_suffix("_results.json")?
        .parse()
        .ok()
}
