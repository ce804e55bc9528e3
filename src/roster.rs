//! The fixed roster of voting cardinals

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cardinal::{Cardinal, CardinalHandle};
use crate::error::ConclaveError;

/// One record of the roster manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub bio_file: PathBuf,
    pub voting_history_file: PathBuf,
    /// Expected in [-1.0, 1.0]; not clamped here
    pub political_leaning: f64,
}

/// Ordered, immutable set of cardinals taking part in the election
///
/// Order follows the manifest and determines voting order within a round.
#[derive(Debug, Clone)]
pub struct Roster {
    cardinals: Vec<CardinalHandle>,
}

impl Roster {
    /// Build a roster, rejecting duplicate names
    pub fn new(cardinals: Vec<Cardinal>) -> Result<Self, ConclaveError> {
        let mut seen = HashSet::new();
        for cardinal in &cardinals {
            if !seen.insert(cardinal.name.as_str()) {
                return Err(ConclaveError::ConfigError(format!(
                    "Duplicate cardinal name: {}",
                    cardinal.name
                )));
            }
        }

        Ok(Self {
            cardinals: cardinals.into_iter().map(CardinalHandle::new).collect(),
        })
    }

    /// Cardinals in roster order
    pub fn cardinals(&self) -> &[CardinalHandle] {
        &self.cardinals
    }

    /// Names in roster order
    pub fn names(&self) -> Vec<String> {
        self.cardinals.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a cardinal by exact name
    pub fn get(&self, name: &str) -> Option<&CardinalHandle> {
        self.cardinals.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.cardinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cardinals.is_empty()
    }

    /// Whether any cardinal already carries ballots from an earlier run
    pub fn has_history(&self) -> bool {
        self.cardinals.iter().any(|c| c.votes_cast() > 0)
    }

    /// Clear every cardinal's persisted history
    pub fn reset_histories(&self) -> Result<(), ConclaveError> {
        for cardinal in &self.cardinals {
            cardinal.reset_history()?;
        }
        info!(cardinals = self.len(), "Reset all voting histories");
        Ok(())
    }
}

/// Read the roster manifest and eagerly load every cardinal's profile
pub fn load_all(manifest_path: &Path) -> Result<Roster, ConclaveError> {
    let data = fs::read(manifest_path).map_err(|e| ConclaveError::Manifest {
        path: manifest_path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_slice(&data).map_err(|e| ConclaveError::Manifest {
            path: manifest_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let cardinals = entries
        .iter()
        .map(|entry| {
            Cardinal::load(
                &entry.name,
                &entry.bio_file,
                &entry.voting_history_file,
                entry.political_leaning,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let roster = Roster::new(cardinals)?;
    info!(
        manifest = %manifest_path.display(),
        cardinals = roster.len(),
        "Loaded roster"
    );
    Ok(roster)
}
