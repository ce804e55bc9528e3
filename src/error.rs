//! Conclave error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a simulation run
#[derive(Debug, Error)]
pub enum ConclaveError {
    /// A cardinal's biography could not be read
    #[error("Failed to load profile for {name} from {}: {source}", path.display())]
    ProfileLoad {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The roster manifest is missing or malformed
    #[error("Invalid roster manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    /// A voting history could not be parsed
    #[error("Corrupt voting history {}: {source}", path.display())]
    CorruptHistory {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A history or ledger write failed
    #[error("Persistence error at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A vote would break the strictly increasing round order of a history
    #[error("Cardinal {cardinal} already voted in round {last}, cannot record round {attempted}")]
    HistoryOutOfOrder {
        cardinal: String,
        last: u32,
        attempted: u32,
    },

    /// A round was requested after a pope was already elected
    #[error("Election is over: {0} was elected")]
    ElectionOver(String),

    /// A round was requested after the round cap was reached
    #[error("No rounds left: the limit of {0} rounds was reached without a winner")]
    RoundBudgetSpent(u32),

    /// No cardinals to run an election with
    #[error("Roster is empty")]
    EmptyRoster,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Failures of a single oracle request
///
/// These never escape a voting round; the coordinator converts them into
/// fallback votes.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Connection or transport failure
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// No answer within the configured bound
    #[error("No response within {0:?}")]
    Timeout(std::time::Duration),
}

impl ConclaveError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}
