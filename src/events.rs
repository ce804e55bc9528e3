//! Election events for observers of a running conclave

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Why a cardinal's ballot was substituted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    /// The oracle answered with something that is not a roster name
    InvalidResponse { raw: String },
    /// The oracle request failed or timed out
    OracleFailure { error: String },
}

/// Where a substituted ballot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSource {
    /// Repeat of the cardinal's most recent ballot
    PriorVote,
    /// Best-supported frontrunner of the previous round
    Frontrunner,
    /// Uniform draw from the roster
    Random,
}

/// A substituted ballot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fallback {
    pub reason: FallbackReason,
    pub source: FallbackSource,
}

/// Something that happened during the election
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConclaveEvent {
    RoundStarted {
        round: u32,
        electors: usize,
    },
    VoteCast {
        round: u32,
        cardinal: String,
        voted_for: String,
        fallback: Option<Fallback>,
    },
    RoundCompleted {
        round: u32,
        votes: Vec<(String, usize)>,
        winner: Option<String>,
    },
    PopeElected {
        round: u32,
        name: String,
    },
    /// Round budget spent without a winner
    Exhausted {
        rounds: u32,
    },
}

/// Sending half held by the coordinator
///
/// Emitting never fails; events are dropped once the observer goes away.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ConclaveEvent>>,
}

impl EventSink {
    /// A sink nobody listens to
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ConclaveEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Receiving half for an observer
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ConclaveEvent>,
}

impl EventStream {
    /// Wait for the next event; `None` once the coordinator is gone
    pub async fn recv(&mut self) -> Option<ConclaveEvent> {
        self.rx.recv().await
    }

    /// Next event if one is queued
    pub fn try_recv(&mut self) -> Option<ConclaveEvent> {
        self.rx.try_recv().ok()
    }

    /// Everything queued so far
    pub fn drain(&mut self) -> Vec<ConclaveEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Create a connected sink and stream
pub fn channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx: Some(tx) }, EventStream { rx })
}
