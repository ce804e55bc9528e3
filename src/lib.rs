//! # Conclave
//!
//! Papal conclave simulation - cardinals vote round after round until one
//! of them holds a two-thirds supermajority.
//!
//! Each cardinal's ballot is decided by a language model prompted with the
//! cardinal's biography, political leaning and the running state of the
//! election.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        CONCLAVE (coordinator)                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐               │
//! │  │ Prompt Build │  │ Fallback Pol.│  │ Frontrunners │               │
//! │  └──────────────┘  └──────────────┘  └──────────────┘               │
//! └──────┬──────────────────┬───────────────────┬───────────────────┬───┘
//!        │                  │                   │                   │
//!        ▼                  ▼                   ▼                   ▼
//!  ┌───────────┐     ┌─────────────┐     ┌─────────────┐     ┌───────────┐
//!  │  Roster   │     │   Oracle    │     │  Resolver   │     │  Ledger   │
//!  │ (history) │     │ hosted/local│     │ (names)     │     │ (rounds)  │
//!  └───────────┘     └─────────────┘     └─────────────┘     └───────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Cardinal**: a voter with a fixed profile and a growing ballot history
//! - **Roster**: the fixed, ordered set of cardinals eligible to vote and be voted for
//! - **Oracle**: the text-generation backend that answers each ballot prompt
//! - **Fallback vote**: a substitute ballot when the oracle fails or answers nonsense
//! - **Ledger**: one durable outcome per completed round

pub mod cardinal;
pub mod conclave;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod oracle;
pub mod prompt;
pub mod resolver;
pub mod roster;
pub mod storage;

pub use cardinal::{Cardinal, CardinalHandle, VoteRecord};
pub use conclave::{Conclave, ConclaveOptions, ElectionState, Frontrunners};
pub use config::{OracleConfig, OracleProvider, SimulationConfig};
pub use error::{ConclaveError, OracleError};
pub use events::{ConclaveEvent, EventSink, EventStream};
pub use ledger::{supermajority_threshold, RoundLedger, RoundOutcome, Tally};
pub use oracle::{DecisionOracle, Oracle};
pub use roster::{load_all, ManifestEntry, Roster};
