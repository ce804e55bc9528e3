//! Conclave simulation CLI
//!
//! ```bash
//! # Hosted provider (needs OPENAI_API_KEY)
//! conclave --manifest data/cardinals.json
//!
//! # Local OpenAI-compatible server
//! conclave --local --url http://127.0.0.1:1234 --temperature 0.7 --fresh
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use conclave::config::{default_results_dir, DEFAULT_LOCAL_URL, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use conclave::events::{self, ConclaveEvent};
use conclave::{Conclave, OracleConfig, OracleProvider, SimulationConfig};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Run a papal conclave simulation", long_about = None)]
struct Args {
    /// Use a local LLM endpoint instead of the hosted provider
    #[arg(long, default_value_t = false)]
    local: bool,

    /// Local LLM endpoint URL
    #[arg(long, default_value = DEFAULT_LOCAL_URL)]
    url: String,

    /// Sampling temperature
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f64,

    /// Model name for the hosted provider
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// API key for the hosted provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Roster manifest
    #[arg(long, default_value = "data/cardinals.json")]
    manifest: PathBuf,

    /// Directory for per-round results (defaults to round_results/ beside the manifest)
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Give up after this many rounds
    #[arg(long, default_value_t = 30)]
    max_rounds: u32,

    /// Seed for fallback randomness
    #[arg(long)]
    seed: Option<u64>,

    /// Per-request oracle timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Clear voting histories and round results before starting
    #[arg(long, default_value_t = false)]
    fresh: bool,
}

impl Args {
    fn into_config(self) -> SimulationConfig {
        let results_dir = self
            .results_dir
            .unwrap_or_else(|| default_results_dir(&self.manifest));

        SimulationConfig {
            results_dir,
            max_rounds: self.max_rounds,
            oracle: OracleConfig {
                provider: if self.local {
                    OracleProvider::Local
                } else {
                    OracleProvider::Hosted
                },
                local_url: self.url,
                model: self.model,
                temperature: self.temperature,
                api_key: self.api_key,
                ..Default::default()
            },
            seed: self.seed,
            oracle_timeout: Duration::from_secs(self.timeout_secs),
            fresh: self.fresh,
            manifest_path: self.manifest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config();
    let max_rounds = config.max_rounds;

    let (sink, mut stream) = events::channel();
    let mut conclave = Conclave::from_config(&config)
        .context("failed to set up the conclave")?
        .with_events(sink);

    let printer = tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            if let ConclaveEvent::RoundCompleted { round, votes, winner } = event {
                let leader = votes.iter().max_by_key(|(_, count)| *count);
                match (winner, leader) {
                    (Some(name), _) => println!("Round {round}: {name} elected"),
                    (None, Some((name, count))) => {
                        println!("Round {round}: no winner, {name} leads with {count} votes")
                    }
                    (None, None) => println!("Round {round}: no votes"),
                }
            }
        }
    });

    let result = conclave
        .run_simulation(max_rounds)
        .await
        .context("simulation aborted")?;
    drop(conclave);
    let _ = printer.await;

    match result {
        Some(pope) => println!("\nConclave has elected {pope} as the new Pope!"),
        None => println!("\nConclave failed to elect a new Pope within {max_rounds} rounds."),
    }

    Ok(())
}
