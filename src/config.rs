//! Simulation configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConclaveError;

pub const DEFAULT_LOCAL_URL: &str = "http://127.0.0.1:1234";
pub const DEFAULT_HOSTED_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_TEMPERATURE: f64 = 0.4;
pub const DEFAULT_MAX_ROUNDS: u32 = 30;
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Which text-generation backend answers the voting prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    /// Hosted chat-completions API
    #[default]
    Hosted,
    /// OpenAI-compatible server on a local endpoint
    Local,
}

/// Oracle backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub hosted_url: String,
    pub local_url: String,
    pub model: String,
    pub temperature: f64,
    /// Bearer token for the hosted provider
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::default(),
            hosted_url: DEFAULT_HOSTED_URL.to_string(),
            local_url: DEFAULT_LOCAL_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            api_key: None,
        }
    }
}

impl OracleConfig {
    /// Local endpoint at `url`
    pub fn local(url: impl Into<String>) -> Self {
        Self {
            provider: OracleProvider::Local,
            local_url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn validate(&self) -> Result<(), ConclaveError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConclaveError::ConfigError(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.provider == OracleProvider::Hosted && self.api_key.is_none() {
            return Err(ConclaveError::ConfigError(
                "hosted provider requires an API key (set OPENAI_API_KEY)".into(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to run one simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Roster manifest (JSON list of cardinals)
    pub manifest_path: PathBuf,
    /// Directory holding one JSON file per completed round
    pub results_dir: PathBuf,
    pub max_rounds: u32,
    pub oracle: OracleConfig,
    /// Seed for fallback randomness; entropy when absent
    pub seed: Option<u64>,
    /// Upper bound on a single oracle request
    #[serde(with = "duration_secs")]
    pub oracle_timeout: Duration,
    /// Clear histories and round results before the first round
    pub fresh: bool,
}

impl SimulationConfig {
    /// Defaults for a manifest, with results stored next to it
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        let manifest_path = manifest_path.into();
        let results_dir = default_results_dir(&manifest_path);
        Self {
            manifest_path,
            results_dir,
            max_rounds: DEFAULT_MAX_ROUNDS,
            oracle: OracleConfig::default(),
            seed: None,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            fresh: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConclaveError> {
        if self.max_rounds == 0 {
            return Err(ConclaveError::ConfigError("max_rounds must be at least 1".into()));
        }
        if self.oracle_timeout.is_zero() {
            return Err(ConclaveError::ConfigError("oracle timeout must be non-zero".into()));
        }
        self.oracle.validate()
    }
}

/// `round_results/` beside the manifest
pub fn default_results_dir(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("round_results")
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
