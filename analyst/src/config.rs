//! Service configuration from `ANALYST_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::actors::conductor::actor::DEFAULT_MAX_RETAINED_RUNS;
use crate::actors::conductor::runtime::{RunPolicy, DEFAULT_MAX_TURNS};
use crate::actors::conductor::WorkerFailurePolicy;
use crate::actors::rag::DEFAULT_TOP_K;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5008";
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 180_000;
pub const DEFAULT_WORKER_MAX_STEPS: usize = 4;
pub const DEFAULT_FILING_PATH: &str = "data/raw/apple_10k.txt";
pub const DEFAULT_FILING_DB: &str = ":memory:";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5174";
pub const DEFAULT_SEARCH_MAX_RESULTS: u32 = 5;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub max_turns: u32,
    pub run_timeout: Duration,
    pub worker_max_steps: usize,
    pub worker_failure: WorkerFailurePolicy,
    pub filing_path: PathBuf,
    /// SQLite path for filing chunks, `:memory:` for an ephemeral index
    pub filing_db: String,
    pub allowed_origins: Vec<String>,
    pub max_retained_runs: usize,
    pub search_max_results: u32,
    /// Filing chunks handed to the answer model per retrieval
    pub retrieval_top_k: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            run_timeout: Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS),
            worker_max_steps: DEFAULT_WORKER_MAX_STEPS,
            worker_failure: WorkerFailurePolicy::Degrade,
            filing_path: PathBuf::from(DEFAULT_FILING_PATH),
            filing_db: DEFAULT_FILING_DB.to_string(),
            allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            max_retained_runs: DEFAULT_MAX_RETAINED_RUNS,
            search_max_results: DEFAULT_SEARCH_MAX_RESULTS,
            retrieval_top_k: DEFAULT_TOP_K,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Unset or blank variables
    /// keep their defaults; unparseable ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let max_turns: u32 = parse_var(&var, "ANALYST_MAX_TURNS", defaults.max_turns)?;
        if max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ANALYST_MAX_TURNS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr: var("ANALYST_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_turns,
            run_timeout: Duration::from_millis(parse_var(
                &var,
                "ANALYST_RUN_TIMEOUT_MS",
                DEFAULT_RUN_TIMEOUT_MS,
            )?),
            worker_max_steps: parse_var(
                &var,
                "ANALYST_WORKER_MAX_STEPS",
                defaults.worker_max_steps,
            )?,
            worker_failure: parse_var(
                &var,
                "ANALYST_WORKER_FAILURE_POLICY",
                defaults.worker_failure,
            )?,
            filing_path: var("ANALYST_FILING_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.filing_path),
            filing_db: var("ANALYST_FILING_DB").unwrap_or(defaults.filing_db),
            allowed_origins: var("ANALYST_ALLOWED_ORIGINS")
                .map(|value| split_origins(&value))
                .unwrap_or(defaults.allowed_origins),
            max_retained_runs: parse_var(
                &var,
                "ANALYST_MAX_RETAINED_RUNS",
                defaults.max_retained_runs,
            )?,
            search_max_results: parse_var(
                &var,
                "ANALYST_SEARCH_MAX_RESULTS",
                defaults.search_max_results,
            )?,
            retrieval_top_k: parse_var(
                &var,
                "ANALYST_RETRIEVAL_TOP_K",
                defaults.retrieval_top_k,
            )?,
        })
    }

    pub fn run_policy(&self) -> RunPolicy {
        RunPolicy {
            max_turns: self.max_turns,
            run_timeout: self.run_timeout,
            worker_failure: self.worker_failure,
        }
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                name,
                value,
                reason: e.to_string(),
            }),
    }
}

fn split_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToString::to_string)
        .collect()
}
