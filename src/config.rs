use crate::ledger::ConfirmationState;
use anyhow::{anyhow, Context};
use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NODE: &str = "http://nodes.nectar.iota.cafe";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// bootstrap node used to find the discovery seed
    pub node: String,
    pub nbr_nodes: usize,
    /// neighbors of the bootstrap node to draw the discovery seed from
    pub seed_candidates: usize,
    pub stagger_ms: u64,
    pub http_timeout_secs: u64,
    pub discovery: DiscoveryConfig,
    pub wallet_store: WalletStoreConfig,
    pub stats_output: Option<PathBuf>,
    pub engine: EngineSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: DEFAULT_NODE.to_string(),
            nbr_nodes: 5,
            seed_candidates: 8,
            stagger_ms: 2_000,
            http_timeout_secs: 60,
            discovery: DiscoveryConfig::default(),
            wallet_store: WalletStoreConfig::default(),
            stats_output: None,
            engine: EngineSettings::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| {
            format!("Cannot read config file {path}", path = path.display())
        })?;
        let config: Config = serde_yaml::from_reader(file).with_context(|| {
            format!("Cannot parse config file {path}", path = path.display())
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.nbr_nodes == 0 {
            return Err(anyhow!("nbr_nodes must be at least 1"));
        }
        if self.engine.fan_out == 0 {
            return Err(anyhow!("engine.fan_out must be at least 1"));
        }
        if self.engine.fan_out > u16::MAX as usize {
            return Err(anyhow!("engine.fan_out does not fit in one split transaction"));
        }
        if self.engine.confirmation.poll_attempts == 0 {
            return Err(anyhow!("engine.confirmation.poll_attempts must be at least 1"));
        }
        if self.engine.submit_retry.max_attempts == 0 || self.engine.post_retry.max_attempts == 0 {
            return Err(anyhow!("retry policies need at least one attempt"));
        }
        Ok(())
    }

    /// Command line values win over the file.
    pub fn apply_overrides(
        &mut self,
        node: Option<String>,
        nbr_nodes: Option<usize>,
        use_rate_setter: Option<bool>,
    ) {
        if let Some(node) = node {
            self.node = node;
        }
        if let Some(nbr_nodes) = nbr_nodes {
            self.nbr_nodes = nbr_nodes;
        }
        if let Some(enabled) = use_rate_setter {
            self.engine.rate_governor.enabled = enabled;
        }
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DiscoveryConfig {
    /// web API port assumed on every neighbor host
    pub api_port: u16,
    pub min_access_mana: f64,
    pub require_stake_check: bool,
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            api_port: 8080,
            min_access_mana: 9_000_000.0,
            require_stake_check: true,
            timeout_secs: 5,
        }
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WalletStoreConfig {
    pub path: PathBuf,
    pub lock_attempts: u32,
    pub lock_retry_ms: u64,
}

impl Default for WalletStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("wallets.dat"),
            lock_attempts: 100,
            lock_retry_ms: 100,
        }
    }
}

/// Minimum confirmation state an output needs before it is spent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalityLevel {
    Accepted,
    Confirmed,
}

impl FinalityLevel {
    pub fn is_reached_by(&self, state: ConfirmationState) -> bool {
        match self {
            FinalityLevel::Accepted => state >= ConfirmationState::Accepted,
            FinalityLevel::Confirmed => state >= ConfirmationState::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// overall budget across all attempts, unlimited when unset
    pub max_elapsed_secs: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1_000,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            max_elapsed_secs: Some(3_600),
        }
    }
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            max_elapsed_secs: None,
        }
    }

    /// Pauses between attempts: doubling from `initial_backoff_ms` up to the cap, one
    /// fewer than `max_attempts`.
    pub fn to_backoff_builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_backoff_ms))
            .with_max_delay(Duration::from_millis(self.max_backoff_ms))
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ConfirmationConfig {
    pub finality: FinalityLevel,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            finality: FinalityLevel::Accepted,
            poll_attempts: 20_000,
            poll_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateGovernorConfig {
    pub enabled: bool,
    pub max_delay_ms: u64,
}

impl Default for RateGovernorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_delay_ms: 5_000,
        }
    }
}

/// Read-only settings shared by every session.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineSettings {
    /// size of the output set
    pub fan_out: usize,
    pub loop_count: u64,
    pub faucet_amount: Option<u64>,
    pub confirmation: ConfirmationConfig,
    pub rate_governor: RateGovernorConfig,
    /// faucet requests and split submissions
    pub submit_retry: RetryPolicy,
    /// per slot submissions of a batch
    pub post_retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fan_out: 100,
            loop_count: 100,
            faucet_amount: None,
            confirmation: ConfirmationConfig::default(),
            rate_governor: RateGovernorConfig::default(),
            submit_retry: RetryPolicy::default(),
            post_retry: RetryPolicy::once(),
        }
    }
}
