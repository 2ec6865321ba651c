//! Node configuration loaded from environment variables.
//!
//! All optional: `RANDMINT_ADDR`, `RANDMINT_NETWORK`, `RANDMINT_KEY_HASH`,
//! `RANDMINT_FEE`, `RANDMINT_INITIAL_FUNDS`, `RANDMINT_POLL_INITIAL_MS`,
//! `RANDMINT_POLL_MAX_MS`, `RANDMINT_MAX_WAIT_MS`,
//! `RANDMINT_ENGINE_INTERVAL_MS`, `RANDMINT_MOCK_AUTOFULFIL_MS`

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use randmint_core::{BackoffPolicy, KeyHash, StrategyParams};
use randmint_oracle::MockConfig;
use randmint_workflow::CoordinatorConfig;

/// Key hash of the oracle proving key used on every preset network.
const DEFAULT_KEY_HASH: &str = "0x474e34a077df58807dbe9c96d3c009b23b3c6d0cce433e59bbf5b34f823bc56c";

/// 0.01 of an 18-decimal fee token.
const DEFAULT_FEE: u64 = 10_000_000_000_000_000;

/// One whole 18-decimal fee token.
const DEFAULT_INITIAL_FUNDS: u64 = 1_000_000_000_000_000_000;

/// Floor for the background engine's tick.
const MIN_ENGINE_INTERVAL: Duration = Duration::from_millis(10);

/// Network presets selecting the default oracle parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Localhost,
    Sepolia,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Localhost => 31337,
            Network::Sepolia => 11155111,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Localhost => "localhost",
            Network::Sepolia => "sepolia",
        }
    }

    /// Default strategy parameters for this network.
    ///
    /// Both presets share one proving key and fee.
    pub fn default_params(&self) -> StrategyParams {
        let key_hash = KeyHash::parse(DEFAULT_KEY_HASH).expect("preset key hash is valid");
        StrategyParams::new(DEFAULT_FEE, key_hash)
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "localhost" | "hardhat" | "31337" => Ok(Network::Localhost),
            "sepolia" | "11155111" => Ok(Network::Sepolia),
            other => bail!("unknown network '{other}'"),
        }
    }
}

/// Configuration for the randmint node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the HTTP server binds to.
    pub addr: SocketAddr,

    /// Network preset.
    pub network: Network,

    /// Parameters used when a request does not specify its own.
    pub default_params: StrategyParams,

    /// Opening balance of the fee account.
    pub initial_funds: u64,

    /// Poll schedule and wait budget for waiting callers.
    pub backoff: BackoffPolicy,

    /// How often the background engine completes fulfilled requests.
    pub engine_interval: Duration,

    /// Mock coordinator auto-fulfilment delay; `None` waits for callbacks.
    pub mock_auto_fulfil: Option<Duration>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let network = Network::Localhost;
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            network,
            default_params: network.default_params(),
            initial_funds: DEFAULT_INITIAL_FUNDS,
            backoff: BackoffPolicy::default(),
            engine_interval: Duration::from_millis(1_000),
            mock_auto_fulfil: None,
        }
    }
}

impl NodeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let addr = match lookup("RANDMINT_ADDR") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid RANDMINT_ADDR: {v}"))?,
            None => defaults.addr,
        };

        let network: Network = match lookup("RANDMINT_NETWORK") {
            Some(v) => v.parse()?,
            None => defaults.network,
        };

        let mut default_params = network.default_params();
        if let Some(v) = lookup("RANDMINT_KEY_HASH") {
            default_params.key_hash =
                KeyHash::parse(&v).with_context(|| format!("invalid RANDMINT_KEY_HASH: {v}"))?;
        }
        if let Some(v) = lookup("RANDMINT_FEE") {
            default_params.fee = v
                .parse()
                .with_context(|| format!("invalid RANDMINT_FEE: {v}"))?;
        }
        default_params
            .validate()
            .context("invalid default strategy parameters")?;

        let initial_funds = parse_or(&lookup, "RANDMINT_INITIAL_FUNDS", defaults.initial_funds);

        let backoff = BackoffPolicy {
            initial_delay_ms: parse_or(&lookup, "RANDMINT_POLL_INITIAL_MS", defaults.backoff.initial_delay_ms),
            max_delay_ms: parse_or(&lookup, "RANDMINT_POLL_MAX_MS", defaults.backoff.max_delay_ms),
            max_wait_ms: parse_or(&lookup, "RANDMINT_MAX_WAIT_MS", defaults.backoff.max_wait_ms),
            ..defaults.backoff
        };

        let engine_interval = Duration::from_millis(parse_or(
            &lookup,
            "RANDMINT_ENGINE_INTERVAL_MS",
            defaults.engine_interval.as_millis() as u64,
        ))
        .max(MIN_ENGINE_INTERVAL);

        let mock_auto_fulfil = lookup("RANDMINT_MOCK_AUTOFULFIL_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis);

        Ok(Self {
            addr,
            network,
            default_params,
            initial_funds,
            backoff,
            engine_interval,
            mock_auto_fulfil,
        })
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            backoff: self.backoff.clone(),
            ..CoordinatorConfig::default()
        }
    }

    pub fn mock_config(&self) -> MockConfig {
        MockConfig {
            auto_fulfil_after: self.mock_auto_fulfil,
            ..MockConfig::default()
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
