//! Configuration management for the swap desk
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Safe MultiSendCallOnly v1.3.0 canonical deployment
pub const DEFAULT_MULTISEND_ADDRESS: &str = "0x40A2aCCbd92BCA938b02010E17A5b8929b49130D";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub desk: DeskConfig,
    pub route: RouteConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeskConfig {
    /// How long an accepted quote stays valid
    #[serde(default = "default_validity_window")]
    pub validity_window_secs: u32,
    /// Countdown tick period
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            validity_window_secs: default_validity_window(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_validity_window() -> u32 {
    30
}

fn default_tick_interval() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub base_url: String,
    pub integrator_id: String,
    #[serde(default = "default_route_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub enable_boost: bool,
    #[serde(default = "default_slippage_mode")]
    pub slippage_auto_mode: u8,
    pub fees: Option<FeeCollectionConfig>,
}

fn default_route_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_slippage_mode() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeCollectionConfig {
    pub integrator_address: String,
    /// Integrator fee in basis points
    pub fee_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub safe_transaction_service: String,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_multisend")]
    pub multisend_address: String,
    #[serde(default = "default_confirmation_blocks")]
    pub confirmation_blocks: u64,
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
    pub enabled: bool,
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_multisend() -> String {
    DEFAULT_MULTISEND_ADDRESS.to_string()
}

fn default_confirmation_blocks() -> u64 {
    1
}

fn default_receipt_timeout() -> u64 {
    300
}

impl ChainConfig {
    pub fn multisend(&self) -> Result<Address> {
        self.multisend_address
            .parse()
            .with_context(|| format!("Invalid multisend address for chain {}", self.name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    /// Environment variable holding a hex private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

fn default_private_key_env() -> String {
    "SWAPDESK_PRIVATE_KEY".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9102
}

impl Settings {
    /// Load settings from the file named by `SWAPDESK_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("SWAPDESK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        if self.desk.validity_window_secs == 0 {
            anyhow::bail!("Quote validity window must be positive");
        }

        if self.desk.tick_interval_ms == 0 {
            anyhow::bail!("Countdown tick interval must be positive");
        }

        if self.route.base_url.is_empty() {
            anyhow::bail!("Route service base_url is empty");
        }

        if let Some(fees) = &self.route.fees {
            fees.integrator_address
                .parse::<Address>()
                .with_context(|| "Invalid fee integrator address")?;
            if fees.fee_bps > 100 {
                anyhow::bail!("Integrator fee of {} bps exceeds 1%", fees.fee_bps);
            }
        }

        for (name, chain) in &self.chains {
            if chain.enabled {
                if chain.safe_transaction_service.is_empty() {
                    anyhow::bail!("Chain {} has no Safe transaction service configured", name);
                }
                if chain.rpc_urls.is_empty() {
                    tracing::warn!("Chain {} has no RPC URLs - on-chain execution disabled", name);
                }
                chain.multisend()?;
            }
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
