//! Chain module - static network metadata and JSON-RPC access
//!
//! Network metadata is loaded once from configuration. Providers are only
//! created for chains with RPC URLs configured.

pub mod provider;

pub use provider::ChainProvider;

use crate::config::{ChainConfig, Settings};
use crate::error::{DeskError, DeskResult};

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tracing::{info, warn};

/// What the desk needs to know about a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    pub multisend: Address,
    pub safe_transaction_service: String,
}

impl NetworkInfo {
    pub fn from_config(config: &ChainConfig) -> anyhow::Result<Self> {
        Ok(Self {
            chain_id: config.chain_id,
            name: config.name.clone(),
            native_symbol: config.native_symbol.clone(),
            multisend: config.multisend()?,
            safe_transaction_service: config.safe_transaction_service.clone(),
        })
    }
}

/// Registry of every enabled chain
pub struct ChainRegistry {
    networks: DashMap<u64, NetworkInfo>,
    /// Chain providers indexed by chain ID
    providers: DashMap<u64, Arc<ChainProvider>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self {
            networks: DashMap::new(),
            providers: DashMap::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let registry = Self::new();

        for (name, chain_config) in settings.enabled_chains() {
            info!(
                "Registering chain {} (ID: {})",
                chain_config.name, chain_config.chain_id
            );
            registry.insert(NetworkInfo::from_config(chain_config)?);

            if chain_config.rpc_urls.is_empty() {
                warn!("Chain {} has no RPC provider", name);
                continue;
            }
            match ChainProvider::new(chain_config) {
                Ok(provider) => registry.insert_provider(Arc::new(provider)),
                Err(e) => warn!("Chain {} provider unavailable: {}", name, e),
            }
        }

        Ok(registry)
    }

    pub fn insert(&self, network: NetworkInfo) {
        self.networks.insert(network.chain_id, network);
    }

    pub fn insert_provider(&self, provider: Arc<ChainProvider>) {
        self.providers.insert(provider.chain_id(), provider);
    }

    pub fn network(&self, chain_id: u64) -> DeskResult<NetworkInfo> {
        self.networks
            .get(&chain_id)
            .map(|n| n.clone())
            .ok_or(DeskError::UnknownChain { chain_id })
    }

    pub fn native_symbol(&self, chain_id: u64) -> DeskResult<String> {
        self.network(chain_id).map(|n| n.native_symbol)
    }

    pub fn provider(&self, chain_id: u64) -> DeskResult<Arc<ChainProvider>> {
        self.providers
            .get(&chain_id)
            .map(|p| p.clone())
            .ok_or(DeskError::UnknownChain { chain_id })
    }

    /// Get all registered chain IDs
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.networks.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}
