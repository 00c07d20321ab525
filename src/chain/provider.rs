//! Chain provider with multi-RPC support and automatic failover

use crate::config::ChainConfig;
use crate::error::{LifecycleError, LifecycleResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    chain_id: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    confirmation_blocks: u64,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl ChainProvider {
    pub fn new(config: &ChainConfig) -> LifecycleResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(500)));
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => warn!("Failed to create provider for {}: {}", url, e),
            }
        }

        if http_providers.is_empty() {
            return Err(LifecycleError::upstream(format!(
                "No valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        Ok(Self {
            chain_id: config.chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
            confirmation_blocks: config.confirmation_blocks,
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            poll_interval: Duration::from_secs(2),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn get_block_number(&self) -> LifecycleResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!("Failed to get block number from chain {}: {}", self.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(LifecycleError::upstream(format!(
            "All providers failed for chain {}",
            self.chain_id
        )))
    }

    /// Whether contract code exists at `address`
    pub async fn is_deployed(&self, address: Address) -> LifecycleResult<bool> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_code(address, None).await {
                Ok(code) => return Ok(!code.is_empty()),
                Err(e) => {
                    warn!("Failed to get code from chain {}: {}", self.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(LifecycleError::upstream(format!(
            "All providers failed to get code on chain {}",
            self.chain_id
        )))
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> LifecycleResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| LifecycleError::upstream(e.to_string()))
    }

    /// Poll until `tx_hash` has a receipt with enough confirmations
    pub async fn wait_for_receipt(&self, tx_hash: H256) -> LifecycleResult<TransactionReceipt> {
        let wait = async {
            loop {
                match self.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => {
                        if let Some(block) = receipt.block_number {
                            let current: u64 = self.get_block_number().await?;
                            let confirmations = current.saturating_sub(block.as_u64()) + 1;
                            if confirmations >= self.confirmation_blocks {
                                return LifecycleResult::Ok(receipt);
                            }
                            debug!(
                                "Transaction {:?} has {} / {} confirmations on chain {}",
                                tx_hash, confirmations, self.confirmation_blocks, self.chain_id
                            );
                        }
                    }
                    Ok(None) => debug!("Transaction {:?} not yet mined", tx_hash),
                    Err(e) => {
                        warn!("Receipt lookup failed on chain {}: {}", self.chain_id, e);
                        self.failover();
                    }
                }
                sleep(self.poll_interval).await;
            }
        };

        match timeout(self.receipt_timeout, wait).await {
            Ok(result) => {
                if result.is_ok() {
                    info!("Transaction {:?} confirmed on chain {}", tx_hash, self.chain_id);
                }
                result
            }
            Err(_) => Err(LifecycleError::upstream(format!(
                "Timed out waiting for receipt of {:?}",
                tx_hash
            ))),
        }
    }
}
