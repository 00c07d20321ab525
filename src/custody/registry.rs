//! Per-chain custody services

use super::{
    AccountInfo, CustodyService, ExecutionReceipt, LocalSigner, Proposal, SafeExecutor,
    SafeServiceClient, ServiceTransaction, TransactionRecord, TxFilters,
};
use crate::chain::ChainRegistry;
use crate::error::{DeskError, DeskResult, LifecycleError, LifecycleResult};

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::{Address, Bytes, H256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transaction service plus, when a wallet and RPC are available, an executor
pub struct SafeCustody {
    service: SafeServiceClient,
    executor: Option<SafeExecutor>,
}

impl SafeCustody {
    pub fn new(service: SafeServiceClient, executor: Option<SafeExecutor>) -> Self {
        Self { service, executor }
    }

    fn executor(&self) -> LifecycleResult<&SafeExecutor> {
        self.executor.as_ref().ok_or(LifecycleError::SignerUnavailable)
    }
}

#[async_trait]
impl CustodyService for SafeCustody {
    fn chain_id(&self) -> u64 {
        self.service.chain_id()
    }

    async fn accounts_by_owner(&self, owner: Address) -> LifecycleResult<Vec<Address>> {
        self.service.accounts_by_owner(owner).await
    }

    async fn account_info(&self, address: Address) -> LifecycleResult<AccountInfo> {
        self.service.account_info(address).await
    }

    async fn list_transactions(
        &self,
        address: Address,
        filters: TxFilters,
    ) -> LifecycleResult<Vec<TransactionRecord>> {
        self.service.list_transactions(address, filters).await
    }

    async fn propose_transaction(&self, proposal: &Proposal) -> LifecycleResult<()> {
        self.service.propose_transaction(proposal).await
    }

    async fn confirm_transaction(&self, safe_tx_hash: H256, signature: Bytes) -> LifecycleResult<()> {
        self.service.confirm_transaction(safe_tx_hash, signature).await
    }

    async fn get_transaction(&self, safe_tx_hash: H256) -> LifecycleResult<ServiceTransaction> {
        self.service.get_transaction(safe_tx_hash).await
    }

    async fn execute_transaction(&self, safe_tx_hash: H256) -> LifecycleResult<H256> {
        let executor = self.executor()?;
        let tx = self.service.get_transaction(safe_tx_hash).await?;

        if tx.is_executed {
            return Err(LifecycleError::upstream(format!(
                "Transaction {:?} was already executed",
                safe_tx_hash
            )));
        }

        executor.execute(&tx).await
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> LifecycleResult<ExecutionReceipt> {
        self.executor()?.wait_for_receipt(tx_hash).await
    }
}

/// Custody services indexed by chain ID
pub struct CustodyRegistry {
    services: DashMap<u64, Arc<dyn CustodyService>>,
}

impl CustodyRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// One Safe-backed service per registered chain
    ///
    /// Chains without an RPC provider, or a desk without a wallet, can
    /// propose and confirm but not execute.
    pub fn from_chains(chains: &ChainRegistry, signer: Option<&LocalSigner>) -> Self {
        let registry = Self::new();

        for chain_id in chains.chain_ids() {
            let network = match chains.network(chain_id) {
                Ok(network) => network,
                Err(_) => continue,
            };

            let service = SafeServiceClient::new(&network.safe_transaction_service, chain_id);
            let executor = match (chains.provider(chain_id), signer) {
                (Ok(provider), Some(signer)) => {
                    Some(SafeExecutor::new(provider, signer.wallet().clone()))
                }
                (Err(_), _) => {
                    warn!("Chain {} has no provider, execution disabled", network.name);
                    None
                }
                (Ok(_), None) => None,
            };

            info!(
                "Custody service for chain {} at {} (execution {})",
                network.name,
                network.safe_transaction_service,
                if executor.is_some() { "enabled" } else { "disabled" }
            );
            registry.insert(chain_id, Arc::new(SafeCustody::new(service, executor)));
        }

        registry
    }

    pub fn insert(&self, chain_id: u64, service: Arc<dyn CustodyService>) {
        debug!("Registered custody service for chain {}", chain_id);
        self.services.insert(chain_id, service);
    }

    pub fn get(&self, chain_id: u64) -> DeskResult<Arc<dyn CustodyService>> {
        self.services
            .get(&chain_id)
            .map(|s| s.clone())
            .ok_or(DeskError::UnknownChain { chain_id })
    }
}

impl Default for CustodyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
