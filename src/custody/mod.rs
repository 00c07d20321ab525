//! Custody account access
//!
//! Two capabilities sit behind traits: the custody service that stores
//! proposals and confirmations, and the signer that approves hashes. Concrete
//! adapters target the Safe Transaction Service and an ethers local wallet.

pub mod executor;
pub mod registry;
pub mod service;
pub mod signer;

pub use executor::{encode_exec_transaction, pack_signatures, SafeExecutor};
pub use registry::{CustodyRegistry, SafeCustody};
pub use service::SafeServiceClient;
pub use signer::LocalSigner;

use crate::error::LifecycleResult;
use crate::tx::{CustodyCall, Operation};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A k-of-n custody account on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustodyAccount {
    pub chain_id: u64,
    pub address: Address,
    pub signer_threshold: usize,
    pub owners: Vec<Address>,
}

impl CustodyAccount {
    pub fn is_owner(&self, address: Address) -> bool {
        self.owners.contains(&address)
    }
}

/// Account state as reported by the custody service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub account: CustodyAccount,
    /// Next unused transaction nonce
    pub nonce: u64,
    pub version: Option<String>,
}

/// Query options for a transaction listing; `None` leaves the filter off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFilters {
    pub executed: Option<bool>,
    pub queued: Option<bool>,
    pub trusted: Option<bool>,
}

/// One entry in an account's transaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub tx_type: String,
    #[serde(default)]
    pub safe_tx_hash: Option<H256>,
    #[serde(default, alias = "txHash")]
    pub transaction_hash: Option<H256>,
    #[serde(default)]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub is_executed: Option<bool>,
    /// Everything else the service reported
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// A signed transaction submitted for co-signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposal {
    pub safe: Address,
    pub sender: Address,
    pub call: CustodyCall,
    pub nonce: u64,
    pub safe_tx_hash: H256,
    pub signature: Bytes,
    /// Free-form description stored alongside the proposal
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub owner: Address,
    pub signature: Bytes,
}

/// A pending or executed transaction as stored by the custody service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTransaction {
    pub safe: Address,
    pub to: Address,
    #[serde(deserialize_with = "decimal_u256")]
    pub value: U256,
    #[serde(default)]
    pub data: Option<Bytes>,
    pub operation: Operation,
    pub nonce: u64,
    pub safe_tx_hash: H256,
    pub confirmations_required: usize,
    #[serde(default)]
    pub confirmations: Vec<Confirmation>,
    pub is_executed: bool,
    #[serde(default)]
    pub transaction_hash: Option<H256>,
    #[serde(default)]
    pub origin: Option<String>,
}

impl ServiceTransaction {
    pub fn call(&self) -> CustodyCall {
        CustodyCall {
            to: self.to,
            value: self.value,
            data: self.data.clone().unwrap_or_default(),
            operation: self.operation,
        }
    }

    /// Collected signatures keyed by owner
    pub fn signatures(&self) -> BTreeMap<Address, Bytes> {
        self.confirmations
            .iter()
            .map(|c| (c.owner, c.signature.clone()))
            .collect()
    }
}

/// Outcome of an on-chain execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub success: bool,
}

fn decimal_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    U256::from_dec_str(&raw).map_err(serde::de::Error::custom)
}

/// Custody service operations for a single chain
///
/// Every method is one network round trip and never retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustodyService: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn accounts_by_owner(&self, owner: Address) -> LifecycleResult<Vec<Address>>;

    async fn account_info(&self, address: Address) -> LifecycleResult<AccountInfo>;

    async fn list_transactions(
        &self,
        address: Address,
        filters: TxFilters,
    ) -> LifecycleResult<Vec<TransactionRecord>>;

    async fn propose_transaction(&self, proposal: &Proposal) -> LifecycleResult<()>;

    async fn confirm_transaction(&self, safe_tx_hash: H256, signature: Bytes) -> LifecycleResult<()>;

    async fn get_transaction(&self, safe_tx_hash: H256) -> LifecycleResult<ServiceTransaction>;

    /// Submit the fully confirmed transaction on-chain, returning its hash
    async fn execute_transaction(&self, safe_tx_hash: H256) -> LifecycleResult<H256>;

    async fn wait_for_receipt(&self, tx_hash: H256) -> LifecycleResult<ExecutionReceipt>;
}

/// External signer approving custody transaction hashes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HashSigner: Send + Sync {
    /// Chain the signer is currently connected to
    fn chain_id(&self) -> u64;

    fn address(&self) -> Address;

    /// Signature in the form the custody contract verifies
    async fn sign_hash(&self, hash: H256) -> LifecycleResult<Bytes>;
}
