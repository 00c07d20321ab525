//! Error types for swap negotiation and custody transactions

use crate::gate::BalanceError;
use crate::lifecycle::TransactionState;

use ethers::types::{Address, H256};
use thiserror::Error;

/// Failure to obtain a priced route
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    /// The quoting service failed; message is passed through verbatim
    #[error("{0}")]
    Upstream(String),

    #[error("Route cannot be priced: {0}")]
    Unpriceable(String),

    #[error("Invalid swap request: {0}")]
    InvalidRequest(String),
}

/// Failure of a single custody lifecycle step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Signer is on chain {signer_chain} but the custody account lives on chain {account_chain}")]
    ChainMismatch { signer_chain: u64, account_chain: u64 },

    #[error("No signer attached")]
    SignerUnavailable,

    #[error("Custody account {address:?} is not deployed on chain {chain_id}")]
    ProxyNotDeployed { address: Address, chain_id: u64 },

    /// Rejection from the custody service or the chain; message is verbatim
    #[error("{message}")]
    UpstreamRejected { message: String },

    #[error("Cannot {operation} a transaction in state {state}")]
    InvalidState {
        state: TransactionState,
        operation: &'static str,
    },

    #[error("Execution transaction {tx_hash:?} reverted")]
    ExecutionReverted { tx_hash: H256 },

    #[error("Custody service hash {reported:?} does not match computed hash {computed:?}")]
    HashMismatch { reported: H256, computed: H256 },
}

impl LifecycleError {
    /// Whether the remedy is switching the active network rather than retrying
    pub fn requires_network_switch(&self) -> bool {
        matches!(
            self,
            LifecycleError::ChainMismatch { .. } | LifecycleError::ProxyNotDeployed { .. }
        )
    }

    pub(crate) fn upstream(message: impl Into<String>) -> Self {
        LifecycleError::UpstreamRejected {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the orchestrator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeskError {
    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Precondition: the accepted quote is gone and must be re-negotiated
    #[error("Swap estimate expired, request a new one")]
    QuoteExpired,

    /// Swap parameters changed while a call was in flight; its result was dropped
    #[error("Negotiation was cancelled")]
    Cancelled,

    #[error("Transaction blocked: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "))]
    BalanceBlocked(Vec<BalanceError>),

    #[error("Chain {chain_id} is not configured")]
    UnknownChain { chain_id: u64 },
}

impl DeskError {
    /// Whether the caller has to fetch a fresh estimate before continuing
    pub fn requires_requote(&self) -> bool {
        matches!(self, DeskError::QuoteExpired | DeskError::Cancelled)
    }

    pub fn requires_network_switch(&self) -> bool {
        match self {
            DeskError::Lifecycle(e) => e.requires_network_switch(),
            _ => false,
        }
    }
}

pub type QuoteResult<T> = Result<T, QuoteError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type DeskResult<T> = Result<T, DeskError>;
