//! On-chain execution of confirmed custody transactions

use super::{ExecutionReceipt, ServiceTransaction};
use crate::chain::ChainProvider;
use crate::error::{LifecycleError, LifecycleResult};
use crate::tx::CustodyCall;

use ethers::abi::{self, Token};
use ethers::middleware::SignerMiddleware;
use ethers::providers::Middleware;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::id;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Concatenate signatures in ascending owner order, as the Safe contract requires
pub fn pack_signatures(signatures: &BTreeMap<Address, Bytes>) -> Bytes {
    signatures
        .values()
        .flat_map(|sig| sig.iter().copied())
        .collect::<Vec<u8>>()
        .into()
}

/// `execTransaction` calldata with zeroed gas refund parameters
pub fn encode_exec_transaction(call: &CustodyCall, signatures: &Bytes) -> Bytes {
    let mut data = id(
        "execTransaction(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,bytes)",
    )
    .to_vec();
    data.extend(abi::encode(&[
        Token::Address(call.to),
        Token::Uint(call.value),
        Token::Bytes(call.data.to_vec()),
        Token::Uint(U256::from(u8::from(call.operation))),
        Token::Uint(U256::zero()),
        Token::Uint(U256::zero()),
        Token::Uint(U256::zero()),
        Token::Address(Address::zero()),
        Token::Address(Address::zero()),
        Token::Bytes(signatures.to_vec()),
    ]));
    data.into()
}

/// Sends `execTransaction` from a local wallet
pub struct SafeExecutor {
    provider: Arc<ChainProvider>,
    wallet: LocalWallet,
}

impl SafeExecutor {
    pub fn new(provider: Arc<ChainProvider>, wallet: LocalWallet) -> Self {
        let wallet = wallet.with_chain_id(provider.chain_id());
        Self { provider, wallet }
    }

    pub fn chain_id(&self) -> u64 {
        self.provider.chain_id()
    }

    pub async fn execute(&self, tx: &ServiceTransaction) -> LifecycleResult<H256> {
        let chain_id = self.provider.chain_id();

        if !self.provider.is_deployed(tx.safe).await? {
            warn!("Safe {:?} has no code on chain {}", tx.safe, chain_id);
            return Err(LifecycleError::ProxyNotDeployed {
                address: tx.safe,
                chain_id,
            });
        }

        let calldata = encode_exec_transaction(&tx.call(), &pack_signatures(&tx.signatures()));
        let request = TransactionRequest::new()
            .from(self.wallet.address())
            .to(tx.safe)
            .data(calldata);

        let client = SignerMiddleware::new(self.provider.http().clone(), self.wallet.clone());
        let pending = client
            .send_transaction(request, None)
            .await
            .map_err(|e| LifecycleError::upstream(e.to_string()))?;
        let tx_hash = pending.tx_hash();

        info!(
            "Execution of {:?} sent on chain {}: {:?}",
            tx.safe_tx_hash, chain_id, tx_hash
        );
        Ok(tx_hash)
    }

    pub async fn wait_for_receipt(&self, tx_hash: H256) -> LifecycleResult<ExecutionReceipt> {
        let receipt = self.provider.wait_for_receipt(tx_hash).await?;

        Ok(ExecutionReceipt {
            tx_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false),
        })
    }
}
