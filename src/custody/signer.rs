//! Local private-key signer

use super::HashSigner;
use crate::config::SignerConfig;
use crate::error::{LifecycleError, LifecycleResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256};
use tracing::info;

/// Offset Safe adds to `v` to mark an `eth_sign` signature
const ETH_SIGN_V_OFFSET: u64 = 4;

/// Hash signer backed by an in-process wallet
#[derive(Debug, Clone)]
pub struct LocalSigner {
    wallet: LocalWallet,
}

impl LocalSigner {
    pub fn new(wallet: LocalWallet, chain_id: u64) -> Self {
        Self {
            wallet: wallet.with_chain_id(chain_id),
        }
    }

    /// Load the wallet from the environment variable named in `config`
    pub fn from_env(config: &SignerConfig, chain_id: u64) -> LifecycleResult<Self> {
        let key = std::env::var(&config.private_key_env)
            .map_err(|_| LifecycleError::SignerUnavailable)?;
        let wallet = key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| LifecycleError::upstream(format!("Invalid private key: {}", e)))?;

        let signer = Self::new(wallet, chain_id);
        info!("Local signer loaded: {:?}", signer.address());
        Ok(signer)
    }

    /// Same key, connected to another chain
    pub fn on_chain(&self, chain_id: u64) -> Self {
        Self::new(self.wallet.clone(), chain_id)
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

#[async_trait]
impl HashSigner for LocalSigner {
    fn chain_id(&self) -> u64 {
        self.wallet.chain_id()
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_hash(&self, hash: H256) -> LifecycleResult<Bytes> {
        let mut signature = self
            .wallet
            .sign_message(hash.as_bytes())
            .await
            .map_err(|e| LifecycleError::upstream(e.to_string()))?;
        signature.v += ETH_SIGN_V_OFFSET;
        Ok(Bytes::from(signature.to_vec()))
    }
}
