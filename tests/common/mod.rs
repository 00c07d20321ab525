#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, Bytes, RecoveryMessage, Signature, H256, U256};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use swapdesk::chain::{ChainRegistry, NetworkInfo};
use swapdesk::config::DeskConfig;
use swapdesk::events::MemorySink;
use swapdesk::Orchestrator;
use swapdesk::custody::{
    AccountInfo, Confirmation, CustodyAccount, CustodyRegistry, CustodyService, ExecutionReceipt,
    HashSigner, LocalSigner, Proposal, ServiceTransaction, TransactionRecord, TxFilters,
};
use swapdesk::error::{LifecycleError, LifecycleResult, QuoteResult};
use swapdesk::route::{CostLine, Estimate, Quote, RouteCall, RouteProvider, SwapRequest, TokenInfo, TokenRef};

pub const ARBITRUM: u64 = 42161;
pub const OPTIMISM: u64 = 10;

// Anvil development keys, never funded on a live network
pub const OWNER_KEYS: [&str; 3] = [
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
];

pub fn safe_address() -> Address {
    Address::from_low_u64_be(0x5afe)
}

pub fn multisend() -> Address {
    "0x40A2aCCbd92BCA938b02010E17A5b8929b49130D".parse().unwrap()
}

pub fn owner_signer(index: usize, chain_id: u64) -> LocalSigner {
    LocalSigner::new(OWNER_KEYS[index].parse().unwrap(), chain_id)
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn usdc_arbitrum() -> TokenRef {
    TokenRef::new(
        "0xaf88d065e77c8cC2239327C5EDb3A432268e5831".parse().unwrap(),
        "USDC",
        6,
    )
}

pub fn usdc_optimism() -> TokenRef {
    TokenRef::new(
        "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85".parse().unwrap(),
        "USDC",
        6,
    )
}

/// 50 USDC from Arbitrum to Optimism, both legs held by the same Safe
pub fn fifty_usdc() -> SwapRequest {
    SwapRequest::from_human(
        ARBITRUM,
        usdc_arbitrum(),
        dec("50"),
        OPTIMISM,
        usdc_optimism(),
        safe_address(),
        safe_address(),
        None,
    )
    .unwrap()
}

pub fn balances(entries: &[(&str, &str)]) -> HashMap<String, Decimal> {
    entries.iter().map(|(k, v)| (k.to_string(), dec(v))).collect()
}

pub fn chains() -> Arc<ChainRegistry> {
    let chains = ChainRegistry::new();
    for (chain_id, name) in [(ARBITRUM, "arbitrum"), (OPTIMISM, "optimism")] {
        chains.insert(NetworkInfo {
            chain_id,
            name: name.to_string(),
            native_symbol: "ETH".to_string(),
            multisend: multisend(),
            safe_transaction_service: format!("https://safe-transaction-{}.safe.global", name),
        });
    }
    Arc::new(chains)
}

/// Route service answering with a fixed priced route
pub struct ScriptedRoute {
    pub fee_costs: Vec<CostLine>,
    pub gas_costs: Vec<CostLine>,
    pub delay: Duration,
    pub calls: Mutex<usize>,
}

impl ScriptedRoute {
    /// 0.05 USDC integrator fee plus 0.002 ETH gas
    pub fn standard() -> Self {
        Self {
            fee_costs: vec![CostLine::new(U256::from(50_000u64), "USDC", 6)],
            gas_costs: vec![CostLine::new(U256::from(2_000_000_000_000_000u64), "ETH", 18)],
            delay: Duration::ZERO,
            calls: Mutex::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::standard()
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RouteProvider for ScriptedRoute {
    async fn quote(&self, request: &SwapRequest) -> QuoteResult<Quote> {
        *self.calls.lock().unwrap() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        Ok(Quote::new(
            request.clone(),
            serde_json::json!({ "provider": "scripted" }),
            Estimate {
                source_amount: request.source_amount,
                dest_amount: U256::from(49_800_000u64),
                dest_token: TokenInfo {
                    symbol: request.dest_token.symbol.clone(),
                    decimals: request.dest_token.decimals,
                },
                fee_costs: self.fee_costs.clone(),
                gas_costs: self.gas_costs.clone(),
            },
            RouteCall {
                target: "0xce16F69375520ab01377ce7B88f5BA8C48F8D666".parse().unwrap(),
                data: Bytes::from(vec![0x84, 0x6a, 0x1b, 0xc6, 0x00, 0x01]),
                value: U256::from(120_000_000_000_000u64),
            },
        ))
    }
}

#[derive(Default)]
struct ServiceState {
    transactions: HashMap<H256, ServiceTransaction>,
    calls: Vec<String>,
}

/// In-memory Safe with a transaction service that accepts everything
pub struct InMemoryCustody {
    pub chain_id: u64,
    pub account: CustodyAccount,
    pub nonce: u64,
    pub account_delay: Duration,
    state: Mutex<ServiceState>,
}

impl InMemoryCustody {
    /// 2-of-3 Safe owned by the three development keys
    pub fn two_of_three(chain_id: u64) -> Self {
        let owners = (0..3)
            .map(|i| owner_signer(i, chain_id).address())
            .collect();

        Self {
            chain_id,
            account: CustodyAccount {
                chain_id,
                address: safe_address(),
                signer_threshold: 2,
                owners,
            },
            nonce: 12,
            account_delay: Duration::ZERO,
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// Account lookups take `delay` to answer
    pub fn with_account_delay(mut self, delay: Duration) -> Self {
        self.account_delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn stored(&self, hash: H256) -> Option<ServiceTransaction> {
        self.state.lock().unwrap().transactions.get(&hash).cloned()
    }

    /// Rewrite a stored transaction as a compromised service would
    pub fn tamper(&self, hash: H256, edit: impl FnOnce(&mut ServiceTransaction)) {
        if let Some(tx) = self.state.lock().unwrap().transactions.get_mut(&hash) {
            edit(tx);
        }
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }
}

#[async_trait]
impl CustodyService for InMemoryCustody {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn accounts_by_owner(&self, owner: Address) -> LifecycleResult<Vec<Address>> {
        self.record("accounts_by_owner");
        Ok(if self.account.is_owner(owner) {
            vec![self.account.address]
        } else {
            vec![]
        })
    }

    async fn account_info(&self, address: Address) -> LifecycleResult<AccountInfo> {
        self.record("account_info");
        if !self.account_delay.is_zero() {
            tokio::time::sleep(self.account_delay).await;
        }
        if address != self.account.address {
            return Err(LifecycleError::ProxyNotDeployed {
                address,
                chain_id: self.chain_id,
            });
        }
        Ok(AccountInfo {
            account: self.account.clone(),
            nonce: self.nonce,
            version: Some("1.3.0".to_string()),
        })
    }

    async fn list_transactions(
        &self,
        _address: Address,
        _filters: TxFilters,
    ) -> LifecycleResult<Vec<TransactionRecord>> {
        self.record("list_transactions");
        Ok(vec![])
    }

    async fn propose_transaction(&self, proposal: &Proposal) -> LifecycleResult<()> {
        self.record("propose_transaction");
        let tx = ServiceTransaction {
            safe: proposal.safe,
            to: proposal.call.to,
            value: proposal.call.value,
            data: Some(proposal.call.data.clone()),
            operation: proposal.call.operation,
            nonce: proposal.nonce,
            safe_tx_hash: proposal.safe_tx_hash,
            confirmations_required: self.account.signer_threshold,
            confirmations: vec![Confirmation {
                owner: proposal.sender,
                signature: proposal.signature.clone(),
            }],
            is_executed: false,
            transaction_hash: None,
            origin: proposal.origin.clone(),
        };
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(proposal.safe_tx_hash, tx);
        Ok(())
    }

    async fn confirm_transaction(&self, safe_tx_hash: H256, signature: Bytes) -> LifecycleResult<()> {
        self.record("confirm_transaction");
        let mut state = self.state.lock().unwrap();
        let tx = state
            .transactions
            .get_mut(&safe_tx_hash)
            .ok_or_else(|| rejected("No MultisigTransaction matches the given query."))?;

        let owner = recover_owner(safe_tx_hash, &signature);
        if !self.account.is_owner(owner) {
            return Err(rejected("Signer is not an owner"));
        }
        tx.confirmations.push(Confirmation { owner, signature });
        Ok(())
    }

    async fn get_transaction(&self, safe_tx_hash: H256) -> LifecycleResult<ServiceTransaction> {
        self.record("get_transaction");
        self.stored(safe_tx_hash)
            .ok_or_else(|| rejected("No MultisigTransaction matches the given query."))
    }

    async fn execute_transaction(&self, safe_tx_hash: H256) -> LifecycleResult<H256> {
        self.record("execute_transaction");
        let mut state = self.state.lock().unwrap();
        let tx = state
            .transactions
            .get_mut(&safe_tx_hash)
            .ok_or_else(|| rejected("unknown transaction"))?;
        if tx.confirmations.len() < tx.confirmations_required {
            return Err(rejected("GS020"));
        }
        tx.is_executed = true;
        tx.transaction_hash = Some(H256::repeat_byte(0xe1));
        Ok(H256::repeat_byte(0xe1))
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> LifecycleResult<ExecutionReceipt> {
        self.record("wait_for_receipt");
        Ok(ExecutionReceipt {
            tx_hash,
            block_number: Some(201_000_000),
            success: true,
        })
    }
}

/// Owner key that takes a while to produce each signature
pub struct SlowSigner {
    pub inner: LocalSigner,
    pub delay: Duration,
}

#[async_trait]
impl HashSigner for SlowSigner {
    fn chain_id(&self) -> u64 {
        self.inner.chain_id()
    }

    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_hash(&self, hash: H256) -> LifecycleResult<Bytes> {
        tokio::time::sleep(self.delay).await;
        self.inner.sign_hash(hash).await
    }
}

/// Owner behind an eth_sign style Safe signature (v offset by 4)
pub fn recover_owner(safe_tx_hash: H256, signature: &Bytes) -> Address {
    let mut signature = Signature::try_from(signature.as_ref()).unwrap();
    signature.v -= 4;
    signature
        .recover(RecoveryMessage::Data(safe_tx_hash.as_bytes().to_vec()))
        .unwrap()
}

fn rejected(message: &str) -> LifecycleError {
    LifecycleError::UpstreamRejected {
        message: message.to_string(),
    }
}

pub fn custody_registry(custody: Arc<InMemoryCustody>) -> Arc<CustodyRegistry> {
    let registry = CustodyRegistry::new();
    registry.insert(custody.chain_id, custody);
    Arc::new(registry)
}

pub fn desk(
    route: Arc<ScriptedRoute>,
    custody: Arc<InMemoryCustody>,
) -> (Orchestrator, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let desk = Orchestrator::new(
        route,
        chains(),
        custody_registry(custody),
        sink.clone(),
        &DeskConfig::default(),
    );
    (desk, sink)
}
