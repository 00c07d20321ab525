//! Custody transaction lifecycle
//!
//! Drives one k-of-n transaction from draft to on-chain execution:
//!
//! ```text
//! Draft -> Hashed -> Signed -> Proposed -> AwaitingConfirmations -> ReadyToExecute
//!                                                                  -> Executing -> Executed
//! ```
//!
//! Every step that talks to the custody service makes exactly one call and
//! leaves the state untouched when that call fails. Any non-terminal state can
//! be abandoned into `Failed`; a reverted execution ends there as well.

use crate::custody::{CustodyAccount, CustodyService, HashSigner, Proposal, ServiceTransaction};
use crate::error::{LifecycleError, LifecycleResult};
use crate::events::{DeskEvent, EventSink};
use crate::tx::{safe_tx_hash, CustodyCall};

use ethers::types::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Draft,
    Hashed,
    Signed,
    Proposed,
    AwaitingConfirmations,
    ReadyToExecute,
    Executing,
    Executed,
    Failed,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Draft => "draft",
            TransactionState::Hashed => "hashed",
            TransactionState::Signed => "signed",
            TransactionState::Proposed => "proposed",
            TransactionState::AwaitingConfirmations => "awaiting_confirmations",
            TransactionState::ReadyToExecute => "ready_to_execute",
            TransactionState::Executing => "executing",
            TransactionState::Executed => "executed",
            TransactionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Executed | TransactionState::Failed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local working copy of a custody transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustodyTransaction {
    pub nonce: u64,
    pub call: CustodyCall,
    pub hash: Option<H256>,
    /// Signatures keyed by signer, ascending
    pub signatures: BTreeMap<Address, Bytes>,
    pub state: TransactionState,
    /// Signer whose signature accompanies the proposal
    pub proposer: Option<Address>,
    pub execution_hash: Option<H256>,
    pub failure: Option<String>,
}

pub struct CustodyTransactionLifecycle {
    account: CustodyAccount,
    tx: CustodyTransaction,
    custody: Arc<dyn CustodyService>,
    signer: Option<Arc<dyn HashSigner>>,
    sink: Arc<dyn EventSink>,
    origin: Option<String>,
}

impl CustodyTransactionLifecycle {
    /// Start a draft for `call` at the account's next `nonce`
    pub fn new_draft(
        account: CustodyAccount,
        call: CustodyCall,
        nonce: u64,
        custody: Arc<dyn CustodyService>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        debug!(
            "Draft custody transaction for {:?} on chain {} at nonce {}",
            account.address, account.chain_id, nonce
        );

        Self {
            account,
            tx: CustodyTransaction {
                nonce,
                call,
                hash: None,
                signatures: BTreeMap::new(),
                state: TransactionState::Draft,
                proposer: None,
                execution_hash: None,
                failure: None,
            },
            custody,
            signer: None,
            sink,
            origin: None,
        }
    }

    /// Pick up a transaction another owner proposed
    ///
    /// The service's hash is checked against one recomputed locally, so a
    /// tampered or foreign payload is never co-signed.
    pub fn resume(
        account: CustodyAccount,
        pending: ServiceTransaction,
        custody: Arc<dyn CustodyService>,
        sink: Arc<dyn EventSink>,
    ) -> LifecycleResult<Self> {
        let call = pending.call();
        let computed = safe_tx_hash(account.chain_id, account.address, &call, pending.nonce);
        if computed != pending.safe_tx_hash {
            warn!(
                "Refusing to resume {:?}: recomputed hash {:?}",
                pending.safe_tx_hash, computed
            );
            return Err(LifecycleError::HashMismatch {
                reported: pending.safe_tx_hash,
                computed,
            });
        }

        let signatures = pending.signatures();
        let state = if pending.is_executed {
            TransactionState::Executed
        } else {
            settled_state(signatures.len(), account.signer_threshold)
        };

        info!(
            "Resumed custody transaction {:?} in state {} ({}/{} signatures)",
            computed,
            state,
            signatures.len(),
            account.signer_threshold
        );

        Ok(Self {
            account,
            tx: CustodyTransaction {
                nonce: pending.nonce,
                call,
                hash: Some(computed),
                signatures,
                state,
                proposer: None,
                execution_hash: pending.transaction_hash,
                failure: None,
            },
            custody,
            signer: None,
            sink,
            origin: pending.origin,
        })
    }

    pub fn set_signer(&mut self, signer: Option<Arc<dyn HashSigner>>) {
        self.signer = signer;
    }

    pub fn with_signer(mut self, signer: Arc<dyn HashSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Description stored with the proposal
    pub fn set_origin(&mut self, origin: impl Into<String>) {
        self.origin = Some(origin.into());
    }

    pub fn state(&self) -> TransactionState {
        self.tx.state
    }

    pub fn transaction(&self) -> &CustodyTransaction {
        &self.tx
    }

    pub fn account(&self) -> &CustodyAccount {
        &self.account
    }

    pub fn safe_tx_hash(&self) -> Option<H256> {
        self.tx.hash
    }

    pub fn signatures(&self) -> &BTreeMap<Address, Bytes> {
        &self.tx.signatures
    }

    pub fn is_ready(&self) -> bool {
        self.tx.state == TransactionState::ReadyToExecute
    }

    /// Draft -> Hashed
    pub fn hash(&mut self) -> LifecycleResult<H256> {
        const OP: &str = "hash";
        self.expect_state(OP, &[TransactionState::Draft])?;
        self.active_signer(OP)?;

        let hash = safe_tx_hash(
            self.account.chain_id,
            self.account.address,
            &self.tx.call,
            self.tx.nonce,
        );
        self.tx.hash = Some(hash);
        self.transition(TransactionState::Hashed);
        Ok(hash)
    }

    /// Hashed -> Signed
    pub async fn sign(&mut self) -> LifecycleResult<Bytes> {
        const OP: &str = "sign";
        self.expect_state(OP, &[TransactionState::Hashed])?;
        let signer = self.active_signer(OP)?;
        let hash = self.require_hash(OP)?;

        let signature = match signer.sign_hash(hash).await {
            Ok(signature) => signature,
            Err(e) => return Err(self.step_failed(OP, e)),
        };

        let owner = signer.address();
        self.tx.signatures.insert(owner, signature.clone());
        self.tx.proposer = Some(owner);
        self.transition(TransactionState::Signed);
        Ok(signature)
    }

    /// Signed -> Proposed, or ReadyToExecute when one signature meets the threshold
    pub async fn propose(&mut self) -> LifecycleResult<()> {
        const OP: &str = "propose";
        self.expect_state(OP, &[TransactionState::Signed])?;
        let hash = self.require_hash(OP)?;

        let (sender, signature) = match self
            .tx
            .proposer
            .and_then(|owner| self.tx.signatures.get(&owner).map(|sig| (owner, sig.clone())))
        {
            Some(entry) => entry,
            None => return Err(self.step_failed(OP, LifecycleError::SignerUnavailable)),
        };

        let proposal = Proposal {
            safe: self.account.address,
            sender,
            call: self.tx.call.clone(),
            nonce: self.tx.nonce,
            safe_tx_hash: hash,
            signature,
            origin: self.origin.clone(),
        };

        if let Err(e) = self.custody.propose_transaction(&proposal).await {
            return Err(self.step_failed(OP, e));
        }

        self.transition(TransactionState::Proposed);
        self.settle();
        Ok(())
    }

    /// Co-sign as the attached signer
    ///
    /// A signer that already signed is a no-op and makes no call.
    pub async fn confirm(&mut self) -> LifecycleResult<()> {
        const OP: &str = "confirm";
        self.expect_state(
            OP,
            &[
                TransactionState::Proposed,
                TransactionState::AwaitingConfirmations,
            ],
        )?;
        let signer = self.active_signer(OP)?;
        let hash = self.require_hash(OP)?;

        let owner = signer.address();
        if self.tx.signatures.contains_key(&owner) {
            debug!("{:?} already signed {:?}", owner, hash);
            return Ok(());
        }

        let signature = match signer.sign_hash(hash).await {
            Ok(signature) => signature,
            Err(e) => return Err(self.step_failed(OP, e)),
        };

        if let Err(e) = self.custody.confirm_transaction(hash, signature.clone()).await {
            return Err(self.step_failed(OP, e));
        }

        self.tx.signatures.insert(owner, signature);
        if self.tx.state == TransactionState::Proposed {
            self.transition(TransactionState::AwaitingConfirmations);
        }
        self.settle();
        Ok(())
    }

    /// Replace the working signature set with the service's
    pub async fn refresh(&mut self) -> LifecycleResult<()> {
        const OP: &str = "refresh";
        self.expect_state(
            OP,
            &[
                TransactionState::Proposed,
                TransactionState::AwaitingConfirmations,
                TransactionState::ReadyToExecute,
            ],
        )?;
        let hash = self.require_hash(OP)?;

        let remote = match self.custody.get_transaction(hash).await {
            Ok(remote) => remote,
            Err(e) => return Err(self.step_failed(OP, e)),
        };

        self.tx.signatures = remote.signatures();
        debug!(
            "Refreshed {:?}: {}/{} signatures",
            hash,
            self.tx.signatures.len(),
            self.account.signer_threshold
        );

        if remote.is_executed {
            self.tx.execution_hash = remote.transaction_hash;
            self.transition(TransactionState::Executed);
            return Ok(());
        }

        let settled = settled_state(self.tx.signatures.len(), self.account.signer_threshold);
        let next = match (self.tx.state, settled) {
            // A co-signed transaction does not return to Proposed
            (TransactionState::AwaitingConfirmations, TransactionState::Proposed) => {
                TransactionState::AwaitingConfirmations
            }
            (_, next) => next,
        };
        self.transition(next);
        Ok(())
    }

    /// ReadyToExecute -> Executing -> Executed
    ///
    /// If submission fails the transaction is ready again. If the receipt
    /// wait fails it stays `Executing`; call [`await_execution`] to retry.
    ///
    /// [`await_execution`]: Self::await_execution
    pub async fn execute(&mut self) -> LifecycleResult<H256> {
        const OP: &str = "execute";
        self.expect_state(OP, &[TransactionState::ReadyToExecute])?;
        let hash = self.require_hash(OP)?;

        self.transition(TransactionState::Executing);

        let tx_hash = match self.custody.execute_transaction(hash).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                self.transition(TransactionState::ReadyToExecute);
                return Err(self.step_failed(OP, e));
            }
        };
        self.tx.execution_hash = Some(tx_hash);

        self.await_execution().await
    }

    /// Wait for the submitted execution to be mined
    pub async fn await_execution(&mut self) -> LifecycleResult<H256> {
        const OP: &str = "execute";
        self.expect_state(OP, &[TransactionState::Executing])?;

        let tx_hash = match self.tx.execution_hash {
            Some(tx_hash) => tx_hash,
            None => {
                return Err(LifecycleError::InvalidState {
                    state: self.tx.state,
                    operation: "await execution of",
                })
            }
        };

        let receipt = match self.custody.wait_for_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.step_failed(OP, e)),
        };

        if !receipt.success {
            let err = LifecycleError::ExecutionReverted { tx_hash };
            self.tx.failure = Some(err.to_string());
            self.transition(TransactionState::Failed);
            return Err(self.step_failed(OP, err));
        }

        self.transition(TransactionState::Executed);
        Ok(tx_hash)
    }

    /// Give up on the transaction
    pub fn abandon(&mut self, reason: impl Into<String>) -> LifecycleResult<()> {
        if self.tx.state.is_terminal() {
            return Err(LifecycleError::InvalidState {
                state: self.tx.state,
                operation: "abandon",
            });
        }

        let reason = reason.into();
        info!("Abandoning custody transaction {:?}: {}", self.tx.hash, reason);
        self.tx.failure = Some(reason);
        self.transition(TransactionState::Failed);
        Ok(())
    }

    fn expect_state(&self, operation: &'static str, allowed: &[TransactionState]) -> LifecycleResult<()> {
        if allowed.contains(&self.tx.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                state: self.tx.state,
                operation,
            })
        }
    }

    fn require_hash(&self, operation: &'static str) -> LifecycleResult<H256> {
        self.tx.hash.ok_or(LifecycleError::InvalidState {
            state: self.tx.state,
            operation,
        })
    }

    /// The attached signer, provided it is on the account's chain
    fn active_signer(&self, operation: &'static str) -> LifecycleResult<Arc<dyn HashSigner>> {
        let signer = match &self.signer {
            Some(signer) => signer.clone(),
            None => return Err(self.step_failed(operation, LifecycleError::SignerUnavailable)),
        };

        let signer_chain = signer.chain_id();
        if signer_chain != self.account.chain_id {
            return Err(self.step_failed(
                operation,
                LifecycleError::ChainMismatch {
                    signer_chain,
                    account_chain: self.account.chain_id,
                },
            ));
        }

        Ok(signer)
    }

    /// Promote to ReadyToExecute once the threshold is met
    fn settle(&mut self) {
        if self.tx.signatures.len() >= self.account.signer_threshold {
            self.transition(TransactionState::ReadyToExecute);
        }
    }

    fn transition(&mut self, to: TransactionState) {
        let from = self.tx.state;
        if from == to {
            return;
        }
        self.tx.state = to;

        info!("Custody transaction {:?}: {} -> {}", self.tx.hash, from, to);
        crate::metrics::record_transition(to);
        self.sink.report(DeskEvent::TransactionStateChanged {
            safe_tx_hash: self.tx.hash,
            from,
            to,
        });
    }

    fn step_failed(&self, operation: &'static str, err: LifecycleError) -> LifecycleError {
        warn!("Failed to {} custody transaction: {}", operation, err);
        crate::metrics::record_custody_failure(operation);
        self.sink.report(DeskEvent::StepFailed {
            operation: format!("{} transaction", operation),
            message: err.to_string(),
            switch_network: err.requires_network_switch(),
        });
        err
    }
}

/// State implied by a signature count once a proposal exists
fn settled_state(signatures: usize, threshold: usize) -> TransactionState {
    if signatures >= threshold {
        TransactionState::ReadyToExecute
    } else if signatures > 1 {
        TransactionState::AwaitingConfirmations
    } else {
        TransactionState::Proposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::{Confirmation, ExecutionReceipt, MockCustodyService, MockHashSigner};
    use crate::events::MemorySink;
    use crate::tx::Operation;
    use ethers::types::U256;

    const CHAIN: u64 = 42161;

    fn owner(n: u64) -> Address {
        Address::from_low_u64_be(0xa0 + n)
    }

    fn account(threshold: usize) -> CustodyAccount {
        CustodyAccount {
            chain_id: CHAIN,
            address: Address::from_low_u64_be(0x5afe),
            signer_threshold: threshold,
            owners: vec![owner(1), owner(2), owner(3)],
        }
    }

    fn call() -> CustodyCall {
        CustodyCall {
            to: Address::from_low_u64_be(0x4040),
            value: U256::zero(),
            data: Bytes::from(vec![0x8d, 0x80, 0xff, 0x0a]),
            operation: Operation::DelegateCall,
        }
    }

    fn signer(n: u64, chain_id: u64) -> Arc<dyn HashSigner> {
        let mut signer = MockHashSigner::new();
        signer.expect_chain_id().return_const(chain_id);
        signer.expect_address().return_const(owner(n));
        signer
            .expect_sign_hash()
            .returning(move |_| Ok(Bytes::from(vec![n as u8; 65])));
        Arc::new(signer)
    }

    fn lifecycle(
        threshold: usize,
        custody: MockCustodyService,
        sink: Arc<MemorySink>,
    ) -> CustodyTransactionLifecycle {
        CustodyTransactionLifecycle::new_draft(account(threshold), call(), 4, Arc::new(custody), sink)
    }

    fn pending(lifecycle: &CustodyTransactionLifecycle, signers: &[u64]) -> ServiceTransaction {
        let tx = lifecycle.transaction();
        ServiceTransaction {
            safe: lifecycle.account().address,
            to: tx.call.to,
            value: tx.call.value,
            data: Some(tx.call.data.clone()),
            operation: tx.call.operation,
            nonce: tx.nonce,
            safe_tx_hash: tx.hash.unwrap_or_default(),
            confirmations_required: lifecycle.account().signer_threshold,
            confirmations: signers
                .iter()
                .map(|n| Confirmation {
                    owner: owner(*n),
                    signature: Bytes::from(vec![*n as u8; 65]),
                })
                .collect(),
            is_executed: false,
            transaction_hash: None,
            origin: None,
        }
    }

    #[tokio::test]
    async fn test_two_of_three_reaches_execution() {
        let mut custody = MockCustodyService::new();
        custody.expect_propose_transaction().times(1).returning(|_| Ok(()));
        custody.expect_confirm_transaction().times(1).returning(|_, _| Ok(()));
        custody
            .expect_execute_transaction()
            .times(1)
            .returning(|_| Ok(H256::repeat_byte(0xee)));
        custody.expect_wait_for_receipt().times(1).returning(|tx_hash| {
            Ok(ExecutionReceipt {
                tx_hash,
                block_number: Some(100),
                success: true,
            })
        });

        let sink = Arc::new(MemorySink::new());
        let mut lc = lifecycle(2, custody, sink.clone()).with_signer(signer(1, CHAIN));

        lc.hash().unwrap();
        lc.sign().await.unwrap();
        lc.propose().await.unwrap();
        assert_eq!(lc.state(), TransactionState::Proposed);
        assert!(!lc.is_ready());

        lc.set_signer(Some(signer(2, CHAIN)));
        lc.confirm().await.unwrap();
        assert_eq!(lc.signatures().len(), 2);
        assert_eq!(lc.state(), TransactionState::ReadyToExecute);

        let tx_hash = lc.execute().await.unwrap();
        assert_eq!(tx_hash, H256::repeat_byte(0xee));
        assert_eq!(lc.state(), TransactionState::Executed);

        let states: Vec<TransactionState> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DeskEvent::TransactionStateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                TransactionState::Hashed,
                TransactionState::Signed,
                TransactionState::Proposed,
                TransactionState::AwaitingConfirmations,
                TransactionState::ReadyToExecute,
                TransactionState::Executing,
                TransactionState::Executed,
            ]
        );
    }

    #[tokio::test]
    async fn test_single_signature_meets_threshold_of_one() {
        let mut custody = MockCustodyService::new();
        custody.expect_propose_transaction().times(1).returning(|_| Ok(()));

        let mut lc = lifecycle(1, custody, Arc::new(MemorySink::new())).with_signer(signer(1, CHAIN));
        lc.hash().unwrap();
        lc.sign().await.unwrap();
        assert_eq!(lc.state(), TransactionState::Signed);

        lc.propose().await.unwrap();
        assert_eq!(lc.state(), TransactionState::ReadyToExecute);
    }

    #[tokio::test]
    async fn test_signer_on_wrong_chain_stays_draft() {
        let sink = Arc::new(MemorySink::new());
        let mut lc = lifecycle(2, MockCustodyService::new(), sink.clone()).with_signer(signer(1, 10));

        let err = lc.hash().unwrap_err();
        assert_eq!(
            err,
            LifecycleError::ChainMismatch {
                signer_chain: 10,
                account_chain: CHAIN
            }
        );
        assert_eq!(lc.state(), TransactionState::Draft);
        assert!(lc.safe_tx_hash().is_none());
        assert_eq!(
            sink.count(|e| matches!(e, DeskEvent::StepFailed { switch_network: true, .. })),
            1
        );
    }

    #[test]
    fn test_hash_without_signer() {
        let mut lc = lifecycle(2, MockCustodyService::new(), Arc::new(MemorySink::new()));
        assert_eq!(lc.hash(), Err(LifecycleError::SignerUnavailable));
        assert_eq!(lc.state(), TransactionState::Draft);
    }

    #[tokio::test]
    async fn test_failed_proposal_leaves_state_unchanged() {
        let mut custody = MockCustodyService::new();
        custody.expect_propose_transaction().times(1).returning(|p| {
            Err(LifecycleError::ProxyNotDeployed {
                address: p.safe,
                chain_id: CHAIN,
            })
        });

        let mut lc = lifecycle(2, custody, Arc::new(MemorySink::new())).with_signer(signer(1, CHAIN));
        lc.hash().unwrap();
        lc.sign().await.unwrap();

        let err = lc.propose().await.unwrap_err();
        assert!(err.requires_network_switch());
        assert_eq!(lc.state(), TransactionState::Signed);
    }

    #[tokio::test]
    async fn test_confirm_by_existing_signer_is_noop() {
        let mut custody = MockCustodyService::new();
        custody.expect_propose_transaction().times(1).returning(|_| Ok(()));
        custody.expect_confirm_transaction().never();

        let mut lc = lifecycle(2, custody, Arc::new(MemorySink::new())).with_signer(signer(1, CHAIN));
        lc.hash().unwrap();
        lc.sign().await.unwrap();
        lc.propose().await.unwrap();

        lc.confirm().await.unwrap();
        assert_eq!(lc.signatures().len(), 1);
        assert_eq!(lc.state(), TransactionState::Proposed);
    }

    #[tokio::test]
    async fn test_refresh_adopts_service_signatures() {
        let mut lc = lifecycle(2, MockCustodyService::new(), Arc::new(MemorySink::new()))
            .with_signer(signer(1, CHAIN));
        lc.hash().unwrap();
        lc.sign().await.unwrap();

        let remote = pending(&lc, &[1, 3]);
        let mut custody = MockCustodyService::new();
        custody.expect_propose_transaction().returning(|_| Ok(()));
        custody
            .expect_get_transaction()
            .times(1)
            .returning(move |_| Ok(remote.clone()));
        lc.custody = Arc::new(custody);

        lc.propose().await.unwrap();
        lc.refresh().await.unwrap();

        assert_eq!(lc.state(), TransactionState::ReadyToExecute);
        let signers: Vec<Address> = lc.signatures().keys().copied().collect();
        assert_eq!(signers, vec![owner(1), owner(3)]);
    }

    #[tokio::test]
    async fn test_resume_checks_hash() {
        let mut lc = lifecycle(2, MockCustodyService::new(), Arc::new(MemorySink::new()))
            .with_signer(signer(1, CHAIN));
        lc.hash().unwrap();

        let good = pending(&lc, &[1]);
        let resumed = CustodyTransactionLifecycle::resume(
            account(2),
            good.clone(),
            Arc::new(MockCustodyService::new()),
            Arc::new(MemorySink::new()),
        )
        .unwrap();
        assert_eq!(resumed.state(), TransactionState::Proposed);
        assert_eq!(resumed.safe_tx_hash(), lc.safe_tx_hash());

        let mut tampered = good;
        tampered.to = Address::from_low_u64_be(0xbad);
        let err = CustodyTransactionLifecycle::resume(
            account(2),
            tampered,
            Arc::new(MockCustodyService::new()),
            Arc::new(MemorySink::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LifecycleError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_revert_moves_to_failed() {
        let mut custody = MockCustodyService::new();
        custody.expect_propose_transaction().returning(|_| Ok(()));
        custody
            .expect_execute_transaction()
            .returning(|_| Ok(H256::repeat_byte(0xee)));
        custody.expect_wait_for_receipt().returning(|tx_hash| {
            Ok(ExecutionReceipt {
                tx_hash,
                block_number: Some(100),
                success: false,
            })
        });

        let mut lc = lifecycle(1, custody, Arc::new(MemorySink::new())).with_signer(signer(1, CHAIN));
        lc.hash().unwrap();
        lc.sign().await.unwrap();
        lc.propose().await.unwrap();

        let err = lc.execute().await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::ExecutionReverted {
                tx_hash: H256::repeat_byte(0xee)
            }
        );
        assert_eq!(lc.state(), TransactionState::Failed);
        assert!(lc.abandon("too late").is_err());
    }

    #[tokio::test]
    async fn test_execution_failures_are_recoverable() {
        let mut custody = MockCustodyService::new();
        custody.expect_propose_transaction().returning(|_| Ok(()));
        let mut attempts = 0;
        custody.expect_execute_transaction().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(LifecycleError::upstream("GS026"))
            } else {
                Ok(H256::repeat_byte(0xee))
            }
        });
        let mut waits = 0;
        custody.expect_wait_for_receipt().times(2).returning(move |tx_hash| {
            waits += 1;
            if waits == 1 {
                Err(LifecycleError::upstream("Timed out waiting for receipt"))
            } else {
                Ok(ExecutionReceipt {
                    tx_hash,
                    block_number: Some(7),
                    success: true,
                })
            }
        });

        let mut lc = lifecycle(1, custody, Arc::new(MemorySink::new())).with_signer(signer(1, CHAIN));
        lc.hash().unwrap();
        lc.sign().await.unwrap();
        lc.propose().await.unwrap();

        assert_eq!(lc.execute().await, Err(LifecycleError::upstream("GS026")));
        assert_eq!(lc.state(), TransactionState::ReadyToExecute);

        assert!(lc.execute().await.is_err());
        assert_eq!(lc.state(), TransactionState::Executing);

        lc.await_execution().await.unwrap();
        assert_eq!(lc.state(), TransactionState::Executed);
    }

    #[test]
    fn test_abandon_from_draft() {
        let mut lc = lifecycle(2, MockCustodyService::new(), Arc::new(MemorySink::new()));
        lc.abandon("quote expired").unwrap();
        assert_eq!(lc.state(), TransactionState::Failed);
        assert_eq!(lc.transaction().failure.as_deref(), Some("quote expired"));
    }

    #[test]
    fn test_out_of_order_step_is_rejected() {
        let mut lc = lifecycle(2, MockCustodyService::new(), Arc::new(MemorySink::new()));
        let err = tokio_test::block_on(lc.propose()).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidState {
                state: TransactionState::Draft,
                operation: "propose"
            }
        );
    }
}
