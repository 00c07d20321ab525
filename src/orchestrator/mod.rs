//! Swap desk orchestrator
//!
//! Composes route quoting, the quote countdown, the balance gate, bundle
//! construction and the custody lifecycle. This is the only component that
//! knows about all of the others.

mod summary;

pub use summary::SwapSummary;

use crate::chain::ChainRegistry;
use crate::config::{DeskConfig, Settings};
use crate::custody::{
    AccountInfo, CustodyRegistry, HashSigner, LocalSigner, TransactionRecord, TxFilters,
};
use crate::error::{DeskError, DeskResult, LifecycleError, QuoteError};
use crate::events::{DeskEvent, EventSink};
use crate::gate::{self, BalanceCheck, BalanceVerdict};
use crate::lifecycle::CustodyTransactionLifecycle;
use crate::quote::Countdown;
use crate::route::{FeeBreakdown, FeeConfig, Quote, RouteProvider, SquidRouteProvider, SwapRequest};
use crate::tx::TransactionBuilder;

use chrono::Utc;
use ethers::types::{Address, H256};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct Orchestrator {
    route: Arc<dyn RouteProvider>,
    chains: Arc<ChainRegistry>,
    custody: Arc<CustodyRegistry>,
    builder: TransactionBuilder,
    countdown: Countdown,
    sink: Arc<dyn EventSink>,
    signer: RwLock<Option<Arc<dyn HashSigner>>>,
    /// Bumped whenever swap parameters change; stale quote results are dropped
    generation: AtomicU64,
    /// Serialises accepting a quote against cancelling one
    negotiation: Mutex<()>,
    fees: RwLock<Option<FeeBreakdown>>,
    default_fee: Option<FeeConfig>,
}

impl Orchestrator {
    pub fn new(
        route: Arc<dyn RouteProvider>,
        chains: Arc<ChainRegistry>,
        custody: Arc<CustodyRegistry>,
        sink: Arc<dyn EventSink>,
        config: &DeskConfig,
    ) -> Self {
        let countdown = Countdown::new(
            config.validity_window_secs,
            Duration::from_millis(config.tick_interval_ms),
            sink.clone(),
        );

        Self {
            route,
            chains,
            custody,
            builder: TransactionBuilder::new(),
            countdown,
            sink,
            signer: RwLock::new(None),
            generation: AtomicU64::new(0),
            negotiation: Mutex::new(()),
            fees: RwLock::new(None),
            default_fee: None,
        }
    }

    /// Wire up the Squid route provider and Safe-backed custody from settings
    ///
    /// A wallet found under `signer.private_key_env` enables on-chain execution;
    /// the active signer is still chosen with [`set_signer`](Self::set_signer).
    pub fn from_settings(settings: &Settings, sink: Arc<dyn EventSink>) -> anyhow::Result<Self> {
        let chains = Arc::new(ChainRegistry::from_settings(settings)?);

        let wallet = chains
            .chain_ids()
            .first()
            .and_then(|chain_id| LocalSigner::from_env(&settings.signer, *chain_id).ok());
        if wallet.is_none() {
            warn!(
                "No wallet in {}, on-chain execution disabled",
                settings.signer.private_key_env
            );
        }

        let custody = Arc::new(CustodyRegistry::from_chains(&chains, wallet.as_ref()));
        let route = Arc::new(SquidRouteProvider::new(&settings.route));

        let default_fee = match &settings.route.fees {
            Some(fees) => Some(FeeConfig {
                integrator_address: fees.integrator_address.parse().map_err(|e| {
                    anyhow::anyhow!("Invalid fee integrator address: {:?}", e)
                })?,
                fee_bps: fees.fee_bps,
            }),
            None => None,
        };

        info!("Swap desk ready on chains {:?}", chains.chain_ids());
        Ok(Self::new(route, chains, custody, sink, &settings.desk).with_default_fee(default_fee))
    }

    /// Integrator fee applied to requests that carry none
    pub fn with_default_fee(mut self, fee: Option<FeeConfig>) -> Self {
        self.default_fee = fee;
        self
    }

    /// Fetch and accept a fresh quote, superseding any current one
    ///
    /// If the parameters change while the request is in flight, its result is
    /// discarded and `Cancelled` is returned.
    pub async fn get_estimate(&self, mut request: SwapRequest) -> DeskResult<Quote> {
        request.validate()?;
        if request.fee.is_none() {
            request.fee = self.default_fee.clone();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let _guard = self.negotiation.lock().await;
            self.drop_quote().await;
        }

        crate::metrics::record_quote_requested(request.source_chain);
        debug!("Estimate generation {} for chain {}", generation, request.source_chain);

        let result = self.route.quote(&request).await;

        let _guard = self.negotiation.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding estimate from superseded generation {}", generation);
            return Err(DeskError::Cancelled);
        }

        let quote = match result {
            Ok(quote) => quote,
            Err(e) => {
                crate::metrics::record_quote_failed(quote_failure_reason(&e));
                self.sink.report(DeskEvent::QuoteFailed {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let fees = quote.fees();
        *self.fees.write().await = Some(fees.clone());
        self.countdown.start(quote.clone()).await;

        info!(
            "Accepted quote {} ({} -> {}), fees {}",
            quote.id, quote.request.source_chain, quote.request.dest_chain, fees
        );
        self.sink.report(DeskEvent::QuoteAccepted {
            quote_id: quote.id,
            valid_for_secs: self.countdown.timer().lock().await.window(),
            estimated_fees: fees.to_string(),
        });

        Ok(quote)
    }

    /// Drop the active quote and any estimate in flight
    pub async fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _guard = self.negotiation.lock().await;
        self.drop_quote().await;
    }

    /// Switch the active signer; invalidates the current negotiation
    pub async fn set_signer(&self, signer: Option<Arc<dyn HashSigner>>) {
        match &signer {
            Some(s) => info!("Active signer {:?} on chain {}", s.address(), s.chain_id()),
            None => info!("Signer detached"),
        }
        *self.signer.write().await = signer;
        self.cancel().await;
    }

    pub async fn signer(&self) -> Option<Arc<dyn HashSigner>> {
        self.signer.read().await.clone()
    }

    /// The accepted quote, if still valid
    pub async fn active_quote(&self) -> Option<Quote> {
        self.countdown
            .timer()
            .lock()
            .await
            .valid_quote(Utc::now())
            .cloned()
    }

    pub async fn remaining(&self) -> u32 {
        self.countdown.remaining().await
    }

    /// Fees of the last accepted estimate
    pub async fn estimated_fees(&self) -> Option<FeeBreakdown> {
        self.fees.read().await.clone()
    }

    /// Run the balance gate for the active quote
    pub async fn check_balances(
        &self,
        known_balances: &HashMap<String, Decimal>,
    ) -> DeskResult<BalanceVerdict> {
        let quote = self.active_quote().await.ok_or(DeskError::QuoteExpired)?;
        self.evaluate_balances(&quote, known_balances).await
    }

    /// Build a draft custody transaction from the active quote
    ///
    /// Refuses without touching the network once the quote has expired, and
    /// checks expiry again after the account lookup.
    pub async fn create_transaction(
        &self,
        known_balances: &HashMap<String, Decimal>,
    ) -> DeskResult<CustodyTransactionLifecycle> {
        let quote = self.active_quote().await.ok_or(DeskError::QuoteExpired)?;
        let request = &quote.request;

        let verdict = self.evaluate_balances(&quote, known_balances).await?;
        if !verdict.allows_creation() {
            return Err(DeskError::BalanceBlocked(verdict.blocking_issues()));
        }
        let signer = self.signer().await;
        if verdict.chain_mismatch {
            let signer_chain = signer.as_ref().map(|s| s.chain_id()).unwrap_or_default();
            return Err(self.step_failed(
                "create transaction",
                LifecycleError::ChainMismatch {
                    signer_chain,
                    account_chain: request.source_chain,
                }
                .into(),
            ));
        }

        let network = self.chains.network(request.source_chain)?;
        let custody = self.custody.get(request.source_chain)?;

        let bundle = self
            .builder
            .build(&quote, request.source_account, request.dest_account);
        let call = bundle.into_custody_call(network.multisend);

        let info = custody
            .account_info(request.source_account)
            .await
            .map_err(|e| self.step_failed("create transaction", e.into()))?;

        self.ensure_fresh(quote.id).await?;

        let mut lifecycle =
            CustodyTransactionLifecycle::new_draft(info.account, call, info.nonce, custody, self.sink.clone());
        lifecycle.set_signer(signer);

        let summary = SwapSummary::from_quote(&quote, &self.chains);
        match serde_json::to_string(&summary) {
            Ok(origin) => lifecycle.set_origin(origin),
            Err(e) => warn!("Could not encode swap summary: {}", e),
        }

        info!(
            "Created draft for quote {} on {:?} (nonce {})",
            quote.id, request.source_account, info.nonce
        );
        Ok(lifecycle)
    }

    /// Create, hash, sign and propose in one go, re-checking the quote before each step
    pub async fn create_and_propose(
        &self,
        known_balances: &HashMap<String, Decimal>,
    ) -> DeskResult<CustodyTransactionLifecycle> {
        let quote_id = self
            .active_quote()
            .await
            .map(|q| q.id)
            .ok_or(DeskError::QuoteExpired)?;

        let mut lifecycle = self.create_transaction(known_balances).await?;

        self.fresh_or_abandon(quote_id, &mut lifecycle).await?;
        lifecycle.hash()?;

        self.fresh_or_abandon(quote_id, &mut lifecycle).await?;
        lifecycle.sign().await?;

        self.fresh_or_abandon(quote_id, &mut lifecycle).await?;
        lifecycle.propose().await?;

        Ok(lifecycle)
    }

    pub async fn accounts_by_owner(&self, chain_id: u64, owner: Address) -> DeskResult<Vec<Address>> {
        let custody = self.custody.get(chain_id)?;
        custody
            .accounts_by_owner(owner)
            .await
            .map_err(|e| self.step_failed("get accounts by owner", e.into()))
    }

    pub async fn account_info(&self, chain_id: u64, address: Address) -> DeskResult<AccountInfo> {
        let custody = self.custody.get(chain_id)?;
        custody
            .account_info(address)
            .await
            .map_err(|e| self.step_failed("get account info", e.into()))
    }

    pub async fn list_transactions(
        &self,
        chain_id: u64,
        address: Address,
        filters: TxFilters,
    ) -> DeskResult<Vec<TransactionRecord>> {
        let custody = self.custody.get(chain_id)?;
        custody
            .list_transactions(address, filters)
            .await
            .map_err(|e| self.step_failed("get all transactions", e.into()))
    }

    /// Load a pending transaction for confirmation or execution by this signer
    pub async fn open_pending(
        &self,
        chain_id: u64,
        safe_tx_hash: H256,
    ) -> DeskResult<CustodyTransactionLifecycle> {
        let custody = self.custody.get(chain_id)?;

        let pending = custody
            .get_transaction(safe_tx_hash)
            .await
            .map_err(|e| self.step_failed("get transaction", e.into()))?;
        let info = custody
            .account_info(pending.safe)
            .await
            .map_err(|e| self.step_failed("get account info", e.into()))?;

        let mut lifecycle =
            CustodyTransactionLifecycle::resume(info.account, pending, custody, self.sink.clone())?;
        lifecycle.set_signer(self.signer().await);
        Ok(lifecycle)
    }

    async fn evaluate_balances(
        &self,
        quote: &Quote,
        known_balances: &HashMap<String, Decimal>,
    ) -> DeskResult<BalanceVerdict> {
        let request = &quote.request;
        let native_symbol = self.chains.native_symbol(request.source_chain)?;
        let active_chain_id = self.signer().await.map(|s| s.chain_id());
        let fees = quote.fees();

        let verdict = gate::evaluate(&BalanceCheck {
            source_amount: request.source_amount_human().unwrap_or(Decimal::MAX),
            source_symbol: &request.source_token.symbol,
            source_is_native: request.source_token.is_native(),
            dest_symbol: &request.dest_token.symbol,
            known_balances,
            estimated_network_fee: fees.for_asset(&native_symbol),
            native_symbol: &native_symbol,
            active_chain_id,
            requested_source_chain_id: request.source_chain,
        });

        if let Some(issue) = verdict.primary_issue() {
            debug!("Balance gate for quote {}: {}", quote.id, issue);
        }
        Ok(verdict)
    }

    async fn ensure_fresh(&self, quote_id: Uuid) -> DeskResult<()> {
        let valid = self
            .countdown
            .timer()
            .lock()
            .await
            .is_valid(quote_id, Utc::now());
        if valid {
            Ok(())
        } else {
            warn!("Quote {} expired before the transaction was built", quote_id);
            Err(DeskError::QuoteExpired)
        }
    }

    async fn fresh_or_abandon(
        &self,
        quote_id: Uuid,
        lifecycle: &mut CustodyTransactionLifecycle,
    ) -> DeskResult<()> {
        if let Err(e) = self.ensure_fresh(quote_id).await {
            // Already terminal is fine, the quote is gone either way
            let _ = lifecycle.abandon("swap estimate expired");
            return Err(e);
        }
        Ok(())
    }

    /// Caller must hold `negotiation`
    async fn drop_quote(&self) {
        let dropped = self.countdown.cancel().await;
        *self.fees.write().await = None;
        if let Some(quote) = dropped {
            debug!("Dropped quote {}", quote.id);
            self.sink.report(DeskEvent::QuoteCancelled {
                quote_id: Some(quote.id),
            });
        }
    }

    fn step_failed(&self, operation: &str, err: DeskError) -> DeskError {
        warn!("Failed to {}: {}", operation, err);
        self.sink.report(DeskEvent::StepFailed {
            operation: operation.to_string(),
            message: err.to_string(),
            switch_network: err.requires_network_switch(),
        });
        err
    }
}

fn quote_failure_reason(err: &QuoteError) -> &'static str {
    match err {
        QuoteError::Upstream(_) => "upstream",
        QuoteError::Unpriceable(_) => "unpriceable",
        QuoteError::InvalidRequest(_) => "invalid_request",
    }
}
