//! Route quoting
//!
//! Types shared by every route source plus the `RouteProvider` seam. A quote
//! is fetched fresh on every estimate request; nothing here caches.

pub mod fees;
pub mod squid;

pub use fees::{from_human, to_human, FeeBreakdown};
pub use squid::SquidRouteProvider;

use crate::error::{QuoteError, QuoteResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H160, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder address route services use for a chain's native gas asset
pub const NATIVE_TOKEN: Address = H160([0xee; 20]);

/// A token as selected by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub address: Address,
    pub symbol: String,
    pub decimals: u32,
}

impl TokenRef {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }

    pub fn native(symbol: impl Into<String>) -> Self {
        Self::new(NATIVE_TOKEN, symbol, 18)
    }

    /// Whether this is the chain's native gas asset rather than a token contract
    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN
    }
}

/// Integrator fee collected on each swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub integrator_address: Address,
    pub fee_bps: u32,
}

/// Parameters of a single swap estimate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub source_chain: u64,
    pub source_token: TokenRef,
    /// Minor units of `source_token`
    pub source_amount: U256,
    pub dest_chain: u64,
    pub dest_token: TokenRef,
    pub source_account: Address,
    pub dest_account: Address,
    pub fee: Option<FeeConfig>,
}

impl SwapRequest {
    /// Build a request from a human-unit amount of the source token
    #[allow(clippy::too_many_arguments)]
    pub fn from_human(
        source_chain: u64,
        source_token: TokenRef,
        amount: Decimal,
        dest_chain: u64,
        dest_token: TokenRef,
        source_account: Address,
        dest_account: Address,
        fee: Option<FeeConfig>,
    ) -> QuoteResult<Self> {
        let source_amount = from_human(amount, source_token.decimals).ok_or_else(|| {
            QuoteError::InvalidRequest(format!(
                "{} is not a representable {} amount",
                amount, source_token.symbol
            ))
        })?;

        Ok(Self {
            source_chain,
            source_token,
            source_amount,
            dest_chain,
            dest_token,
            source_account,
            dest_account,
            fee,
        })
    }

    /// Reject requests that are missing a field or move nothing
    pub fn validate(&self) -> QuoteResult<()> {
        let missing = if self.source_chain == 0 {
            Some("source chain")
        } else if self.dest_chain == 0 {
            Some("destination chain")
        } else if self.source_token.address.is_zero() {
            Some("source token")
        } else if self.dest_token.address.is_zero() {
            Some("destination token")
        } else if self.source_account.is_zero() {
            Some("source account")
        } else if self.dest_account.is_zero() {
            Some("destination account")
        } else {
            None
        };

        if let Some(field) = missing {
            return Err(QuoteError::InvalidRequest(format!("{} is required", field)));
        }

        if self.source_amount.is_zero() {
            return Err(QuoteError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Source amount in human units
    pub fn source_amount_human(&self) -> Option<Decimal> {
        to_human(self.source_amount, self.source_token.decimals)
    }
}

/// Token metadata attached to an estimate line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u32,
}

/// One fee or gas cost in minor units of its own token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLine {
    pub amount: U256,
    pub token: TokenInfo,
}

impl CostLine {
    pub fn new(amount: U256, symbol: impl Into<String>, decimals: u32) -> Self {
        Self {
            amount,
            token: TokenInfo {
                symbol: symbol.into(),
                decimals,
            },
        }
    }

    pub fn human(&self) -> Option<Decimal> {
        to_human(self.amount, self.token.decimals)
    }
}

/// Priced outcome of a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub source_amount: U256,
    pub dest_amount: U256,
    pub dest_token: TokenInfo,
    pub fee_costs: Vec<CostLine>,
    pub gas_costs: Vec<CostLine>,
}

/// Call the route service wants executed on the source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCall {
    pub target: Address,
    pub data: Bytes,
    pub value: U256,
}

/// A priced route; superseded, never mutated, on re-negotiation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub request: SwapRequest,
    /// Opaque route metadata as returned by the service
    pub route: serde_json::Value,
    pub estimate: Estimate,
    pub transaction_request: RouteCall,
    pub issued_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        request: SwapRequest,
        route: serde_json::Value,
        estimate: Estimate,
        transaction_request: RouteCall,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            route,
            estimate,
            transaction_request,
            issued_at: Utc::now(),
        }
    }

    /// Wall-clock validity: `now - issued_at < window`
    pub fn is_fresh(&self, window_secs: u32, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.issued_at);
        age < chrono::Duration::seconds(window_secs as i64)
    }

    /// Aggregate fee across all fee and gas lines
    pub fn fees(&self) -> FeeBreakdown {
        FeeBreakdown::from_estimate(&self.estimate)
    }

    /// Destination amount using the destination token's own decimals
    pub fn dest_amount_human(&self) -> Option<Decimal> {
        to_human(self.estimate.dest_amount, self.estimate.dest_token.decimals)
    }
}

/// Source of priced routes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Price a swap; callers pass current parameters on every call
    async fn quote(&self, request: &SwapRequest) -> QuoteResult<Quote>;
}
