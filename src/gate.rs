//! Balance and chain checks run before a custody transaction may be built
//!
//! Pure functions only. Every facet is computed so the caller can show the
//! most relevant problem; nothing short-circuits.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Inputs for a single balance check, all amounts in human units
#[derive(Debug, Clone)]
pub struct BalanceCheck<'a> {
    pub source_amount: Decimal,
    pub source_symbol: &'a str,
    /// Source token is the chain's gas asset itself, not a token contract
    pub source_is_native: bool,
    pub dest_symbol: &'a str,
    pub known_balances: &'a HashMap<String, Decimal>,
    /// Estimated cost in the native gas asset only; other fee assets excluded
    pub estimated_network_fee: Decimal,
    pub native_symbol: &'a str,
    /// Chain of the connected wallet, `None` when no wallet is connected
    pub active_chain_id: Option<u64>,
    pub requested_source_chain_id: u64,
}

/// Advisory problem with a proposed swap; returned, never thrown
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BalanceError {
    #[error("Insufficient safe {symbol} balance")]
    InsufficientTokenBalance { symbol: String },

    #[error("Insufficient safe {symbol} balance, at least {required} {symbol} needed")]
    InsufficientGasBalance { symbol: String, required: Decimal },

    #[error("Switch to chain {requested}")]
    ChainMismatch { active: u64, requested: u64 },
}

/// Independent facets of a balance check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceVerdict {
    pub insufficient_token_balance: bool,
    pub insufficient_gas_balance: bool,
    pub chain_mismatch: bool,
    issues: Vec<BalanceError>,
}

impl BalanceVerdict {
    /// A chain mismatch is corrected by switching networks, not a hard block
    pub fn allows_creation(&self) -> bool {
        !self.insufficient_token_balance && !self.insufficient_gas_balance
    }

    pub fn is_clear(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues ordered by relevance: token, gas, then chain
    pub fn issues(&self) -> &[BalanceError] {
        &self.issues
    }

    /// Issues that block creation outright
    pub fn blocking_issues(&self) -> Vec<BalanceError> {
        self.issues
            .iter()
            .filter(|i| !matches!(i, BalanceError::ChainMismatch { .. }))
            .cloned()
            .collect()
    }

    pub fn primary_issue(&self) -> Option<&BalanceError> {
        self.issues.first()
    }
}

/// Run every facet of the balance gate
///
/// An asset missing from `known_balances` counts as a zero balance.
pub fn evaluate(check: &BalanceCheck<'_>) -> BalanceVerdict {
    let balance_of = |symbol: &str| {
        check
            .known_balances
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO)
    };

    let token_balance = balance_of(check.source_symbol);
    let native_balance = balance_of(check.native_symbol);

    let insufficient_token_balance = check.source_amount > token_balance;

    let required_native = if check.source_is_native {
        check.source_amount + check.estimated_network_fee
    } else {
        check.estimated_network_fee
    };
    let insufficient_gas_balance = native_balance < check.estimated_network_fee
        || (check.source_is_native && native_balance < required_native);

    let chain_mismatch = check
        .active_chain_id
        .map(|active| active != check.requested_source_chain_id)
        .unwrap_or(false);

    let mut issues = Vec::new();
    if insufficient_token_balance {
        issues.push(BalanceError::InsufficientTokenBalance {
            symbol: check.source_symbol.to_string(),
        });
    }
    if insufficient_gas_balance {
        issues.push(BalanceError::InsufficientGasBalance {
            symbol: check.native_symbol.to_string(),
            required: required_native.normalize(),
        });
    }
    if let (true, Some(active)) = (chain_mismatch, check.active_chain_id) {
        issues.push(BalanceError::ChainMismatch {
            active,
            requested: check.requested_source_chain_id,
        });
    }

    BalanceVerdict {
        insufficient_token_balance,
        insufficient_gas_balance,
        chain_mismatch,
        issues,
    }
}
