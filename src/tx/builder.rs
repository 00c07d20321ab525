//! Swap bundle construction
//!
//! A quote becomes an ordered bundle: token approval first, swap second. The
//! bundle only states the order; MultiSend is what enforces it on-chain.

use super::multisend::encode_multisend;
use super::{Call, CustodyCall, Operation};
use crate::route::Quote;

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Ordered calls to run from one custody account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallBundle {
    pub quote_id: Uuid,
    pub source_account: Address,
    pub dest_account: Address,
    pub calls: Vec<Call>,
}

impl CallBundle {
    /// Collapse the bundle into the single call a Safe transaction executes
    ///
    /// Several calls go through a MultiSendCallOnly delegate call so they run
    /// in order; a lone call is executed directly.
    pub fn into_custody_call(&self, multisend: Address) -> CustodyCall {
        match self.calls.as_slice() {
            [single] => CustodyCall {
                to: single.to,
                value: single.value,
                data: single.data.clone(),
                operation: Operation::Call,
            },
            calls => CustodyCall {
                to: multisend,
                value: U256::zero(),
                data: encode_multisend(calls),
                operation: Operation::DelegateCall,
            },
        }
    }
}

/// `approve(spender, amount)` calldata for an ERC-20 token
pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    let mut data = id("approve(address,uint256)").to_vec();
    data.extend(abi::encode(&[Token::Address(spender), Token::Uint(amount)]));
    data.into()
}

/// Turns accepted quotes into call bundles
#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionBuilder;

impl TransactionBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, quote: &Quote, source_account: Address, dest_account: Address) -> CallBundle {
        let route_call = &quote.transaction_request;
        let source_token = &quote.request.source_token;

        let mut calls = Vec::with_capacity(2);

        // Native gas assets have no token contract to approve
        if !source_token.is_native() {
            calls.push(Call {
                to: source_token.address,
                value: U256::zero(),
                data: encode_approve(route_call.target, quote.estimate.source_amount),
            });
        }

        calls.push(Call {
            to: route_call.target,
            value: route_call.value,
            data: route_call.data.clone(),
        });

        debug!(
            "Built {} call bundle for quote {} from {:?}",
            calls.len(),
            quote.id,
            source_account
        );

        CallBundle {
            quote_id: quote.id,
            source_account,
            dest_account,
            calls,
        }
    }
}
