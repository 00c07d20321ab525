//! Custody call construction: swap bundles, MultiSend packing, Safe hashing

mod builder;
mod hash;
mod multisend;

pub use builder::{encode_approve, CallBundle, TransactionBuilder};
pub use hash::{domain_separator, keccak256, safe_tx_hash};
pub use multisend::encode_multisend;

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Safe operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Operation {
    Call,
    DelegateCall,
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> u8 {
        match op {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operation::Call),
            1 => Ok(Operation::DelegateCall),
            other => Err(format!("unknown operation {}", other)),
        }
    }
}

/// A single contract call inside a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// The one call a Safe transaction executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_values() {
        assert_eq!(u8::from(Operation::Call), 0);
        assert_eq!(u8::from(Operation::DelegateCall), 1);
        assert_eq!(Operation::try_from(1u8), Ok(Operation::DelegateCall));
        assert!(Operation::try_from(2u8).is_err());
        assert_eq!(serde_json::to_string(&Operation::DelegateCall).unwrap(), "1");
    }
}
