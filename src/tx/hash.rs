//! EIP-712 hashing for Safe transactions

use super::CustodyCall;

use ethers::abi::{self, Token};
use ethers::types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

const DOMAIN_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";
const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

pub fn domain_separator(chain_id: u64, safe: Address) -> H256 {
    let encoded = abi::encode(&[
        Token::FixedBytes(keccak256(DOMAIN_TYPE).to_vec()),
        Token::Uint(U256::from(chain_id)),
        Token::Address(safe),
    ]);
    H256(keccak256(encoded))
}

/// Hash owners sign to approve `call` at `nonce`
///
/// Gas refund fields are always zero: the executing owner pays gas directly.
pub fn safe_tx_hash(chain_id: u64, safe: Address, call: &CustodyCall, nonce: u64) -> H256 {
    let struct_hash = keccak256(abi::encode(&[
        Token::FixedBytes(keccak256(SAFE_TX_TYPE).to_vec()),
        Token::Address(call.to),
        Token::Uint(call.value),
        Token::FixedBytes(keccak256(&call.data).to_vec()),
        Token::Uint(U256::from(u8::from(call.operation))),
        Token::Uint(U256::zero()),
        Token::Uint(U256::zero()),
        Token::Uint(U256::zero()),
        Token::Address(Address::zero()),
        Token::Address(Address::zero()),
        Token::Uint(U256::from(nonce)),
    ]));

    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(&[0x19, 0x01]);
    message.extend_from_slice(domain_separator(chain_id, safe).as_bytes());
    message.extend_from_slice(&struct_hash);
    H256(keccak256(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::Operation;
    use ethers::types::Bytes;

    #[test]
    fn test_type_hashes_match_safe_contracts() {
        assert_eq!(
            hex::encode(keccak256(DOMAIN_TYPE)),
            "47e79534a245952e8b16893a336b85a3d9ea9fa8c573f3d803afb92a79469218"
        );
        assert_eq!(
            hex::encode(keccak256(SAFE_TX_TYPE)),
            "bb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8"
        );
    }

    #[test]
    fn test_hash_commits_to_every_input() {
        let safe = Address::from_low_u64_be(0x5afe);
        let call = CustodyCall {
            to: Address::from_low_u64_be(0xaa),
            value: U256::zero(),
            data: Bytes::from(vec![1, 2, 3]),
            operation: Operation::DelegateCall,
        };

        let base = safe_tx_hash(42161, safe, &call, 7);
        assert_eq!(base, safe_tx_hash(42161, safe, &call, 7));
        assert_ne!(base, safe_tx_hash(42161, safe, &call, 8));
        assert_ne!(base, safe_tx_hash(1, safe, &call, 7));
        assert_ne!(base, safe_tx_hash(42161, Address::zero(), &call, 7));

        let mut plain = call.clone();
        plain.operation = Operation::Call;
        assert_ne!(base, safe_tx_hash(42161, safe, &plain, 7));
    }

    #[test]
    fn test_domain_separator_depends_on_chain() {
        let safe = Address::from_low_u64_be(0x5afe);
        assert_ne!(domain_separator(1, safe), domain_separator(10, safe));
    }
}
