//! MultiSendCallOnly payload packing

use super::{Call, Operation};

use ethers::abi::{self, Token};
use ethers::types::{Bytes, U256};
use ethers::utils::id;

fn push_word(buf: &mut Vec<u8>, value: U256) {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    buf.extend_from_slice(&word);
}

/// `multiSend(bytes)` calldata running `calls` in order
///
/// Each call is packed as `operation (1) | to (20) | value (32) | data length (32) | data`.
/// Only plain calls are packed; MultiSendCallOnly rejects nested delegate calls.
pub fn encode_multisend(calls: &[Call]) -> Bytes {
    let mut packed = Vec::with_capacity(calls.iter().map(|c| 85 + c.data.len()).sum());

    for call in calls {
        packed.push(u8::from(Operation::Call));
        packed.extend_from_slice(call.to.as_bytes());
        push_word(&mut packed, call.value);
        push_word(&mut packed, U256::from(call.data.len()));
        packed.extend_from_slice(&call.data);
    }

    let mut data = id("multiSend(bytes)").to_vec();
    data.extend(abi::encode(&[Token::Bytes(packed)]));
    data.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    #[test]
    fn test_multisend_layout() {
        let first = Call {
            to: Address::from_low_u64_be(0xaa),
            value: U256::zero(),
            data: Bytes::from(vec![0x09, 0x5e, 0xa7, 0xb3]),
        };
        let second = Call {
            to: Address::from_low_u64_be(0xbb),
            value: U256::from(7u64),
            data: Bytes::from(vec![0x01, 0x02]),
        };

        let data = encode_multisend(&[first.clone(), second.clone()]);

        assert_eq!(hex::encode(&data[..4]), "8d80ff0a");
        // offset word, then length word
        assert_eq!(U256::from_big_endian(&data[4..36]), U256::from(32u64));
        let packed_len = U256::from_big_endian(&data[36..68]).as_usize();
        assert_eq!(packed_len, (85 + 4) + (85 + 2));

        let packed = &data[68..68 + packed_len];
        assert_eq!(packed[0], 0);
        assert_eq!(&packed[1..21], first.to.as_bytes());
        assert_eq!(U256::from_big_endian(&packed[53..85]), U256::from(4u64));
        assert_eq!(&packed[85..89], first.data.as_ref());

        let rest = &packed[89..];
        assert_eq!(rest[0], 0);
        assert_eq!(&rest[1..21], second.to.as_bytes());
        assert_eq!(U256::from_big_endian(&rest[21..53]), U256::from(7u64));
        assert_eq!(&rest[85..], second.data.as_ref());

        // padded to a whole word
        assert_eq!((data.len() - 4) % 32, 0);
    }
}
