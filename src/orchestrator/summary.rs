//! Proposal origin describing the swap to co-owners

use crate::chain::ChainRegistry;
use crate::route::Quote;

use ethers::utils::to_checksum;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Human-readable description of a swap, stored as the proposal origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub from: String,
    pub from_network: String,
    pub from_amount: String,
    pub to: String,
    pub to_network: String,
    pub to_amount: String,
    pub estimated_swap_fees: String,
}

impl SwapSummary {
    pub fn from_quote(quote: &Quote, chains: &ChainRegistry) -> Self {
        let request = &quote.request;
        let network_name = |chain_id: u64| {
            chains
                .network(chain_id)
                .map(|n| n.name)
                .unwrap_or_else(|_| chain_id.to_string())
        };
        let amount = |value: Option<Decimal>, symbol: &str| {
            value
                .map(|v| format!("{} {}", v.normalize(), symbol))
                .unwrap_or_default()
        };

        Self {
            kind: "swap".to_string(),
            from: to_checksum(&request.source_account, None),
            from_network: network_name(request.source_chain),
            from_amount: amount(request.source_amount_human(), &request.source_token.symbol),
            to: to_checksum(&request.dest_account, None),
            to_network: network_name(request.dest_chain),
            // Destination decimals, not the source token's
            to_amount: amount(quote.dest_amount_human(), &quote.estimate.dest_token.symbol),
            estimated_swap_fees: quote.fees().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::NetworkInfo;
    use crate::quote::expiry::tests::sample_quote;
    use crate::route::{CostLine, TokenInfo};
    use ethers::types::{Address, U256};

    #[test]
    fn test_summary_uses_destination_decimals() {
        let chains = ChainRegistry::new();
        chains.insert(NetworkInfo {
            chain_id: 42161,
            name: "arbitrum".to_string(),
            native_symbol: "ETH".to_string(),
            multisend: Address::zero(),
            safe_transaction_service: String::new(),
        });

        let mut quote = sample_quote();
        quote.request.source_account = "0x5aFEB8F0E7a6fA2E8C1a3a1B9D5e2c0A9e6b4F21".parse().unwrap();
        quote.estimate.dest_amount = U256::from(49_800_000_000_000_000_000u128);
        quote.estimate.dest_token = TokenInfo {
            symbol: "DAI".to_string(),
            decimals: 18,
        };
        quote.estimate.fee_costs = vec![CostLine::new(U256::from(50_000u64), "USDC", 6)];

        let summary = SwapSummary::from_quote(&quote, &chains);
        assert_eq!(summary.from, to_checksum(&quote.request.source_account, None));
        assert_ne!(summary.from, summary.from.to_lowercase());
        assert_eq!(summary.from_amount, "50 USDC");
        assert_eq!(summary.from_network, "arbitrum");
        assert_eq!(summary.to, "0x0000000000000000000000000000000000000002");
        assert_eq!(summary.to_network, "10");
        assert_eq!(summary.to_amount, "49.8 DAI");
        assert_eq!(summary.estimated_swap_fees, "0.05 USDC");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["type"], "swap");
        assert_eq!(json["fromNetwork"], "arbitrum");
        assert_eq!(json["estimatedSwapFees"], "0.05 USDC");
    }
}
