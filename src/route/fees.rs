//! Minor/human unit conversion and fee aggregation
//!
//! Fee and gas lines may be denominated in tokens with different decimals, so
//! every line is converted to human units before summing.

use super::{CostLine, Estimate};

use ethers::types::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Decimal supports at most 28 fractional digits
const MAX_SCALE: u32 = 28;

/// `amount / 10^decimals`, or `None` if it does not fit a `Decimal`
pub fn to_human(amount: U256, decimals: u32) -> Option<Decimal> {
    if decimals > MAX_SCALE || amount > U256::from(i128::MAX as u128) {
        return None;
    }
    let mantissa = amount.as_u128() as i128;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .ok()
        .map(|d| d.normalize())
}

/// `amount * 10^decimals`, truncating precision the token cannot carry
pub fn from_human(amount: Decimal, decimals: u32) -> Option<U256> {
    if amount.is_sign_negative() {
        return None;
    }
    let ten = Decimal::from(10);
    let mut scaled = amount;
    for _ in 0..decimals {
        scaled = scaled.checked_mul(ten)?;
    }
    scaled.trunc().to_u128().map(U256::from)
}

/// Human-unit sum of cost lines; unconvertible lines are skipped
pub fn sum_costs(costs: &[CostLine]) -> Decimal {
    costs
        .iter()
        .filter_map(CostLine::human)
        .fold(Decimal::ZERO, |acc, v| acc + v)
}

/// Aggregate fee of an estimate
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeeBreakdown {
    /// Σ fee lines + Σ gas lines, each in its own human units
    pub total: Decimal,
    /// Per-asset sums in first-seen order
    pub per_asset: Vec<(String, Decimal)>,
}

impl FeeBreakdown {
    pub fn from_estimate(estimate: &Estimate) -> Self {
        let total = sum_costs(&estimate.fee_costs) + sum_costs(&estimate.gas_costs);

        let mut per_asset: Vec<(String, Decimal)> = Vec::new();
        for line in estimate.fee_costs.iter().chain(estimate.gas_costs.iter()) {
            let Some(value) = line.human() else { continue };
            match per_asset.iter_mut().find(|(s, _)| *s == line.token.symbol) {
                Some((_, sum)) => *sum += value,
                None => per_asset.push((line.token.symbol.clone(), value)),
            }
        }

        Self { total, per_asset }
    }

    /// Sum for one asset, zero if it does not appear
    pub fn for_asset(&self, symbol: &str) -> Decimal {
        self.per_asset
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, v)| *v)
            .unwrap_or(Decimal::ZERO)
    }
}

impl fmt::Display for FeeBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.per_asset.is_empty() {
            return write!(f, "0");
        }
        let parts: Vec<String> = self
            .per_asset
            .iter()
            .map(|(symbol, value)| format!("{} {}", value.normalize(), symbol))
            .collect();
        write!(f, "{}", parts.join(" + "))
    }
}
