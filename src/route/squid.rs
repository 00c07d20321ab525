//! Squid v2 route quoting client

use super::{CostLine, Estimate, FeeConfig, Quote, RouteCall, RouteProvider, SwapRequest, TokenInfo};
use crate::config::RouteConfig;
use crate::error::{QuoteError, QuoteResult};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client for the Squid route API
pub struct SquidRouteProvider {
    client: Client,
    base_url: String,
    integrator_id: String,
    enable_boost: bool,
    slippage_auto_mode: u8,
}

impl SquidRouteProvider {
    pub fn new(config: &RouteConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            integrator_id: config.integrator_id.clone(),
            enable_boost: config.enable_boost,
            slippage_auto_mode: config.slippage_auto_mode,
        }
    }

    fn params(&self, request: &SwapRequest) -> RouteParams {
        RouteParams {
            from_chain: request.source_chain.to_string(),
            from_token: request.source_token.address,
            from_amount: request.source_amount.to_string(),
            to_chain: request.dest_chain.to_string(),
            to_token: request.dest_token.address,
            from_address: request.source_account,
            to_address: request.dest_account,
            enable_boost: self.enable_boost,
            quote_only: false,
            slippage_config: SlippageConfig {
                auto_mode: self.slippage_auto_mode,
            },
            collect_fees: request.fee.as_ref().map(CollectFees::from),
        }
    }
}

#[async_trait]
impl RouteProvider for SquidRouteProvider {
    async fn quote(&self, request: &SwapRequest) -> QuoteResult<Quote> {
        request.validate()?;

        let url = format!("{}/v2/route", self.base_url);
        debug!(
            "Requesting route {}:{:?} -> {}:{:?}",
            request.source_chain,
            request.source_token.address,
            request.dest_chain,
            request.dest_token.address
        );

        let response = self
            .client
            .post(&url)
            .header("x-integrator-id", &self.integrator_id)
            .json(&self.params(request))
            .send()
            .await
            .map_err(|e| QuoteError::Upstream(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QuoteError::Upstream(e.to_string()))?;

        if !status.is_success() {
            let message = upstream_message(&body).unwrap_or_else(|| status.to_string());
            warn!("Route request rejected ({}): {}", status, message);
            return Err(classify_failure(status, message));
        }

        parse_route(request, &body)
    }
}

/// 4xx means the service understood the request and could not route it
fn classify_failure(status: StatusCode, message: String) -> QuoteError {
    if status.is_client_error() {
        QuoteError::Unpriceable(message)
    } else {
        QuoteError::Upstream(message)
    }
}

/// First upstream error message, verbatim
fn upstream_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .errors
        .into_iter()
        .find_map(|e| e.message.filter(|m| !m.is_empty()))
        .or(parsed.message)
}

fn parse_route(request: &SwapRequest, body: &str) -> QuoteResult<Quote> {
    let envelope: serde_json::Value =
        serde_json::from_str(body).map_err(|e| QuoteError::Upstream(e.to_string()))?;

    let route = envelope
        .get("route")
        .cloned()
        .ok_or_else(|| QuoteError::Unpriceable("response carries no route".to_string()))?;

    let wire: WireRoute = serde_json::from_value(route.clone())
        .map_err(|e| QuoteError::Upstream(format!("malformed route: {}", e)))?;

    let estimate = wire
        .estimate
        .ok_or_else(|| QuoteError::Unpriceable("route carries no estimate".to_string()))?;
    let tx = wire.transaction_request.ok_or_else(|| {
        QuoteError::Unpriceable("route carries no transaction request".to_string())
    })?;

    let dest_token = estimate
        .to_token
        .map(TokenInfo::from)
        .unwrap_or_else(|| TokenInfo {
            symbol: request.dest_token.symbol.clone(),
            decimals: request.dest_token.decimals,
        });

    let estimate = Estimate {
        source_amount: parse_amount("fromAmount", &estimate.from_amount)?,
        dest_amount: parse_amount("toAmount", &estimate.to_amount)?,
        dest_token,
        fee_costs: cost_lines(estimate.fee_costs)?,
        gas_costs: cost_lines(estimate.gas_costs)?,
    };

    let transaction_request = RouteCall {
        target: tx.target,
        data: tx.data,
        value: parse_amount("value", tx.value.as_deref().unwrap_or("0"))?,
    };

    Ok(Quote::new(
        request.clone(),
        route,
        estimate,
        transaction_request,
    ))
}

fn parse_amount(field: &str, raw: &str) -> QuoteResult<U256> {
    U256::from_dec_str(raw)
        .map_err(|_| QuoteError::Upstream(format!("malformed {}: {:?}", field, raw)))
}

/// Lines without an amount carry no cost and are dropped
fn cost_lines(costs: Vec<WireCost>) -> QuoteResult<Vec<CostLine>> {
    costs
        .into_iter()
        .filter_map(|c| c.amount.map(|amount| (amount, c.token)))
        .map(|(amount, token)| {
            Ok(CostLine {
                amount: parse_amount("cost amount", &amount)?,
                token: token.into(),
            })
        })
        .collect()
}

// Wire types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteParams {
    from_chain: String,
    from_token: Address,
    from_amount: String,
    to_chain: String,
    to_token: Address,
    from_address: Address,
    to_address: Address,
    enable_boost: bool,
    quote_only: bool,
    slippage_config: SlippageConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    collect_fees: Option<CollectFees>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SlippageConfig {
    auto_mode: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectFees {
    integrator_address: Address,
    fee: u32,
}

impl From<&FeeConfig> for CollectFees {
    fn from(fee: &FeeConfig) -> Self {
        Self {
            integrator_address: fee.integrator_address,
            fee: fee.fee_bps,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoute {
    estimate: Option<WireEstimate>,
    transaction_request: Option<WireTransaction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEstimate {
    from_amount: String,
    to_amount: String,
    to_token: Option<WireToken>,
    #[serde(default)]
    fee_costs: Vec<WireCost>,
    #[serde(default)]
    gas_costs: Vec<WireCost>,
}

#[derive(Deserialize)]
struct WireToken {
    #[serde(default)]
    symbol: String,
    decimals: u32,
}

impl From<WireToken> for TokenInfo {
    fn from(token: WireToken) -> Self {
        TokenInfo {
            symbol: token.symbol,
            decimals: token.decimals,
        }
    }
}

#[derive(Deserialize)]
struct WireCost {
    amount: Option<String>,
    token: WireToken,
}

#[derive(Deserialize)]
struct WireTransaction {
    target: Address,
    data: Bytes,
    value: Option<String>,
}
