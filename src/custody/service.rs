//! Safe Transaction Service v1 client

use super::{AccountInfo, CustodyAccount, Proposal, ServiceTransaction, TransactionRecord, TxFilters};
use crate::error::{LifecycleError, LifecycleResult};

use ethers::types::{Address, Bytes, H256};
use ethers::utils::to_checksum;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Message the service and SDKs use for an account missing on this chain
pub const PROXY_NOT_DEPLOYED: &str = "SafeProxy contract is not deployed on the current network";

/// HTTP client for one chain's transaction service
pub struct SafeServiceClient {
    client: Client,
    base_url: String,
    chain_id: u64,
}

impl SafeServiceClient {
    pub fn new(base_url: &str, chain_id: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    /// Send `request`; a 404 against an account path means the account is missing
    async fn send(&self, request: RequestBuilder, account: Option<Address>) -> LifecycleResult<String> {
        let response = request
            .send()
            .await
            .map_err(|e| LifecycleError::upstream(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LifecycleError::upstream(e.to_string()))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = service_message(&body).unwrap_or_else(|| status.to_string());
        warn!("Custody service rejected request ({}): {}", status, message);
        Err(classify_failure(status, message, account, self.chain_id))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        account: Option<Address>,
    ) -> LifecycleResult<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let body = self.send(self.client.get(&url).query(query), account).await?;
        serde_json::from_str(&body).map_err(|e| LifecycleError::upstream(e.to_string()))
    }

    pub async fn accounts_by_owner(&self, owner: Address) -> LifecycleResult<Vec<Address>> {
        let path = format!("owners/{}/safes/", to_checksum(&owner, None));
        let response: OwnerSafes = self.get_json(&path, &[], None).await?;
        Ok(response.safes)
    }

    pub async fn account_info(&self, address: Address) -> LifecycleResult<AccountInfo> {
        let path = format!("safes/{}/", to_checksum(&address, None));
        let info: WireSafeInfo = self.get_json(&path, &[], Some(address)).await?;

        Ok(AccountInfo {
            account: CustodyAccount {
                chain_id: self.chain_id,
                address: info.address,
                signer_threshold: info.threshold,
                owners: info.owners,
            },
            nonce: info.nonce,
            version: info.version,
        })
    }

    /// Every page of the account's history, newest first
    pub async fn list_transactions(
        &self,
        address: Address,
        filters: TxFilters,
    ) -> LifecycleResult<Vec<TransactionRecord>> {
        let path = format!("safes/{}/all-transactions/", to_checksum(&address, None));
        let query = filter_query(filters);

        let mut page: Page<TransactionRecord> = self.get_json(&path, &query, Some(address)).await?;
        let mut records = std::mem::take(&mut page.results);

        while let Some(next) = page.next.take() {
            debug!("GET {}", next);
            let body = self.send(self.client.get(&next), Some(address)).await?;
            page = serde_json::from_str(&body).map_err(|e| LifecycleError::upstream(e.to_string()))?;
            records.append(&mut page.results);
        }

        Ok(records)
    }

    pub async fn propose_transaction(&self, proposal: &Proposal) -> LifecycleResult<()> {
        let path = format!(
            "safes/{}/multisig-transactions/",
            to_checksum(&proposal.safe, None)
        );
        let url = self.url(&path);
        debug!("POST {} ({:?})", url, proposal.safe_tx_hash);

        let body = WireProposal::from(proposal);
        self.send(self.client.post(&url).json(&body), Some(proposal.safe))
            .await
            .map(|_| ())
    }

    pub async fn confirm_transaction(&self, safe_tx_hash: H256, signature: Bytes) -> LifecycleResult<()> {
        let url = self.url(&format!("multisig-transactions/{:?}/confirmations/", safe_tx_hash));
        debug!("POST {}", url);

        self.send(
            self.client.post(&url).json(&WireConfirmation { signature }),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn get_transaction(&self, safe_tx_hash: H256) -> LifecycleResult<ServiceTransaction> {
        let path = format!("multisig-transactions/{:?}/", safe_tx_hash);
        self.get_json(&path, &[], None).await
    }
}

fn classify_failure(
    status: StatusCode,
    message: String,
    account: Option<Address>,
    chain_id: u64,
) -> LifecycleError {
    let missing_account = account.filter(|_| status == StatusCode::NOT_FOUND);
    match missing_account {
        Some(address) => LifecycleError::ProxyNotDeployed { address, chain_id },
        None if message == PROXY_NOT_DEPLOYED => LifecycleError::ProxyNotDeployed {
            address: account.unwrap_or_default(),
            chain_id,
        },
        None => LifecycleError::UpstreamRejected { message },
    }
}

/// Human-readable message from an error body, verbatim
fn service_message(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;

    for key in ["detail", "message"] {
        if let Some(text) = parsed.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }

    parsed
        .get("nonFieldErrors")
        .and_then(|v| v.as_array())
        .and_then(|errors| errors.first())
        .and_then(|first| first.as_str())
        .map(String::from)
}

fn filter_query(filters: TxFilters) -> Vec<(&'static str, String)> {
    [
        ("executed", filters.executed),
        ("queued", filters.queued),
        ("trusted", filters.trusted),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|v| (key, v.to_string())))
    .collect()
}

#[derive(Debug, Deserialize)]
struct OwnerSafes {
    safes: Vec<Address>,
}

#[derive(Debug, Deserialize)]
struct WireSafeInfo {
    address: Address,
    nonce: u64,
    threshold: usize,
    owners: Vec<Address>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireProposal {
    safe: String,
    to: String,
    value: String,
    data: Option<Bytes>,
    operation: u8,
    gas_token: String,
    safe_tx_gas: String,
    base_gas: String,
    gas_price: String,
    refund_receiver: String,
    nonce: u64,
    contract_transaction_hash: H256,
    sender: String,
    signature: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<String>,
}

impl From<&Proposal> for WireProposal {
    fn from(proposal: &Proposal) -> Self {
        let zero = to_checksum(&Address::zero(), None);
        let call = &proposal.call;

        Self {
            safe: to_checksum(&proposal.safe, None),
            to: to_checksum(&call.to, None),
            value: call.value.to_string(),
            data: (!call.data.is_empty()).then(|| call.data.clone()),
            operation: call.operation.into(),
            gas_token: zero.clone(),
            safe_tx_gas: "0".to_string(),
            base_gas: "0".to_string(),
            gas_price: "0".to_string(),
            refund_receiver: zero,
            nonce: proposal.nonce,
            contract_transaction_hash: proposal.safe_tx_hash,
            sender: to_checksum(&proposal.sender, None),
            signature: proposal.signature.clone(),
            origin: proposal.origin.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireConfirmation {
    signature: Bytes,
}
