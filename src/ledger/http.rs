use crate::ledger::api::{
    FaucetRequest, FaucetResponse, InfoResponse, ManaResponse, NeighborsResponse, NodeResponse,
    PostTransactionRequest, PostTransactionResponse, RateSetterResponse, UnspentOutputsRequest,
    UnspentOutputsResponse, ROUTE_FAUCET, ROUTE_INFO, ROUTE_MANA, ROUTE_NEIGHBORS,
    ROUTE_RATE_SETTER, ROUTE_TRANSACTIONS, ROUTE_UNSPENT_OUTPUTS,
};
use crate::ledger::{
    AddressOutputs, ClientError, Connector, Endpoint, LedgerClient, Mana, Neighbors, NodeInfo,
    ServerStatus,
};
use crate::wallet::seed::Address;
use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct HttpLedgerClient {
    endpoint: Endpoint,
    client: Client,
}

impl HttpLedgerClient {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.append(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP Client")?;

        Ok(Self { endpoint, client })
    }

    async fn send<T: DeserializeOwned + NodeResponse>(
        &self,
        url: String,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await.map_err(|source| ClientError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::OK {
            let body: T = response.json().await.map_err(|err| ClientError::Decode {
                url: url.clone(),
                reason: err.to_string(),
            })?;
            checked(body)
        } else {
            Err(error_response(url, status, response.json().await.ok()))
        }
    }

    async fn get<T: DeserializeOwned + NodeResponse>(
        &self,
        api: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let url = self.endpoint.url(api);
        let request = self.client.get(&url).query(query);
        self.send(url, request).await
    }

    async fn post<B: serde::Serialize, T: DeserializeOwned + NodeResponse>(
        &self,
        api: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.endpoint.url(api);
        let request = self.client.post(&url).json(body);
        self.send(url, request).await
    }
}

/// A successful answer can still carry the node's refusal in its `error` field.
fn checked<T: NodeResponse>(body: T) -> Result<T, ClientError> {
    match body.error() {
        Some(error) => Err(ClientError::Rejected(error.to_string())),
        None => Ok(body),
    }
}

/// Maps a non-200 answer: a node reason in the body's `error` field is a rejection,
/// anything else is reported by status.
fn error_response(
    url: String,
    status: StatusCode,
    body: Option<serde_json::Value>,
) -> ClientError {
    let reason = body
        .as_ref()
        .and_then(|body| body.get("error"))
        .and_then(serde_json::Value::as_str)
        .filter(|error| !error.is_empty());
    match reason {
        Some(error) => ClientError::Rejected(error.to_string()),
        None => ClientError::Status {
            url,
            status: status.as_u16(),
        },
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn info(&self) -> Result<NodeInfo, ClientError> {
        let info: InfoResponse = self.get(ROUTE_INFO, &[]).await?;
        Ok(info.into())
    }

    async fn broadcast_faucet_request(
        &self,
        address: &Address,
        amount: Option<u64>,
    ) -> Result<(), ClientError> {
        let request = FaucetRequest {
            address: address.to_base58(),
            amount,
        };
        let response: FaucetResponse = self.post(ROUTE_FAUCET, &request).await?;
        tracing::debug!(
            endpoint = %self.endpoint,
            request_id = ?response.id,
            "faucet request accepted"
        );
        Ok(())
    }

    async fn autopeering_neighbors(&self, known: bool) -> Result<Neighbors, ClientError> {
        let known = if known { "1" } else { "0" };
        let response: NeighborsResponse = self.get(ROUTE_NEIGHBORS, &[("known", known)]).await?;
        Ok(response.into())
    }

    async fn server_status(&self) -> Result<ServerStatus, ClientError> {
        let info = self.info().await?;
        Ok(ServerStatus {
            id: info.identity_id,
            synced: info.synced,
        })
    }

    async fn mana_by_issuer(&self, issuer_id: &str) -> Result<Mana, ClientError> {
        let response: ManaResponse = self.get(ROUTE_MANA, &[("IssuerID", issuer_id)]).await?;
        Ok(response.into())
    }

    async fn address_unspent_outputs(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<AddressOutputs>, ClientError> {
        let request = UnspentOutputsRequest {
            addresses: addresses.iter().map(Address::to_base58).collect(),
        };
        let response: UnspentOutputsResponse = self.post(ROUTE_UNSPENT_OUTPUTS, &request).await?;
        Ok(response
            .unspent_outputs
            .into_iter()
            .map(AddressOutputs::from)
            .collect())
    }

    async fn post_transaction(&self, tx_bytes: &[u8]) -> Result<String, ClientError> {
        let request = PostTransactionRequest {
            txn_bytes: STANDARD.encode(tx_bytes),
        };
        let response: PostTransactionResponse = self.post(ROUTE_TRANSACTIONS, &request).await?;
        response.transaction_id.ok_or_else(|| ClientError::Decode {
            url: self.endpoint.url(ROUTE_TRANSACTIONS),
            reason: "missing transaction_id".to_string(),
        })
    }

    async fn rate_setter_estimate(&self) -> Result<Duration, ClientError> {
        let response: RateSetterResponse = self.get(ROUTE_RATE_SETTER, &[]).await?;
        Ok(Duration::from_nanos(response.estimate.max(0) as u64))
    }
}

#[derive(Clone, Debug, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    type Client = HttpLedgerClient;

    fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> anyhow::Result<Self::Client> {
        HttpLedgerClient::new(endpoint.clone(), timeout)
            .with_context(|| format!("Cannot create client for {endpoint}"))
    }
}
