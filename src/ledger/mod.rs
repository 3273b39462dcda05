pub mod api;
pub mod http;

use crate::wallet::seed::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Base URL of a node web API.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into().trim_end_matches('/').to_string())
    }

    /// Endpoint on the same host as a `host:port` service address, but on `api_port`.
    pub fn from_service_address(service_address: &str, api_port: u16) -> Option<Self> {
        let host = service_address.split(':').next()?;
        if host.is_empty() {
            return None;
        }
        Some(Self::new(format!("http://{host}:{api_port}")))
    }

    pub fn url(&self, api: impl fmt::Display) -> String {
        format!("{}/{}", self.0, api)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base58 encoded ledger output identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId(String);

impl OutputId {
    pub const LENGTH: usize = 34;

    pub fn new(base58: impl Into<String>) -> Self {
        Self(base58.into())
    }

    pub fn from_parts(transaction_id: &[u8; 32], index: u16) -> Self {
        let mut bytes = transaction_id.to_vec();
        bytes.extend_from_slice(&index.to_le_bytes());
        Self(bs58::encode(bytes).into_string())
    }

    pub fn to_bytes(&self) -> Option<[u8; Self::LENGTH]> {
        let decoded = bs58::decode(&self.0).into_vec().ok()?;
        decoded.try_into().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node reported assurance that an output will not be reverted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    Undefined,
    Rejected,
    Pending,
    Accepted,
    Confirmed,
}

impl From<u8> for ConfirmationState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConfirmationState::Undefined,
            1 => ConfirmationState::Rejected,
            2 => ConfirmationState::Pending,
            3 => ConfirmationState::Accepted,
            4.. => ConfirmationState::Confirmed,
        }
    }
}

impl fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfirmationState::Undefined => "undefined",
            ConfirmationState::Rejected => "rejected",
            ConfirmationState::Pending => "pending",
            ConfirmationState::Accepted => "accepted",
            ConfirmationState::Confirmed => "confirmed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub identity_id: String,
    pub synced: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerStatus {
    pub id: String,
    pub synced: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerService {
    pub id: String,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnownPeer {
    pub id: String,
    pub services: Vec<PeerService>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub known_peers: Vec<KnownPeer>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mana {
    pub access: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub id: OutputId,
    pub balance: u64,
    pub confirmation_state: ConfirmationState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressOutputs {
    pub address: String,
    pub outputs: Vec<UnspentOutput>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("node rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("endpoint {0} is unreachable")]
    Unreachable(String),
}

/// The slice of the node web API the load engine depends on.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    async fn info(&self) -> Result<NodeInfo, ClientError>;

    /// `amount` of `None` lets the faucet pick its default grant.
    async fn broadcast_faucet_request(
        &self,
        address: &Address,
        amount: Option<u64>,
    ) -> Result<(), ClientError>;

    async fn autopeering_neighbors(&self, known: bool) -> Result<Neighbors, ClientError>;

    async fn server_status(&self) -> Result<ServerStatus, ClientError>;

    async fn mana_by_issuer(&self, issuer_id: &str) -> Result<Mana, ClientError>;

    async fn address_unspent_outputs(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<AddressOutputs>, ClientError>;

    /// Returns the transaction id assigned by the node.
    async fn post_transaction(&self, tx_bytes: &[u8]) -> Result<String, ClientError>;

    async fn rate_setter_estimate(&self) -> Result<Duration, ClientError>;
}

/// Opens clients against arbitrary endpoints, used wherever a new endpoint is discovered.
pub trait Connector: Send + Sync + 'static {
    type Client: LedgerClient + Clone + 'static;

    fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> anyhow::Result<Self::Client>;
}
