use crate::ledger::{
    AddressOutputs, ConfirmationState, KnownPeer, Mana, Neighbors, NodeInfo, OutputId,
    PeerService, UnspentOutput,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ROUTE_INFO: &str = "info";
pub const ROUTE_FAUCET: &str = "faucetrequest";
pub const ROUTE_NEIGHBORS: &str = "autopeering/neighbors";
pub const ROUTE_MANA: &str = "mana";
pub const ROUTE_UNSPENT_OUTPUTS: &str = "ledgerstate/addresses/unspentOutputs";
pub const ROUTE_TRANSACTIONS: &str = "ledgerstate/transactions";
pub const ROUTE_RATE_SETTER: &str = "ratesetter";

/// Non-empty `error` fields turn a 200 answer into a rejection.
pub trait NodeResponse {
    fn error(&self) -> Option<&str>;
}

macro_rules! node_response {
    ($($ty:ty),*) => {
        $(impl NodeResponse for $ty {
            fn error(&self) -> Option<&str> {
                self.error.as_deref().filter(|error| !error.is_empty())
            }
        })*
    };
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    #[serde(rename = "identityID", default)]
    pub identity_id: String,
    pub tangle_time: TangleTime,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TangleTime {
    #[serde(default)]
    pub synced: bool,
}

impl From<InfoResponse> for NodeInfo {
    fn from(info: InfoResponse) -> Self {
        NodeInfo {
            identity_id: info.identity_id,
            synced: info.tangle_time.synced,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FaucetRequest {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FaucetResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NeighborsResponse {
    #[serde(default)]
    pub known: Vec<PeerResponse>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PeerResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub services: Vec<ServiceResponse>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServiceResponse {
    pub id: String,
    pub address: String,
}

impl From<NeighborsResponse> for Neighbors {
    fn from(response: NeighborsResponse) -> Self {
        Neighbors {
            known_peers: response
                .known
                .into_iter()
                .map(|peer| KnownPeer {
                    id: peer.id,
                    services: peer
                        .services
                        .into_iter()
                        .map(|service| PeerService {
                            id: service.id,
                            address: service.address,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManaResponse {
    #[serde(default)]
    pub access: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl From<ManaResponse> for Mana {
    fn from(response: ManaResponse) -> Self {
        Mana {
            access: response.access,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct UnspentOutputsRequest {
    pub addresses: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutputsResponse {
    #[serde(default)]
    pub unspent_outputs: Vec<AddressOutputsResponse>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AddressOutputsResponse {
    pub address: AddressResponse,
    #[serde(default)]
    pub outputs: Vec<OutputMetadataResponse>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AddressResponse {
    pub base58: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadataResponse {
    pub output: OutputResponse,
    #[serde(default)]
    pub confirmation_state: u8,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResponse {
    #[serde(rename = "outputID")]
    pub output_id: OutputIdResponse,
    #[serde(default)]
    pub output: OutputContent,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputIdResponse {
    pub base58: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OutputContent {
    #[serde(default)]
    pub balances: HashMap<String, u64>,
}

impl From<AddressOutputsResponse> for AddressOutputs {
    fn from(response: AddressOutputsResponse) -> Self {
        AddressOutputs {
            address: response.address.base58,
            outputs: response
                .outputs
                .into_iter()
                .map(|metadata| UnspentOutput {
                    id: OutputId::new(metadata.output.output_id.base58),
                    balance: metadata.output.output.balances.values().sum(),
                    confirmation_state: ConfirmationState::from(metadata.confirmation_state),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PostTransactionRequest {
    /// base64 encoded transaction bytes
    pub txn_bytes: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PostTransactionResponse {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RateSetterResponse {
    /// nanoseconds
    #[serde(default)]
    pub estimate: i64,
    #[serde(default)]
    pub error: Option<String>,
}

node_response!(
    InfoResponse,
    FaucetResponse,
    NeighborsResponse,
    ManaResponse,
    UnspentOutputsResponse,
    PostTransactionResponse,
    RateSetterResponse
);
