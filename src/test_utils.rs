//! In-memory ledger used by the engine, discovery and orchestrator tests.
//!
//! Posted transactions are decoded and executed against a per-address unspent set,
//! so a whole ping-pong session can run against it.

use crate::ledger::{
    AddressOutputs, ClientError, ConfirmationState, Connector, Endpoint, KnownPeer,
    LedgerClient, Mana, Neighbors, NodeInfo, OutputId, PeerService, ServerStatus, UnspentOutput,
};
use crate::tx_builder::{transaction_id, Transaction};
use crate::wallet::seed::Address;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub struct MockOutput {
    pub id: OutputId,
    pub balance: u64,
    polls_seen: u32,
}

pub struct MockState {
    pub identity_id: String,
    pub reachable: bool,
    pub synced: bool,
    pub access_mana: f64,
    pub neighbors: Vec<KnownPeer>,
    pub rate_estimate: Duration,
    pub faucet_value: u64,
    /// faucet requests are accepted but never credited when false
    pub faucet_pays: bool,
    /// the next n faucet requests are refused
    pub faucet_failures: u32,
    /// the next n transaction posts are refused
    pub post_failures: u32,
    /// transactions paying any of these addresses are refused
    pub poisoned_receivers: Vec<Address>,
    /// an output is reported pending for this many polls of its address
    pub polls_until_final: u32,
    /// state reported once an output stops being pending
    pub final_state: ConfirmationState,
    pub unspent: HashMap<Address, Vec<MockOutput>>,
    pub posted: Vec<Transaction>,
    pub faucet_requests: Vec<Address>,
    pub rate_queries: u32,
    pub polls: u64,
}

#[derive(Clone)]
pub struct MockLedger {
    endpoint: Endpoint,
    state: Arc<Mutex<MockState>>,
}

impl MockLedger {
    pub fn new(endpoint: &str) -> Self {
        let endpoint = Endpoint::new(endpoint);
        Self {
            state: Arc::new(Mutex::new(MockState {
                identity_id: format!("id-{endpoint}"),
                reachable: true,
                synced: true,
                access_mana: 0.0,
                neighbors: vec![],
                rate_estimate: Duration::ZERO,
                faucet_value: 1_000_000,
                faucet_pays: true,
                faucet_failures: 0,
                post_failures: 0,
                poisoned_receivers: vec![],
                polls_until_final: 0,
                final_state: ConfirmationState::Confirmed,
                unspent: HashMap::new(),
                posted: vec![],
                faucet_requests: vec![],
                rate_queries: 0,
                polls: 0,
            })),
            endpoint,
        }
    }

    pub fn unreachable(endpoint: &str) -> Self {
        let ledger = Self::new(endpoint);
        ledger.state().reachable = false;
        ledger
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn add_neighbor(&self, id: &str, peering_address: &str) {
        self.state().neighbors.push(KnownPeer {
            id: id.to_string(),
            services: vec![
                PeerService {
                    id: "gossip".to_string(),
                    address: peering_address.replace("14626", "14666"),
                },
                PeerService {
                    id: "peering".to_string(),
                    address: peering_address.to_string(),
                },
            ],
        });
    }

    pub fn credit(&self, address: Address, balance: u64) -> OutputId {
        let mut state = self.state();
        let index = state.unspent.values().map(Vec::len).sum::<usize>() as u16;
        let id = OutputId::from_parts(&transaction_id(address.as_bytes()), index);
        state.unspent.entry(address).or_default().push(MockOutput {
            id: id.clone(),
            balance,
            polls_seen: 0,
        });
        id
    }

    pub fn unspent_at(&self, address: &Address) -> Vec<(OutputId, u64)> {
        self.state()
            .unspent
            .get(address)
            .map(|outputs| {
                outputs
                    .iter()
                    .map(|output| (output.id.clone(), output.balance))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_reachable(&self) -> Result<(), ClientError> {
        if self.state().reachable {
            Ok(())
        } else {
            Err(ClientError::Unreachable(self.endpoint.to_string()))
        }
    }

    fn execute(state: &mut MockState, tx_bytes: &[u8]) -> Result<String, ClientError> {
        let tx = Transaction::from_bytes(tx_bytes)
            .map_err(|err| ClientError::Rejected(err.to_string()))?;
        if tx
            .essence
            .outputs
            .iter()
            .any(|(address, _)| state.poisoned_receivers.contains(address))
        {
            return Err(ClientError::Rejected("receiver refused".to_string()));
        }
        let signer = Address::from_public_key(&tx.public_key);

        let owned = state.unspent.get(&signer).map(Vec::as_slice).unwrap_or(&[]);
        let mut input_value = 0u64;
        for input in tx.essence.inputs.iter() {
            let output = owned
                .iter()
                .find(|output| &output.id == input)
                .ok_or_else(|| ClientError::Rejected(format!("input {input} not spendable")))?;
            input_value += output.balance;
        }
        let output_value: u64 = tx.essence.outputs.iter().map(|(_, value)| value).sum();
        if output_value > input_value {
            return Err(ClientError::Rejected("outputs exceed inputs".to_string()));
        }

        if let Some(owned) = state.unspent.get_mut(&signer) {
            owned.retain(|output| !tx.essence.inputs.contains(&output.id));
        }
        let id = transaction_id(tx_bytes);
        for (index, (address, value)) in tx.essence.outputs.iter().enumerate() {
            state.unspent.entry(*address).or_default().push(MockOutput {
                id: OutputId::from_parts(&id, index as u16),
                balance: *value,
                polls_seen: 0,
            });
        }
        state.posted.push(tx);
        Ok(bs58::encode(id).into_string())
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn info(&self) -> Result<NodeInfo, ClientError> {
        self.check_reachable()?;
        let state = self.state();
        Ok(NodeInfo {
            identity_id: state.identity_id.clone(),
            synced: state.synced,
        })
    }

    async fn broadcast_faucet_request(
        &self,
        address: &Address,
        amount: Option<u64>,
    ) -> Result<(), ClientError> {
        self.check_reachable()?;
        let value = {
            let mut state = self.state();
            state.faucet_requests.push(*address);
            if state.faucet_failures > 0 {
                state.faucet_failures -= 1;
                return Err(ClientError::Rejected("faucet busy".to_string()));
            }
            if !state.faucet_pays {
                return Ok(());
            }
            amount.unwrap_or(state.faucet_value)
        };
        self.credit(*address, value);
        Ok(())
    }

    async fn autopeering_neighbors(&self, _known: bool) -> Result<Neighbors, ClientError> {
        self.check_reachable()?;
        Ok(Neighbors {
            known_peers: self.state().neighbors.clone(),
        })
    }

    async fn server_status(&self) -> Result<ServerStatus, ClientError> {
        let info = self.info().await?;
        Ok(ServerStatus {
            id: info.identity_id,
            synced: info.synced,
        })
    }

    async fn mana_by_issuer(&self, issuer_id: &str) -> Result<Mana, ClientError> {
        self.check_reachable()?;
        let state = self.state();
        if issuer_id != state.identity_id {
            return Ok(Mana { access: 0.0 });
        }
        Ok(Mana {
            access: state.access_mana,
        })
    }

    async fn address_unspent_outputs(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<AddressOutputs>, ClientError> {
        self.check_reachable()?;
        let mut state = self.state();
        state.polls += 1;
        let polls_until_final = state.polls_until_final;
        let final_state = state.final_state;
        Ok(addresses
            .iter()
            .map(|address| AddressOutputs {
                address: address.to_base58(),
                outputs: state
                    .unspent
                    .get_mut(address)
                    .map(|outputs| {
                        outputs
                            .iter_mut()
                            .map(|output| {
                                output.polls_seen += 1;
                                UnspentOutput {
                                    id: output.id.clone(),
                                    balance: output.balance,
                                    confirmation_state: if output.polls_seen > polls_until_final {
                                        final_state
                                    } else {
                                        ConfirmationState::Pending
                                    },
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn post_transaction(&self, tx_bytes: &[u8]) -> Result<String, ClientError> {
        self.check_reachable()?;
        let mut state = self.state();
        if state.post_failures > 0 {
            state.post_failures -= 1;
            return Err(ClientError::Rejected("congested".to_string()));
        }
        Self::execute(&mut state, tx_bytes)
    }

    async fn rate_setter_estimate(&self) -> Result<Duration, ClientError> {
        self.check_reachable()?;
        let mut state = self.state();
        state.rate_queries += 1;
        Ok(state.rate_estimate)
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    nodes: Arc<Mutex<HashMap<Endpoint, MockLedger>>>,
}

impl MockConnector {
    pub fn add(&self, ledger: &MockLedger) {
        self.nodes
            .lock()
            .unwrap()
            .insert(ledger.endpoint().clone(), ledger.clone());
    }

    pub fn node(&self, endpoint: &str) -> Option<MockLedger> {
        self.nodes
            .lock()
            .unwrap()
            .get(&Endpoint::new(endpoint))
            .cloned()
    }
}

impl Connector for MockConnector {
    type Client = MockLedger;

    fn connect(&self, endpoint: &Endpoint, _timeout: Duration) -> anyhow::Result<MockLedger> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| MockLedger::unreachable(endpoint.as_str())))
    }
}
