pub mod confirmation;
pub mod poster;
pub mod rate_governor;
pub mod retry;
pub mod round_trip;
pub mod splitter;
pub mod stats_accumulator;

use crate::config::EngineSettings;
use crate::ledger::{Endpoint, LedgerClient, OutputId};
use crate::tx_builder::NodeId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one session needs to talk to its endpoint.
#[derive(Clone)]
pub struct SessionContext<C> {
    pub client: C,
    pub settings: Arc<EngineSettings>,
    pub cancel: CancellationToken,
    pub node_id: NodeId,
}

impl<C: LedgerClient> SessionContext<C> {
    pub fn new(client: C, settings: Arc<EngineSettings>, cancel: CancellationToken) -> Self {
        Self {
            client,
            settings,
            cancel,
            node_id: NodeId::default(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.client.endpoint()
    }
}

/// A confirmed unspent output owned by address `address_index` of some wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputRef {
    pub id: OutputId,
    pub value: u64,
    pub address_index: u64,
}

/// The outputs produced by one leg, slot `i` at `leg_offset(leg, count) + i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSet {
    pub leg: u64,
    pub outputs: Vec<OutputRef>,
}

impl OutputSet {
    /// Slot of every output in a layout of `count` slots per leg.
    pub fn slots(&self, count: usize) -> Vec<u64> {
        let offset = leg_offset(self.leg, count);
        self.outputs
            .iter()
            .map(|output| output.address_index.saturating_sub(offset))
            .collect()
    }

    /// Value every slot can forward without overspending its smallest input.
    pub fn value_per_output(&self) -> u64 {
        self.outputs
            .iter()
            .map(|output| output.value)
            .min()
            .unwrap_or_default()
    }
}

/// First address index of leg `leg`. Leg 0 is the split, later legs alternate
/// between the two wallets and never reuse an index.
pub fn leg_offset(leg: u64, count: usize) -> u64 {
    1 + leg * count as u64
}
