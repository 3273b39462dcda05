use crate::config::DiscoveryConfig;
use crate::ledger::{Connector, Endpoint, LedgerClient};
use rand::seq::SliceRandom;
use rand::Rng;

const PEERING_SERVICE: &str = "peering";

/// Collects up to `desired` usable endpoints, starting with `seed`.
///
/// Neighbors of the seed are checked in the order the seed reports them. A neighbor is
/// accepted when it is synced and, with `require_stake_check`, holds more access mana
/// than `config.min_access_mana`. Neighbors that cannot be reached are skipped. The
/// result is empty when the seed itself cannot be queried.
pub async fn discover<K: Connector>(
    connector: &K,
    seed: &Endpoint,
    desired: usize,
    require_stake_check: bool,
    config: &DiscoveryConfig,
) -> Vec<Endpoint> {
    if desired == 0 {
        return vec![];
    }
    let mut nodes = vec![seed.clone()];
    if desired == 1 {
        return nodes;
    }

    let neighbors = match connector.connect(seed, config.timeout()) {
        Ok(client) => client.autopeering_neighbors(true).await,
        Err(err) => {
            tracing::warn!(seed = %seed, "cannot connect to discovery seed: {:?}", err);
            return vec![];
        }
    };
    let neighbors = match neighbors {
        Ok(neighbors) => neighbors,
        Err(err) => {
            tracing::warn!(seed = %seed, "cannot list neighbors: {}", err);
            return vec![];
        }
    };

    let candidates = neighbors
        .known_peers
        .iter()
        .flat_map(|peer| peer.services.iter())
        .filter(|service| service.id == PEERING_SERVICE)
        .filter_map(|service| Endpoint::from_service_address(&service.address, config.api_port));

    for candidate in candidates {
        if nodes.contains(&candidate) {
            continue;
        }
        tracing::debug!(candidate = %candidate, "checking neighbor");
        if accept(connector, &candidate, require_stake_check, config).await {
            nodes.push(candidate);
            if nodes.len() == desired {
                break;
            }
        }
    }
    nodes
}

async fn accept<K: Connector>(
    connector: &K,
    candidate: &Endpoint,
    require_stake_check: bool,
    config: &DiscoveryConfig,
) -> bool {
    let client = match connector.connect(candidate, config.timeout()) {
        Ok(client) => client,
        Err(_) => return false,
    };
    let status = match client.server_status().await {
        Ok(status) if status.synced => status,
        _ => return false,
    };
    if !require_stake_check {
        return true;
    }
    match client.mana_by_issuer(&status.id).await {
        Ok(mana) if mana.access > config.min_access_mana => {
            tracing::info!(
                candidate = %candidate,
                "selected, access mana={:.0}",
                mana.access
            );
            true
        }
        _ => false,
    }
}

/// Picks one of the first `candidates` synced endpoints around `seed`, without any
/// stake requirement, to serve as a discovery seed.
pub async fn random_endpoint<K: Connector, R: Rng + ?Sized>(
    connector: &K,
    seed: &Endpoint,
    candidates: usize,
    config: &DiscoveryConfig,
    rng: &mut R,
) -> Option<Endpoint> {
    let nodes = discover(connector, seed, candidates, false, config).await;
    nodes.choose(rng).cloned()
}
