use crate::config::Config;
use crate::discovery::{discover, random_endpoint};
use crate::engine::retry::pause;
use crate::engine::round_trip::RoundTripDriver;
use crate::engine::stats_accumulator::{SessionOutcome, SessionReport, StatsAccumulator};
use crate::engine::SessionContext;
use crate::ledger::{Connector, Endpoint};
use crate::wallet::store::SeedStore;
use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use tokio_util::sync::CancellationToken;

/// Endpoints the sessions will run against: discovered around a random neighbor of
/// the configured node, never empty.
pub async fn select_endpoints<K: Connector>(connector: &K, config: &Config) -> Vec<Endpoint> {
    let bootstrap = Endpoint::new(config.node.as_str());
    let mut rng = StdRng::from_entropy();
    let seed = match random_endpoint(
        connector,
        &bootstrap,
        config.seed_candidates,
        &config.discovery,
        &mut rng,
    )
    .await
    {
        Some(seed) => seed,
        None => {
            tracing::warn!("no neighbor of {} usable as seed, using it directly", bootstrap);
            bootstrap
        }
    };
    tracing::info!(seed = %seed, "discovering nodes");

    let nodes = discover(
        connector,
        &seed,
        config.nbr_nodes,
        config.discovery.require_stake_check,
        &config.discovery,
    )
    .await;
    if nodes.is_empty() {
        tracing::warn!(seed = %seed, "no node discovered, running against the seed only");
        return vec![seed];
    }
    nodes
}

/// Runs one ping-pong session per selected endpoint and waits for all of them.
pub async fn run_sessions<K: Connector>(
    connector: Arc<K>,
    config: Arc<Config>,
    cancel: CancellationToken,
) -> anyhow::Result<StatsAccumulator> {
    let endpoints = select_endpoints(connector.as_ref(), &config).await;
    tracing::info!("testing against {} nodes", endpoints.len());

    let store = SeedStore::new(&config.wallet_store);
    let settings = Arc::new(config.engine.clone());
    let mut stats = StatsAccumulator::default();
    let mut sessions: Vec<(Endpoint, JoinHandle<SessionReport>)> = vec![];

    for (position, endpoint) in endpoints.into_iter().enumerate() {
        if position > 0 && pause(&cancel, config.stagger()).await.is_err() {
            tracing::warn!("cancelled before every session was started");
            break;
        }
        let client = match connector.connect(&endpoint, config.http_timeout()) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(endpoint = %endpoint, "cannot create client: {:?}", err);
                let mut report = SessionReport::new(endpoint);
                report.outcome = SessionOutcome::Failed(err.to_string());
                stats.add_report(report);
                continue;
            }
        };
        tracing::info!(endpoint = %endpoint, "client started");
        let ctx = SessionContext::new(client, settings.clone(), cancel.child_token());
        let driver = RoundTripDriver::new(ctx, store.clone());
        let span = tracing::info_span!("session", endpoint = %endpoint);
        sessions.push((endpoint, tokio::spawn(driver.run().instrument(span))));
    }

    for (endpoint, session) in sessions {
        match session.await {
            Ok(report) => stats.add_report(report),
            Err(err) => {
                tracing::error!(endpoint = %endpoint, "session task aborted: {}", err);
                let mut report = SessionReport::new(endpoint);
                report.outcome = SessionOutcome::Failed(err.to_string());
                stats.add_report(report);
            }
        }
    }

    stats.log_summary();
    if let Some(path) = &config.stats_output {
        stats.dump_stats(path).with_context(|| {
            format!("Cannot write session stats to {path}", path = path.display())
        })?;
    }
    Ok(stats)
}
