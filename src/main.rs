use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use utxo_ping_pong::config::Config;
use utxo_ping_pong::ledger::http::HttpConnector;
use utxo_ping_pong::orchestrator::run_sessions;

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file, defaults are used when omitted
    #[clap(long, value_parser)]
    config_path: Option<PathBuf>,

    /// use the node rate setter estimate to pace submissions
    #[clap(long = "useRS", value_parser)]
    use_rs: Option<bool>,

    /// number of nodes you want to test against
    #[clap(long = "nbrNodes", value_parser)]
    nbr_nodes: Option<usize>,

    /// valid node for initial transactions
    #[clap(long, value_parser)]
    node: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = _main().await {
        tracing::error!("{:?}", err);
        std::process::exit(1);
    }
}

async fn _main() -> anyhow::Result<()> {
    // Start logging setup block
    let fmt_layer = tracing_subscriber::fmt::layer();

    let http_filter = tracing_subscriber::filter::Targets::new()
        // connection pool chatter on every request
        .with_target("hyper", tracing::Level::WARN)
        .with_target("reqwest", tracing::Level::WARN)
        .with_default(tracing_subscriber::fmt::Subscriber::DEFAULT_MAX_LEVEL);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(http_filter)
        .init();

    let Cli {
        config_path,
        use_rs,
        nbr_nodes,
        node,
    } = Cli::parse();

    let mut config = match config_path {
        Some(path) => {
            tracing::info!("Config file {:?}", path);
            Config::load(&path)?
        }
        None => Config::default(),
    };
    config.apply_overrides(node, nbr_nodes, use_rs);
    config.validate()?;

    tracing::info!(
        "spamming with {} nodes using ratesetter({}), {} outputs per wallet, {} rounds",
        config.nbr_nodes,
        config.engine.rate_governor.enabled,
        config.engine.fan_out,
        config.engine.loop_count
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping all sessions");
                cancel.cancel();
            }
        });
    }

    let stats = run_sessions(Arc::new(HttpConnector), Arc::new(config), cancel).await?;
    if stats.succeeded() == 0 {
        return Err(anyhow!("no session succeeded"));
    }
    Ok(())
}
