pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod tx_builder;
pub mod wallet;

#[cfg(test)]
pub mod test_utils;
