use crate::engine::confirmation::wait_for_funds;
use crate::engine::rate_governor::throttle;
use crate::engine::retry::with_retry;
use crate::engine::{leg_offset, OutputRef, SessionContext};
use crate::error::SessionError;
use crate::ledger::LedgerClient;
use crate::tx_builder::build_transaction;
use crate::wallet::seed::{Address, Seed};

/// Equal shares of `total`, rounding down; whatever does not divide evenly is left out.
pub fn split_values(total: u64, count: usize) -> Vec<u64> {
    if count == 0 {
        return vec![];
    }
    vec![total / count as u64; count]
}

/// Spends `source` into `count` equal outputs on the split addresses of `wallet`
/// and waits until all of them are confirmed.
pub async fn split<C: LedgerClient>(
    ctx: &SessionContext<C>,
    wallet: &Seed,
    source: &OutputRef,
    count: usize,
) -> Result<Vec<OutputRef>, SessionError> {
    let first_index = leg_offset(0, count);
    let values = split_values(source.value, count);
    if values.first().copied().unwrap_or_default() == 0 {
        return Err(SessionError::InsufficientFunds {
            available: source.value,
            count,
        });
    }

    let outputs: Vec<(Address, u64)> = values
        .into_iter()
        .enumerate()
        .map(|(slot, value)| (wallet.address(first_index + slot as u64), value))
        .collect();
    let key_pair = wallet.key_pair(source.address_index);

    let outputs = &outputs;
    let key_pair = &key_pair;
    let transaction_id = with_retry(
        &ctx.settings.submit_retry,
        "split",
        &ctx.cancel,
        |attempt| async move {
            throttle(ctx).await?;
            let tx = build_transaction(&[source.id.clone()], outputs, key_pair, ctx.node_id)?;
            tracing::debug!(attempt, "posting split transaction");
            Ok(ctx.client.post_transaction(&tx).await?)
        },
    )
    .await?;
    tracing::info!(
        transaction_id = %transaction_id,
        count,
        "split transaction accepted"
    );

    wait_for_funds(ctx, wallet, count, first_index).await
}
