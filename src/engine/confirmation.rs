use crate::engine::retry::pause;
use crate::engine::{OutputRef, SessionContext};
use crate::error::SessionError;
use crate::ledger::{LedgerClient, UnspentOutput};
use crate::wallet::seed::Seed;
use std::time::Duration;

/// Polls addresses `address_offset..address_offset + count` of `wallet` until each
/// holds an output at the configured finality, returning them in address order.
pub async fn wait_for_funds<C: LedgerClient>(
    ctx: &SessionContext<C>,
    wallet: &Seed,
    count: usize,
    address_offset: u64,
) -> Result<Vec<OutputRef>, SessionError> {
    let slots: Vec<u64> = (0..count as u64).collect();
    wait_for_slots(ctx, wallet, address_offset, &slots).await
}

/// Same as [`wait_for_funds`] for a subset of the slots, addresses `address_offset + slot`.
pub async fn wait_for_slots<C: LedgerClient>(
    ctx: &SessionContext<C>,
    wallet: &Seed,
    address_offset: u64,
    slots: &[u64],
) -> Result<Vec<OutputRef>, SessionError> {
    let count = slots.len();
    tracing::info!(count, address_offset, "waiting for funds to be confirmed");
    let mut outputs = Vec::with_capacity(count);
    for slot in slots {
        outputs.push(wait_for_output(ctx, wallet, address_offset + slot).await?);
    }
    tracing::info!(count, address_offset, "funds confirmed");
    Ok(outputs)
}

async fn wait_for_output<C: LedgerClient>(
    ctx: &SessionContext<C>,
    wallet: &Seed,
    index: u64,
) -> Result<OutputRef, SessionError> {
    let policy = &ctx.settings.confirmation;
    let interval = Duration::from_millis(policy.poll_interval_ms);
    let address = wallet.address(index);

    let mut last_seen: Option<UnspentOutput> = None;
    for attempt in 1..=policy.poll_attempts {
        if attempt > 1 {
            pause(&ctx.cancel, interval).await?;
        } else if ctx.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let response = match ctx.client.address_unspent_outputs(&[address]).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(index, attempt, "unspent output query failed: {}", err);
                continue;
            }
        };

        let mut outputs = response.into_iter().flat_map(|entry| entry.outputs);
        let output = match outputs.next() {
            Some(output) => output,
            None => continue,
        };
        if outputs.next().is_some() {
            tracing::debug!(index, "several unspent outputs on one address, using the first");
        }

        if policy.finality.is_reached_by(output.confirmation_state) {
            return Ok(OutputRef {
                id: output.id,
                value: output.balance,
                address_index: index,
            });
        }
        last_seen = Some(output);
    }

    match last_seen {
        None => {
            tracing::warn!(index, "could not find an output");
            Err(SessionError::OutputNotFound {
                address: address.to_base58(),
                index,
                attempts: policy.poll_attempts,
            })
        }
        Some(output) => {
            tracing::warn!(index, output = %output.id, "output not confirmed");
            Err(SessionError::OutputNotConfirmed {
                output: output.id.to_string(),
                index,
                state: output.confirmation_state,
                attempts: policy.poll_attempts,
            })
        }
    }
}
