use crate::engine::rate_governor::throttle;
use crate::engine::retry::with_retry;
use crate::engine::{OutputRef, SessionContext};
use crate::error::SessionError;
use crate::ledger::LedgerClient;
use crate::tx_builder::build_transaction;
use crate::wallet::seed::Seed;

/// Slots of a batch, by outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub posted: Vec<u64>,
    pub failed: Vec<u64>,
}

/// Moves each input from sender address `l + sender_offset` to receiver address
/// `l + receiver_offset`, one transaction per slot `l`. The slot of an input is taken
/// from its address index, so a set with gaps keeps its layout.
///
/// A slot whose submission is rejected is logged and skipped. Cancellation stops the
/// batch and returns what was posted so far. Confirmation is left to the caller.
#[allow(clippy::too_many_arguments)]
pub async fn post_batch<C: LedgerClient>(
    ctx: &SessionContext<C>,
    receiver: &Seed,
    sender: &Seed,
    count: usize,
    value_per_output: u64,
    sender_offset: u64,
    receiver_offset: u64,
    inputs: &[OutputRef],
) -> Result<BatchReport, SessionError> {
    if inputs.len() < count {
        return Err(SessionError::OutputSetMismatch {
            expected: count,
            actual: inputs.len(),
        });
    }

    tracing::info!(count, sender_offset, receiver_offset, "posting transactions");
    let mut report = BatchReport::default();
    for input in inputs.iter().take(count) {
        let slot = match input.address_index.checked_sub(sender_offset) {
            Some(slot) => slot,
            None => {
                tracing::warn!(
                    address_index = input.address_index,
                    sender_offset,
                    "input lies before the sending leg, skipping"
                );
                continue;
            }
        };
        let output = [(receiver.address(slot + receiver_offset), value_per_output)];
        let key_pair = sender.key_pair(slot + sender_offset);

        let output = &output;
        let key_pair = &key_pair;
        let result = with_retry(
            &ctx.settings.post_retry,
            "post transaction",
            &ctx.cancel,
            |_| async move {
                throttle(ctx).await?;
                let tx = build_transaction(&[input.id.clone()], output, key_pair, ctx.node_id)?;
                Ok(ctx.client.post_transaction(&tx).await?)
            },
        )
        .await;

        match result {
            Ok(transaction_id) => {
                tracing::trace!(slot, transaction_id = %transaction_id, "transaction issued");
                report.posted.push(slot);
            }
            Err(SessionError::Cancelled) => {
                tracing::warn!(posted = report.posted.len(), "batch cancelled");
                break;
            }
            Err(err) => {
                tracing::warn!(slot, "skipping slot: {}", err);
                report.failed.push(slot);
            }
        }
    }
    Ok(report)
}
