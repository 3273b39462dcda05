use crate::engine::retry::pause;
use crate::engine::SessionContext;
use crate::error::SessionError;
use crate::ledger::LedgerClient;
use std::time::Duration;

/// Waits as long as the node's rate setter asks before the next submission.
///
/// Failing to read the estimate is not fatal, the submission just goes ahead.
pub async fn throttle<C: LedgerClient>(ctx: &SessionContext<C>) -> Result<(), SessionError> {
    let governor = &ctx.settings.rate_governor;
    if !governor.enabled {
        return Ok(());
    }

    let estimate = match ctx.client.rate_setter_estimate().await {
        Ok(estimate) => estimate,
        Err(err) => {
            tracing::warn!("rate setter estimate unavailable: {}", err);
            return Ok(());
        }
    };

    let cap = Duration::from_millis(governor.max_delay_ms);
    if estimate > cap {
        tracing::debug!("rate setter estimate {:?}, limiting to {:?}", estimate, cap);
    }
    pause(&ctx.cancel, estimate.min(cap)).await
}
