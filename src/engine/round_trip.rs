use crate::engine::confirmation::{wait_for_funds, wait_for_slots};
use crate::engine::poster::post_batch;
use crate::engine::retry::with_retry;
use crate::engine::splitter::split;
use crate::engine::stats_accumulator::{SessionOutcome, SessionReport};
use crate::engine::{leg_offset, OutputRef, OutputSet, SessionContext};
use crate::error::SessionError;
use crate::ledger::LedgerClient;
use crate::wallet::seed::Seed;
use crate::wallet::store::{SeedStore, WalletRecord, WalletRole};
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    /// a persisted ping wallet was loaded, its funds sit on `slots` of `leg`
    Recovering { leg: u64, slots: Vec<u64> },
    FundingRequested,
    Funded { source: OutputRef },
    Splitting { source: OutputRef },
    Split { outputs: OutputSet },
    RoundPingToPong { round: u64, outputs: OutputSet },
    ConfirmPong { round: u64, leg: u64, slots: Vec<u64> },
    RoundPongToPing { round: u64, outputs: OutputSet },
    ConfirmPing { round: u64, leg: u64, slots: Vec<u64> },
    Finished { outputs: OutputSet },
}

/// Funds the session answers for: `slots` of `leg` on the `role` wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Holding {
    role: WalletRole,
    leg: u64,
    slots: Vec<u64>,
}

/// Drives one session: funding, split, then `loop_count` ping-pong rounds.
pub struct RoundTripDriver<C> {
    ctx: SessionContext<C>,
    store: SeedStore,
    ping: Seed,
    pong: Seed,
    /// everything this session may leave behind on the ledger
    holdings: Vec<Holding>,
    report: SessionReport,
}

impl<C: LedgerClient> RoundTripDriver<C> {
    pub fn new(ctx: SessionContext<C>, store: SeedStore) -> Self {
        let report = SessionReport::new(ctx.endpoint().clone());
        Self {
            ctx,
            store,
            ping: Seed::generate(),
            pong: Seed::generate(),
            holdings: vec![],
            report,
        }
    }

    pub fn ping(&self) -> &Seed {
        &self.ping
    }

    pub fn pong(&self) -> &Seed {
        &self.pong
    }

    pub async fn run(mut self) -> SessionReport {
        let started = Instant::now();
        let mut state = SessionState::Init;
        let result = loop {
            if self.ctx.cancel.is_cancelled() {
                break Err(SessionError::Cancelled);
            }
            match self.step(state).await {
                Ok(Some(next)) => state = next,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        self.report.outcome = match result {
            Ok(()) => SessionOutcome::Success,
            Err(SessionError::Cancelled) => SessionOutcome::Cancelled,
            Err(err) => {
                tracing::error!("session failed: {}", err);
                SessionOutcome::Failed(err.to_string())
            }
        };
        if !self.report.is_success() {
            self.preserve_funds().await;
        }
        self.report.elapsed = started.elapsed();
        self.report
    }

    /// Performs the work of `state` and returns the state that follows, `None` once finished.
    pub async fn step(
        &mut self,
        state: SessionState,
    ) -> Result<Option<SessionState>, SessionError> {
        let count = self.ctx.settings.fan_out;
        let next = match state {
            SessionState::Init => {
                let info = self.ctx.client.info().await?;
                if !info.synced {
                    return Err(SessionError::NodeNotSynced(self.ctx.endpoint().to_string()));
                }
                match self.store.take(WalletRole::Ping).await {
                    Ok(Some(record)) => {
                        let slots = if record.slots.is_empty() {
                            (0..count as u64).collect()
                        } else {
                            record.slots
                        };
                        self.ping = record.seed;
                        // from here on the record only lives in this session
                        self.holdings = vec![Holding {
                            role: WalletRole::Ping,
                            leg: record.leg,
                            slots: slots.clone(),
                        }];
                        tracing::info!(
                            slots = slots.len(),
                            "wallet loaded from file. address {}",
                            self.ping.address(leg_offset(record.leg, count))
                        );
                        SessionState::Recovering {
                            leg: record.leg,
                            slots,
                        }
                    }
                    Ok(None) => SessionState::FundingRequested,
                    Err(err) => {
                        tracing::warn!("wallet store unavailable, using a fresh wallet: {}", err);
                        SessionState::FundingRequested
                    }
                }
            }
            SessionState::Recovering { leg, slots } => {
                let outputs =
                    wait_for_slots(&self.ctx, &self.ping, leg_offset(leg, count), &slots).await?;
                SessionState::Split {
                    outputs: OutputSet { leg, outputs },
                }
            }
            SessionState::FundingRequested => {
                let ctx = &self.ctx;
                let address = self.ping.address(0);
                let amount = ctx.settings.faucet_amount;
                let policy = &ctx.settings.submit_retry;
                with_retry(policy, "faucet request", &ctx.cancel, |_| async move {
                    Ok(ctx.client.broadcast_faucet_request(&address, amount).await?)
                })
                .await?;
                tracing::info!(address = %address, "faucet request sent");

                let mut funds = match wait_for_funds(ctx, &self.ping, 1, 0).await {
                    Ok(funds) => funds,
                    Err(SessionError::OutputNotFound { address, .. }) => {
                        return Err(SessionError::FundingTimeout { address })
                    }
                    Err(err) => return Err(err),
                };
                match funds.pop() {
                    Some(source) => SessionState::Funded { source },
                    None => {
                        return Err(SessionError::OutputSetMismatch {
                            expected: 1,
                            actual: 0,
                        })
                    }
                }
            }
            SessionState::Funded { source } => {
                tracing::info!(output = %source.id, value = source.value, "wallet funded");
                SessionState::Splitting { source }
            }
            SessionState::Splitting { source } => {
                let outputs = split(&self.ctx, &self.ping, &source, count).await?;
                self.report.transactions_posted += 1;
                let outputs = OutputSet { leg: 0, outputs };
                self.holdings = vec![Holding {
                    role: WalletRole::Ping,
                    leg: 0,
                    slots: outputs.slots(count),
                }];
                SessionState::Split { outputs }
            }
            SessionState::Split { outputs } => {
                if self.ctx.settings.loop_count == 0 {
                    SessionState::Finished { outputs }
                } else {
                    SessionState::RoundPingToPong { round: 0, outputs }
                }
            }
            SessionState::RoundPingToPong { round, outputs } => {
                tracing::info!(round, "send to pong");
                let slots = self.forward(WalletRole::Ping, &outputs).await?;
                SessionState::ConfirmPong {
                    round,
                    leg: outputs.leg + 1,
                    slots,
                }
            }
            SessionState::ConfirmPong { round, leg, slots } => {
                let outputs =
                    wait_for_slots(&self.ctx, &self.pong, leg_offset(leg, count), &slots).await?;
                self.holdings = vec![Holding {
                    role: WalletRole::Pong,
                    leg,
                    slots,
                }];
                SessionState::RoundPongToPing {
                    round,
                    outputs: OutputSet { leg, outputs },
                }
            }
            SessionState::RoundPongToPing { round, outputs } => {
                tracing::info!(round, "send to ping");
                let slots = self.forward(WalletRole::Pong, &outputs).await?;
                SessionState::ConfirmPing {
                    round,
                    leg: outputs.leg + 1,
                    slots,
                }
            }
            SessionState::ConfirmPing { round, leg, slots } => {
                let outputs =
                    wait_for_slots(&self.ctx, &self.ping, leg_offset(leg, count), &slots).await?;
                self.holdings = vec![Holding {
                    role: WalletRole::Ping,
                    leg,
                    slots,
                }];
                self.report.rounds_completed = round + 1;
                let outputs = OutputSet { leg, outputs };
                if round + 1 < self.ctx.settings.loop_count {
                    SessionState::RoundPingToPong {
                        round: round + 1,
                        outputs,
                    }
                } else {
                    SessionState::Finished { outputs }
                }
            }
            SessionState::Finished { outputs } => {
                self.preserve_funds().await;
                tracing::info!(
                    rounds = self.report.rounds_completed,
                    leg = outputs.leg,
                    "FINISHED"
                );
                return Ok(None);
            }
        };
        tracing::debug!(state = ?next, "session state");
        Ok(Some(next))
    }

    /// Posts `outputs` from `sender` to the other wallet and returns the slots the
    /// receiver has to confirm.
    ///
    /// Holdings are split between both wallets as soon as the batch is out, so a
    /// failure before the confirmation keeps track of every slot.
    async fn forward(
        &mut self,
        sender: WalletRole,
        outputs: &OutputSet,
    ) -> Result<Vec<u64>, SessionError> {
        let count = self.ctx.settings.fan_out;
        let leg = outputs.leg + 1;
        let slots = outputs.slots(count);
        let (receiver, receiver_seed, sender_seed) = match sender {
            WalletRole::Ping => (WalletRole::Pong, &self.pong, &self.ping),
            WalletRole::Pong => (WalletRole::Ping, &self.ping, &self.pong),
        };
        let batch = post_batch(
            &self.ctx,
            receiver_seed,
            sender_seed,
            outputs.outputs.len(),
            outputs.value_per_output(),
            leg_offset(outputs.leg, count),
            leg_offset(leg, count),
            &outputs.outputs,
        )
        .await?;
        self.report.transactions_posted += batch.posted.len();
        self.report.transactions_failed += batch.failed.len();
        if !batch.failed.is_empty() {
            tracing::warn!(failed = ?batch.failed, "some slots were not posted");
        }

        let left: Vec<u64> = slots
            .iter()
            .copied()
            .filter(|slot| !batch.posted.contains(slot))
            .collect();
        self.holdings.clear();
        if !left.is_empty() {
            self.holdings.push(Holding {
                role: sender,
                leg: outputs.leg,
                slots: left,
            });
        }
        if !batch.posted.is_empty() {
            self.holdings.push(Holding {
                role: receiver,
                leg,
                slots: batch.posted,
            });
        }
        Ok(slots)
    }

    /// Saves every wallet still holding funds so a later run can pick them up.
    async fn preserve_funds(&self) {
        if self.holdings.is_empty() {
            tracing::debug!("no output set to preserve");
        }
        for holding in self.holdings.iter() {
            self.save(holding).await;
        }
    }

    async fn save(&self, holding: &Holding) {
        let count = self.ctx.settings.fan_out as u64;
        let seed = match holding.role {
            WalletRole::Ping => &self.ping,
            WalletRole::Pong => &self.pong,
        };
        let complete = holding.slots.len() as u64 == count
            && holding.slots.iter().copied().eq(0..count);
        let record = WalletRecord {
            seed: seed.clone(),
            leg: holding.leg,
            slots: if complete { vec![] } else { holding.slots.clone() },
        };
        // whoever holds the funds is picked up as the next ping wallet
        match self.store.push(WalletRole::Ping, &record).await {
            Ok(()) => tracing::info!(
                leg = holding.leg,
                slots = holding.slots.len(),
                "{} wallet saved to {:?}",
                holding.role,
                self.store.path()
            ),
            Err(err) => tracing::error!(
                leg = holding.leg,
                "could not save the {} wallet ({}); funds at {} are unrecoverable",
                holding.role,
                err,
                seed.address(leg_offset(holding.leg, self.ctx.settings.fan_out))
            ),
        }
    }
}
