use std::sync::Arc;

use alloy_rpc_types_beacon::events::{ChainReorgEvent, FinalizedCheckpointEvent};
use anyhow::Context;
use stakescope_consensus::{
    agnostic::AgnosticState,
    constants::{SECONDS_PER_SLOT, SLOTS_PER_EPOCH},
    epoch_at_slot, first_slot_of_epoch,
    fork::Fork,
    is_epoch_boundary, last_slot_of_epoch,
};
use stakescope_db::{
    Persistable,
    models::{BlockRow, FinalizedCheckpointRow, ReorgRow},
};
use tokio::{sync::mpsc, time::Duration};
use tracing::{debug, error, info, warn};

use crate::chain::{AnalyzerContext, BlockTask, EpochTask};

/// Window constant shared by the rewind re-download distance and the
/// resume-from-database backoff.
pub(crate) const EPOCHS_TO_FINALIZED: u64 = 2;

impl AnalyzerContext {
    /// Historical loop: the requested range widened to whole epochs, two
    /// epochs of lead-in and lead-out so every epoch in range gets its
    /// four-state window.
    pub(crate) async fn run_historical(
        &self,
        block_tx: mpsc::Sender<BlockTask>,
        epoch_tx: mpsc::Sender<EpochTask>,
    ) -> anyhow::Result<()> {
        let init_epoch = epoch_at_slot(self.cfg.init_slot);
        let final_epoch = epoch_at_slot(self.cfg.final_slot);
        let download_init = first_slot_of_epoch(init_epoch.saturating_sub(EPOCHS_TO_FINALIZED));
        let download_final = last_slot_of_epoch(final_epoch + EPOCHS_TO_FINALIZED);
        info!("launching historical download for slots {download_init}..{download_final}");

        for slot in download_init..=download_final {
            if self.should_stop() {
                info!("shutdown detected, historical download routine");
                break;
            }
            self.download_block_at(slot, &block_tx).await?;
            if is_epoch_boundary(slot) {
                self.download_state_at(slot, &epoch_tx, false).await?;
            }
        }

        info!("historical download finished");
        Ok(())
    }

    /// Finalized/live loop: catch up from the resume point to the head, then
    /// follow head, finalized-checkpoint and reorg events.
    pub(crate) async fn run_finalized(
        &self,
        block_tx: mpsc::Sender<BlockTask>,
        epoch_tx: mpsc::Sender<EpochTask>,
        last_persisted_slot: Option<u64>,
    ) -> anyhow::Result<()> {
        info!("launching finalized download");
        let finalized_block = self
            .client
            .request_finalized_block()
            .await
            .context("could not request the finalized block")?;
        let head_slot = self.client.request_current_head_slot().await?;

        let mut next_slot = match last_persisted_slot {
            Some(slot) if slot > 0 && slot <= finalized_block.slot => {
                let resume = slot.saturating_sub(EPOCHS_TO_FINALIZED * SLOTS_PER_EPOCH);
                info!(
                    "database detected, continuing from slot {resume}, epoch {}",
                    epoch_at_slot(resume)
                );
                resume
            }
            _ => {
                info!(
                    "continuing from finalized slot {}, epoch {}",
                    finalized_block.slot,
                    epoch_at_slot(finalized_block.slot)
                );
                finalized_block.slot
            }
        };
        self.cache.anchor_finalized(finalized_block.slot);

        while next_slot <= head_slot {
            if self.should_stop() {
                info!("shutdown detected, finalized download routine");
                return Ok(());
            }
            debug!("filling missing slot {next_slot}");
            self.download_block_at(next_slot, &block_tx).await?;
            if is_epoch_boundary(next_slot) {
                self.download_state_at(next_slot, &epoch_tx, true).await?;
            }
            next_slot += 1;
        }

        let mut events = self.client.subscribe_events()?;
        let mut ticker = tokio::time::interval(Duration::from_secs(SECONDS_PER_SLOT));

        loop {
            tokio::select! {
                Some(head) = events.head.recv() => {
                    debug!("received new head signal: {}", head.slot);
                    while next_slot <= head.slot {
                        if self.should_stop() {
                            info!("shutdown detected, finalized download routine");
                            return Ok(());
                        }
                        self.download_block_at(next_slot, &block_tx).await?;
                        if is_epoch_boundary(next_slot) {
                            self.download_state_at(next_slot, &epoch_tx, true).await?;
                        }
                        next_slot += 1;
                    }
                }
                Some(checkpoint) = events.finalized_checkpoint.recv() => {
                    self.writer
                        .persist(Persistable::FinalizedCheckpoint(FinalizedCheckpointRow {
                            epoch: checkpoint.epoch as i64,
                            block_root: checkpoint.block.to_string(),
                            state_root: checkpoint.state.to_string(),
                        }))
                        .await?;
                    match self.check_finalized(&checkpoint).await {
                        Ok(Some(rewind_to)) => next_slot = rewind_to,
                        Ok(None) => {}
                        Err(err) => {
                            error!("error checking finalized: {err:#}");
                            self.request_stop();
                        }
                    }
                }
                Some(reorg) = events.chain_reorg.recv() => {
                    self.writer
                        .persist(Persistable::Reorg(ReorgRow {
                            slot: reorg.slot as i64,
                            depth: reorg.depth as i64,
                            old_head_block: reorg.old_head_block.to_string(),
                            new_head_block: reorg.new_head_block.to_string(),
                            old_head_state: reorg.old_head_state.to_string(),
                            new_head_state: reorg.new_head_state.to_string(),
                        }))
                        .await?;
                    self.handle_reorg(&reorg, &mut next_slot).await?;
                }
                _ = ticker.tick() => {
                    if self.should_stop() {
                        info!("shutdown detected, finalized download routine");
                        return Ok(());
                    }
                }
                _ = self.cancel.cancelled() => {
                    info!("cancellation scope closed, finalized download routine");
                    return Ok(());
                }
            }
        }
    }

    async fn download_block_at(
        &self,
        slot: u64,
        block_tx: &mpsc::Sender<BlockTask>,
    ) -> anyhow::Result<()> {
        debug!("requesting beacon block at slot {slot}");
        let block = self
            .client
            .request_beacon_block(slot)
            .await
            .with_context(|| format!("block download failed at slot {slot}"))?;
        self.cache.add_block(block);

        if self.cfg.metrics.block && block_tx.send(BlockTask { slot }).await.is_err() {
            warn!("block task channel closed before slot {slot} was handed off");
        }
        Ok(())
    }

    /// Download the end-of-epoch state at `slot`, attach this epoch's duties
    /// and blocks, and emit an epoch task once four consecutive states are
    /// in the cache.
    async fn download_state_at(
        &self,
        slot: u64,
        epoch_tx: &mpsc::Sender<EpochTask>,
        finalized: bool,
    ) -> anyhow::Result<()> {
        let epoch = epoch_at_slot(slot);
        debug!("requesting beacon state at slot {slot}, epoch {epoch}");
        let duties = self
            .client
            .request_epoch_duties(epoch)
            .await
            .with_context(|| format!("duties download failed for epoch {epoch}"))?;
        let versioned = self
            .client
            .request_beacon_state(slot)
            .await
            .with_context(|| format!("state download failed at slot {slot}"))?;

        let is_phase0 = versioned.version == Fork::Phase0;
        let mut state = AgnosticState::from_versioned(versioned, duties)?;
        if is_phase0
            && epoch > 0
            && let Some(prev) = self.cache.state_at_epoch(epoch - 1)
        {
            state.process_phase0_attestations(&prev.epoch_structs);
        }
        state.block_list = self.cache.epoch_blocks(epoch);
        self.cache.add_state(Arc::new(state));

        self.try_emit_epoch_task(epoch, finalized, epoch_tx).await;
        Ok(())
    }

    async fn try_emit_epoch_task(
        &self,
        newest_epoch: u64,
        finalized: bool,
        epoch_tx: &mpsc::Sender<EpochTask>,
    ) {
        let Some(base_epoch) = newest_epoch.checked_sub(3) else {
            debug!("insufficient window before epoch {newest_epoch}");
            return;
        };
        let window = (
            self.cache.state_at_epoch(base_epoch),
            self.cache.state_at_epoch(base_epoch + 1),
            self.cache.state_at_epoch(base_epoch + 2),
            self.cache.state_at_epoch(newest_epoch),
        );
        let (Some(prev_prev), Some(prev), Some(current), Some(next)) = window else {
            debug!("insufficient window around epoch {newest_epoch}");
            return;
        };

        let task = EpochTask {
            prev_prev,
            prev,
            current,
            next,
            finalized,
        };
        if epoch_tx.send(task).await.is_err() {
            warn!("epoch task channel closed before epoch {newest_epoch} was handed off");
        }
    }

    /// Walk the state roots between the stored finalized anchor and the new
    /// checkpoint. Verified slots advance the anchor; the first mismatch
    /// drops the affected rows, rewinds the cache and returns the slot the
    /// download should restart from.
    async fn check_finalized(
        &self,
        checkpoint: &FinalizedCheckpointEvent,
    ) -> anyhow::Result<Option<u64>> {
        let finalized_block = self
            .client
            .request_beacon_block(checkpoint.epoch * SLOTS_PER_EPOCH)
            .await
            .context("error requesting finalized checkpoint block")?;
        let start = self
            .cache
            .finalized_slot()
            .unwrap_or(finalized_block.slot);

        for slot in start..finalized_block.slot {
            let Some(cached) = self.cache.block_at(slot) else {
                continue;
            };
            // missed slots carry no state root of their own
            if !cached.proposed {
                self.cache.advance_finalized(slot);
                continue;
            }
            let canonical_root = self.client.request_state_root(slot).await?;
            if canonical_root == cached.state_root {
                self.cache.advance_finalized(slot);
                continue;
            }

            info!("checkpoint mismatch!");
            info!("chain checkpoint for slot {slot}: {canonical_root}");
            info!("stored checkpoint for slot {slot}: {}", cached.state_root);
            let rewind_to = slot.saturating_sub(EPOCHS_TO_FINALIZED * SLOTS_PER_EPOCH);
            info!("rewinding to slot {rewind_to}...");
            self.rewind_block_metrics(slot).await?;
            self.rewind_epoch_metrics(epoch_at_slot(slot).saturating_sub(1))
                .await?;
            self.cache.rewind(slot);
            return Ok(Some(rewind_to));
        }

        self.cache.advance_finalized(finalized_block.slot);
        info!(
            "state roots verified, stored finalized advanced to {}",
            finalized_block.slot
        );
        Ok(None)
    }

    /// Persist orphan rows for the blocks a reorg removed, roll the derived
    /// rows back to the fork point and rewind the cache.
    async fn handle_reorg(
        &self,
        reorg: &ChainReorgEvent,
        next_slot: &mut u64,
    ) -> anyhow::Result<()> {
        let base_slot = reorg.slot.saturating_sub(reorg.depth);
        if *next_slot <= base_slot {
            return Ok(());
        }
        info!(
            "reorg of depth {} at slot {}, rewinding to {base_slot}",
            reorg.depth, reorg.slot
        );

        self.rewind_block_metrics(base_slot).await?;
        if let Some(epoch) = reorg_rewind_epoch(base_slot, reorg.slot) {
            self.rewind_epoch_metrics(epoch).await?;
        }

        // only blocks that were actually downloaded become orphan rows
        for slot in base_slot..reorg.slot {
            if let Some(block) = self.cache.block_at(slot) {
                self.writer
                    .persist(Persistable::OrphanBlock(BlockRow::from_block(&block)))
                    .await?;
            }
        }

        self.cache.rewind(base_slot);
        *next_slot = self.cache.head_slot().map_or(base_slot, |head| head + 1);
        Ok(())
    }

    async fn rewind_block_metrics(&self, slot: u64) -> anyhow::Result<()> {
        info!("deleting block data from {slot} (included) onwards");
        self.writer.persist(Persistable::BlockDrop { slot }).await?;
        self.writer
            .persist(Persistable::TransactionDrop { slot })
            .await?;
        self.writer
            .persist(Persistable::WithdrawalDrop { slot })
            .await?;
        Ok(())
    }

    async fn rewind_epoch_metrics(&self, epoch: u64) -> anyhow::Result<()> {
        info!("deleting epoch data from {epoch} (included) onwards");
        self.writer.persist(Persistable::EpochDrop { epoch }).await?;
        self.writer
            .persist(Persistable::ProposerDutiesDrop { epoch })
            .await?;
        // reward rows are recorded one epoch after the one they score
        self.writer
            .persist(Persistable::ValidatorRewardsDrop { epoch: epoch + 1 })
            .await?;
        Ok(())
    }
}

/// Epoch whose derived rows a reorg invalidates: set when the reorg crosses
/// an epoch boundary or lands on the last slot of one.
pub(crate) fn reorg_rewind_epoch(base_slot: u64, reorg_slot: u64) -> Option<u64> {
    let base_epoch = epoch_at_slot(base_slot);
    if is_epoch_boundary(reorg_slot) || base_epoch != epoch_at_slot(reorg_slot) {
        Some(base_epoch.saturating_sub(1))
    } else {
        None
    }
}
