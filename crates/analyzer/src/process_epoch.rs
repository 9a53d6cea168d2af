use std::sync::Arc;

use stakescope_consensus::metrics::StateMetrics;
use stakescope_db::{
    Persistable,
    models::{EpochRow, ProposerDutyRow, ValidatorRewardsRow},
};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, warn};

use crate::chain::{AnalyzerContext, EpochTask, ValTask};

/// Large validator sets split into tasks of at most this many indices.
const MAX_VAL_BATCH_SIZE: usize = 20_000;

impl AnalyzerContext {
    /// Single consumer of epoch tasks, which keeps epoch processing in epoch
    /// order per finalized-flag class.
    pub(crate) async fn run_epoch_processor(
        &self,
        mut epoch_rx: mpsc::Receiver<EpochTask>,
        val_tx: mpsc::Sender<ValTask>,
    ) {
        while let Some(task) = epoch_rx.recv().await {
            if let Err(err) = self.process_epoch(task, &val_tx).await {
                error!("epoch processing failed: {err:#}");
            }
        }
        // dropping val_tx here lets the validator workers drain and finish
    }

    async fn process_epoch(
        &self,
        task: EpochTask,
        val_tx: &mpsc::Sender<ValTask>,
    ) -> anyhow::Result<()> {
        let finalized = task.finalized;
        let metrics = match StateMetrics::new(task.prev_prev, task.prev, task.current, task.next)
        {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!("skipping epoch window: {err}");
                return Ok(());
            }
        };

        let epoch = metrics.epoch();
        let key = format!("epoch={epoch},finalized={finalized}");
        if !self.book.acquire(&key) {
            return Ok(());
        }
        let result = self.process_epoch_inner(metrics, finalized, val_tx).await;
        self.book.free_page(&key);
        result
    }

    async fn process_epoch_inner(
        &self,
        metrics: StateMetrics,
        finalized: bool,
        val_tx: &mpsc::Sender<ValTask>,
    ) -> anyhow::Result<()> {
        if self.cfg.metrics.epoch {
            self.writer
                .persist(Persistable::Epoch(EpochRow::from_state(&metrics.current)))
                .await?;

            for duty in &metrics.current.epoch_structs.proposer_duties {
                let proposed = metrics
                    .current
                    .block_list
                    .iter()
                    .find(|block| block.slot == duty.slot)
                    .map(|block| block.proposed)
                    .unwrap_or(false);
                self.writer
                    .persist(Persistable::ProposerDuty(ProposerDutyRow {
                        slot: duty.slot as i64,
                        validator_index: duty.validator_index as i64,
                        proposed,
                    }))
                    .await?;
            }
        }

        if !self.cfg.metrics.rewards {
            return Ok(());
        }

        let metrics = Arc::new(metrics);
        let indices = if !self.cfg.validator_indexes.is_empty() {
            self.cfg.validator_indexes.clone()
        } else if self.cfg.missing_vals {
            metrics.current.all_validator_indices()
        } else {
            metrics.current.active_validator_indices()
        };

        for chunk in indices.chunks(MAX_VAL_BATCH_SIZE) {
            let task = ValTask {
                val_idxs: chunk.to_vec(),
                metrics: metrics.clone(),
                pool_name: None,
                finalized,
            };
            if val_tx.send(task).await.is_err() {
                warn!("validator task channel closed during epoch {}", metrics.epoch());
                return Ok(());
            }
        }

        for pool in &self.cfg.pool_validators {
            for chunk in pool.val_idxs.chunks(MAX_VAL_BATCH_SIZE) {
                let task = ValTask {
                    val_idxs: chunk.to_vec(),
                    metrics: metrics.clone(),
                    pool_name: Some(pool.pool_name.clone()),
                    finalized,
                };
                if val_tx.send(task).await.is_err() {
                    warn!(
                        "validator task channel closed during epoch {}",
                        metrics.epoch()
                    );
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Scores a chunk of validators and enqueues their reward rows. Broken
    /// records skip the single validator, never the chunk.
    pub(crate) async fn run_val_worker(&self, rx: Arc<Mutex<mpsc::Receiver<ValTask>>>) {
        loop {
            let task = { rx.lock().await.recv().await };
            let Some(task) = task else { break };

            for &validator_index in &task.val_idxs {
                match task.metrics.reward_record(validator_index) {
                    Ok(record) => {
                        let row =
                            ValidatorRewardsRow::from_rewards(&record, task.pool_name.clone());
                        if let Err(err) =
                            self.writer.persist(Persistable::ValidatorRewards(row)).await
                        {
                            error!("persistence queue closed, validator worker exiting: {err}");
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(
                            "skipping validator {validator_index} at epoch {}: {err}",
                            task.metrics.epoch()
                        );
                    }
                }
            }
        }
    }
}
