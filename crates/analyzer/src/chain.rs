use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::bail;
use stakescope_beacon_api::{BeaconApiClient, ExecutionClient};
use stakescope_consensus::{agnostic::AgnosticState, metrics::StateMetrics};
use stakescope_db::{DbService, DbWriter};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{cache::DownloadCache, config::AnalyzerConfig, process_book::ProcessBook};

const BLOCK_TASK_QUEUE: usize = 64;

pub(crate) struct BlockTask {
    pub slot: u64,
}

/// Four consecutive end-of-epoch states; emitted once per (epoch,
/// finalized-flag) pair when the window closes.
pub(crate) struct EpochTask {
    pub prev_prev: Arc<AgnosticState>,
    pub prev: Arc<AgnosticState>,
    pub current: Arc<AgnosticState>,
    pub next: Arc<AgnosticState>,
    pub finalized: bool,
}

/// A chunk of validator indices to score against one epoch window.
pub(crate) struct ValTask {
    pub val_idxs: Vec<u64>,
    pub metrics: Arc<StateMetrics>,
    pub pool_name: Option<String>,
    pub finalized: bool,
}

/// Everything the download loops and worker pools share.
pub(crate) struct AnalyzerContext {
    pub cfg: AnalyzerConfig,
    pub client: Arc<BeaconApiClient>,
    pub execution: Option<Arc<ExecutionClient>>,
    pub writer: DbWriter,
    pub cache: DownloadCache,
    pub book: ProcessBook,
    pub cancel: CancellationToken,
    /// Child of `cancel`, additionally released once the downloaders exit so
    /// block waits for slots that will never arrive cannot stall the drain.
    pub wait_cancel: CancellationToken,
    stop: AtomicBool,
    db_fatal: Arc<AtomicBool>,
}

impl AnalyzerContext {
    /// Cooperative stop: downloaders break at the next loop iteration,
    /// processors drain what is already queued.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
            || self.cancel.is_cancelled()
            || self.db_fatal.load(Ordering::Relaxed)
    }
}

/// Handle for shutting the analyzer down from outside `run()`.
#[derive(Clone)]
pub struct StopHandle {
    ctx: Arc<AnalyzerContext>,
}

impl StopHandle {
    /// Graceful: stop downloading, drain every queue, flush the store.
    pub fn stop(&self) {
        info!("shutdown requested, draining the pipeline");
        self.ctx.request_stop();
    }

    /// Hard cancel: abort network waits and in-flight processing.
    pub fn abort(&self) {
        self.ctx.request_stop();
        self.ctx.cancel.cancel();
    }
}

/// The orchestrator: owns the download loops, the processing pools and the
/// persistence service, and tears everything down through one cancellation
/// scope once the work (or a stop request) runs out.
pub struct ChainAnalyzer {
    ctx: Arc<AnalyzerContext>,
    db: DbService,
}

impl ChainAnalyzer {
    pub async fn new(cfg: AnalyzerConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        info!(
            "starting analyzer for slots {}..{} ({:?})",
            cfg.init_slot, cfg.final_slot, cfg.download_mode
        );

        let client = Arc::new(BeaconApiClient::new(
            cfg.bn_endpoint.clone(),
            cfg.request_timeout,
        )?);
        let execution = cfg
            .el_endpoint
            .clone()
            .map(|endpoint| ExecutionClient::new(endpoint, cfg.request_timeout))
            .transpose()?
            .map(Arc::new);
        let db = DbService::connect(&cfg.db_url, cfg.db_worker_num).await?;

        let cancel = CancellationToken::new();
        let ctx = Arc::new(AnalyzerContext {
            client,
            execution,
            writer: db.writer(),
            cache: DownloadCache::new(),
            book: ProcessBook::new(),
            wait_cancel: cancel.child_token(),
            cancel,
            stop: AtomicBool::new(false),
            db_fatal: db.fatal_flag(),
            cfg,
        });

        Ok(ChainAnalyzer { ctx, db })
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            ctx: self.ctx.clone(),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let ChainAnalyzer { ctx, db } = self;
        let worker_num = ctx.cfg.worker_num.max(1);

        let (block_tx, block_rx) = mpsc::channel::<BlockTask>(BLOCK_TASK_QUEUE);
        let (epoch_tx, epoch_rx) = mpsc::channel::<EpochTask>(1);
        let (val_tx, val_rx) = mpsc::channel::<ValTask>(worker_num);

        // Resume point for the finalized loop, from whatever a previous run
        // left in the store.
        let last_persisted_slot = if ctx.cfg.download_mode.runs_finalized() {
            db.last_persisted_slot().await.unwrap_or_else(|err| {
                error!("could not obtain the last persisted slot: {err:#}");
                None
            })
        } else {
            None
        };

        let mut downloaders = Vec::new();
        if ctx.cfg.download_mode.runs_historical() {
            let ctx = ctx.clone();
            let block_tx = block_tx.clone();
            let epoch_tx = epoch_tx.clone();
            downloaders.push(tokio::spawn(async move {
                ctx.run_historical(block_tx, epoch_tx).await
            }));
        }
        if ctx.cfg.download_mode.runs_finalized() {
            let ctx = ctx.clone();
            let block_tx = block_tx.clone();
            let epoch_tx = epoch_tx.clone();
            downloaders.push(tokio::spawn(async move {
                ctx.run_finalized(block_tx, epoch_tx, last_persisted_slot)
                    .await
            }));
        }
        drop(block_tx);
        drop(epoch_tx);

        let block_rx = Arc::new(Mutex::new(block_rx));
        let block_workers: Vec<_> = (0..worker_num)
            .map(|_| {
                let ctx = ctx.clone();
                let block_rx = block_rx.clone();
                tokio::spawn(async move { ctx.run_block_worker(block_rx).await })
            })
            .collect();

        let epoch_processor = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.run_epoch_processor(epoch_rx, val_tx).await })
        };

        let val_rx = Arc::new(Mutex::new(val_rx));
        let val_workers: Vec<_> = (0..worker_num)
            .map(|_| {
                let ctx = ctx.clone();
                let val_rx = val_rx.clone();
                tokio::spawn(async move { ctx.run_val_worker(val_rx).await })
            })
            .collect();

        let mut failed = false;
        for downloader in downloaders {
            match downloader.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!("download routine failed: {err:#}");
                    ctx.request_stop();
                    failed = true;
                }
                Err(err) => {
                    error!("download routine panicked: {err}");
                    ctx.request_stop();
                    failed = true;
                }
            }
        }
        info!("downloads finished");
        // blocks a rewind erased will not come back now; release their waiters
        ctx.wait_cancel.cancel();

        for worker in block_workers {
            worker.await?;
        }
        epoch_processor.await?;
        for worker in val_workers {
            worker.await?;
        }
        if !ctx.book.is_empty() {
            warn!(
                "{} processing keys left in flight: {:?}",
                ctx.book.len(),
                ctx.book.pages()
            );
        }
        info!("processing finished, flushing the store");

        let db_fatal = db.is_fatal();
        db.close().await?;
        ctx.cancel.cancel();

        if failed || db_fatal {
            bail!("chain analyzer exited after a fatal error");
        }
        info!("chain analyzer finished");
        Ok(())
    }
}
