use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::{Instant, timeout},
};
use tracing::{debug, error, info};

use crate::persistable::{ModelType, Persistable};

/// Same-type facts are flushed once a batch reaches this size.
const MAX_BATCH_SIZE: usize = 512;
/// …or once the oldest fact in it has waited this long.
const BATCH_FLUSH_AGE: Duration = Duration::from_secs(1);
/// Producers block once this many facts are in flight, which is the
/// backpressure that slows the processors down to what the store can take.
const QUEUE_CAPACITY: usize = 4 * MAX_BATCH_SIZE;

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Persistable>>>;

/// Cloneable producer handle onto the persistence queue.
#[derive(Clone)]
pub struct DbWriter {
    tx: mpsc::Sender<Persistable>,
}

impl DbWriter {
    /// Enqueue a fact; waits when the queue is full.
    pub async fn persist(&self, persistable: Persistable) -> anyhow::Result<()> {
        self.tx
            .send(persistable)
            .await
            .map_err(|_| anyhow::anyhow!("persistence queue is closed"))
    }
}

/// Worker pool draining the persistence queue into Postgres. Facts are
/// grouped by model type and written in batched transactions; cross-type
/// ordering is not guaranteed and readers must not assume it.
pub struct DbService {
    pool: PgPool,
    writer: DbWriter,
    workers: Vec<JoinHandle<()>>,
    fatal: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
}

impl DbService {
    pub async fn connect(url: &str, worker_num: usize) -> anyhow::Result<Self> {
        let worker_num = worker_num.max(1);
        let pool = PgPoolOptions::new()
            .max_connections(worker_num as u32 + 2)
            .connect(url)
            .await?;

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));
        let fatal = Arc::new(AtomicBool::new(false));
        let closing = Arc::new(AtomicBool::new(false));

        let workers = (0..worker_num)
            .map(|worker_id| {
                let worker = Worker {
                    pool: pool.clone(),
                    rx: rx.clone(),
                    fatal: fatal.clone(),
                    closing: closing.clone(),
                    batches: HashMap::new(),
                };
                tokio::spawn(worker.run(worker_id))
            })
            .collect();

        Ok(DbService {
            pool,
            writer: DbWriter { tx },
            workers,
            fatal,
            closing,
        })
    }

    pub fn writer(&self) -> DbWriter {
        self.writer.clone()
    }

    /// Whether a worker hit an unrecoverable store error; the orchestrator
    /// downgrades to drain-and-exit when set.
    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Relaxed)
    }

    /// Shared flag behind [`Self::is_fatal`], for loops that outlive the
    /// service handle.
    pub fn fatal_flag(&self) -> Arc<AtomicBool> {
        self.fatal.clone()
    }

    /// Highest slot with a block row, used to resume the finalized download
    /// mode where a previous run left off.
    pub async fn last_persisted_slot(&self) -> anyhow::Result<Option<u64>> {
        let slot: Option<i64> = sqlx::query_scalar("SELECT MAX(f_slot) FROM t_blocks")
            .fetch_one(&self.pool)
            .await?;
        Ok(slot.map(|slot| slot as u64))
    }

    /// Delete reward rows recorded before `epoch` (sliding-window pruning).
    pub async fn prune_rewards_before(&self, epoch: u64) -> anyhow::Result<u64> {
        let result = sqlx::query(crate::models::validator_rewards::PRUNE_BEFORE_EPOCH)
            .bind(epoch as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Drain the queue, flush every batch and wait for the workers. Other
    /// writer handles may still be alive; the closing flag tells the workers
    /// to shut the queue themselves once it is drained.
    pub async fn close(self) -> anyhow::Result<()> {
        self.closing.store(true, Ordering::Relaxed);
        drop(self.writer);
        for worker in self.workers {
            worker.await?;
        }
        self.pool.close().await;
        info!("all database workers finished");
        Ok(())
    }
}

struct Batch {
    rows: Vec<Persistable>,
    opened: Instant,
}

struct Worker {
    pool: PgPool,
    rx: SharedReceiver,
    fatal: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    batches: HashMap<ModelType, Batch>,
}

impl Worker {
    async fn run(mut self, worker_id: usize) {
        debug!("database worker {worker_id} launched");
        loop {
            let next = {
                let mut rx = self.rx.lock().await;
                if self.closing.load(Ordering::Relaxed) {
                    // no new facts are coming; drain what is buffered
                    rx.close();
                }
                timeout(BATCH_FLUSH_AGE, rx.recv()).await
            };
            match next {
                Ok(Some(persistable)) => self.ingest(persistable).await,
                Ok(None) => {
                    self.flush_all().await;
                    break;
                }
                Err(_elapsed) => self.flush_aged().await,
            }
        }
        debug!("database worker {worker_id} finished");
    }

    async fn ingest(&mut self, persistable: Persistable) {
        let model_type = persistable.model_type();

        // A drop must not overtake inserts of the table it targets.
        if let Some(target) = model_type.drop_target() {
            self.flush(target).await;
            self.execute_single(&persistable).await;
            return;
        }

        let batch = self.batches.entry(model_type).or_insert_with(|| Batch {
            rows: Vec::with_capacity(MAX_BATCH_SIZE),
            opened: Instant::now(),
        });
        batch.rows.push(persistable);
        if batch.rows.len() >= MAX_BATCH_SIZE {
            self.flush(model_type).await;
        }
    }

    async fn flush(&mut self, model_type: ModelType) {
        let Some(batch) = self.batches.remove(&model_type) else {
            return;
        };
        if batch.rows.is_empty() {
            return;
        }
        if let Err(err) = self.write_batch(&batch.rows).await {
            error!(
                "failed to persist a batch of {} {model_type:?} rows: {err}",
                batch.rows.len()
            );
            self.record_error(&err);
        }
    }

    async fn write_batch(&self, rows: &[Persistable]) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            row.execute(&mut tx).await?;
        }
        tx.commit().await
    }

    async fn execute_single(&mut self, persistable: &Persistable) {
        let result = async {
            let mut conn = self.pool.acquire().await?;
            persistable.execute(&mut conn).await
        }
        .await;
        if let Err(err) = result {
            error!(
                "failed to execute {:?}: {err}",
                persistable.model_type()
            );
            self.record_error(&err);
        }
    }

    async fn flush_aged(&mut self) {
        let aged: Vec<ModelType> = self
            .batches
            .iter()
            .filter(|(_, batch)| batch.opened.elapsed() >= BATCH_FLUSH_AGE)
            .map(|(model_type, _)| *model_type)
            .collect();
        for model_type in aged {
            self.flush(model_type).await;
        }
    }

    async fn flush_all(&mut self) {
        let remaining: Vec<ModelType> = self.batches.keys().copied().collect();
        for model_type in remaining {
            self.flush(model_type).await;
        }
    }

    fn record_error(&self, err: &sqlx::Error) {
        if matches!(
            err,
            sqlx::Error::Io(_)
                | sqlx::Error::PoolClosed
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::Tls(_)
        ) {
            self.fatal.store(true, Ordering::Relaxed);
        }
    }
}
