use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;
use stakescope_consensus::{
    agnostic::AgnosticState, block::AgnosticBlock, epoch_at_slot, first_slot_of_epoch,
    last_slot_of_epoch,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How many epochs behind the finalized anchor blocks and states are kept
/// before eviction. Must cover the four-state reward window.
pub const RETENTION_EPOCHS: u64 = 4;

/// In-memory sliding window of recently downloaded blocks and states, keyed
/// by slot/epoch. Downloaders are the only writers; processors read and
/// `wait_for_block` until the slot they need lands.
#[derive(Default)]
pub struct DownloadCache {
    inner: Mutex<CacheInner>,
    block_added: Notify,
}

#[derive(Default)]
struct CacheInner {
    blocks: BTreeMap<u64, Arc<AgnosticBlock>>,
    states: BTreeMap<u64, Arc<AgnosticState>>,
    head_slot: Option<u64>,
    finalized_slot: Option<u64>,
}

impl DownloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&self, block: AgnosticBlock) {
        let slot = block.slot;
        {
            let mut inner = self.inner.lock();
            inner.blocks.insert(slot, Arc::new(block));
            inner.head_slot = Some(inner.head_slot.map_or(slot, |head| head.max(slot)));
        }
        self.block_added.notify_waiters();
    }

    pub fn add_state(&self, state: Arc<AgnosticState>) {
        let mut inner = self.inner.lock();
        inner.states.insert(state.epoch, state);
    }

    pub fn block_at(&self, slot: u64) -> Option<Arc<AgnosticBlock>> {
        self.inner.lock().blocks.get(&slot).cloned()
    }

    pub fn state_at_epoch(&self, epoch: u64) -> Option<Arc<AgnosticState>> {
        self.inner.lock().states.get(&epoch).cloned()
    }

    /// Blocks of `epoch` currently cached, in slot order.
    pub fn epoch_blocks(&self, epoch: u64) -> Vec<Arc<AgnosticBlock>> {
        let inner = self.inner.lock();
        inner
            .blocks
            .range(first_slot_of_epoch(epoch)..=last_slot_of_epoch(epoch))
            .map(|(_, block)| block.clone())
            .collect()
    }

    pub fn head_slot(&self) -> Option<u64> {
        self.inner.lock().head_slot
    }

    pub fn finalized_slot(&self) -> Option<u64> {
        self.inner.lock().finalized_slot
    }

    /// Block until the block at `slot` is added or the scope is cancelled.
    pub async fn wait_for_block(
        &self,
        slot: u64,
        cancel: &CancellationToken,
    ) -> Option<Arc<AgnosticBlock>> {
        loop {
            let notified = self.block_added.notified();
            if let Some(block) = self.block_at(slot) {
                return Some(block);
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Set the initial finalized anchor without evicting anything.
    pub fn anchor_finalized(&self, slot: u64) {
        self.inner.lock().finalized_slot = Some(slot);
    }

    /// Advance the finalized anchor and evict everything that fell out of
    /// the retention window.
    pub fn advance_finalized(&self, slot: u64) {
        let mut inner = self.inner.lock();
        let finalized = inner.finalized_slot.map_or(slot, |prev| prev.max(slot));
        inner.finalized_slot = Some(finalized);

        let Some(horizon_epoch) = epoch_at_slot(finalized).checked_sub(RETENTION_EPOCHS) else {
            return;
        };
        let horizon_slot = first_slot_of_epoch(horizon_epoch);
        inner.blocks = inner.blocks.split_off(&horizon_slot);
        inner.states = inner.states.split_off(&horizon_epoch);
    }

    /// Erase every block with slot >= `slot` and every state whose epoch is
    /// >= `slot / 32`; the head anchor falls back to what remains.
    pub fn rewind(&self, slot: u64) {
        let mut inner = self.inner.lock();
        inner.blocks.split_off(&slot);
        inner.states.split_off(&epoch_at_slot(slot));
        inner.head_slot = inner.blocks.keys().next_back().copied();
        debug!(
            "cache rewound to slot {slot}, head is now {:?}",
            inner.head_slot
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn block(slot: u64) -> AgnosticBlock {
        AgnosticBlock {
            slot,
            proposed: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_head_tracking_and_epoch_blocks() {
        let cache = DownloadCache::new();
        for slot in 64..=127 {
            cache.add_block(block(slot));
        }
        assert_eq!(cache.head_slot(), Some(127));
        assert_eq!(cache.epoch_blocks(2).len(), 32);
        assert_eq!(cache.epoch_blocks(2)[0].slot, 64);
        assert_eq!(cache.epoch_blocks(5).len(), 0);
    }

    #[test]
    fn test_rewind_erases_from_slot() {
        let cache = DownloadCache::new();
        for slot in 64..=160 {
            cache.add_block(block(slot));
        }
        cache.rewind(100);
        assert_eq!(cache.head_slot(), Some(99));
        assert!(cache.block_at(100).is_none());
        assert!(cache.block_at(99).is_some());
    }

    #[test]
    fn test_eviction_behind_finalized() {
        let cache = DownloadCache::new();
        for slot in 0..=(32 * 8) {
            cache.add_block(block(slot));
        }
        // finalized lands in epoch 7; epochs below 3 leave the window
        cache.advance_finalized(32 * 7);
        assert!(cache.block_at(0).is_none());
        assert!(cache.block_at(32 * 2 + 31).is_none());
        assert!(cache.block_at(32 * 3).is_some());
        assert_eq!(cache.finalized_slot(), Some(32 * 7));
    }

    #[tokio::test]
    async fn test_wait_for_block_wakes_on_add() {
        let cache = Arc::new(DownloadCache::new());
        let cancel = CancellationToken::new();

        let waiter = {
            let cache = cache.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.wait_for_block(42, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.add_block(block(42));

        let found = waiter.await.unwrap();
        assert_eq!(found.unwrap().slot, 42);
    }

    #[tokio::test]
    async fn test_wait_for_block_cancellation() {
        let cache = Arc::new(DownloadCache::new());
        let cancel = CancellationToken::new();

        let waiter = {
            let cache = cache.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.wait_for_block(42, &cancel).await })
        };
        cancel.cancel();

        assert!(waiter.await.unwrap().is_none());
    }
}
