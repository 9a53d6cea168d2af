use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{B256, keccak256};
use sha2::{Digest, Sha256};
use stakescope_consensus::block::AgnosticBlock;
use stakescope_db::{
    Persistable,
    models::{BlobSidecarRow, BlockRow, BlsChangeRow, DepositRow, TransactionRow, WithdrawalRow},
};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, warn};

use crate::chain::{AnalyzerContext, BlockTask};

const BLOB_TX_TYPE: u8 = 0x03;

impl AnalyzerContext {
    pub(crate) async fn run_block_worker(&self, rx: Arc<Mutex<mpsc::Receiver<BlockTask>>>) {
        loop {
            let task = { rx.lock().await.recv().await };
            let Some(task) = task else { break };
            if let Err(err) = self.process_block(task.slot).await {
                error!("block processing failed at slot {}: {err:#}", task.slot);
            }
        }
    }

    async fn process_block(&self, slot: u64) -> anyhow::Result<()> {
        let key = format!("slot={slot}");
        if !self.book.acquire(&key) {
            return Ok(());
        }
        let result = self.process_block_inner(slot).await;
        self.book.free_page(&key);
        result
    }

    /// Persist the block row and everything the block carries: withdrawals,
    /// deposits, BLS-to-execution changes, receipt-enriched transactions and
    /// blob sidecars.
    async fn process_block_inner(&self, slot: u64) -> anyhow::Result<()> {
        let Some(block) = self.cache.wait_for_block(slot, &self.wait_cancel).await else {
            return Ok(());
        };

        self.writer
            .persist(Persistable::Block(BlockRow::from_block(&block)))
            .await?;

        for withdrawal in &block.execution_payload.withdrawals {
            self.writer
                .persist(Persistable::Withdrawal(WithdrawalRow::from_withdrawal(
                    slot, withdrawal,
                )))
                .await?;
        }
        for (index_in_block, deposit) in block.deposits.iter().enumerate() {
            self.writer
                .persist(Persistable::Deposit(DepositRow::from_deposit(
                    slot,
                    index_in_block,
                    deposit,
                )))
                .await?;
        }
        for change in &block.bls_to_execution_changes {
            self.writer
                .persist(Persistable::BlsToExecutionChange(BlsChangeRow::from_change(
                    slot, change,
                )))
                .await?;
        }

        if self.cfg.metrics.transactions && block.proposed {
            self.process_transactions(&block).await?;
        }
        if !block.blob_kzg_commitments.is_empty() {
            self.process_blob_sidecars(&block).await?;
        }
        Ok(())
    }

    /// Expand the payload's raw transactions with their receipt-derived
    /// fields. Receipt failures are logged and skipped; the block row
    /// already made it to the store.
    async fn process_transactions(&self, block: &AgnosticBlock) -> anyhow::Result<()> {
        let Some(execution) = &self.execution else {
            warn!(
                "transaction metrics enabled without an execution client, skipping slot {}",
                block.slot
            );
            return Ok(());
        };

        let payload = &block.execution_payload;
        let receipts = match execution.block_receipts(payload.block_hash).await {
            Ok(receipts) => receipts,
            Err(err) => {
                error!(
                    "could not request receipts for slot {} block {}: {err}",
                    block.slot, payload.block_hash
                );
                return Ok(());
            }
        };
        let receipts_by_hash: HashMap<B256, _> = receipts
            .into_iter()
            .map(|receipt| (receipt.transaction_hash, receipt))
            .collect();

        for (tx_index, raw) in payload.transactions.iter().enumerate() {
            let hash = keccak256(raw);
            let receipt = receipts_by_hash.get(&hash);
            let row = TransactionRow {
                slot: block.slot as i64,
                el_block_number: payload.block_number as i64,
                timestamp: payload.timestamp as i64,
                tx_index: tx_index as i64,
                hash: hash.to_string(),
                from: receipt
                    .map(|receipt| receipt.from.to_string().to_lowercase())
                    .unwrap_or_default(),
                to: receipt
                    .and_then(|receipt| receipt.to)
                    .map(|to| to.to_string().to_lowercase()),
                contract_address: receipt
                    .and_then(|receipt| receipt.contract_address)
                    .map(|address| address.to_string().to_lowercase()),
                effective_gas_price: receipt
                    .map(|receipt| {
                        receipt
                            .effective_gas_price
                            .to::<u128>()
                            .min(i64::MAX as u128) as i64
                    })
                    .unwrap_or_default(),
                gas_used: receipt
                    .map(|receipt| receipt.gas_used.to::<u64>() as i64)
                    .unwrap_or_default(),
                size: raw.len() as i64,
                tx_type: tx_type(raw) as i64,
            };
            self.writer.persist(Persistable::Transaction(row)).await?;
        }
        Ok(())
    }

    /// Persist the slot's blob sidecars, each tagged with the hash of the
    /// blob transaction whose versioned hash matches its commitment.
    async fn process_blob_sidecars(&self, block: &AgnosticBlock) -> anyhow::Result<()> {
        let sidecars = match self.client.request_blob_sidecars(block.slot).await {
            Ok(sidecars) => sidecars,
            Err(err) => {
                error!(
                    "could not request blob sidecars for slot {}: {err}",
                    block.slot
                );
                return Ok(());
            }
        };

        let blob_txs: Vec<(B256, &[u8])> = block
            .execution_payload
            .transactions
            .iter()
            .filter(|raw| raw.first() == Some(&BLOB_TX_TYPE))
            .map(|raw| (keccak256(raw), raw.as_ref()))
            .collect();

        for sidecar in sidecars {
            let versioned_hash = kzg_to_versioned_hash(sidecar.kzg_commitment.as_slice());
            // versioned hashes appear verbatim in the canonical tx encoding
            let tx_hash = blob_txs
                .iter()
                .find(|(_, raw)| contains_subslice(raw, versioned_hash.as_slice()))
                .map(|(hash, _)| *hash)
                .unwrap_or(B256::ZERO);

            self.writer
                .persist(Persistable::BlobSidecar(BlobSidecarRow {
                    slot: block.slot as i64,
                    index: sidecar.index as i64,
                    kzg_commitment: sidecar.kzg_commitment.to_string(),
                    tx_hash: tx_hash.to_string(),
                }))
                .await?;
        }
        Ok(())
    }
}

/// EIP-4844 versioned hash: sha256 of the commitment with the version byte.
fn kzg_to_versioned_hash(commitment: &[u8]) -> B256 {
    let mut hash: [u8; 32] = Sha256::digest(commitment).into();
    hash[0] = 0x01;
    B256::from(hash)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

/// EIP-2718 transaction type; legacy transactions start with an RLP list
/// prefix (>= 0xc0) and report type 0.
fn tx_type(raw: &[u8]) -> u8 {
    match raw.first() {
        Some(&first) if first < 0x80 => first,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versioned_hash_prefix() {
        let hash = kzg_to_versioned_hash(&[0x11; 48]);
        assert_eq!(hash[0], 0x01);
        let plain: [u8; 32] = Sha256::digest([0x11; 48]).into();
        assert_eq!(&hash[1..], &plain[1..]);
    }

    #[test]
    fn test_tx_type_detection() {
        assert_eq!(tx_type(&[0x02, 0xf8]), 2);
        assert_eq!(tx_type(&[0x03, 0xf8]), 3);
        // legacy RLP list prefix
        assert_eq!(tx_type(&[0xf8, 0x6f]), 0);
        assert_eq!(tx_type(&[]), 0);
    }

    #[test]
    fn test_contains_subslice() {
        assert!(contains_subslice(&[1, 2, 3, 4], &[2, 3]));
        assert!(!contains_subslice(&[1, 2, 3, 4], &[3, 2]));
        assert!(!contains_subslice(&[1], &[1, 2]));
    }
}
