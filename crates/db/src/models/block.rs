use stakescope_consensus::block::AgnosticBlock;

use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_blocks (
        f_slot, f_epoch, f_proposer_index, f_proposed, f_graffiti,
        f_attestation_count, f_deposit_count, f_el_block_hash, f_el_block_number,
        f_el_fee_recipient, f_el_gas_limit, f_el_gas_used, f_el_timestamp,
        f_el_transaction_count)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT (f_slot) DO UPDATE SET
        f_epoch = excluded.f_epoch,
        f_proposer_index = excluded.f_proposer_index,
        f_proposed = excluded.f_proposed,
        f_graffiti = excluded.f_graffiti,
        f_attestation_count = excluded.f_attestation_count,
        f_deposit_count = excluded.f_deposit_count,
        f_el_block_hash = excluded.f_el_block_hash,
        f_el_block_number = excluded.f_el_block_number,
        f_el_fee_recipient = excluded.f_el_fee_recipient,
        f_el_gas_limit = excluded.f_el_gas_limit,
        f_el_gas_used = excluded.f_el_gas_used,
        f_el_timestamp = excluded.f_el_timestamp,
        f_el_transaction_count = excluded.f_el_transaction_count;
";

const UPSERT_ORPHAN: &str = r"
    INSERT INTO t_orphans (
        f_slot, f_epoch, f_proposer_index, f_proposed, f_graffiti,
        f_attestation_count, f_deposit_count, f_el_block_hash, f_el_block_number,
        f_el_fee_recipient, f_el_gas_limit, f_el_gas_used, f_el_timestamp,
        f_el_transaction_count)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT DO NOTHING;
";

pub const DROP_FROM_SLOT: &str = "DELETE FROM t_blocks WHERE f_slot >= $1;";

/// One row per slot, missed slots included with the zero payload sentinel.
#[derive(Debug, Clone)]
pub struct BlockRow {
    pub slot: i64,
    pub epoch: i64,
    pub proposer_index: i64,
    pub proposed: bool,
    pub graffiti: String,
    pub attestation_count: i64,
    pub deposit_count: i64,
    pub el_block_hash: String,
    pub el_block_number: i64,
    pub el_fee_recipient: String,
    pub el_gas_limit: i64,
    pub el_gas_used: i64,
    pub el_timestamp: i64,
    pub el_transaction_count: i64,
}

impl BlockRow {
    pub fn from_block(block: &AgnosticBlock) -> Self {
        let payload = &block.execution_payload;
        BlockRow {
            slot: block.slot as i64,
            epoch: block.epoch() as i64,
            proposer_index: block.proposer_index as i64,
            proposed: block.proposed,
            graffiti: block.graffiti_string(),
            attestation_count: block.attestations.len() as i64,
            deposit_count: block.deposits.len() as i64,
            el_block_hash: payload.block_hash.to_string(),
            el_block_number: payload.block_number as i64,
            el_fee_recipient: payload.fee_recipient.to_string().to_lowercase(),
            el_gas_limit: payload.gas_limit as i64,
            el_gas_used: payload.gas_used as i64,
            el_timestamp: payload.timestamp as i64,
            el_transaction_count: payload.transactions.len() as i64,
        }
    }

    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        self.bind(sqlx::query(UPSERT))
    }

    pub(crate) fn upsert_orphan(&self) -> PgQuery<'_> {
        self.bind(sqlx::query(UPSERT_ORPHAN))
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.slot)
            .bind(self.epoch)
            .bind(self.proposer_index)
            .bind(self.proposed)
            .bind(self.graffiti.as_str())
            .bind(self.attestation_count)
            .bind(self.deposit_count)
            .bind(self.el_block_hash.as_str())
            .bind(self.el_block_number)
            .bind(self.el_fee_recipient.as_str())
            .bind(self.el_gas_limit)
            .bind(self.el_gas_used)
            .bind(self.el_timestamp)
            .bind(self.el_transaction_count)
    }
}

#[cfg(test)]
mod tests {
    use stakescope_consensus::block::AgnosticBlock;

    use super::*;

    #[test]
    fn test_missed_block_row() {
        let row = BlockRow::from_block(&AgnosticBlock::missed(320_011, 77));
        assert_eq!(row.slot, 320_011);
        assert_eq!(row.epoch, 10_000);
        assert_eq!(row.proposer_index, 77);
        assert!(!row.proposed);
        assert_eq!(row.el_block_number, 0);
        assert_eq!(
            row.el_block_hash,
            "0x0000000000000000000000000000000000000000000000000000000000000000"
        );
        assert_eq!(row.el_transaction_count, 0);
    }
}
