use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_transactions (
        f_slot, f_el_block_number, f_timestamp, f_tx_index, f_hash, f_from,
        f_to, f_contract_address, f_effective_gas_price, f_gas_used, f_size,
        f_tx_type)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    ON CONFLICT DO NOTHING;
";

pub const DROP_FROM_SLOT: &str = "DELETE FROM t_transactions WHERE f_slot >= $1;";

/// Execution transaction enriched with its receipt-derived fields.
#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub slot: i64,
    pub el_block_number: i64,
    pub timestamp: i64,
    pub tx_index: i64,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub contract_address: Option<String>,
    pub effective_gas_price: i64,
    pub gas_used: i64,
    pub size: i64,
    pub tx_type: i64,
}

impl TransactionRow {
    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.slot)
            .bind(self.el_block_number)
            .bind(self.timestamp)
            .bind(self.tx_index)
            .bind(self.hash.as_str())
            .bind(self.from.as_str())
            .bind(self.to.as_deref())
            .bind(self.contract_address.as_deref())
            .bind(self.effective_gas_price)
            .bind(self.gas_used)
            .bind(self.size)
            .bind(self.tx_type)
    }
}
