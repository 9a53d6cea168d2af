use stakescope_consensus::block::BlsToExecutionChange;

use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_bls_to_execution_changes
        (f_slot, f_val_idx, f_from_bls_pubkey, f_to_execution_address)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (f_slot, f_val_idx) DO NOTHING;
";

#[derive(Debug, Clone)]
pub struct BlsChangeRow {
    pub slot: i64,
    pub validator_index: i64,
    pub from_bls_pubkey: String,
    pub to_execution_address: String,
}

impl BlsChangeRow {
    pub fn from_change(slot: u64, change: &BlsToExecutionChange) -> Self {
        BlsChangeRow {
            slot: slot as i64,
            validator_index: change.validator_index as i64,
            from_bls_pubkey: change.from_bls_pubkey.to_string(),
            to_execution_address: change.to_execution_address.to_string().to_lowercase(),
        }
    }

    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.slot)
            .bind(self.validator_index)
            .bind(self.from_bls_pubkey.as_str())
            .bind(self.to_execution_address.as_str())
    }
}
