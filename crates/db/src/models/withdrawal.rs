use stakescope_consensus::block::Withdrawal;

use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_withdrawals (f_slot, f_index, f_val_idx, f_address, f_amount)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (f_slot, f_index) DO NOTHING;
";

pub const DROP_FROM_SLOT: &str = "DELETE FROM t_withdrawals WHERE f_slot >= $1;";

#[derive(Debug, Clone)]
pub struct WithdrawalRow {
    pub slot: i64,
    pub index: i64,
    pub validator_index: i64,
    pub address: String,
    pub amount: i64,
}

impl WithdrawalRow {
    pub fn from_withdrawal(slot: u64, withdrawal: &Withdrawal) -> Self {
        WithdrawalRow {
            slot: slot as i64,
            index: withdrawal.index as i64,
            validator_index: withdrawal.validator_index as i64,
            address: withdrawal.address.to_string().to_lowercase(),
            amount: withdrawal.amount as i64,
        }
    }

    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.slot)
            .bind(self.index)
            .bind(self.validator_index)
            .bind(self.address.as_str())
            .bind(self.amount)
    }
}
