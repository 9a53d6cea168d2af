use stakescope_consensus::block::Deposit;

use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_deposits (f_slot, f_index_in_block, f_pubkey, f_amount)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (f_slot, f_index_in_block) DO NOTHING;
";

#[derive(Debug, Clone)]
pub struct DepositRow {
    pub slot: i64,
    pub index_in_block: i64,
    pub pubkey: String,
    pub amount: i64,
}

impl DepositRow {
    pub fn from_deposit(slot: u64, index_in_block: usize, deposit: &Deposit) -> Self {
        DepositRow {
            slot: slot as i64,
            index_in_block: index_in_block as i64,
            pubkey: deposit.data.pubkey.to_string(),
            amount: deposit.data.amount as i64,
        }
    }

    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.slot)
            .bind(self.index_in_block)
            .bind(self.pubkey.as_str())
            .bind(self.amount)
    }
}
