use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_proposer_duties (f_slot, f_val_idx, f_proposed)
    VALUES ($1, $2, $3)
    ON CONFLICT (f_slot) DO UPDATE SET
        f_val_idx = excluded.f_val_idx,
        f_proposed = excluded.f_proposed;
";

pub const DROP_FROM_SLOT: &str = "DELETE FROM t_proposer_duties WHERE f_slot >= $1;";

#[derive(Debug, Clone)]
pub struct ProposerDutyRow {
    pub slot: i64,
    pub validator_index: i64,
    pub proposed: bool,
}

impl ProposerDutyRow {
    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.slot)
            .bind(self.validator_index)
            .bind(self.proposed)
    }
}
