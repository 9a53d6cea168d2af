use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_reorgs
        (f_slot, f_depth, f_old_head_block, f_new_head_block, f_old_head_state,
         f_new_head_state)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT DO NOTHING;
";

#[derive(Debug, Clone)]
pub struct ReorgRow {
    pub slot: i64,
    pub depth: i64,
    pub old_head_block: String,
    pub new_head_block: String,
    pub old_head_state: String,
    pub new_head_state: String,
}

impl ReorgRow {
    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.slot)
            .bind(self.depth)
            .bind(self.old_head_block.as_str())
            .bind(self.new_head_block.as_str())
            .bind(self.old_head_state.as_str())
            .bind(self.new_head_state.as_str())
    }
}
