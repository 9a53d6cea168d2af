use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_finalized_checkpoints (f_epoch, f_block_root, f_state_root)
    VALUES ($1, $2, $3)
    ON CONFLICT (f_epoch) DO NOTHING;
";

#[derive(Debug, Clone)]
pub struct FinalizedCheckpointRow {
    pub epoch: i64,
    pub block_root: String,
    pub state_root: String,
}

impl FinalizedCheckpointRow {
    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.epoch)
            .bind(self.block_root.as_str())
            .bind(self.state_root.as_str())
    }
}
