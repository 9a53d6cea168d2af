use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_blob_sidecars (f_slot, f_index, f_kzg_commitment, f_tx_hash)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (f_slot, f_index) DO NOTHING;
";

/// A blob sidecar tagged with the transaction whose commitment it carries.
#[derive(Debug, Clone)]
pub struct BlobSidecarRow {
    pub slot: i64,
    pub index: i64,
    pub kzg_commitment: String,
    pub tx_hash: String,
}

impl BlobSidecarRow {
    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.slot)
            .bind(self.index)
            .bind(self.kzg_commitment.as_str())
            .bind(self.tx_hash.as_str())
    }
}
