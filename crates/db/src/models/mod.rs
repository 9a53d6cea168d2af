pub mod blob_sidecar;
pub mod block;
pub mod bls_change;
pub mod checkpoint;
pub mod deposit;
pub mod epoch;
pub mod proposer_duty;
pub mod reorg;
pub mod transaction;
pub mod validator_rewards;
pub mod withdrawal;

pub use blob_sidecar::BlobSidecarRow;
pub use block::BlockRow;
pub use bls_change::BlsChangeRow;
pub use checkpoint::FinalizedCheckpointRow;
pub use deposit::DepositRow;
pub use epoch::EpochRow;
pub use proposer_duty::ProposerDutyRow;
pub use reorg::ReorgRow;
pub use transaction::TransactionRow;
pub use validator_rewards::ValidatorRewardsRow;
pub use withdrawal::WithdrawalRow;

pub(crate) type PgQuery<'q> =
    sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;
