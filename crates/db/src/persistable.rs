use sqlx::PgConnection;

use crate::models::{
    BlobSidecarRow, BlockRow, BlsChangeRow, DepositRow, EpochRow, FinalizedCheckpointRow,
    ProposerDutyRow, ReorgRow, TransactionRow, ValidatorRewardsRow, WithdrawalRow, block,
    epoch, proposer_duty, transaction, validator_rewards, withdrawal,
};

/// Stable tag used to batch same-type facts together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Block,
    Epoch,
    ProposerDuty,
    ValidatorRewards,
    Transaction,
    Withdrawal,
    Deposit,
    BlsToExecutionChange,
    BlobSidecar,
    OrphanBlock,
    Reorg,
    FinalizedCheckpoint,
    BlockDrop,
    EpochDrop,
    ProposerDutiesDrop,
    ValidatorRewardsDrop,
    TransactionDrop,
    WithdrawalDrop,
}

impl ModelType {
    /// For a drop marker, the insert batch it must not overtake.
    pub fn drop_target(&self) -> Option<ModelType> {
        Some(match self {
            ModelType::BlockDrop => ModelType::Block,
            ModelType::EpochDrop => ModelType::Epoch,
            ModelType::ProposerDutiesDrop => ModelType::ProposerDuty,
            ModelType::ValidatorRewardsDrop => ModelType::ValidatorRewards,
            ModelType::TransactionDrop => ModelType::Transaction,
            ModelType::WithdrawalDrop => ModelType::Withdrawal,
            _ => return None,
        })
    }

    pub fn is_drop(&self) -> bool {
        self.drop_target().is_some()
    }
}

/// Every fact the pipeline can push at the store, plus the per-type
/// "delete from slot/epoch onward" markers used by rewinds.
#[derive(Debug, Clone)]
pub enum Persistable {
    Block(BlockRow),
    Epoch(EpochRow),
    ProposerDuty(ProposerDutyRow),
    ValidatorRewards(ValidatorRewardsRow),
    Transaction(TransactionRow),
    Withdrawal(WithdrawalRow),
    Deposit(DepositRow),
    BlsToExecutionChange(BlsChangeRow),
    BlobSidecar(BlobSidecarRow),
    OrphanBlock(BlockRow),
    Reorg(ReorgRow),
    FinalizedCheckpoint(FinalizedCheckpointRow),
    BlockDrop { slot: u64 },
    EpochDrop { epoch: u64 },
    ProposerDutiesDrop { epoch: u64 },
    ValidatorRewardsDrop { epoch: u64 },
    TransactionDrop { slot: u64 },
    WithdrawalDrop { slot: u64 },
}

impl Persistable {
    pub fn model_type(&self) -> ModelType {
        match self {
            Persistable::Block(_) => ModelType::Block,
            Persistable::Epoch(_) => ModelType::Epoch,
            Persistable::ProposerDuty(_) => ModelType::ProposerDuty,
            Persistable::ValidatorRewards(_) => ModelType::ValidatorRewards,
            Persistable::Transaction(_) => ModelType::Transaction,
            Persistable::Withdrawal(_) => ModelType::Withdrawal,
            Persistable::Deposit(_) => ModelType::Deposit,
            Persistable::BlsToExecutionChange(_) => ModelType::BlsToExecutionChange,
            Persistable::BlobSidecar(_) => ModelType::BlobSidecar,
            Persistable::OrphanBlock(_) => ModelType::OrphanBlock,
            Persistable::Reorg(_) => ModelType::Reorg,
            Persistable::FinalizedCheckpoint(_) => ModelType::FinalizedCheckpoint,
            Persistable::BlockDrop { .. } => ModelType::BlockDrop,
            Persistable::EpochDrop { .. } => ModelType::EpochDrop,
            Persistable::ProposerDutiesDrop { .. } => ModelType::ProposerDutiesDrop,
            Persistable::ValidatorRewardsDrop { .. } => ModelType::ValidatorRewardsDrop,
            Persistable::TransactionDrop { .. } => ModelType::TransactionDrop,
            Persistable::WithdrawalDrop { .. } => ModelType::WithdrawalDrop,
        }
    }

    /// Execute this fact's upsert or delete on `conn`.
    pub(crate) async fn execute(&self, conn: &mut PgConnection) -> sqlx::Result<()> {
        match self {
            Persistable::Block(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::Epoch(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::ProposerDuty(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::ValidatorRewards(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::Transaction(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::Withdrawal(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::Deposit(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::BlsToExecutionChange(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::BlobSidecar(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::OrphanBlock(row) => row.upsert_orphan().execute(&mut *conn).await?,
            Persistable::Reorg(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::FinalizedCheckpoint(row) => row.upsert().execute(&mut *conn).await?,
            Persistable::BlockDrop { slot } => {
                sqlx::query(block::DROP_FROM_SLOT)
                    .bind(*slot as i64)
                    .execute(&mut *conn)
                    .await?
            }
            Persistable::EpochDrop { epoch } => {
                sqlx::query(epoch::DROP_FROM_EPOCH)
                    .bind(*epoch as i64)
                    .execute(&mut *conn)
                    .await?
            }
            Persistable::ProposerDutiesDrop { epoch } => {
                sqlx::query(proposer_duty::DROP_FROM_SLOT)
                    .bind((*epoch * stakescope_consensus::constants::SLOTS_PER_EPOCH) as i64)
                    .execute(&mut *conn)
                    .await?
            }
            Persistable::ValidatorRewardsDrop { epoch } => {
                sqlx::query(validator_rewards::DROP_FROM_EPOCH)
                    .bind(*epoch as i64)
                    .execute(&mut *conn)
                    .await?
            }
            Persistable::TransactionDrop { slot } => {
                sqlx::query(transaction::DROP_FROM_SLOT)
                    .bind(*slot as i64)
                    .execute(&mut *conn)
                    .await?
            }
            Persistable::WithdrawalDrop { slot } => {
                sqlx::query(withdrawal::DROP_FROM_SLOT)
                    .bind(*slot as i64)
                    .execute(&mut *conn)
                    .await?
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stakescope_consensus::block::AgnosticBlock;

    use super::*;
    use crate::models::BlockRow;

    #[test]
    fn test_drop_targets() {
        assert_eq!(
            ModelType::BlockDrop.drop_target(),
            Some(ModelType::Block)
        );
        assert_eq!(
            ModelType::ValidatorRewardsDrop.drop_target(),
            Some(ModelType::ValidatorRewards)
        );
        assert_eq!(ModelType::Block.drop_target(), None);
        assert!(ModelType::TransactionDrop.is_drop());
        assert!(!ModelType::Reorg.is_drop());
    }

    #[test]
    fn test_model_type_tags() {
        let row = BlockRow::from_block(&AgnosticBlock::missed(1, 0));
        assert_eq!(
            Persistable::Block(row.clone()).model_type(),
            ModelType::Block
        );
        assert_eq!(
            Persistable::OrphanBlock(row).model_type(),
            ModelType::OrphanBlock
        );
        assert_eq!(
            Persistable::BlockDrop { slot: 5 }.model_type(),
            ModelType::BlockDrop
        );
    }
}
