use stakescope_consensus::metrics::ValidatorRewards;

use super::PgQuery;

const UPSERT: &str = r"
    INSERT INTO t_validator_rewards (
        f_val_idx, f_epoch, f_balance, f_reward, f_max_reward,
        f_max_att_reward, f_max_sync_reward, f_base_reward, f_att_slot,
        f_in_sync_committee, f_missing_source, f_missing_target,
        f_missing_head, f_status, f_pool_name)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    ON CONFLICT (f_val_idx, f_epoch) DO UPDATE SET
        f_balance = excluded.f_balance,
        f_reward = excluded.f_reward,
        f_max_reward = excluded.f_max_reward,
        f_max_att_reward = excluded.f_max_att_reward,
        f_max_sync_reward = excluded.f_max_sync_reward,
        f_base_reward = excluded.f_base_reward,
        f_att_slot = excluded.f_att_slot,
        f_in_sync_committee = excluded.f_in_sync_committee,
        f_missing_source = excluded.f_missing_source,
        f_missing_target = excluded.f_missing_target,
        f_missing_head = excluded.f_missing_head,
        f_status = excluded.f_status,
        f_pool_name = excluded.f_pool_name;
";

pub const DROP_FROM_EPOCH: &str = "DELETE FROM t_validator_rewards WHERE f_epoch >= $1;";

/// Keeps the rewards table trimmed to a sliding epoch window.
pub const PRUNE_BEFORE_EPOCH: &str = "DELETE FROM t_validator_rewards WHERE f_epoch < $1;";

#[derive(Debug, Clone)]
pub struct ValidatorRewardsRow {
    pub validator_index: i64,
    pub epoch: i64,
    pub balance: i64,
    pub reward: i64,
    pub max_reward: i64,
    pub max_attestation_reward: i64,
    pub max_sync_reward: i64,
    pub base_reward: i64,
    pub attestation_slot: Option<i64>,
    pub in_sync_committee: bool,
    pub missing_source: bool,
    pub missing_target: bool,
    pub missing_head: bool,
    pub status: &'static str,
    pub pool_name: Option<String>,
}

impl ValidatorRewardsRow {
    pub fn from_rewards(rewards: &ValidatorRewards, pool_name: Option<String>) -> Self {
        ValidatorRewardsRow {
            validator_index: rewards.validator_index as i64,
            epoch: rewards.epoch as i64,
            balance: rewards.validator_balance as i64,
            reward: rewards.reward,
            max_reward: rewards.max_reward as i64,
            max_attestation_reward: rewards.max_attestation_reward as i64,
            max_sync_reward: rewards.max_sync_committee_reward as i64,
            base_reward: rewards.base_reward as i64,
            attestation_slot: rewards.attestation_slot.map(|slot| slot as i64),
            in_sync_committee: rewards.in_sync_committee,
            missing_source: rewards.missing_source,
            missing_target: rewards.missing_target,
            missing_head: rewards.missing_head,
            status: rewards.status.as_str(),
            pool_name,
        }
    }

    pub(crate) fn upsert(&self) -> PgQuery<'_> {
        sqlx::query(UPSERT)
            .bind(self.validator_index)
            .bind(self.epoch)
            .bind(self.balance)
            .bind(self.reward)
            .bind(self.max_reward)
            .bind(self.max_attestation_reward)
            .bind(self.max_sync_reward)
            .bind(self.base_reward)
            .bind(self.attestation_slot)
            .bind(self.in_sync_committee)
            .bind(self.missing_source)
            .bind(self.missing_target)
            .bind(self.missing_head)
            .bind(self.status)
            .bind(self.pool_name.as_deref())
    }
}
