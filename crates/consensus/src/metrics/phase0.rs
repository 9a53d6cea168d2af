//! Phase0 reward formulas, kept for historical epochs.

use super::{MetricsError, StateMetrics, ValidatorRewards};
use crate::{
    constants::{BASE_REWARD_FACTOR, BASE_REWARDS_PER_EPOCH},
    integer_squareroot,
};

pub(super) fn reward_record(
    metrics: &StateMetrics,
    validator_index: u64,
) -> Result<ValidatorRewards, MetricsError> {
    let current = &metrics.current;
    let index = validator_index as usize;
    let validator =
        current
            .validators
            .get(index)
            .ok_or(MetricsError::UnknownValidator {
                index: validator_index,
                epoch: current.epoch,
            })?;

    let base_reward = base_reward(validator.effective_balance, current.total_active_balance);

    // Approximation inherited from the original tooling, not protocol-exact:
    // a perfect attester collects about 31/8 of the base reward, discounted
    // by how much of the network attested with it.
    let participation_rate = if current.num_active_vals == 0 {
        0.0
    } else {
        current.num_attesting_vals as f64 / current.num_active_vals as f64
    };
    let max_attestation_reward =
        ((31.0 / 8.0) * participation_rate * base_reward as f64) as u64;

    // Realized as the balance delta across the transition that applied the
    // scored participation; proposer tips did not exist before the merge.
    let balance_current = current.balance(validator_index)?;
    let balance_next = metrics.next.balance(validator_index)?;
    let reward = balance_next as i64 - balance_current as i64;

    let [missing_source, missing_target, missing_head] = current.missing_flags(validator_index);

    Ok(ValidatorRewards {
        validator_index,
        epoch: current.epoch,
        validator_balance: balance_current,
        reward,
        max_reward: max_attestation_reward,
        max_attestation_reward,
        max_sync_committee_reward: 0,
        base_reward,
        attestation_slot: current
            .epoch_structs
            .validator_att_slot
            .get(&validator_index)
            .copied(),
        in_sync_committee: false,
        missing_source,
        missing_target,
        missing_head,
        status: current.validator_status(validator_index),
    })
}

fn base_reward(effective_balance: u64, total_active_balance: u64) -> u64 {
    let denominator =
        BASE_REWARDS_PER_EPOCH * integer_squareroot(total_active_balance);
    if denominator == 0 {
        return 0;
    }
    effective_balance * BASE_REWARD_FACTOR / denominator
}
