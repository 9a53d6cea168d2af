//! Reward formulas for Altair and every later fork.

use super::{MetricsError, StateMetrics, ValidatorRewards};
use crate::{
    agnostic::AgnosticState,
    constants::{
        BASE_REWARD_FACTOR, EFFECTIVE_BALANCE_INCREMENT, NUM_FLAG_INDICES,
        PARTICIPATING_FLAG_WEIGHTS, SLOTS_PER_EPOCH, SYNC_COMMITTEE_SIZE, SYNC_REWARD_WEIGHT,
        TIMELY_HEAD_FLAG_INDEX, WEIGHT_DENOMINATOR,
    },
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

    let total_active_balance = current.total_active_balance;
    let base_reward = base_reward(validator.effective_balance, total_active_balance);
    let max_attestation_reward =
        max_attestation_reward(current, validator.effective_balance, total_active_balance);

    let in_sync_committee = current.sync_committee.contains(&validator.pubkey);
    let max_sync_committee_reward = if in_sync_committee {
        max_sync_committee_reward(total_active_balance)
    } else {
        0
    };

    // The scored participation is the previous epoch's, so activity is judged
    // there as well.
    let was_active = validator.is_active(current.epoch.saturating_sub(1));
    let mut reward = 0i64;
    if was_active {
        let mut attained = 0f64;
        let mut penalty = 0u64;
        for flag in 0..NUM_FLAG_INDICES {
            if current.correct_flags[flag][index] {
                attained +=
                    flag_reward(current, flag, validator.effective_balance, total_active_balance);
            } else if flag != TIMELY_HEAD_FLAG_INDEX {
                // a late or absent head vote forfeits the reward but is not penalized
                penalty += base_reward * PARTICIPATING_FLAG_WEIGHTS[flag] / WEIGHT_DENOMINATOR;
            }
        }
        reward = attained as i64 - penalty as i64;
        if in_sync_committee {
            reward += max_sync_committee_reward as i64;
        }
    }

    let [missing_source, missing_target, missing_head] = current.missing_flags(validator_index);

    Ok(ValidatorRewards {
        validator_index,
        epoch: current.epoch,
        validator_balance: current.balance(validator_index)?,
        reward,
        max_reward: max_attestation_reward + max_sync_committee_reward,
        max_attestation_reward,
        max_sync_committee_reward,
        base_reward,
        attestation_slot: current
            .epoch_structs
            .validator_att_slot
            .get(&validator_index)
            .copied(),
        in_sync_committee,
        missing_source,
        missing_target,
        missing_head,
        status: current.validator_status(validator_index),
    })
}

/// Base reward per effective-balance increment.
fn base_reward_per_increment(total_active_balance: u64) -> f64 {
    if total_active_balance == 0 {
        return 0.0;
    }
    (EFFECTIVE_BALANCE_INCREMENT * BASE_REWARD_FACTOR) as f64
        / (total_active_balance as f64).sqrt()
}

fn base_reward(effective_balance: u64, total_active_balance: u64) -> u64 {
    (effective_balance / EFFECTIVE_BALANCE_INCREMENT)
        * base_reward_per_increment(total_active_balance) as u64
}

/// Reward for one timely flag: its weight share of the base reward, scaled by
/// how much of the active balance attested that flag.
fn flag_reward(
    state: &AgnosticState,
    flag: usize,
    effective_balance: u64,
    total_active_balance: u64,
) -> f64 {
    let attesting_increments = state.attesting_balance[flag] / EFFECTIVE_BALANCE_INCREMENT;
    let total_increments = total_active_balance / EFFECTIVE_BALANCE_INCREMENT;
    let base = base_reward(effective_balance, total_active_balance) as f64;
    PARTICIPATING_FLAG_WEIGHTS[flag] as f64 * base * attesting_increments as f64
        / (total_increments as f64 * WEIGHT_DENOMINATOR as f64)
}

fn max_attestation_reward(
    state: &AgnosticState,
    effective_balance: u64,
    total_active_balance: u64,
) -> u64 {
    (0..NUM_FLAG_INDICES)
        .map(|flag| flag_reward(state, flag, effective_balance, total_active_balance))
        .sum::<f64>() as u64
}

/// Max sync-committee reward over the epoch: the committee member keeps its
/// seat for all slots, so the per-slot participant reward counts once per
/// slot of the epoch.
fn max_sync_committee_reward(total_active_balance: u64) -> u64 {
    let total_increments = (total_active_balance / EFFECTIVE_BALANCE_INCREMENT) as f64;
    let total_base_rewards = base_reward_per_increment(total_active_balance) * total_increments;
    let max_participant_rewards = total_base_rewards * SYNC_REWARD_WEIGHT as f64
        / WEIGHT_DENOMINATOR as f64
        / SLOTS_PER_EPOCH as f64;
    let participant_reward = max_participant_rewards / SYNC_COMMITTEE_SIZE as f64;

    (participant_reward * SLOTS_PER_EPOCH as f64) as u64
}
