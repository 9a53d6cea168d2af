use std::sync::Arc;

use alloy_primitives::B256;
use thiserror::Error;

use crate::{
    block::AgnosticBlock,
    constants::{
        NUM_FLAG_INDICES, SLOTS_PER_HISTORICAL_ROOT, TIMELY_HEAD_FLAG_INDEX,
        TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX,
    },
    duties::EpochDuties,
    epoch_at_slot, first_slot_of_epoch,
    fork::Fork,
    state::{PendingAttestation, SyncCommittee, VersionedBeaconState},
    validator::{Validator, ValidatorStatus},
};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("validator index {index} was not activated at slot {slot}")]
    UnknownValidator { index: u64, slot: u64 },
    #[error("state at slot {0} carries no validator list")]
    EmptyValidatorSet(u64),
}

/// Normalized beacon state shared by every fork. Populated by the
/// fork-dispatching constructor; all analysis downstream branches only on
/// `version` where reward formulas differ.
#[derive(Debug, Clone, Default)]
pub struct AgnosticState {
    pub version: Fork,
    pub slot: u64,
    pub epoch: u64,
    pub balances: Vec<u64>,
    pub validators: Vec<Validator>,
    /// Sum of effective balances of validators active at this epoch.
    pub total_active_balance: u64,
    /// Sum of actual balances of validators active at this epoch.
    pub total_active_real_balance: u64,
    /// Attesting effective balance per participation flag.
    pub attesting_balance: [u64; NUM_FLAG_INDICES],
    /// Per flag, which validators voted it timely in the previous epoch.
    pub correct_flags: [Vec<bool>; NUM_FLAG_INDICES],
    /// Which validators attested at all in the previous epoch.
    pub attesting_vals: Vec<bool>,
    /// Phase0 only: raw pending attestations for the previous epoch.
    pub prev_attestations: Vec<PendingAttestation>,
    pub num_attesting_vals: u64,
    pub num_active_vals: u64,
    pub epoch_structs: EpochDuties,
    pub block_roots: Vec<B256>,
    pub sync_committee: SyncCommittee,
    /// Blocks belonging to this state's epoch, missed slots included.
    pub block_list: Vec<Arc<AgnosticBlock>>,
}

impl AgnosticState {
    /// Fork-dispatching constructor: normalizes the raw typed state and runs
    /// participation processing for forks that carry flag bytes. Phase0
    /// participation is aggregated later from the pending attestations, once
    /// the previous epoch's committees are known.
    pub fn from_versioned(
        state: VersionedBeaconState,
        duties: EpochDuties,
    ) -> Result<Self, StateError> {
        let raw = state.data;
        if raw.validators.is_empty() {
            return Err(StateError::EmptyValidatorSet(raw.slot));
        }

        let mut agnostic = AgnosticState {
            version: state.version,
            slot: raw.slot,
            epoch: epoch_at_slot(raw.slot),
            balances: raw.balances,
            validators: raw.validators,
            prev_attestations: raw.previous_epoch_attestations,
            block_roots: raw.block_roots,
            sync_committee: raw.current_sync_committee.unwrap_or_default(),
            epoch_structs: duties,
            ..Default::default()
        };
        agnostic.setup();

        if state.version.has_participation_flags() {
            agnostic.process_participation(&raw.previous_epoch_participation);
        }

        Ok(agnostic)
    }

    /// Allocate the per-flag arrays and compute the active-balance totals,
    /// refreshing `num_active_vals` along the way.
    fn setup(&mut self) {
        let validator_count = self.validators.len();
        self.correct_flags = std::array::from_fn(|_| vec![false; validator_count]);
        self.attesting_vals = vec![false; validator_count];

        self.num_active_vals = 0;
        self.total_active_balance = 0;
        self.total_active_real_balance = 0;
        for (index, validator) in self.validators.iter().enumerate() {
            if validator.is_active(self.epoch) {
                self.num_active_vals += 1;
                self.total_active_balance += validator.effective_balance;
                self.total_active_real_balance +=
                    self.balances.get(index).copied().unwrap_or_default();
            }
        }
    }

    /// Altair and later: fold the previous-epoch participation flag bytes
    /// into per-flag bitmaps and attesting balances.
    fn process_participation(&mut self, participation: &[u64]) {
        let validator_count = self.validators.len();
        for flag in 0..NUM_FLAG_INDICES {
            let flag_bit = 1 << flag;
            for (index, byte) in participation.iter().take(validator_count).enumerate() {
                if byte & flag_bit != flag_bit {
                    continue;
                }
                self.correct_flags[flag][index] = true;
                self.attesting_balance[flag] += self.validators[index].effective_balance;
                if !self.attesting_vals[index] {
                    self.num_attesting_vals += 1;
                }
                self.attesting_vals[index] = true;
            }
        }
    }

    /// Phase0: aggregate the pending attestations into the same per-flag
    /// shape. The source vote is implied by inclusion; target and head are
    /// checked against the block-roots ring. Committees come from the
    /// previous epoch's duties, which is where the attestations were due.
    pub fn process_phase0_attestations(&mut self, prev_duties: &EpochDuties) {
        if self.epoch == 0 {
            return;
        }
        let target_root = self.block_root_at_slot(first_slot_of_epoch(self.epoch - 1));
        let attestations = std::mem::take(&mut self.prev_attestations);

        for attestation in &attestations {
            let Some(committee) =
                prev_duties.committee(attestation.data.slot, attestation.data.index)
            else {
                continue;
            };
            let head_root = self.block_root_at_slot(attestation.data.slot);

            for (position, &validator_index) in committee.validators.iter().enumerate() {
                if !bitlist_bit(&attestation.aggregation_bits, position) {
                    continue;
                }
                let index = validator_index as usize;
                if index >= self.validators.len() {
                    continue;
                }
                self.set_flag(TIMELY_SOURCE_FLAG_INDEX, index);
                if Some(attestation.data.target.root) == target_root {
                    self.set_flag(TIMELY_TARGET_FLAG_INDEX, index);
                }
                if Some(attestation.data.beacon_block_root) == head_root {
                    self.set_flag(TIMELY_HEAD_FLAG_INDEX, index);
                }
            }
        }

        self.prev_attestations = attestations;
    }

    fn set_flag(&mut self, flag: usize, index: usize) {
        if self.correct_flags[flag][index] {
            return;
        }
        self.correct_flags[flag][index] = true;
        self.attesting_balance[flag] += self.validators[index].effective_balance;
        if !self.attesting_vals[index] {
            self.num_attesting_vals += 1;
        }
        self.attesting_vals[index] = true;
    }

    pub fn balance(&self, validator_index: u64) -> Result<u64, StateError> {
        self.balances
            .get(validator_index as usize)
            .copied()
            .ok_or(StateError::UnknownValidator {
                index: validator_index,
                slot: self.slot,
            })
    }

    /// Root of the last block at or before `slot`, read from the ring buffer.
    pub fn block_root_at_slot(&self, slot: u64) -> Option<B256> {
        if slot >= self.slot || self.slot > slot + SLOTS_PER_HISTORICAL_ROOT {
            return None;
        }
        self.block_roots
            .get((slot % SLOTS_PER_HISTORICAL_ROOT) as usize)
            .copied()
    }

    /// Slots of this state's epoch whose proposer did not get a block in.
    pub fn missing_blocks(&self) -> Vec<u64> {
        self.block_list
            .iter()
            .filter(|block| !block.proposed)
            .map(|block| block.slot)
            .collect()
    }

    /// The three flags validator `index` missed in the previous epoch;
    /// validators that were not active then miss nothing.
    pub fn missing_flags(&self, validator_index: u64) -> [bool; NUM_FLAG_INDICES] {
        let index = validator_index as usize;
        let mut result = [false; NUM_FLAG_INDICES];
        if index >= self.attesting_vals.len() {
            return result;
        }
        let was_active = self.validators[index].is_active(self.epoch.saturating_sub(1));
        for (flag, flags) in self.correct_flags.iter().enumerate() {
            result[flag] = was_active && !flags[index];
        }
        result
    }

    /// Count of active validators that missed `flag` in the previous epoch.
    pub fn missing_flag_count(&self, flag: usize) -> u64 {
        self.correct_flags[flag]
            .iter()
            .enumerate()
            .filter(|&(index, correct)| {
                !correct && self.validators[index].is_active(self.epoch.saturating_sub(1))
            })
            .count() as u64
    }

    pub fn validator_status(&self, validator_index: u64) -> ValidatorStatus {
        self.validators[validator_index as usize].status(self.epoch)
    }

    pub fn active_validator_indices(&self) -> Vec<u64> {
        self.validators
            .iter()
            .enumerate()
            .filter(|(_, validator)| validator.is_active(self.epoch))
            .map(|(index, _)| index as u64)
            .collect()
    }

    pub fn all_validator_indices(&self) -> Vec<u64> {
        (0..self.validators.len() as u64).collect()
    }
}

/// Read bit `position` of an SSZ bitlist. The length marker sits one past the
/// committee size, so callers index strictly below it.
fn bitlist_bit(bits: &[u8], position: usize) -> bool {
    bits.get(position / 8)
        .map(|byte| byte >> (position % 8) & 1 == 1)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, Bytes};

    use super::*;
    use crate::{
        block::{AttestationData, Checkpoint},
        constants::{
            TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX,
        },
        duties::BeaconCommittee,
        state::BeaconStateData,
        validator::BlsPubKey,
    };

    fn test_validator(effective_balance: u64, activation_epoch: u64) -> Validator {
        Validator {
            pubkey: BlsPubKey::ZERO,
            withdrawal_credentials: B256::ZERO,
            effective_balance,
            slashed: false,
            activation_eligibility_epoch: 0,
            activation_epoch,
            exit_epoch: u64::MAX,
            withdrawable_epoch: u64::MAX,
        }
    }

    fn altair_state(participation: Vec<u64>) -> AgnosticState {
        let validators = participation
            .iter()
            .map(|_| test_validator(32_000_000_000, 0))
            .collect::<Vec<_>>();
        let balances = validators.iter().map(|_| 32_100_000_000).collect();
        AgnosticState::from_versioned(
            VersionedBeaconState {
                version: Fork::Altair,
                data: BeaconStateData {
                    slot: 320_031,
                    balances,
                    validators,
                    block_roots: vec![],
                    previous_epoch_attestations: vec![],
                    previous_epoch_participation: participation,
                    current_sync_committee: None,
                },
            },
            EpochDuties::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_setup_totals() {
        let mut validators = vec![test_validator(32_000_000_000, 0); 3];
        validators.push(test_validator(32_000_000_000, 99_999));
        let state = AgnosticState::from_versioned(
            VersionedBeaconState {
                version: Fork::Altair,
                data: BeaconStateData {
                    slot: 320_031,
                    balances: vec![32_100_000_000; 4],
                    validators,
                    block_roots: vec![],
                    previous_epoch_attestations: vec![],
                    previous_epoch_participation: vec![0; 4],
                    current_sync_committee: None,
                },
            },
            EpochDuties::default(),
        )
        .unwrap();

        assert_eq!(state.epoch, 10_000);
        assert_eq!(state.num_active_vals, 3);
        assert_eq!(state.total_active_balance, 96_000_000_000);
        assert_eq!(state.total_active_real_balance, 96_300_000_000);
    }

    #[test]
    fn test_participation_flags() {
        // 0b111 all flags, 0b011 source+target, 0b000 none
        let state = altair_state(vec![0b111, 0b011, 0b000]);

        assert_eq!(state.num_attesting_vals, 2);
        assert_eq!(
            state.attesting_balance[TIMELY_SOURCE_FLAG_INDEX],
            64_000_000_000
        );
        assert_eq!(
            state.attesting_balance[TIMELY_TARGET_FLAG_INDEX],
            64_000_000_000
        );
        assert_eq!(
            state.attesting_balance[TIMELY_HEAD_FLAG_INDEX],
            32_000_000_000
        );
        assert_eq!(state.missing_flags(0), [false, false, false]);
        assert_eq!(state.missing_flags(1), [false, false, true]);
        assert_eq!(state.missing_flags(2), [true, true, true]);
        assert_eq!(state.missing_flag_count(TIMELY_HEAD_FLAG_INDEX), 2);
    }

    #[test]
    fn test_missing_blocks() {
        let mut state = altair_state(vec![0b111]);
        state.block_list = vec![
            Arc::new(AgnosticBlock {
                slot: 320_000,
                proposed: true,
                ..Default::default()
            }),
            Arc::new(AgnosticBlock::missed(320_011, 7)),
            Arc::new(AgnosticBlock::missed(320_023, 9)),
        ];
        assert_eq!(state.missing_blocks(), vec![320_011, 320_023]);
    }

    #[test]
    fn test_phase0_pending_attestations() {
        let validators = (0..4)
            .map(|_| test_validator(32_000_000_000, 0))
            .collect::<Vec<_>>();
        let mut block_roots = vec![B256::ZERO; 8192];
        let target_root = B256::repeat_byte(0xaa);
        let head_root = B256::repeat_byte(0xbb);
        block_roots[(first_slot_of_epoch(9_999) % 8192) as usize] = target_root;
        block_roots[((first_slot_of_epoch(9_999) + 3) % 8192) as usize] = head_root;

        let mut state = AgnosticState::from_versioned(
            VersionedBeaconState {
                version: Fork::Phase0,
                data: BeaconStateData {
                    slot: 320_031,
                    balances: vec![32_000_000_000; 4],
                    validators,
                    block_roots,
                    previous_epoch_attestations: vec![PendingAttestation {
                        // bits for committee positions 0 and 2, length marker at 3
                        aggregation_bits: Bytes::from(vec![0b1101u8]),
                        data: AttestationData {
                            slot: first_slot_of_epoch(9_999) + 3,
                            index: 0,
                            beacon_block_root: head_root,
                            source: Checkpoint {
                                epoch: 9_998,
                                root: B256::ZERO,
                            },
                            target: Checkpoint {
                                epoch: 9_999,
                                root: target_root,
                            },
                        },
                        inclusion_delay: 1,
                        proposer_index: 0,
                    }],
                    previous_epoch_participation: vec![],
                    current_sync_committee: None,
                },
            },
            EpochDuties::default(),
        )
        .unwrap();

        let prev_duties = EpochDuties::new(
            9_999,
            vec![],
            vec![BeaconCommittee {
                index: 0,
                slot: first_slot_of_epoch(9_999) + 3,
                validators: vec![0, 1, 2],
            }],
        );
        state.process_phase0_attestations(&prev_duties);

        assert_eq!(state.num_attesting_vals, 2);
        assert!(state.correct_flags[TIMELY_SOURCE_FLAG_INDEX][0]);
        assert!(state.correct_flags[TIMELY_TARGET_FLAG_INDEX][0]);
        assert!(state.correct_flags[TIMELY_HEAD_FLAG_INDEX][2]);
        assert!(!state.attesting_vals[1]);
        assert!(!state.attesting_vals[3]);
    }
}
