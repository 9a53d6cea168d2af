use std::collections::HashMap;

use serde::Deserialize;

use crate::validator::BlsPubKey;

#[derive(Debug, Clone, Deserialize)]
pub struct ProposerDuty {
    pub pubkey: BlsPubKey,
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeaconCommittee {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(with = "serde_utils::quoted_u64_vec")]
    pub validators: Vec<u64>,
}

/// Duties settled for one epoch: who proposes each slot and which committee
/// every validator attests with.
#[derive(Debug, Clone, Default)]
pub struct EpochDuties {
    pub epoch: u64,
    pub proposer_duties: Vec<ProposerDuty>,
    pub beacon_committees: Vec<BeaconCommittee>,
    /// For each validator, the slot it had to attest at.
    pub validator_att_slot: HashMap<u64, u64>,
    /// For each slot of the epoch, the validators assigned to attest there.
    pub attesting_vals_per_slot: HashMap<u64, Vec<u64>>,
}

impl EpochDuties {
    pub fn new(
        epoch: u64,
        proposer_duties: Vec<ProposerDuty>,
        beacon_committees: Vec<BeaconCommittee>,
    ) -> Self {
        let mut validator_att_slot = HashMap::new();
        let mut attesting_vals_per_slot: HashMap<u64, Vec<u64>> = HashMap::new();

        for committee in &beacon_committees {
            for &validator_index in &committee.validators {
                validator_att_slot.insert(validator_index, committee.slot);
                attesting_vals_per_slot
                    .entry(committee.slot)
                    .or_default()
                    .push(validator_index);
            }
        }

        EpochDuties {
            epoch,
            proposer_duties,
            beacon_committees,
            validator_att_slot,
            attesting_vals_per_slot,
        }
    }

    pub fn proposer_for_slot(&self, slot: u64) -> Option<u64> {
        self.proposer_duties
            .iter()
            .find(|duty| duty.slot == slot)
            .map(|duty| duty.validator_index)
    }

    pub fn committee(&self, slot: u64, index: u64) -> Option<&BeaconCommittee> {
        self.beacon_committees
            .iter()
            .find(|committee| committee.slot == slot && committee.index == index)
    }
}
