use alloy_primitives::{B256, Bytes};
use serde::Deserialize;

use crate::{block::AttestationData, fork::Fork, validator::{BlsPubKey, Validator}};

/// Beacon state as served by `/eth/v2/debug/beacon/states/{slot}`, reduced to
/// the fields the per-epoch analysis reads. Later-fork fields default to
/// empty so one shape parses every fork; the `version` tag on the response
/// decides which constructor interprets it.
#[derive(Debug, Clone, Deserialize)]
pub struct BeaconStateData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(with = "serde_utils::quoted_u64_vec")]
    pub balances: Vec<u64>,
    pub validators: Vec<Validator>,
    #[serde(default)]
    pub block_roots: Vec<B256>,
    /// Phase0 only.
    #[serde(default)]
    pub previous_epoch_attestations: Vec<PendingAttestation>,
    /// Altair and later: one flag byte per validator.
    #[serde(default, with = "serde_utils::quoted_u64_vec")]
    pub previous_epoch_participation: Vec<u64>,
    /// Altair and later.
    #[serde(default)]
    pub current_sync_committee: Option<SyncCommittee>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PendingAttestation {
    /// SSZ bitlist over the committee, hex encoded.
    pub aggregation_bits: Bytes,
    pub data: AttestationData,
    #[serde(with = "serde_utils::quoted_u64")]
    pub inclusion_delay: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncCommittee {
    pub pubkeys: Vec<BlsPubKey>,
    pub aggregate_pubkey: BlsPubKey,
}

impl SyncCommittee {
    pub fn contains(&self, pubkey: &BlsPubKey) -> bool {
        self.pubkeys.iter().any(|member| member == pubkey)
    }
}

/// A raw state tagged with the fork it was served under.
#[derive(Debug, Clone)]
pub struct VersionedBeaconState {
    pub version: Fork,
    pub data: BeaconStateData,
}
