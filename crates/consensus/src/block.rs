use alloy_primitives::{Address, B256, Bytes, FixedBytes};
use serde::Deserialize;

use crate::{epoch_at_slot, fork::Fork, validator::BlsPubKey};

pub type KzgCommitment = FixedBytes<48>;
pub type KzgProof = FixedBytes<48>;

/// Signed beacon block as served by `/eth/v2/beacon/blocks/{slot}`. Only the
/// fields the engine derives facts from are kept; the signature is dropped at
/// the door since nothing is re-verified.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignedBeaconBlockData {
    pub message: BeaconBlockData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeaconBlockData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: B256,
    pub state_root: B256,
    pub body: BeaconBlockBodyData,
}

/// One body shape covers Phase0 through Deneb: fields introduced by later
/// forks default to empty when absent from the JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeaconBlockBodyData {
    pub graffiti: B256,
    #[serde(default)]
    pub attestations: Vec<Attestation>,
    #[serde(default)]
    pub deposits: Vec<Deposit>,
    #[serde(default)]
    pub bls_to_execution_changes: Vec<SignedBlsToExecutionChange>,
    #[serde(default)]
    pub execution_payload: Option<ExecutionPayloadData>,
    #[serde(default)]
    pub blob_kzg_commitments: Vec<KzgCommitment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attestation {
    /// SSZ bitlist, hex encoded; the highest set bit is the length marker.
    pub aggregation_bits: Bytes,
    pub data: AttestationData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttestationData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    pub beacon_block_root: B256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Checkpoint {
    #[serde(with = "serde_utils::quoted_u64")]
    pub epoch: u64,
    pub root: B256,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deposit {
    pub data: DepositData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositData {
    pub pubkey: BlsPubKey,
    pub withdrawal_credentials: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedBlsToExecutionChange {
    pub message: BlsToExecutionChange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlsToExecutionChange {
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    pub from_bls_pubkey: BlsPubKey,
    pub to_execution_address: Address,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionPayloadData {
    pub block_hash: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    pub fee_recipient: Address,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_limit: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub gas_used: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<Bytes>,
    #[serde(default)]
    pub withdrawals: Vec<Withdrawal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Withdrawal {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub validator_index: u64,
    pub address: Address,
    #[serde(with = "serde_utils::quoted_u64")]
    pub amount: u64,
}

/// Normalized block record shared by every fork. A missed slot is represented
/// by a zero-valued block with `proposed = false` and the proposer index
/// resolved from proposer duties.
#[derive(Debug, Clone, Default)]
pub struct AgnosticBlock {
    pub slot: u64,
    pub proposer_index: u64,
    pub graffiti: B256,
    pub proposed: bool,
    pub state_root: B256,
    pub parent_root: B256,
    pub attestations: Vec<Attestation>,
    pub deposits: Vec<Deposit>,
    pub bls_to_execution_changes: Vec<BlsToExecutionChange>,
    pub execution_payload: ExecutionPayload,
    pub blob_kzg_commitments: Vec<KzgCommitment>,
}

/// Execution payload summary. Missed blocks and pre-Bellatrix slots keep the
/// zero sentinel (zero block hash, zero numbers).
#[derive(Debug, Clone, Default)]
pub struct ExecutionPayload {
    pub block_hash: B256,
    pub block_number: u64,
    pub fee_recipient: Address,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub transactions: Vec<Bytes>,
    pub withdrawals: Vec<Withdrawal>,
}

impl AgnosticBlock {
    pub fn from_signed(_fork: Fork, signed: SignedBeaconBlockData) -> Self {
        let message = signed.message;
        let body = message.body;
        let execution_payload = body
            .execution_payload
            .map(|payload| ExecutionPayload {
                block_hash: payload.block_hash,
                block_number: payload.block_number,
                fee_recipient: payload.fee_recipient,
                gas_limit: payload.gas_limit,
                gas_used: payload.gas_used,
                timestamp: payload.timestamp,
                transactions: payload.transactions,
                withdrawals: payload.withdrawals,
            })
            .unwrap_or_default();

        AgnosticBlock {
            slot: message.slot,
            proposer_index: message.proposer_index,
            graffiti: body.graffiti,
            proposed: true,
            state_root: message.state_root,
            parent_root: message.parent_root,
            attestations: body.attestations,
            deposits: body.deposits,
            bls_to_execution_changes: body
                .bls_to_execution_changes
                .into_iter()
                .map(|signed_change| signed_change.message)
                .collect(),
            execution_payload,
            blob_kzg_commitments: body.blob_kzg_commitments,
        }
    }

    pub fn missed(slot: u64, proposer_index: u64) -> Self {
        AgnosticBlock {
            slot,
            proposer_index,
            proposed: false,
            ..Default::default()
        }
    }

    pub fn epoch(&self) -> u64 {
        epoch_at_slot(self.slot)
    }

    /// Graffiti rendered as text with trailing NUL padding stripped.
    pub fn graffiti_string(&self) -> String {
        String::from_utf8_lossy(self.graffiti.as_slice())
            .trim_end_matches('\0')
            .replace('\0', "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missed_block_is_zero_sentinel() {
        let block = AgnosticBlock::missed(6_564_753, 565_236);
        assert_eq!(block.slot, 6_564_753);
        assert_eq!(block.proposer_index, 565_236);
        assert!(!block.proposed);
        assert_eq!(block.execution_payload.block_hash, B256::ZERO);
        assert_eq!(block.execution_payload.block_number, 0);
        assert_eq!(block.execution_payload.fee_recipient, Address::ZERO);
        assert!(block.execution_payload.transactions.is_empty());
        assert!(block.attestations.is_empty());
    }

    #[test]
    fn test_from_signed_capella_body() {
        let json = serde_json::json!({
            "message": {
                "slot": "6564725",
                "proposer_index": "646459",
                "parent_root": "0x2222222222222222222222222222222222222222222222222222222222222222",
                "state_root": "0x3333333333333333333333333333333333333333333333333333333333333333",
                "body": {
                    "graffiti": "0x5374616b65776973655f616f6e69660000000000000000000000000000000000",
                    "attestations": [],
                    "deposits": [],
                    "bls_to_execution_changes": [],
                    "execution_payload": {
                        "block_hash": "0xdbdb4d20266578de916de5b052f500c9d92633b7d9017e9193e4b4f90c086c89",
                        "block_number": "17384171",
                        "fee_recipient": "0x6b333b20fbae3c5c0969dd02176e30802e2fbbdb",
                        "gas_limit": "30000000",
                        "gas_used": "22774075",
                        "timestamp": "1685600723",
                        "transactions": ["0x02f870"],
                        "withdrawals": [{
                            "index": "7",
                            "validator_index": "1234",
                            "address": "0x6b333b20fbae3c5c0969dd02176e30802e2fbbdb",
                            "amount": "12345"
                        }]
                    }
                }
            }
        });
        let signed: SignedBeaconBlockData = serde_json::from_value(json).unwrap();
        let block = AgnosticBlock::from_signed(Fork::Capella, signed);

        assert!(block.proposed);
        assert_eq!(block.slot, 6_564_725);
        assert_eq!(block.epoch(), 205_147);
        assert_eq!(block.graffiti_string(), "Stakewise_aonif");
        assert_eq!(block.execution_payload.block_number, 17_384_171);
        assert_eq!(block.execution_payload.gas_used, 22_774_075);
        assert_eq!(block.execution_payload.withdrawals.len(), 1);
        assert_eq!(block.execution_payload.withdrawals[0].amount, 12_345);
    }

    #[test]
    fn test_from_signed_phase0_body_defaults() {
        let json = serde_json::json!({
            "message": {
                "slot": "320031",
                "proposer_index": "100",
                "parent_root": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "state_root": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "body": {
                    "graffiti": "0x0000000000000000000000000000000000000000000000000000000000000000"
                }
            }
        });
        let signed: SignedBeaconBlockData = serde_json::from_value(json).unwrap();
        let block = AgnosticBlock::from_signed(Fork::Phase0, signed);

        assert!(block.proposed);
        assert_eq!(block.execution_payload.block_hash, B256::ZERO);
        assert!(block.blob_kzg_commitments.is_empty());
        assert_eq!(block.graffiti_string(), "");
    }
}
