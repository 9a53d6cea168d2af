use alloy_primitives::B256;
use serde::Deserialize;
use stakescope_consensus::block::{KzgCommitment, KzgProof};

/// `{ "data": T }` wrapper most beacon endpoints respond with; extra
/// metadata fields (`execution_optimistic`, `finalized`, …) are ignored.
#[derive(Debug, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// `{ "version": "...", "data": T }` wrapper used by fork-versioned
/// endpoints (blocks, debug states).
#[derive(Debug, Deserialize)]
pub struct VersionedDataResponse<T> {
    pub version: String,
    pub data: T,
}

/// Duty endpoints add the dependent root the duties were computed against.
#[derive(Debug, Deserialize)]
pub struct DutiesResponse<T> {
    pub dependent_root: B256,
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct RootResponse {
    pub root: B256,
}

#[derive(Debug, Deserialize)]
pub struct BlockHeaderData {
    pub root: B256,
    pub header: SignedHeaderData,
}

#[derive(Debug, Deserialize)]
pub struct SignedHeaderData {
    pub message: HeaderData,
}

#[derive(Debug, Deserialize)]
pub struct HeaderData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
}

/// Blob sidecar as served by `/eth/v1/beacon/blob_sidecars/{slot}`; the blob
/// body itself is never read, only the commitment is matched to a
/// transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobSidecarData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,
    pub kzg_commitment: KzgCommitment,
    pub kzg_proof: KzgProof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_response_shape() {
        let json = serde_json::json!({
            "execution_optimistic": false,
            "finalized": false,
            "data": {
                "root": "0x1111111111111111111111111111111111111111111111111111111111111111",
                "canonical": true,
                "header": {
                    "message": {
                        "slot": "6564725",
                        "proposer_index": "646459",
                        "parent_root": "0x2222222222222222222222222222222222222222222222222222222222222222",
                        "state_root": "0x3333333333333333333333333333333333333333333333333333333333333333",
                        "body_root": "0x4444444444444444444444444444444444444444444444444444444444444444"
                    },
                    "signature": "0x00"
                }
            }
        });
        let parsed: DataResponse<BlockHeaderData> = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.data.header.message.slot, 6_564_725);
    }

    #[test]
    fn test_blob_sidecar_shape() {
        let json = serde_json::json!({
            "index": "2",
            "blob": "0xdead",
            "kzg_commitment": format!("0x{}", "11".repeat(48)),
            "kzg_proof": format!("0x{}", "22".repeat(48)),
        });
        let parsed: BlobSidecarData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.index, 2);
    }
}
