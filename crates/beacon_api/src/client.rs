use std::{str::FromStr, time::Duration};

use alloy_primitives::B256;
use reqwest::Url;
use serde::de::DeserializeOwned;
use stakescope_consensus::{
    block::{AgnosticBlock, SignedBeaconBlockData},
    duties::{BeaconCommittee, EpochDuties, ProposerDuty},
    epoch_at_slot,
    fork::Fork,
    last_slot_of_epoch,
    state::{BeaconStateData, VersionedBeaconState},
};
use tokio::time::sleep;
use tracing::warn;

use crate::{
    error::ClientError,
    gate::RequestGate,
    http_client::ClientWithBaseUrl,
    types::{
        BlobSidecarData, BlockHeaderData, DataResponse, DutiesResponse, RootResponse,
        VersionedDataResponse,
    },
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Typed accessors over the beacon-node REST API. Every request passes the
/// minimum-interval gate and transient failures are retried with backoff;
/// what comes back is already normalized into the fork-agnostic model.
pub struct BeaconApiClient {
    http: ClientWithBaseUrl,
    gate: RequestGate,
}

impl BeaconApiClient {
    pub fn new(endpoint: Url, request_timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: ClientWithBaseUrl::new(endpoint, request_timeout)?,
            gate: RequestGate::new(MIN_REQUEST_INTERVAL),
        })
    }

    pub(crate) fn base_url(&self) -> &Url {
        self.http.base_url()
    }

    /// GET a JSON endpoint. `Ok(None)` is a 404; transient transport errors
    /// and 5xx responses are retried before escalating.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ClientError> {
        let mut attempt = 1;
        loop {
            self.gate.tick().await;
            match self.try_get(path).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    warn!("request to {path} failed (attempt {attempt}): {err}");
                    sleep(RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ClientError> {
        let request = self.http.get(path)?.build()?;
        let response = self.http.execute(request).await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClientError::RequestFailed {
                endpoint: path.to_string(),
                status,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| ClientError::Decode {
                endpoint: path.to_string(),
                source,
            })
    }

    async fn get_json_required<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.get_json(path)
            .await?
            .ok_or_else(|| ClientError::UnexpectedNotFound {
                endpoint: path.to_string(),
            })
    }

    /// Block at `slot`. A 404 means the proposer missed: the result is the
    /// zero sentinel with the proposer index resolved from duties.
    pub async fn request_beacon_block(&self, slot: u64) -> Result<AgnosticBlock, ClientError> {
        let path = format!("eth/v2/beacon/blocks/{slot}");
        match self
            .get_json::<VersionedDataResponse<SignedBeaconBlockData>>(&path)
            .await?
        {
            Some(response) => {
                let fork = Fork::from_str(&response.version)?;
                Ok(AgnosticBlock::from_signed(fork, response.data))
            }
            None => {
                let proposer_index = self.proposer_for_slot(slot).await.unwrap_or_else(|err| {
                    warn!("could not resolve proposer duty for missed slot {slot}: {err}");
                    0
                });
                Ok(AgnosticBlock::missed(slot, proposer_index))
            }
        }
    }

    async fn proposer_for_slot(&self, slot: u64) -> Result<u64, ClientError> {
        let duties = self.request_proposer_duties(epoch_at_slot(slot)).await?;
        Ok(duties
            .iter()
            .find(|duty| duty.slot == slot)
            .map(|duty| duty.validator_index)
            .unwrap_or_default())
    }

    /// Latest finalized block on the chain the node follows.
    pub async fn request_finalized_block(&self) -> Result<AgnosticBlock, ClientError> {
        let response = self
            .get_json_required::<VersionedDataResponse<SignedBeaconBlockData>>(
                "eth/v2/beacon/blocks/finalized",
            )
            .await?;
        let fork = Fork::from_str(&response.version)?;
        Ok(AgnosticBlock::from_signed(fork, response.data))
    }

    pub async fn request_current_head_slot(&self) -> Result<u64, ClientError> {
        let response = self
            .get_json_required::<DataResponse<BlockHeaderData>>("eth/v1/beacon/headers/head")
            .await?;
        Ok(response.data.header.message.slot)
    }

    /// Canonical state root at `slot`.
    pub async fn request_state_root(&self, slot: u64) -> Result<B256, ClientError> {
        let response = self
            .get_json_required::<DataResponse<RootResponse>>(&format!(
                "eth/v1/beacon/states/{slot}/root"
            ))
            .await?;
        Ok(response.data.root)
    }

    /// Raw beacon state at `slot`, tagged with the fork it was served under.
    pub async fn request_beacon_state(
        &self,
        slot: u64,
    ) -> Result<VersionedBeaconState, ClientError> {
        let response = self
            .get_json_required::<VersionedDataResponse<BeaconStateData>>(&format!(
                "eth/v2/debug/beacon/states/{slot}"
            ))
            .await?;
        Ok(VersionedBeaconState {
            version: Fork::from_str(&response.version)?,
            data: response.data,
        })
    }

    pub async fn request_proposer_duties(
        &self,
        epoch: u64,
    ) -> Result<Vec<ProposerDuty>, ClientError> {
        let response = self
            .get_json_required::<DutiesResponse<ProposerDuty>>(&format!(
                "eth/v1/validator/duties/proposer/{epoch}"
            ))
            .await?;
        Ok(response.data)
    }

    pub async fn request_beacon_committees(
        &self,
        epoch: u64,
    ) -> Result<Vec<BeaconCommittee>, ClientError> {
        let slot = last_slot_of_epoch(epoch);
        let response = self
            .get_json_required::<DataResponse<Vec<BeaconCommittee>>>(&format!(
                "eth/v1/beacon/states/{slot}/committees?epoch={epoch}"
            ))
            .await?;
        Ok(response.data)
    }

    /// Proposer duties and committees for `epoch`, folded into the
    /// per-validator attestation-slot maps.
    pub async fn request_epoch_duties(&self, epoch: u64) -> Result<EpochDuties, ClientError> {
        let proposer_duties = self.request_proposer_duties(epoch).await?;
        let beacon_committees = self.request_beacon_committees(epoch).await?;
        Ok(EpochDuties::new(epoch, proposer_duties, beacon_committees))
    }

    /// Blob sidecars at `slot`; slots before Deneb and missed slots yield an
    /// empty list.
    pub async fn request_blob_sidecars(
        &self,
        slot: u64,
    ) -> Result<Vec<BlobSidecarData>, ClientError> {
        let response = self
            .get_json::<DataResponse<Vec<BlobSidecarData>>>(&format!(
                "eth/v1/beacon/blob_sidecars/{slot}"
            ))
            .await?;
        Ok(response.map(|response| response.data).unwrap_or_default())
    }
}
