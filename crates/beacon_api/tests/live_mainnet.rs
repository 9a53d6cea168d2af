//! Scenario tests against a synced mainnet beacon node with historical
//! states enabled. They are ignored by default; point
//! `STAKESCOPE_TEST_BN_ENDPOINT` at the node and run
//! `cargo test -p stakescope_beacon_api -- --ignored`.

use std::{sync::Arc, time::Duration};

use reqwest::Url;
use stakescope_beacon_api::BeaconApiClient;
use stakescope_consensus::{
    agnostic::AgnosticState,
    duties::EpochDuties,
    epoch_at_slot, first_slot_of_epoch,
    fork::Fork,
    last_slot_of_epoch,
    metrics::StateMetrics,
};

const ENDPOINT_VAR: &str = "STAKESCOPE_TEST_BN_ENDPOINT";

fn test_client() -> BeaconApiClient {
    let endpoint = std::env::var(ENDPOINT_VAR)
        .unwrap_or_else(|_| panic!("{ENDPOINT_VAR} must point at a mainnet beacon node"));
    BeaconApiClient::new(
        Url::parse(&endpoint).expect("invalid beacon node endpoint"),
        Duration::from_secs(90),
    )
    .expect("could not build client")
}

async fn download_state(
    client: &BeaconApiClient,
    epoch: u64,
    prev_duties: Option<&EpochDuties>,
) -> Arc<AgnosticState> {
    let duties = client
        .request_epoch_duties(epoch)
        .await
        .expect("could not download duties");
    let raw = client
        .request_beacon_state(last_slot_of_epoch(epoch))
        .await
        .expect("could not download state");
    let is_phase0 = raw.version == Fork::Phase0;
    let mut state = AgnosticState::from_versioned(raw, duties).expect("could not build state");

    if is_phase0
        && let Some(prev_duties) = prev_duties
    {
        state.process_phase0_attestations(prev_duties);
    }

    let mut blocks = Vec::new();
    for slot in first_slot_of_epoch(epoch)..=last_slot_of_epoch(epoch) {
        let block = client
            .request_beacon_block(slot)
            .await
            .expect("could not download block");
        blocks.push(Arc::new(block));
    }
    state.block_list = blocks;

    Arc::new(state)
}

/// Four consecutive end-of-epoch states so that `current` lands on the epoch
/// of `slot`, matching how the analyzer assembles its window.
async fn build_window(client: &BeaconApiClient, slot: u64) -> StateMetrics {
    let base_epoch = epoch_at_slot(slot) - 2;
    let mut states = Vec::new();
    let mut prev_duties: Option<EpochDuties> = None;
    for epoch in base_epoch..base_epoch + 4 {
        let state = download_state(client, epoch, prev_duties.as_ref()).await;
        prev_duties = Some(state.epoch_structs.clone());
        states.push(state);
    }
    let mut states = states.into_iter();
    StateMetrics::new(
        states.next().unwrap(),
        states.next().unwrap(),
        states.next().unwrap(),
        states.next().unwrap(),
    )
    .expect("window should be consistent")
}

#[tokio::test]
#[ignore = "requires a synced mainnet beacon node"]
async fn test_phase0_epoch_10000() {
    let client = test_client();
    let metrics = build_window(&client, 320_031).await;

    assert_eq!(metrics.current.num_active_vals, 60_849);
    assert_eq!(metrics.current.missing_blocks(), vec![320_011, 320_023]);
}

#[tokio::test]
#[ignore = "requires a synced mainnet beacon node"]
async fn test_altair_epoch_74240() {
    let client = test_client();
    let metrics = build_window(&client, 2_375_711).await;

    assert_eq!(metrics.current.num_active_vals, 250_226);
    assert_eq!(metrics.current.attesting_balance[1], 7_979_389_000_000_000);
    assert_eq!(
        metrics.current.total_active_real_balance,
        8_007_160_000_000_000
    );
    assert_eq!(
        metrics.current.missing_blocks(),
        vec![
            2_375_681, 2_375_682, 2_375_683, 2_375_688, 2_375_692, 2_375_699, 2_375_704
        ]
    );
}

#[tokio::test]
#[ignore = "requires a synced mainnet beacon node"]
async fn test_altair_rewards_epoch_205180() {
    let client = test_client();
    let metrics = build_window(&client, 6_565_791).await;

    let record = metrics.reward_record(1_250).unwrap();
    assert_eq!(record.max_attestation_reward, 12_322);
    assert_eq!(record.base_reward, 14_816);
    assert_eq!(record.max_reward, 12_322);
    assert_eq!(record.reward, 12_322);
    assert!(!record.in_sync_committee);
    assert_eq!(record.max_sync_committee_reward, 0);
    assert!(!record.missing_source && !record.missing_target && !record.missing_head);
    assert_eq!(record.validator_balance, 36_586_892_613);
    let att_slot = record.attestation_slot.unwrap();
    assert_eq!(epoch_at_slot(att_slot), metrics.current.epoch);

    let sync_member = metrics.reward_record(325_479).unwrap();
    assert_eq!(sync_member.max_attestation_reward, 12_322);
    assert!(sync_member.in_sync_committee);
    assert_eq!(sync_member.max_sync_committee_reward, 505_560);
    assert_eq!(sync_member.max_reward, 517_882);
    assert_eq!(sync_member.validator_balance, 32_078_071_168);
}

#[tokio::test]
#[ignore = "requires a synced mainnet beacon node"]
async fn test_altair_negative_rewards_epoch_205182() {
    let client = test_client();
    let metrics = build_window(&client, 6_565_855).await;

    let record = metrics.reward_record(9_097).unwrap();
    assert_eq!(record.reward, -9_260);
    assert!(record.missing_source && record.missing_target && record.missing_head);
    assert!(!record.in_sync_committee);
    assert_eq!(record.max_sync_committee_reward, 0);
    assert_eq!(record.validator_balance, 36_855_786_132);
}

#[tokio::test]
#[ignore = "requires a synced mainnet beacon node"]
async fn test_capella_block_6564725() {
    let client = test_client();

    let block = client.request_beacon_block(6_564_725).await.unwrap();
    assert!(block.proposed);
    assert_eq!(block.proposer_index, 646_459);
    assert_eq!(block.graffiti_string(), "Stakewise_aonif");
    assert_eq!(block.attestations.len(), 65);
    assert_eq!(
        format!("{}", block.execution_payload.block_hash),
        "0xdbdb4d20266578de916de5b052f500c9d92633b7d9017e9193e4b4f90c086c89"
    );
    assert_eq!(
        format!("{}", block.execution_payload.fee_recipient).to_lowercase(),
        "0x6b333b20fbae3c5c0969dd02176e30802e2fbbdb"
    );
    assert_eq!(block.execution_payload.gas_used, 22_774_075);
    assert_eq!(block.execution_payload.transactions.len(), 222);
    assert_eq!(block.execution_payload.withdrawals.len(), 16);

    let missed = client.request_beacon_block(6_564_753).await.unwrap();
    assert!(!missed.proposed);
    assert_eq!(missed.proposer_index, 565_236);
    assert_eq!(missed.execution_payload.block_number, 0);
    assert!(missed.execution_payload.transactions.is_empty());
}
