use std::{fmt::Display, pin::Pin, str::FromStr};

use alloy_rpc_types_beacon::events::{ChainReorgEvent, FinalizedCheckpointEvent, HeadEvent};
use anyhow::anyhow;
use eventsource_client::{Client, ClientBuilder, Event, SSE};
use futures::{Stream, StreamExt};
use serde::de::{DeserializeOwned, Error};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::{BeaconApiClient, error::ClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTopic {
    Head,
    FinalizedCheckpoint,
    ChainReorg,
}

impl FromStr for EventTopic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "head" => EventTopic::Head,
            "finalized_checkpoint" => EventTopic::FinalizedCheckpoint,
            "chain_reorg" => EventTopic::ChainReorg,
            _ => return Err(anyhow!("unsupported event topic: {s}")),
        })
    }
}

impl Display for EventTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                EventTopic::Head => "head",
                EventTopic::FinalizedCheckpoint => "finalized_checkpoint",
                EventTopic::ChainReorg => "chain_reorg",
            }
        )
    }
}

pub enum BeaconEvent {
    Head(HeadEvent),
    FinalizedCheckpoint(FinalizedCheckpointEvent),
    ChainReorg(ChainReorgEvent),
}

impl BeaconEvent {
    fn from_json<T: DeserializeOwned>(
        json: &str,
        constructor: impl FnOnce(T) -> Self,
    ) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(constructor)
    }
}

impl TryFrom<Event> for BeaconEvent {
    type Error = serde_json::Error;

    fn try_from(event: Event) -> Result<Self, Self::Error> {
        let topic =
            EventTopic::from_str(event.event_type.as_str()).map_err(Self::Error::custom)?;
        match topic {
            EventTopic::Head => Self::from_json(event.data.as_str(), Self::Head),
            EventTopic::FinalizedCheckpoint => {
                Self::from_json(event.data.as_str(), Self::FinalizedCheckpoint)
            }
            EventTopic::ChainReorg => Self::from_json(event.data.as_str(), Self::ChainReorg),
        }
    }
}

/// The three live-mode inputs, each on its own channel so the select loop can
/// prioritize finality and reorg handling over plain head advances.
pub struct EventChannels {
    pub head: mpsc::UnboundedReceiver<HeadEvent>,
    pub finalized_checkpoint: mpsc::UnboundedReceiver<FinalizedCheckpointEvent>,
    pub chain_reorg: mpsc::UnboundedReceiver<ChainReorgEvent>,
}

impl BeaconApiClient {
    pub fn events_stream(
        &self,
        topics: &[EventTopic],
        stream_tag: &'static str,
    ) -> Result<Pin<Box<dyn Stream<Item = BeaconEvent> + Send>>, ClientError> {
        let endpoint = self.base_url().join(&format!(
            "eth/v1/events?topics={}",
            topics
                .iter()
                .map(|topic| topic.to_string())
                .collect::<Vec<_>>()
                .join(",")
        ))?;

        Ok(ClientBuilder::for_url(endpoint.as_str())
            .map_err(|err| ClientError::Rpc(format!("invalid event stream url: {err}")))?
            .build()
            .stream()
            .filter_map(move |event| async move {
                let event = match event {
                    Ok(SSE::Event(event)) => event,
                    Ok(SSE::Connected(connection_details)) => {
                        info!("{stream_tag}: connected to SSE stream: {connection_details:?}");
                        return None;
                    }
                    Ok(SSE::Comment(comment)) => {
                        info!("{stream_tag}: received comment: {comment:?}");
                        return None;
                    }
                    Err(err) => {
                        error!("{stream_tag}: error receiving event: {err:?}");
                        return None;
                    }
                };
                match BeaconEvent::try_from(event) {
                    Ok(event) => Some(event),
                    Err(err) => {
                        error!("{stream_tag}: failed to decode event: {err:?}");
                        None
                    }
                }
            })
            .boxed())
    }

    /// Subscribe to head / finalized-checkpoint / chain-reorg events and fan
    /// them out onto per-topic channels. The forwarder task ends once every
    /// receiver is dropped.
    pub fn subscribe_events(&self) -> Result<EventChannels, ClientError> {
        let mut stream = self.events_stream(
            &[
                EventTopic::Head,
                EventTopic::FinalizedCheckpoint,
                EventTopic::ChainReorg,
            ],
            "chain-events",
        )?;

        let (head_tx, head_rx) = mpsc::unbounded_channel();
        let (finalized_tx, finalized_rx) = mpsc::unbounded_channel();
        let (reorg_tx, reorg_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let receiver_gone = match event {
                    BeaconEvent::Head(event) => head_tx.send(event).is_err(),
                    BeaconEvent::FinalizedCheckpoint(event) => finalized_tx.send(event).is_err(),
                    BeaconEvent::ChainReorg(event) => reorg_tx.send(event).is_err(),
                };
                if receiver_gone {
                    break;
                }
            }
        });

        Ok(EventChannels {
            head: head_rx,
            finalized_checkpoint: finalized_rx,
            chain_reorg: reorg_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_round_trip() {
        for name in ["head", "finalized_checkpoint", "chain_reorg"] {
            assert_eq!(EventTopic::from_str(name).unwrap().to_string(), name);
        }
        assert!(EventTopic::from_str("attestation").is_err());
    }

    #[test]
    fn test_decode_reorg_payload() {
        let payload = serde_json::json!({
            "slot": "200",
            "depth": "3",
            "old_head_block": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "new_head_block": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "old_head_state": "0x3333333333333333333333333333333333333333333333333333333333333333",
            "new_head_state": "0x4444444444444444444444444444444444444444444444444444444444444444",
            "epoch": "6",
            "execution_optimistic": false
        })
        .to_string();

        match BeaconEvent::from_json(&payload, BeaconEvent::ChainReorg).unwrap() {
            BeaconEvent::ChainReorg(reorg) => {
                assert_eq!(reorg.slot, 200);
                assert_eq!(reorg.depth, 3);
            }
            _ => panic!("expected a chain_reorg event"),
        }
    }
}
