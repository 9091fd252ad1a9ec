//! Command dispatcher: serializes a watering intent and publishes it to the
//! owning device's command topic. Fire-and-forget — no acknowledgement is
//! awaited, and a failed publish is surfaced to the caller without retry
//! (the next scheduled fire is the retry boundary).

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{IntentSink, WateringIntent};
use crate::error::Error;

// ---------------------------------------------------------------------------
// Wire payload + topics
// ---------------------------------------------------------------------------

/// Payload published on `<prefix>/command/water`.
#[derive(Debug, Serialize)]
pub struct WaterCommand {
    pub valve_id: u32,
    /// Watering length in milliseconds.
    pub duration: u64,
    /// Correlation id, echoed back in execution telemetry.
    pub id: String,
}

/// Build "<prefix>/command/water".
pub fn water_command_topic(prefix: &str) -> String {
    format!("{prefix}/command/water")
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    client: AsyncClient,
    topic: String,
}

impl Dispatcher {
    pub fn new(client: AsyncClient, topic_prefix: &str) -> Self {
        Self {
            client,
            topic: water_command_topic(topic_prefix),
        }
    }
}

#[async_trait]
impl IntentSink for Dispatcher {
    async fn dispatch(&self, intent: &WateringIntent) -> Result<(), Error> {
        if intent.duration.is_zero() {
            // Skipped fire: record it, send nothing.
            warn!(
                schedule = %intent.schedule_id,
                valve = intent.valve_id,
                correlation = %intent.correlation_id,
                "watering skipped"
            );
            return Ok(());
        }

        let command = WaterCommand {
            valve_id: intent.valve_id,
            duration: intent.duration.as_millis() as u64,
            id: intent.correlation_id.clone(),
        };
        let payload = serde_json::to_vec(&command).expect("WaterCommand always serializes");

        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .await?;

        info!(
            schedule = %intent.schedule_id,
            valve = intent.valve_id,
            millis = command.duration,
            correlation = %intent.correlation_id,
            "water command dispatched"
        );
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // -- topics ---------------------------------------------------------------

    #[test]
    fn water_topic_uses_prefix() {
        assert_eq!(water_command_topic("garden"), "garden/command/water");
    }

    // -- payload ----------------------------------------------------------------

    #[test]
    fn water_command_serializes_expected_fields() {
        let cmd = WaterCommand {
            valve_id: 3,
            duration: 1500,
            id: "abc".into(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["valve_id"], 3);
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["id"], "abc");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    // -- dispatch ------------------------------------------------------------------

    /// Client whose event loop is never polled: publishes buffer internally,
    /// which is enough to verify the dispatch paths.
    fn test_client() -> (AsyncClient, rumqttc::EventLoop) {
        let opts = rumqttc::MqttOptions::new("test-dispatch", "127.0.0.1", 1883);
        AsyncClient::new(opts, 10)
    }

    #[tokio::test]
    async fn zero_duration_intent_is_not_published() {
        let (client, _el) = test_client();
        let dispatcher = Dispatcher::new(client, "garden");
        let intent = WateringIntent {
            schedule_id: "ws".into(),
            valve_id: 0,
            duration: Duration::ZERO,
            correlation_id: "c1".into(),
        };
        dispatcher.dispatch(&intent).await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_intent_publishes_ok() {
        let (client, _el) = test_client();
        let dispatcher = Dispatcher::new(client, "garden");
        let intent = WateringIntent {
            schedule_id: "ws".into(),
            valve_id: 2,
            duration: Duration::from_millis(1000),
            correlation_id: "c2".into(),
        };
        dispatcher.dispatch(&intent).await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_surfaces_dispatch_error() {
        let (client, el) = test_client();
        // Dropping the event loop closes the client's request channel, so
        // the next publish fails with a transport error.
        drop(el);
        let dispatcher = Dispatcher::new(client, "garden");
        let intent = WateringIntent {
            schedule_id: "ws".into(),
            valve_id: 2,
            duration: Duration::from_millis(1000),
            correlation_id: "c3".into(),
        };
        assert!(matches!(
            dispatcher.dispatch(&intent).await,
            Err(Error::DispatchFailure(_))
        ));
    }
}
