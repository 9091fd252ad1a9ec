//! Best-effort telemetry. Records use influx line protocol so the hub side
//! can forward them straight into a time-series store. Publish failures are
//! logged and the record is dropped; telemetry never blocks watering.

use rumqttc::{AsyncClient, QoS};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::executor::Completion;
use crate::mqtt::{health_data_topic, water_data_topic};

/// Line recording how long a valve actually ran.
pub(crate) fn water_record(valve_id: u32, actual: Duration) -> String {
    format!("water,plant={valve_id} millis={}", actual.as_millis())
}

/// Periodic liveness line.
pub(crate) fn health_record(name: &str) -> String {
    format!("health garden=\"{name}\"")
}

/// Forward completion records from the executor onto `<prefix>/data/water`.
/// Runs until the executor side of the channel closes.
pub(crate) async fn publish_completions(
    client: AsyncClient,
    prefix: String,
    mut completions: mpsc::Receiver<Completion>,
) {
    let topic = water_data_topic(&prefix);

    while let Some(c) = completions.recv().await {
        info!(
            valve = c.valve_id,
            millis = c.actual.as_millis() as u64,
            outcome = ?c.outcome,
            id = %c.id,
            "watering recorded"
        );
        let line = water_record(c.valve_id, c.actual);
        if let Err(err) = client
            .publish(&topic, QoS::AtLeastOnce, false, line.into_bytes())
            .await
        {
            warn!(error = %err, "failed to publish water record, dropping");
        }
    }
}

/// Publish a health record every `interval` on `<prefix>/data/health`.
pub(crate) async fn publish_health(
    client: AsyncClient,
    prefix: String,
    name: String,
    interval: Duration,
) {
    let topic = health_data_topic(&prefix);
    let line = health_record(&name);
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        if let Err(err) = client
            .publish(&topic, QoS::AtLeastOnce, false, line.clone().into_bytes())
            .await
        {
            warn!(error = %err, "failed to publish health record, dropping");
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_record_format() {
        assert_eq!(
            water_record(3, Duration::from_millis(15000)),
            "water,plant=3 millis=15000"
        );
    }

    #[test]
    fn water_record_interrupted_duration() {
        assert_eq!(
            water_record(0, Duration::from_millis(742)),
            "water,plant=0 millis=742"
        );
    }

    #[test]
    fn health_record_format() {
        assert_eq!(health_record("backyard"), r#"health garden="backyard""#);
    }
}
