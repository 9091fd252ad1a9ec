mod config;
mod dispatch;
mod engine;
mod error;
mod evaluate;
mod schedule;
mod weather;

use std::{env, sync::Arc, time::Duration};

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet};
use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{error, info, warn};

use dispatch::Dispatcher;
use engine::Engine;
use weather::{StaticMoisture, StaticWeather};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new("garden-hub", cfg.mqtt.host.clone(), cfg.mqtt.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    // ── Engine ──────────────────────────────────────────────────────
    let weather = Arc::new(StaticWeather {
        rain_mm: cfg.weather.rain_mm,
        average_high_temp: cfg.weather.average_high_temp,
    });
    let moisture = Arc::new(StaticMoisture {
        moisture_percent: cfg.weather.moisture_percent,
    });
    let dispatcher = Arc::new(Dispatcher::new(client, &cfg.topic_prefix));
    let engine = Engine::new(weather, moisture, dispatcher);

    // Register every active schedule from config (end-dated ones stay out,
    // same as they would coming from the resource API at boot).
    let now = OffsetDateTime::now_utc();
    for entry in &cfg.schedules {
        let schedule = entry.to_schedule(now);
        if schedule.end_dated() {
            info!(schedule = %schedule.id, "schedule is end-dated, not registering");
            continue;
        }
        engine.add(schedule).await?;
    }
    info!(
        jobs = engine.job_count().await,
        prefix = %cfg.topic_prefix,
        "hub started"
    );

    // ── Event loop ──────────────────────────────────────────────────
    // The hub only publishes, but the loop must be polled to drive the
    // connection and flush queued commands.
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
            }
            Ok(_) => {}
            Err(e) => {
                error!("mqtt error: {e}. reconnecting...");
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
