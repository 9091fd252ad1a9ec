mod button;
mod config;
mod executor;
mod mqtt;
mod telemetry;
mod valve;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use executor::{normalize_duration, StopSignal, WateringEvent, QUEUE_CAPACITY, STOP_CAPACITY};
use mqtt::{parse_command_topic, CommandKind, WaterMessage};
use valve::ValveBoard;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Config::from_env();
    info!(?cfg, "controller starting");

    let mut valves = ValveBoard::new(&cfg.valve_pins, cfg.relay_active_low)?;
    valves.all_off();

    let (events_tx, events_rx) = mpsc::channel::<WateringEvent>(QUEUE_CAPACITY);
    let (stops_tx, stops_rx) = mpsc::channel::<StopSignal>(STOP_CAPACITY);
    let (completions_tx, completions_rx) = mpsc::channel(32);

    let mut opts = MqttOptions::new(
        format!("garden-controller-{}", cfg.garden_name),
        cfg.mqtt_host.clone(),
        cfg.mqtt_port,
    );
    opts.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(opts, 20);

    tokio::spawn(executor::run(events_rx, stops_rx, completions_tx, valves));
    tokio::spawn(telemetry::publish_completions(
        client.clone(),
        cfg.topic_prefix.clone(),
        completions_rx,
    ));
    tokio::spawn(telemetry::publish_health(
        client.clone(),
        cfg.topic_prefix.clone(),
        cfg.garden_name.clone(),
        cfg.health_interval,
    ));

    spawn_inputs(&cfg, events_tx.clone(), stops_tx.clone())?;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("connected to mqtt broker");
                // A fresh session starts with no subscriptions, so every
                // connect (first or reconnect) must subscribe again.
                for topic in mqtt::command_topics(&cfg.topic_prefix) {
                    if let Err(err) = client.subscribe(topic, QoS::AtLeastOnce).await {
                        error!(error = %err, "command subscribe failed");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match parse_command_topic(&cfg.topic_prefix, &publish.topic) {
                    Some(CommandKind::Water) => {
                        let msg: WaterMessage = match serde_json::from_slice(&publish.payload) {
                            Ok(msg) => msg,
                            Err(err) => {
                                warn!(error = %err, topic = %publish.topic, "bad water command");
                                continue;
                            }
                        };
                        let ev = WateringEvent {
                            valve_id: msg.valve_id,
                            duration: normalize_duration(msg.duration, cfg.default_water),
                            id: msg.id,
                        };
                        info!(valve = ev.valve_id, id = %ev.id, "watering command queued");
                        // Blocks when the queue is full; commands are never dropped.
                        if events_tx.send(ev).await.is_err() {
                            error!("executor stopped, exiting");
                            return Ok(());
                        }
                    }
                    Some(CommandKind::Stop) => {
                        if stops_tx.send(StopSignal::Current).await.is_err() {
                            error!("executor stopped, exiting");
                            return Ok(());
                        }
                    }
                    Some(CommandKind::StopAll) => {
                        if stops_tx.send(StopSignal::All).await.is_err() {
                            error!("executor stopped, exiting");
                            return Ok(());
                        }
                    }
                    None => {}
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt broker disconnected");
            }
            Ok(_) => {}
            Err(err) => {
                error!(error = %err, "mqtt connection error, retrying");
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

#[cfg(feature = "gpio")]
fn spawn_inputs(
    cfg: &Config,
    events: mpsc::Sender<WateringEvent>,
    stops: mpsc::Sender<StopSignal>,
) -> Result<()> {
    use rppal::gpio::Gpio;

    let gpio = Gpio::new()?;
    let water_line = button::InputLine::new(gpio.get(cfg.water_button_pin)?.into_input_pulldown());
    let stop_line = button::InputLine::new(gpio.get(cfg.stop_button_pin)?.into_input_pulldown());

    tokio::spawn(button::run_water_input(
        water_line,
        events,
        cfg.manual_valve_id,
        cfg.default_water,
    ));
    tokio::spawn(button::run_stop_input(stop_line, stops));
    Ok(())
}

#[cfg(not(feature = "gpio"))]
fn spawn_inputs(
    cfg: &Config,
    events: mpsc::Sender<WateringEvent>,
    stops: mpsc::Sender<StopSignal>,
) -> Result<()> {
    // No hardware buttons without gpio; the mock lines stay low forever but
    // keep the sampler path exercised in development.
    tokio::spawn(button::run_water_input(
        button::InputLine::new(),
        events,
        cfg.manual_valve_id,
        cfg.default_water,
    ));
    tokio::spawn(button::run_stop_input(button::InputLine::new(), stops));
    Ok(())
}
