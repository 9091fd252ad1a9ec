//! Manual push-button inputs. Lines are sampled every [`SAMPLE_INTERVAL`]
//! and a level change must hold for [`DEBOUNCE_WINDOW`] before it counts,
//! so relay chatter and contact bounce never trigger spurious waterings.

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

use crate::executor::{StopSignal, WateringEvent};

#[cfg(feature = "gpio")]
use rppal::gpio::InputPin;

/// How long a level must hold before it is accepted.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(50);

/// Input sampling cadence.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

// ---------------------------------------------------------------------------
// Debounce filter
// ---------------------------------------------------------------------------

/// Two-state debounce filter. Feed it raw samples; it reports an [`Edge`]
/// once a new level has held for the full window.
pub struct Debouncer {
    last_raw: bool,
    stable_since: Instant,
    accepted: bool,
}

impl Debouncer {
    pub fn new(now: Instant) -> Self {
        Self {
            last_raw: false,
            stable_since: now,
            accepted: false,
        }
    }

    pub fn sample(&mut self, raw: bool, now: Instant) -> Option<Edge> {
        if raw != self.last_raw {
            // Level changed; restart the hold timer.
            self.last_raw = raw;
            self.stable_since = now;
            return None;
        }
        if raw != self.accepted && now.duration_since(self.stable_since) >= DEBOUNCE_WINDOW {
            self.accepted = raw;
            return Some(if raw { Edge::Pressed } else { Edge::Released });
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Input lines (gpio / mock)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
pub struct InputLine {
    pin: InputPin,
}

#[cfg(feature = "gpio")]
impl InputLine {
    pub fn new(pin: InputPin) -> Self {
        Self { pin }
    }

    fn read(&self) -> bool {
        self.pin.is_high()
    }
}

#[cfg(not(feature = "gpio"))]
pub struct InputLine {
    level: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(not(feature = "gpio"))]
impl InputLine {
    pub fn new() -> Self {
        Self {
            level: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Handle for driving the mock line, usable after the line has been
    /// moved into a sampler task.
    pub fn handle(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.level.clone()
    }

    fn read(&self) -> bool {
        self.level.load(std::sync::atomic::Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Sampler tasks
// ---------------------------------------------------------------------------

/// Sample the water button; each accepted press enqueues one watering event
/// for `valve_id`. The send blocks when the queue is full, so further
/// presses wait rather than being dropped.
pub async fn run_water_input(
    line: InputLine,
    events: mpsc::Sender<WateringEvent>,
    valve_id: u32,
    duration: Duration,
) {
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    let mut debouncer = Debouncer::new(Instant::now());

    loop {
        ticker.tick().await;
        if debouncer.sample(line.read(), Instant::now()) == Some(Edge::Pressed) {
            let ev = WateringEvent {
                valve_id,
                duration,
                id: format!("manual-{}", Uuid::new_v4()),
            };
            info!(valve = valve_id, id = %ev.id, "manual watering requested");
            if events.send(ev).await.is_err() {
                return;
            }
        }
    }
}

/// Sample the stop button; each accepted press interrupts the in-flight
/// watering event.
pub async fn run_stop_input(line: InputLine, stops: mpsc::Sender<StopSignal>) {
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    let mut debouncer = Debouncer::new(Instant::now());

    loop {
        ticker.tick().await;
        if debouncer.sample(line.read(), Instant::now()) == Some(Edge::Pressed) {
            info!("manual stop requested");
            if stops.send(StopSignal::Current).await.is_err() {
                return;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
