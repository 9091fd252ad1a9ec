//! Command execution core: a bounded queue of watering events drained by a
//! single consumer that drives exactly one valve at a time.
//!
//! Interrupts ride a separate bounded channel. While executing, the
//! consumer checks it every [`INTERRUPT_POLL`], so cancellation latency is
//! bounded but not zero. Stop-current ends the in-flight event; stop-all
//! additionally drains the queue without executing the remaining events.
//! The valve is switched off on every exit path.

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::valve::ValveBoard;

/// Maximum queued watering events. Senders block when the queue is full
/// (back-pressure, never drop).
pub const QUEUE_CAPACITY: usize = 10;

/// Stop-signal channel depth.
pub const STOP_CAPACITY: usize = 4;

/// How often the consumer polls for interrupts while a valve is open.
pub const INTERRUPT_POLL: Duration = Duration::from_millis(5);

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One unit of watering work. Created by the inbound command handler or the
/// manual input path; owned by the consumer while executing.
#[derive(Debug, Clone)]
pub struct WateringEvent {
    pub valve_id: u32,
    pub duration: Duration,
    /// Correlation id, echoed in the completion record.
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// End the in-flight event; no-op while idle.
    Current,
    /// End the in-flight event and drain the queue without executing.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Interrupted,
}

/// Emitted exactly once per executed event, completed or interrupted.
/// Drained events emit nothing.
#[derive(Debug, Clone)]
pub struct Completion {
    pub valve_id: u32,
    pub requested: Duration,
    pub actual: Duration,
    pub id: String,
    pub outcome: Outcome,
}

/// A zero requested duration means "use the device default". Never lets an
/// event execute for zero time.
pub fn normalize_duration(requested_ms: u64, default: Duration) -> Duration {
    if requested_ms == 0 {
        default
    } else {
        Duration::from_millis(requested_ms)
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Run the consumer loop. Sole owner of the valve board; waits indefinitely
/// for work and exits only when both channels close.
pub async fn run(
    mut events: mpsc::Receiver<WateringEvent>,
    mut stops: mpsc::Receiver<StopSignal>,
    completions: mpsc::Sender<Completion>,
    mut valves: ValveBoard,
) {
    info!(queue_capacity = QUEUE_CAPACITY, "executor started");

    loop {
        tokio::select! {
            sig = stops.recv() => match sig {
                // Nothing is executing; stop-current has no target.
                Some(StopSignal::Current) => {}
                Some(StopSignal::All) => drain(&mut events),
                None => break,
            },
            ev = events.recv() => match ev {
                Some(ev) => {
                    let drain_after = execute(ev, &mut valves, &mut stops, &completions).await;
                    if drain_after {
                        drain(&mut events);
                    }
                }
                None => break,
            },
        }
    }

    valves.all_off();
}

/// Execute one event to completion or interruption. Returns true when a
/// stop-all arrived and the queue must be drained.
async fn execute(
    ev: WateringEvent,
    valves: &mut ValveBoard,
    stops: &mut mpsc::Receiver<StopSignal>,
    completions: &mpsc::Sender<Completion>,
) -> bool {
    info!(
        valve = ev.valve_id,
        millis = ev.duration.as_millis() as u64,
        id = %ev.id,
        "watering started"
    );

    valves.set(ev.valve_id, true);
    let started = Instant::now();
    let deadline = started + ev.duration;
    let mut outcome = Outcome::Completed;
    let mut drain_after = false;

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(INTERRUPT_POLL.min(deadline - now)).await;

        match stops.try_recv() {
            Ok(StopSignal::Current) => {
                outcome = Outcome::Interrupted;
                break;
            }
            Ok(StopSignal::All) => {
                outcome = Outcome::Interrupted;
                drain_after = true;
                break;
            }
            Err(_) => {}
        }
    }

    // Fail-safe: the valve closes no matter how the loop ended.
    valves.set(ev.valve_id, false);

    let actual = match outcome {
        Outcome::Completed => ev.duration,
        Outcome::Interrupted => started.elapsed(),
    };
    info!(
        valve = ev.valve_id,
        millis = actual.as_millis() as u64,
        ?outcome,
        id = %ev.id,
        "watering finished"
    );

    let completion = Completion {
        valve_id: ev.valve_id,
        requested: ev.duration,
        actual,
        id: ev.id,
        outcome,
    };
    if completions.send(completion).await.is_err() {
        warn!("telemetry channel closed, dropping completion record");
    }

    drain_after
}

/// Discard everything queued without executing it.
fn drain(events: &mut mpsc::Receiver<WateringEvent>) {
    let mut dropped = 0usize;
    while let Ok(ev) = events.try_recv() {
        debug!(valve = ev.valve_id, id = %ev.id, "drained queued event");
        dropped += 1;
    }
    if dropped > 0 {
        info!(dropped, "stop-all drained the queue");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
