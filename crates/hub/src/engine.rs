//! Adaptive scheduling engine: one recurring timer task per water schedule.
//!
//! The job table maps schedule id to its running timer. Fires re-read the
//! current schedule, evaluate weather controls, and hand a resolved intent
//! to the dispatcher. Rescheduling always adds the interval to the
//! previous fire instant, never to "now", so phase never drifts no matter
//! how long a fire takes.
//!
//! Mutations (add/reset/remove) serialize on the job-table lock; fires run
//! in independent spawned tasks and never block each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::evaluate::{evaluate, Decision, Readings, WEATHER_WINDOW};
use crate::schedule::{RainControl, WaterSchedule};
use crate::weather::{MoistureProvider, WeatherProvider};

// ---------------------------------------------------------------------------
// Intent + sink
// ---------------------------------------------------------------------------

/// The resolved outcome of one fire. A zero duration means "skip": the
/// dispatcher records it but sends nothing.
#[derive(Debug, Clone)]
pub struct WateringIntent {
    pub schedule_id: String,
    pub valve_id: u32,
    pub duration: Duration,
    pub correlation_id: String,
}

/// Where resolved intents go. Production wires this to the MQTT command
/// dispatcher; tests use a recording sink.
#[async_trait]
pub trait IntentSink: Send + Sync {
    async fn dispatch(&self, intent: &WateringIntent) -> Result<(), Error>;
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Job {
    interval: Duration,
    handle: JoinHandle<()>,
}

struct Inner {
    /// At most one entry per schedule id.
    jobs: Mutex<HashMap<String, Job>>,
    /// Current schedule data, re-read at each fire. A fire already in
    /// flight may finish with stale data; a fire that begins after a reset
    /// sees the replacement.
    schedules: RwLock<HashMap<String, WaterSchedule>>,
    weather: Arc<dyn WeatherProvider>,
    moisture: Arc<dyn MoistureProvider>,
    sink: Arc<dyn IntentSink>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(
        weather: Arc<dyn WeatherProvider>,
        moisture: Arc<dyn MoistureProvider>,
        sink: Arc<dyn IntentSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                schedules: RwLock::new(HashMap::new()),
                weather,
                moisture,
                sink,
            }),
        }
    }

    /// Register a recurring job for the schedule. The first fire is the
    /// smallest `start_time + k*interval` at or after now (k >= 0). An
    /// existing job for the same id is replaced, keeping the one-job-per-id
    /// invariant.
    pub async fn add(&self, schedule: WaterSchedule) -> Result<(), Error> {
        if schedule.interval.is_zero() {
            return Err(Error::InvalidSchedule {
                id: schedule.id.clone(),
                reason: "interval must be positive".into(),
            });
        }
        if schedule.duration.is_zero() {
            return Err(Error::InvalidSchedule {
                id: schedule.id.clone(),
                reason: "duration must be positive".into(),
            });
        }
        if let Some(control) = &schedule.weather_control {
            let rain_scale_bad = matches!(&control.rain,
                Some(RainControl::Scale(sc)) if !sc.in_bounds());
            let temp_bad = control.temperature.as_ref().is_some_and(|sc| !sc.in_bounds());
            if rain_scale_bad || temp_bad {
                return Err(Error::InvalidSchedule {
                    id: schedule.id.clone(),
                    reason: "scale control out of bounds (factor in [-1, 1], range > 0)".into(),
                });
            }
        }

        let id = schedule.id.clone();
        let interval = schedule.interval;
        let first_in = delay_to_first_fire(&schedule, OffsetDateTime::now_utc());

        self.inner.schedules.write().await.insert(id.clone(), schedule);

        let mut jobs = self.inner.jobs.lock().await;
        if let Some(old) = jobs.remove(&id) {
            old.handle.abort();
        }
        let handle = tokio::spawn(run_job(Arc::clone(&self.inner), id.clone(), first_in, interval));
        jobs.insert(id.clone(), Job { interval, handle });

        info!(schedule = %id, first_fire_in = ?first_in, interval = ?interval, "job registered");
        Ok(())
    }

    /// Replace the job for an edited schedule. A fire already in flight
    /// with the old data may complete; no fire started after this returns
    /// will use it.
    pub async fn reset(&self, schedule: WaterSchedule) -> Result<(), Error> {
        self.add(schedule).await
    }

    /// Cancel the schedule's job. Idempotent: removing an unknown id is a
    /// no-op, not an error.
    pub async fn remove(&self, id: &str) {
        let mut jobs = self.inner.jobs.lock().await;
        if let Some(job) = jobs.remove(id) {
            job.handle.abort();
            info!(schedule = %id, "job removed");
        }
        drop(jobs);
        self.inner.schedules.write().await.remove(id);
    }

    /// Number of registered jobs (used by tests and status logging).
    pub async fn job_count(&self) -> usize {
        self.inner.jobs.lock().await.len()
    }
}

/// Delay from `now` until the first fire instant of the form
/// `start_time + k*interval`, k >= 0.
fn delay_to_first_fire(schedule: &WaterSchedule, now: OffsetDateTime) -> Duration {
    if schedule.start_time >= now {
        return (schedule.start_time - now).unsigned_abs();
    }
    let elapsed = (now - schedule.start_time).unsigned_abs();
    let interval_ns = schedule.interval.as_nanos();
    let rem = elapsed.as_nanos() % interval_ns;
    if rem == 0 {
        // Exactly on a fire boundary: fire now.
        Duration::ZERO
    } else {
        let ns = interval_ns - rem;
        Duration::new((ns / 1_000_000_000) as u64, (ns % 1_000_000_000) as u32)
    }
}

// ---------------------------------------------------------------------------
// Per-job timer task
// ---------------------------------------------------------------------------

async fn run_job(inner: Arc<Inner>, id: String, first_in: Duration, interval: Duration) {
    let mut next = tokio::time::Instant::now() + first_in;
    loop {
        tokio::time::sleep_until(next).await;

        let schedule = inner.schedules.read().await.get(&id).cloned();
        match schedule {
            Some(schedule) => {
                if let Err(e) = fire(&inner, &schedule).await {
                    // Fire failures never cancel the job; the next interval
                    // is the retry boundary.
                    error!(schedule = %id, "fire failed: {e}");
                }
            }
            None => break, // removed underneath us
        }

        next += interval;
    }
}

/// One fire: gather readings, evaluate, dispatch.
async fn fire(inner: &Inner, schedule: &WaterSchedule) -> Result<(), Error> {
    let duration = match gather_readings(inner, schedule).await {
        Ok(readings) => {
            match evaluate(schedule.duration, schedule.weather_control.as_ref(), &readings) {
                Decision::Water(d) => d,
                Decision::Skip(reason) => {
                    info!(schedule = %schedule.id, %reason, "skipping watering");
                    Duration::ZERO
                }
            }
        }
        Err(e) => {
            // Never water on unknown conditions.
            warn!(schedule = %schedule.id, "readings unavailable, skipping this cycle: {e}");
            Duration::ZERO
        }
    };

    let intent = WateringIntent {
        schedule_id: schedule.id.clone(),
        valve_id: schedule.valve_id,
        duration,
        correlation_id: Uuid::new_v4().to_string(),
    };
    inner.sink.dispatch(&intent).await
}

/// Query only the readings the schedule's controls need. Any provider
/// error fails the whole gather.
async fn gather_readings(inner: &Inner, schedule: &WaterSchedule) -> Result<Readings, Error> {
    let mut readings = Readings::default();
    let Some(control) = &schedule.weather_control else {
        return Ok(readings);
    };

    if control.soil_moisture.is_some() {
        let m = inner
            .moisture
            .moisture(schedule.valve_id)
            .await
            .map_err(Error::ProviderUnavailable)?;
        readings.moisture_percent = Some(m);
    }
    if control.rain.is_some() {
        let rain = inner
            .weather
            .total_rain(WEATHER_WINDOW)
            .await
            .map_err(Error::ProviderUnavailable)?;
        readings.total_rain_mm = Some(rain);
    }
    if control.temperature.is_some() {
        let temp = inner
            .weather
            .average_high_temperature(WEATHER_WINDOW)
            .await
            .map_err(Error::ProviderUnavailable)?;
        readings.average_high_temp = Some(temp);
    }

    Ok(readings)
}

// ===========================================================================
// Tests
// ===========================================================================
