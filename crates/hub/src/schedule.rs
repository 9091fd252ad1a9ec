//! Water schedule data model: how often and how long a valve waters, plus
//! the optional weather controls that adjust or skip a watering.

use std::time::Duration;

use serde::Deserialize;
use time::OffsetDateTime;

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A recurring watering schedule for one valve. `interval` anchors off
/// `start_time`, so fire instants are always `start_time + k*interval`.
#[derive(Debug, Clone)]
pub struct WaterSchedule {
    pub id: String,
    pub valve_id: u32,
    /// Time between fires.
    pub interval: Duration,
    /// Nominal watering length before weather scaling.
    pub duration: Duration,
    /// Anchor instant that interval offsets are computed from.
    pub start_time: OffsetDateTime,
    /// A schedule past its end date is never registered with the engine.
    pub end_date: Option<OffsetDateTime>,
    pub weather_control: Option<WeatherControl>,
}

impl WaterSchedule {
    /// True if the schedule has been end-dated in the past.
    pub fn end_dated(&self) -> bool {
        self.end_date
            .map(|end| end < OffsetDateTime::now_utc())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Weather controls
// ---------------------------------------------------------------------------

/// Up to three independent sub-controls. Soil moisture and rain-threshold
/// produce skip decisions; rain-scale and temperature produce scale factors.
/// Skip always takes precedence over scaling.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherControl {
    pub rain: Option<RainControl>,
    pub temperature: Option<ScaleControl>,
    pub soil_moisture: Option<SoilMoistureControl>,
}

/// Rain control comes in two mutually exclusive forms. Untagged with the
/// threshold variant first: a config table that could satisfy both shapes
/// deserializes as a threshold, so threshold-presence wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RainControl {
    /// Skip entirely when accumulated rain over the look-back window
    /// reaches `threshold` (mm, inclusive).
    Threshold { threshold: f64 },
    /// Scale the nominal duration off observed rainfall.
    Scale(ScaleControl),
}

/// Scales the nominal duration proportional to the deviation of an observed
/// value from `baseline_value`, capped at `range` in either direction:
/// `scale = 1 + factor * clamp(observed - baseline, -range, range) / range`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScaleControl {
    pub baseline_value: f64,
    pub factor: f64,
    pub range: f64,
}

impl ScaleControl {
    /// Validation bounds shared by config and tests. A negative factor
    /// shortens watering as the observed value rises (the usual rain setup).
    pub fn in_bounds(&self) -> bool {
        (-1.0..=1.0).contains(&self.factor) && self.range > 0.0
    }
}

/// Skip watering while the zone's own moisture reading is at or above the
/// minimum.
#[derive(Debug, Clone, Deserialize)]
pub struct SoilMoistureControl {
    pub minimum_moisture: f64,
}

// ===========================================================================
// Tests
// ===========================================================================
