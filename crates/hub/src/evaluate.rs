//! Weather adjustment evaluator: a pure function from a schedule's weather
//! controls plus live readings to a watering decision.
//!
//! Decision order:
//!   1. soil moisture at/above minimum        -> skip
//!   2. accumulated rain at/above threshold   -> skip
//!   3. rain-scale and temperature controls   -> scaled duration
//!      (applied multiplicatively when both are present)
//!
//! A scaled duration of exactly zero is a skip: the dispatcher never sends
//! a zero-length command.

use std::fmt;
use std::time::Duration;

use crate::schedule::{RainControl, ScaleControl, WeatherControl};

/// Fixed look-back window for rain accumulation and average-high
/// temperature queries.
pub const WEATHER_WINDOW: Duration = Duration::from_secs(72 * 60 * 60);

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Live readings gathered ahead of evaluation. Only the fields needed by
/// the schedule's configured controls are populated.
#[derive(Debug, Clone, Default)]
pub struct Readings {
    /// Accumulated rain (mm) over [`WEATHER_WINDOW`].
    pub total_rain_mm: Option<f64>,
    /// Average daily high temperature over [`WEATHER_WINDOW`].
    pub average_high_temp: Option<f64>,
    /// Current moisture percentage for the target zone.
    pub moisture_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Water(Duration),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Moisture reading at/above the configured minimum.
    SoilMoisture { reading: f64, minimum: f64 },
    /// Accumulated rain at/above the configured threshold.
    RainThreshold { rain_mm: f64, threshold: f64 },
    /// Scale factors reduced the duration to zero.
    ScaledToZero,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SoilMoisture { reading, minimum } => {
                write!(f, "soil moisture {reading} >= minimum {minimum}")
            }
            SkipReason::RainThreshold { rain_mm, threshold } => {
                write!(f, "rain {rain_mm}mm >= threshold {threshold}mm")
            }
            SkipReason::ScaledToZero => write!(f, "weather scaling reduced duration to zero"),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Resolve the effective watering duration for one fire.
///
/// At most one skip reason is produced per evaluation, and skip takes
/// precedence over scaling. With no controls configured the nominal
/// duration passes through unchanged.
pub fn evaluate(
    nominal: Duration,
    control: Option<&WeatherControl>,
    readings: &Readings,
) -> Decision {
    let Some(control) = control else {
        return Decision::Water(nominal);
    };

    if let (Some(ctl), Some(reading)) = (&control.soil_moisture, readings.moisture_percent) {
        if reading >= ctl.minimum_moisture {
            return Decision::Skip(SkipReason::SoilMoisture {
                reading,
                minimum: ctl.minimum_moisture,
            });
        }
    }

    if let (Some(RainControl::Threshold { threshold }), Some(rain_mm)) =
        (&control.rain, readings.total_rain_mm)
    {
        if rain_mm >= *threshold {
            return Decision::Skip(SkipReason::RainThreshold {
                rain_mm,
                threshold: *threshold,
            });
        }
    }

    let mut scale = 1.0;
    if let (Some(RainControl::Scale(ctl)), Some(rain_mm)) = (&control.rain, readings.total_rain_mm)
    {
        scale *= scale_factor(ctl, rain_mm);
    }
    if let (Some(ctl), Some(temp)) = (&control.temperature, readings.average_high_temp) {
        scale *= scale_factor(ctl, temp);
    }

    let scaled = nominal.mul_f64(scale);
    if scaled.is_zero() {
        Decision::Skip(SkipReason::ScaledToZero)
    } else {
        Decision::Water(scaled)
    }
}

/// `1 + factor * deviation/range`, with the deviation capped at the
/// configured range in either direction and the result floored at zero.
/// A non-positive range cannot express a deviation; the control is inert.
fn scale_factor(ctl: &ScaleControl, observed: f64) -> f64 {
    if ctl.range <= 0.0 {
        return 1.0;
    }
    let deviation = (observed - ctl.baseline_value).clamp(-ctl.range, ctl.range);
    (1.0 + ctl.factor * deviation / ctl.range).max(0.0)
}

// ===========================================================================
// Tests
// ===========================================================================
