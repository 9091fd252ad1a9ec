//! Collaborator contracts for weather and soil moisture data, plus
//! constant-reading implementations used when no live provider is wired in.
//!
//! Real provider integrations live outside this crate; the engine only
//! needs the two capabilities below. Every call is fallible — a failed
//! read makes the current fire skip, never water.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Accumulated rainfall (mm) over the trailing window.
    async fn total_rain(&self, window: Duration) -> Result<f64>;

    /// Average daily high temperature over the trailing window.
    async fn average_high_temperature(&self, window: Duration) -> Result<f64>;
}

#[async_trait]
pub trait MoistureProvider: Send + Sync {
    /// Current soil moisture percentage for the zone watered by `valve_id`.
    async fn moisture(&self, valve_id: u32) -> Result<f64>;
}

// ---------------------------------------------------------------------------
// Static providers
// ---------------------------------------------------------------------------

/// Returns fixed readings from config. Stands in for a live weather service
/// and doubles as the test fixture.
#[derive(Debug, Clone, Copy)]
pub struct StaticWeather {
    pub rain_mm: f64,
    pub average_high_temp: f64,
}

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn total_rain(&self, _window: Duration) -> Result<f64> {
        Ok(self.rain_mm)
    }

    async fn average_high_temperature(&self, _window: Duration) -> Result<f64> {
        Ok(self.average_high_temp)
    }
}

/// Fixed moisture reading for every zone.
#[derive(Debug, Clone, Copy)]
pub struct StaticMoisture {
    pub moisture_percent: f64,
}

#[async_trait]
impl MoistureProvider for StaticMoisture {
    async fn moisture(&self, _valve_id: u32) -> Result<f64> {
        Ok(self.moisture_percent)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Provider whose every read fails, for skip-this-cycle tests.
    pub struct FailingProvider;

    #[async_trait]
    impl WeatherProvider for FailingProvider {
        async fn total_rain(&self, _window: Duration) -> Result<f64> {
            anyhow::bail!("weather service unreachable")
        }

        async fn average_high_temperature(&self, _window: Duration) -> Result<f64> {
            anyhow::bail!("weather service unreachable")
        }
    }

    #[async_trait]
    impl MoistureProvider for FailingProvider {
        async fn moisture(&self, _valve_id: u32) -> Result<f64> {
            anyhow::bail!("moisture sensor unreachable")
        }
    }
}
