//! TOML config file loading and validation for the hub: broker address,
//! static weather readings, and the water schedules registered at boot.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::schedule::{RainControl, WaterSchedule, WeatherControl};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Device-scoped MQTT topic prefix (`P` in the wire contract).
    pub topic_prefix: String,
    #[serde(default)]
    pub mqtt: MqttConfig,
    /// Constant readings for the built-in static providers. Real weather
    /// integrations replace these from outside this crate.
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1883,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub rain_mm: f64,
    pub average_high_temp: f64,
    pub moisture_percent: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            rain_mm: 0.0,
            average_high_temp: 25.0,
            moisture_percent: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleEntry {
    pub id: String,
    pub valve_id: u32,
    pub interval_sec: u64,
    pub duration_ms: u64,
    /// RFC3339 anchor instant; defaults to boot time when omitted.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub weather_control: Option<WeatherControl>,
}

impl ScheduleEntry {
    /// Build the runtime schedule, anchoring omitted start times at `now`.
    pub fn to_schedule(&self, now: OffsetDateTime) -> WaterSchedule {
        WaterSchedule {
            id: self.id.clone(),
            valve_id: self.valve_id,
            interval: Duration::from_secs(self.interval_sec),
            duration: Duration::from_millis(self.duration_ms),
            start_time: self.start_time.unwrap_or(now),
            end_date: self.end_date,
            weather_control: self.weather_control.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.topic_prefix.trim().is_empty() {
            errors.push("topic_prefix is empty".into());
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        for (i, s) in self.schedules.iter().enumerate() {
            let ctx = || {
                if s.id.is_empty() {
                    format!("schedules[{i}]")
                } else {
                    format!("schedule '{}'", s.id)
                }
            };

            // ── Identity ────────────────────────────────────────
            if s.id.trim().is_empty() {
                errors.push(format!("{}: id is empty", ctx()));
            } else if !seen_ids.insert(&s.id) {
                errors.push(format!("{}: duplicate id", ctx()));
            }

            // ── Timing (all must be positive) ───────────────────
            if s.interval_sec == 0 {
                errors.push(format!("{}: interval_sec must be positive", ctx()));
            }
            if s.duration_ms == 0 {
                errors.push(format!("{}: duration_ms must be positive", ctx()));
            }

            // ── Weather controls ────────────────────────────────
            if let Some(wc) = &s.weather_control {
                match &wc.rain {
                    Some(RainControl::Threshold { threshold }) if *threshold <= 0.0 => {
                        errors.push(format!(
                            "{}: rain threshold must be positive, got {threshold}",
                            ctx()
                        ));
                    }
                    Some(RainControl::Scale(sc)) if !sc.in_bounds() => {
                        errors.push(format!(
                            "{}: rain scale control out of bounds (factor in [-1, 1], range > 0)",
                            ctx()
                        ));
                    }
                    _ => {}
                }
                if let Some(sc) = &wc.temperature {
                    if !sc.in_bounds() {
                        errors.push(format!(
                            "{}: temperature scale control out of bounds (factor in [-1, 1], range > 0)",
                            ctx()
                        ));
                    }
                }
                if let Some(sm) = &wc.soil_moisture {
                    if sm.minimum_moisture <= 0.0 {
                        errors.push(format!(
                            "{}: minimum_moisture must be positive, got {}",
                            ctx(),
                            sm.minimum_moisture
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_entry() -> ScheduleEntry {
        ScheduleEntry {
            id: "ws1".into(),
            valve_id: 0,
            interval_sec: 86400,
            duration_ms: 15000,
            start_time: None,
            end_date: None,
            weather_control: None,
        }
    }

    fn valid_config() -> Config {
        Config {
            topic_prefix: "garden".into(),
            mqtt: MqttConfig::default(),
            weather: WeatherConfig::default(),
            schedules: vec![valid_entry()],
        }
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
topic_prefix = "garden"

[mqtt]
host = "broker.local"
port = 1884

[weather]
rain_mm = 5.0
average_high_temp = 28.0
moisture_percent = 30.0

[[schedules]]
id = "front-bed"
valve_id = 0
interval_sec = 86400
duration_ms = 15000
start_time = "2024-06-01T06:00:00Z"

[schedules.weather_control.rain]
threshold = 25.4

[schedules.weather_control.soil_moisture]
minimum_moisture = 50.0

[[schedules]]
id = "back-bed"
valve_id = 1
interval_sec = 43200
duration_ms = 8000

[schedules.weather_control.temperature]
baseline_value = 30.0
factor = 0.5
range = 10.0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.topic_prefix, "garden");
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.schedules.len(), 2);

        let front = &config.schedules[0];
        assert!(front.start_time.is_some());
        let wc = front.weather_control.as_ref().unwrap();
        assert!(matches!(wc.rain, Some(RainControl::Threshold { threshold }) if threshold == 25.4));
        assert!(wc.soil_moisture.is_some());

        let back = &config.schedules[1];
        assert!(back.weather_control.as_ref().unwrap().temperature.is_some());
    }

    #[test]
    fn parse_minimal_config() {
        let config: Config = toml::from_str(r#"topic_prefix = "garden""#).unwrap();
        config.validate().unwrap();
        assert!(config.schedules.is_empty());
        assert_eq!(config.mqtt.port, 1883);
    }

    // -- to_schedule --------------------------------------------------------

    #[test]
    fn to_schedule_defaults_start_time_to_now() {
        let now = OffsetDateTime::now_utc();
        let ws = valid_entry().to_schedule(now);
        assert_eq!(ws.start_time, now);
        assert_eq!(ws.interval, Duration::from_secs(86400));
        assert_eq!(ws.duration, Duration::from_millis(15000));
    }

    #[test]
    fn to_schedule_keeps_explicit_start_time() {
        let mut entry = valid_entry();
        let start = time::macros::datetime!(2024-06-01 06:00 UTC);
        entry.start_time = Some(start);
        let ws = entry.to_schedule(OffsetDateTime::now_utc());
        assert_eq!(ws.start_time, start);
    }

    // -- Validation ---------------------------------------------------------

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn empty_topic_prefix_rejected() {
        let mut cfg = valid_config();
        cfg.topic_prefix = " ".into();
        assert_validation_err(&cfg, "topic_prefix is empty");
    }

    #[test]
    fn empty_schedule_id_rejected() {
        let mut cfg = valid_config();
        cfg.schedules[0].id = "".into();
        assert_validation_err(&cfg, "id is empty");
    }

    #[test]
    fn duplicate_schedule_id_rejected() {
        let mut cfg = valid_config();
        cfg.schedules.push(valid_entry());
        assert_validation_err(&cfg, "duplicate id");
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = valid_config();
        cfg.schedules[0].interval_sec = 0;
        assert_validation_err(&cfg, "interval_sec must be positive");
    }

    #[test]
    fn zero_duration_rejected() {
        let mut cfg = valid_config();
        cfg.schedules[0].duration_ms = 0;
        assert_validation_err(&cfg, "duration_ms must be positive");
    }

    #[test]
    fn zero_rain_threshold_rejected() {
        let mut cfg = valid_config();
        cfg.schedules[0].weather_control = Some(WeatherControl {
            rain: Some(RainControl::Threshold { threshold: 0.0 }),
            temperature: None,
            soil_moisture: None,
        });
        assert_validation_err(&cfg, "rain threshold must be positive");
    }

    #[test]
    fn out_of_bounds_temperature_factor_rejected() {
        let mut cfg = valid_config();
        cfg.schedules[0].weather_control = Some(WeatherControl {
            rain: None,
            temperature: Some(crate::schedule::ScaleControl {
                baseline_value: 30.0,
                factor: 2.0,
                range: 10.0,
            }),
            soil_moisture: None,
        });
        assert_validation_err(&cfg, "temperature scale control out of bounds");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = valid_config();
        cfg.topic_prefix = "".into();
        cfg.schedules[0].interval_sec = 0;
        cfg.schedules[0].duration_ms = 0;
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains("topic_prefix is empty"),
            "missing prefix error in: {msg}"
        );
        assert!(msg.contains("interval_sec"), "missing interval error in: {msg}");
        assert!(msg.contains("duration_ms"), "missing duration error in: {msg}");
    }
}
