//! Device configuration from environment variables. Every value has a
//! default so the controller boots on a bare dev machine with no setup.

use std::env;
use tokio::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    /// Topic prefix shared with the hub, e.g. "garden".
    pub topic_prefix: String,
    /// Name reported in health records.
    pub garden_name: String,
    /// GPIO pins driving the valve relays, in valve-id order.
    pub valve_pins: Vec<u8>,
    pub relay_active_low: bool,
    /// Applied when a command carries a zero duration.
    pub default_water: Duration,
    /// Valve the manual water button drives.
    pub manual_valve_id: u32,
    pub water_button_pin: u8,
    pub stop_button_pin: u8,
    pub health_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mqtt_host: env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            mqtt_port: parse_var("MQTT_PORT", 1883),
            topic_prefix: env::var("TOPIC_PREFIX").unwrap_or_else(|_| "garden".to_string()),
            garden_name: env::var("GARDEN_NAME").unwrap_or_else(|_| "garden".to_string()),
            valve_pins: env::var("VALVE_PINS")
                .ok()
                .and_then(|s| parse_pins(&s))
                .unwrap_or_else(|| vec![17]),
            relay_active_low: parse_var("RELAY_ACTIVE_LOW", true),
            default_water: Duration::from_millis(parse_var("DEFAULT_WATER_MS", 15_000)),
            manual_valve_id: parse_var("MANUAL_VALVE_ID", 0),
            water_button_pin: parse_var("WATER_BUTTON_PIN", 23),
            stop_button_pin: parse_var("STOP_BUTTON_PIN", 24),
            health_interval: Duration::from_secs(parse_var("HEALTH_INTERVAL_S", 60)),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse "17,27,22" into pin numbers. Returns None on any bad entry so a
/// typo falls back to the default rather than driving the wrong pin.
fn parse_pins(s: &str) -> Option<Vec<u8>> {
    let pins: Vec<u8> = s
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<Vec<u8>>>()?;
    if pins.is_empty() {
        None
    } else {
        Some(pins)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pins_single() {
        assert_eq!(parse_pins("17"), Some(vec![17]));
    }

    #[test]
    fn parse_pins_list_with_spaces() {
        assert_eq!(parse_pins("17, 27, 22"), Some(vec![17, 27, 22]));
    }

    #[test]
    fn parse_pins_rejects_garbage() {
        assert_eq!(parse_pins("17,abc"), None);
        assert_eq!(parse_pins(""), None);
    }
}
