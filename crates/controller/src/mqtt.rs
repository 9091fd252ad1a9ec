use serde::Deserialize;

// ---------------------------------------------------------------------------
// MQTT message types
// ---------------------------------------------------------------------------

/// Inbound watering command payload on `<prefix>/command/water`.
#[derive(Debug, Deserialize)]
pub(crate) struct WaterMessage {
    pub(crate) valve_id: u32,
    /// Watering time in milliseconds. Zero means "use the device default".
    pub(crate) duration: u64,
    pub(crate) id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Water,
    Stop,
    StopAll,
}

// ---------------------------------------------------------------------------
// Topic helpers
// ---------------------------------------------------------------------------

/// Classify "<prefix>/command/<kind>" topics. Anything else is None.
pub(crate) fn parse_command_topic(prefix: &str, topic: &str) -> Option<CommandKind> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    match rest {
        "command/water" => Some(CommandKind::Water),
        "command/stop" => Some(CommandKind::Stop),
        "command/stop_all" => Some(CommandKind::StopAll),
        _ => None,
    }
}

/// All topics the device must be subscribed to. Subscriptions do not
/// survive a clean-session reconnect, so these are re-issued on every
/// broker connect.
pub(crate) fn command_topics(prefix: &str) -> [String; 3] {
    [
        format!("{prefix}/command/water"),
        format!("{prefix}/command/stop"),
        format!("{prefix}/command/stop_all"),
    ]
}

pub(crate) fn water_data_topic(prefix: &str) -> String {
    format!("{prefix}/data/water")
}

pub(crate) fn health_data_topic(prefix: &str) -> String {
    format!("{prefix}/data/health")
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- parse_command_topic --------------------------------------------------

    #[test]
    fn parse_water_topic() {
        assert_eq!(
            parse_command_topic("garden", "garden/command/water"),
            Some(CommandKind::Water)
        );
    }

    #[test]
    fn parse_stop_topic() {
        assert_eq!(
            parse_command_topic("garden", "garden/command/stop"),
            Some(CommandKind::Stop)
        );
    }

    #[test]
    fn parse_stop_all_topic() {
        assert_eq!(
            parse_command_topic("garden", "garden/command/stop_all"),
            Some(CommandKind::StopAll)
        );
    }

    #[test]
    fn wrong_prefix_is_ignored() {
        assert_eq!(parse_command_topic("garden", "other/command/water"), None);
    }

    #[test]
    fn unknown_command_is_ignored() {
        assert_eq!(parse_command_topic("garden", "garden/command/reboot"), None);
    }

    #[test]
    fn prefix_must_be_a_full_segment() {
        assert_eq!(parse_command_topic("garden", "gardenextra/command/water"), None);
    }

    #[test]
    fn command_topics_round_trip_through_parser() {
        let [water, stop, stop_all] = command_topics("garden");
        assert_eq!(parse_command_topic("garden", &water), Some(CommandKind::Water));
        assert_eq!(parse_command_topic("garden", &stop), Some(CommandKind::Stop));
        assert_eq!(
            parse_command_topic("garden", &stop_all),
            Some(CommandKind::StopAll)
        );
    }

    #[test]
    fn data_topics_are_under_prefix() {
        assert_eq!(water_data_topic("garden"), "garden/data/water");
        assert_eq!(health_data_topic("garden"), "garden/data/health");
    }

    // -- WaterMessage ----------------------------------------------------------

    #[test]
    fn water_message_parses() {
        let msg: WaterMessage =
            serde_json::from_str(r#"{"valve_id": 2, "duration": 15000, "id": "abc"}"#).unwrap();
        assert_eq!(msg.valve_id, 2);
        assert_eq!(msg.duration, 15000);
        assert_eq!(msg.id, "abc");
    }

    #[test]
    fn water_message_rejects_missing_fields() {
        assert!(serde_json::from_str::<WaterMessage>(r#"{"valve_id": 2}"#).is_err());
    }
}
