//! Device records as reported by the server.
//!
//! Records arrive as loosely typed JSON. Parsing never fails: a missing or mistyped field is
//! replaced by its default and reported with a warning, so one bad payload cannot take down the
//! rest of a batch.

use std::collections::BTreeMap;

use serde_json::Value;
use strum::AsRefStr;
use strum::EnumIter;
use strum::EnumString;
use tracing::warn;

/// Device id of the air conditioner card.
pub const AIR_CONDITIONER: &str = "air_conditioner";

/// Device id of the living-room light card.
pub const LIGHT_LIVING: &str = "light_living";

/// Temperature shown when a record carries none.
pub const DEFAULT_TEMPERATURE: i64 = 26;

/// A set of device states received together from one source, keyed by device id.
pub type Batch = BTreeMap<String, Value>;

/// Device types the client knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    AirConditioner,
    Light,
}

impl DeviceKind {
    /// Map a device id to its kind. Unknown ids have no renderer.
    pub fn for_id(device_id: &str) -> Option<Self> {
        match device_id {
            AIR_CONDITIONER => Some(DeviceKind::AirConditioner),
            LIGHT_LIVING => Some(DeviceKind::Light),
            _ => None,
        }
    }
}

/// Air conditioner operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Cool,
    Heat,
    Fan,
    Off,
}

impl Mode {
    /// Status text used when the server sends no `mode_display`.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Cool => "Cooling",
            Mode::Heat => "Heating",
            Mode::Fan => "Fan",
            Mode::Off => "Stopped",
        }
    }

    pub fn button_label(self) -> &'static str {
        match self {
            Mode::Cool => "Cool",
            Mode::Heat => "Heat",
            Mode::Fan => "Fan",
            Mode::Off => "Off",
        }
    }

    /// CSS class carried by the card while in this mode.
    pub fn card_class(self) -> String {
        format!("mode-{}", self.as_ref())
    }
}

/// Air conditioner fan speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FanSpeed {
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub fn label(self) -> &'static str {
        match self {
            FanSpeed::Low => "Low",
            FanSpeed::Medium => "Medium",
            FanSpeed::High => "High",
        }
    }
}

/// Status text for a raw mode string: the built-in label for known modes, the raw value otherwise.
pub fn mode_label(mode: &str) -> &str {
    match mode.parse::<Mode>() {
        Ok(known) => known.label(),
        Err(_) => mode,
    }
}

/// State of the air conditioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirConditionerState {
    pub is_on: bool,

    /// Raw mode string; known values parse into [`Mode`]
    pub mode: Option<String>,

    /// Raw fan speed string; known values parse into [`FanSpeed`]
    pub fan_speed: Option<String>,

    pub temperature: i64,

    /// Pre-localized status label supplied by the server
    pub mode_display: Option<String>,
}

impl Default for AirConditionerState {
    fn default() -> Self {
        Self {
            is_on: false,
            mode: None,
            fan_speed: None,
            temperature: DEFAULT_TEMPERATURE,
            mode_display: None,
        }
    }
}

impl AirConditionerState {
    /// Parse a record, substituting defaults for anything missing or malformed.
    pub fn from_value(device_id: &str, value: &Value) -> Self {
        let mut state = Self::default();
        let Some(fields) = record_fields(device_id, value) else {
            return state;
        };

        state.is_on = read_power(device_id, fields);
        state.mode = read_string(device_id, fields, "mode");
        state.fan_speed = read_string(device_id, fields, "fan_speed");
        state.mode_display = read_string(device_id, fields, "mode_display");

        match fields.get("temperature") {
            None | Some(Value::Null) => {}
            Some(v) => match v.as_i64() {
                Some(t) => state.temperature = t,
                None => warn!(
                    "[{}] temperature is not an integer ({}), showing {}",
                    device_id, v, DEFAULT_TEMPERATURE
                ),
            },
        }

        state
    }

    pub fn parsed_mode(&self) -> Option<Mode> {
        self.mode.as_deref().and_then(|m| m.parse().ok())
    }

    /// Text for the status element.
    pub fn status_text(&self) -> String {
        if !self.is_on {
            return "Off".to_string();
        }
        if let Some(display) = &self.mode_display {
            return display.clone();
        }
        self.mode.as_deref().map(mode_label).unwrap_or("").to_string()
    }
}

/// State of a light.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightState {
    pub is_on: bool,
}

impl LightState {
    pub fn from_value(device_id: &str, value: &Value) -> Self {
        let mut state = Self::default();
        if let Some(fields) = record_fields(device_id, value) {
            state.is_on = read_power(device_id, fields);
        }
        state
    }
}

fn record_fields<'a>(
    device_id: &str,
    value: &'a Value,
) -> Option<&'a serde_json::Map<String, Value>> {
    let fields = value.as_object();
    if fields.is_none() {
        warn!(
            "[{}] device record is not an object ({}), using defaults",
            device_id, value
        );
    }
    fields
}

fn read_power(device_id: &str, fields: &serde_json::Map<String, Value>) -> bool {
    match fields.get("is_on").and_then(Value::as_bool) {
        Some(on) => on,
        None => {
            warn!("[{}] missing or invalid is_on, assuming off", device_id);
            false
        }
    }
}

fn read_string(
    device_id: &str,
    fields: &serde_json::Map<String, Value>,
    key: &str,
) -> Option<String> {
    match fields.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            warn!("[{}] {} is not a string ({}), ignoring", device_id, key, other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_device_kind_for_id() {
        assert_eq!(
            DeviceKind::for_id("air_conditioner"),
            Some(DeviceKind::AirConditioner)
        );
        assert_eq!(DeviceKind::for_id("light_living"), Some(DeviceKind::Light));
        assert_eq!(DeviceKind::for_id("garage_door"), None);
    }

    #[test]
    fn test_parse_full_air_conditioner() {
        let value = json!({
            "is_on": true,
            "mode": "heat",
            "fan_speed": "high",
            "temperature": 21,
            "mode_display": "Warming up"
        });
        let ac = AirConditionerState::from_value(AIR_CONDITIONER, &value);
        assert!(ac.is_on);
        assert_eq!(ac.parsed_mode(), Some(Mode::Heat));
        assert_eq!(ac.fan_speed.as_deref(), Some("high"));
        assert_eq!(ac.temperature, 21);
        assert_eq!(ac.status_text(), "Warming up");
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let ac = AirConditionerState::from_value(AIR_CONDITIONER, &json!({}));
        assert_eq!(ac, AirConditionerState::default());
        assert_eq!(ac.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(ac.status_text(), "Off");
    }

    #[test]
    fn test_mistyped_fields_fall_back_to_defaults() {
        let value = json!({ "is_on": "yes", "temperature": "hot", "mode": 3 });
        let ac = AirConditionerState::from_value(AIR_CONDITIONER, &value);
        assert!(!ac.is_on);
        assert_eq!(ac.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(ac.mode, None);
    }

    #[test]
    fn test_non_object_record() {
        let light = LightState::from_value(LIGHT_LIVING, &json!("broken"));
        assert!(!light.is_on);
    }

    #[test]
    fn test_zero_temperature_is_kept() {
        let ac = AirConditionerState::from_value(AIR_CONDITIONER, &json!({ "temperature": 0 }));
        assert_eq!(ac.temperature, 0);
    }

    #[test]
    fn test_status_text_uses_mode_label() {
        let ac = AirConditionerState {
            is_on: true,
            mode: Some("cool".to_string()),
            ..Default::default()
        };
        assert_eq!(ac.status_text(), "Cooling");

        let ac = AirConditionerState {
            is_on: true,
            mode: Some("dry".to_string()),
            ..Default::default()
        };
        assert_eq!(ac.status_text(), "dry");
    }
}
