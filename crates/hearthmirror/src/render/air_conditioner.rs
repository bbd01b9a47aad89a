use std::time::Duration;

use serde_json::Value;
use strum::IntoEnumIterator;

use super::DeviceRenderer;
use crate::device::AirConditionerState;
use crate::device::Mode;
use crate::document::Document;
use crate::document::ElementRef;
use crate::document::RenderError;

const POWER_INDICATOR: &str = "ac-power-indicator";
const STATUS: &str = "ac-status";
const CONTROLS: &str = "ac-controls";
const TEMPERATURE: &str = "ac-temp";

/// Renders the air conditioner card.
#[derive(Debug, Clone)]
pub struct AirConditionerRenderer {
    flash_duration: Duration,
}

impl AirConditionerRenderer {
    pub fn new(flash_duration: Duration) -> Self {
        Self { flash_duration }
    }
}

impl DeviceRenderer for AirConditionerRenderer {
    fn render(
        &self,
        doc: &mut Document,
        device_id: &str,
        state: &Value,
        flash: bool,
    ) -> Result<(), RenderError> {
        let card = doc.require(device_id)?;
        let power = doc.require(POWER_INDICATOR)?;
        let status = doc.require(STATUS)?;
        let controls = doc.require(CONTROLS)?;
        let temperature = doc.get_element_by_id(TEMPERATURE);

        let ac = AirConditionerState::from_value(device_id, state);

        doc.toggle_class(power, "on", ac.is_on);

        doc.set_text(status, &ac.status_text());
        doc.set_class_name(
            status,
            if ac.is_on {
                "device-status on"
            } else {
                "device-status"
            },
        );

        // Card carries at most one mode class, and only while running
        for mode in Mode::iter() {
            doc.remove_class(card, &mode.card_class());
        }
        doc.toggle_class(card, "active", ac.is_on);
        doc.toggle_class(controls, "active", ac.is_on);
        if ac.is_on {
            if let Some(mode) = ac.parsed_mode() {
                doc.add_class(card, &mode.card_class());
            }
        }

        if let Some(temperature) = temperature {
            doc.set_text(temperature, &ac.temperature.to_string());
        }

        select_buttons(doc, card, "mode-btn", "mode", ac.mode.as_deref());
        select_buttons(doc, card, "fan-btn", "speed", ac.fan_speed.as_deref());

        if flash {
            doc.add_class(card, "highlight");
            doc.add_class(power, "pulse");
        }

        Ok(())
    }

    fn clear_flash(&self, doc: &mut Document, device_id: &str) -> Result<(), RenderError> {
        let card = doc.require(device_id)?;
        doc.remove_class(card, "highlight");
        if let Some(power) = doc.get_element_by_id(POWER_INDICATOR) {
            doc.remove_class(power, "pulse");
        }
        Ok(())
    }

    fn flash_duration(&self) -> Duration {
        self.flash_duration
    }
}

/// Mark the buttons of `class` under `card` active iff their `data-<key>` equals `selected`.
fn select_buttons(
    doc: &mut Document,
    card: ElementRef,
    class: &str,
    key: &str,
    selected: Option<&str>,
) {
    for btn in doc.query_within(card, class) {
        let active = selected.is_some()
            && doc.element(btn).data.get(key).map(String::as_str) == selected;
        doc.toggle_class(btn, "active", active);
    }
}
