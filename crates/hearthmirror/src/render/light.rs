use std::time::Duration;

use serde_json::Value;

use super::DeviceRenderer;
use crate::device::LightState;
use crate::document::Document;
use crate::document::RenderError;

/// Renders a light card.
///
/// Sub-element ids are derived from the device id with `_` replaced by `-`, so `light_living`
/// owns `light-living-status`, `light-living-bar` and so on.
#[derive(Debug, Clone)]
pub struct LightRenderer {
    flash_duration: Duration,
}

impl LightRenderer {
    pub fn new(flash_duration: Duration) -> Self {
        Self { flash_duration }
    }
}

fn element_prefix(device_id: &str) -> String {
    device_id.replace('_', "-")
}

impl DeviceRenderer for LightRenderer {
    fn render(
        &self,
        doc: &mut Document,
        device_id: &str,
        state: &Value,
        flash: bool,
    ) -> Result<(), RenderError> {
        let prefix = element_prefix(device_id);
        let card = doc.require(device_id)?;
        let status = doc.require(&format!("{}-status", prefix))?;
        let power = doc.get_element_by_id(&format!("{}-power-indicator", prefix));
        let bar = doc.get_element_by_id(&format!("{}-bar", prefix));

        let light = LightState::from_value(device_id, state);

        if let Some(power) = power {
            doc.toggle_class(power, "on", light.is_on);
        }

        doc.set_text(status, if light.is_on { "On" } else { "Off" });
        doc.set_class_name(
            status,
            if light.is_on {
                "device-status on"
            } else {
                "device-status"
            },
        );

        doc.toggle_class(card, "active", light.is_on);

        if let Some(bar) = bar {
            doc.remove_class(bar, "on");
            doc.remove_class(bar, "off");
            if light.is_on {
                doc.add_class(bar, "on");
                doc.set_style(bar, "width", "100%");
            } else {
                doc.add_class(bar, "off");
                doc.set_style(bar, "width", "0%");
            }
        }

        if flash {
            doc.add_class(card, "highlight");
        }

        Ok(())
    }

    fn clear_flash(&self, doc: &mut Document, device_id: &str) -> Result<(), RenderError> {
        let card = doc.require(device_id)?;
        doc.remove_class(card, "highlight");
        Ok(())
    }

    fn flash_duration(&self) -> Duration {
        self.flash_duration
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::document::Element;

    fn renderer() -> LightRenderer {
        LightRenderer::new(Duration::from_millis(1000))
    }

    #[test]
    fn test_render_on() {
        let mut doc = Document::dashboard();
        renderer()
            .render(&mut doc, "light_living", &json!({ "is_on": true }), false)
            .unwrap();

        let card = doc.require("light_living").unwrap();
        assert!(doc.has_class(card, "active"));

        let status = doc.require("light-living-status").unwrap();
        assert_eq!(doc.element(status).text, "On");
        assert!(doc.has_class(status, "on"));

        let power = doc.require("light-living-power-indicator").unwrap();
        assert!(doc.has_class(power, "on"));

        let bar = doc.require("light-living-bar").unwrap();
        assert!(doc.has_class(bar, "on"));
        assert!(!doc.has_class(bar, "off"));
        assert_eq!(doc.element(bar).style["width"], "100%");
    }

    #[test]
    fn test_render_off_after_on() {
        let mut doc = Document::dashboard();
        let r = renderer();
        r.render(&mut doc, "light_living", &json!({ "is_on": true }), false)
            .unwrap();
        r.render(&mut doc, "light_living", &json!({ "is_on": false }), false)
            .unwrap();

        let card = doc.require("light_living").unwrap();
        assert!(!doc.has_class(card, "active"));
        let bar = doc.require("light-living-bar").unwrap();
        assert!(doc.has_class(bar, "off"));
        assert!(!doc.has_class(bar, "on"));
        assert_eq!(doc.element(bar).style["width"], "0%");
    }

    #[test]
    fn test_optional_elements_may_be_absent() {
        let mut doc = Document::new();
        let card = doc.append(None, Element::new().with_id("light_living"));
        doc.append(Some(card), Element::new().with_id("light-living-status"));

        renderer()
            .render(&mut doc, "light_living", &json!({ "is_on": true }), true)
            .unwrap();
        assert!(doc.has_class(card, "highlight"));
    }

    #[test]
    fn test_missing_status_is_an_error() {
        let mut doc = Document::new();
        doc.append(None, Element::new().with_id("light_living"));

        let err = renderer()
            .render(&mut doc, "light_living", &json!({ "is_on": true }), false)
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingElement("light-living-status".to_string())
        );
    }

    #[test]
    fn test_clear_flash() {
        let mut doc = Document::dashboard();
        let r = renderer();
        r.render(&mut doc, "light_living", &json!({ "is_on": false }), true)
            .unwrap();
        r.clear_flash(&mut doc, "light_living").unwrap();
        let card = doc.require("light_living").unwrap();
        assert!(!doc.has_class(card, "highlight"));
    }
}
