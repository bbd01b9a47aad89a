//! Device renderers.
//!
//! A renderer maps one device record onto the document. Renderers keep no state of their own:
//! rendering the same record twice without a flash leaves the document exactly as it was after
//! the first call. Removing a flash highlight is a separate call scheduled by the reconciler.

mod air_conditioner;
mod light;

use std::time::Duration;

use serde_json::Value;

pub use air_conditioner::AirConditionerRenderer;
pub use light::LightRenderer;

use crate::config::FlashConfig;
use crate::device::DeviceKind;
use crate::document::Document;
use crate::document::RenderError;

/// Renders one device type.
pub trait DeviceRenderer: Send + Sync {
    /// Apply `state` to the document, adding the highlight marker when `flash` is set.
    fn render(
        &self,
        doc: &mut Document,
        device_id: &str,
        state: &Value,
        flash: bool,
    ) -> Result<(), RenderError>;

    /// Remove the highlight marker added by a flashing render.
    fn clear_flash(&self, doc: &mut Document, device_id: &str) -> Result<(), RenderError>;

    /// How long the highlight stays on.
    fn flash_duration(&self) -> Duration;
}

/// Renderer lookup by device id.
pub struct Renderers {
    air_conditioner: AirConditionerRenderer,
    light: LightRenderer,
}

impl Renderers {
    pub fn new(flash: &FlashConfig) -> Self {
        Self {
            air_conditioner: AirConditionerRenderer::new(flash.air_conditioner()),
            light: LightRenderer::new(flash.light()),
        }
    }

    /// Renderer for `device_id`, or `None` for ids the client does not display.
    pub fn for_device(&self, device_id: &str) -> Option<&dyn DeviceRenderer> {
        match DeviceKind::for_id(device_id)? {
            DeviceKind::AirConditioner => Some(&self.air_conditioner),
            DeviceKind::Light => Some(&self.light),
        }
    }
}

impl Default for Renderers {
    fn default() -> Self {
        Self::new(&FlashConfig::default())
    }
}
