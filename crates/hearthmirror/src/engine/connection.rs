use tracing::info;
use tracing::warn;

use crate::document::Document;

const STATUS_ELEMENT: &str = "connection-status";

/// Last known connectivity, shown in the status badge.
///
/// The badge is only written when the value actually flips.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    last: Option<bool>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until the first report arrives.
    pub fn connected(&self) -> Option<bool> {
        self.last
    }

    /// Record a connectivity report. Returns whether the state changed.
    pub fn update(&mut self, doc: &mut Document, connected: bool) -> bool {
        if self.last == Some(connected) {
            return false;
        }
        self.last = Some(connected);
        info!(
            "Connection status: {}",
            if connected { "connected" } else { "disconnected" }
        );

        match doc.get_element_by_id(STATUS_ELEMENT) {
            Some(badge) => {
                if connected {
                    doc.set_text(badge, "● Connected");
                    doc.set_class_name(badge, "status-badge connected");
                } else {
                    doc.set_text(badge, "● Disconnected");
                    doc.set_class_name(badge, "status-badge disconnected");
                }
            }
            None => warn!("Element #{} not found, status not shown", STATUS_ELEMENT),
        }

        true
    }
}
