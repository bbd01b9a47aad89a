use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::connection::ConnectionTracker;
use super::snapshot::Classification;
use super::snapshot::SnapshotCache;
use super::snapshot::canonical_json;
use crate::device::Batch;
use crate::document::Document;
use crate::render::Renderers;

const LAST_UPDATE_ELEMENT: &str = "last-update";

/// Where a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BatchSource {
    /// Bulk state pushed when the channel connects
    InitialState,
    /// Single device pushed by the server
    DeviceUpdate,
    /// Scheduled full-state fetch
    Poll,
    /// Full-state fetch after the push channel reconnected
    Resync,
    /// Full-state fetch after a manual HTTP sync
    ManualSync,
}

impl BatchSource {
    /// Initial state is a fresh full sync and never flashes; everything else flashes real changes.
    pub fn flashes_changes(self) -> bool {
        !matches!(self, BatchSource::InitialState)
    }
}

/// Result of one [`Reconciler::ingest_batch`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Classification per device id, in batch order
    pub outcomes: Vec<(String, Classification)>,

    /// Devices rendered with the highlight
    pub flashed: Vec<String>,

    /// Devices that were classified FirstSeen or Changed but could not be rendered
    pub render_failures: Vec<String>,

    /// Whether the last-update display was written
    pub timestamp_written: bool,
}

impl ReconcileReport {
    pub fn changed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, c)| *c != Classification::Unchanged)
            .count()
    }

    pub fn classification(&self, device_id: &str) -> Option<Classification> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == device_id)
            .map(|(_, c)| *c)
    }
}

/// Merges device state from every source into the document.
///
/// Owns the snapshot cache and the connection tracker. All ingestion goes through
/// [`Reconciler::ingest_batch`], so push events and polls are deduplicated identically.
pub struct Reconciler {
    cache: SnapshotCache,
    connection: ConnectionTracker,
    renderers: Renderers,
}

impl Reconciler {
    pub fn new(renderers: Renderers) -> Self {
        Self {
            cache: SnapshotCache::new(),
            connection: ConnectionTracker::new(),
            renderers,
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn connected(&self) -> Option<bool> {
        self.connection.connected()
    }

    /// Classify every device in `batch`, render the ones that changed and, if anything did,
    /// stamp the last-update display once.
    pub fn ingest_batch(
        &mut self,
        doc: &mut Document,
        source: BatchSource,
        batch: &Batch,
        now: Instant,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (device_id, state) in batch {
            let classification =
                self.reconcile_device(doc, source, device_id, state, now, &mut report);
            report.outcomes.push((device_id.clone(), classification));
        }

        if report.changed_count() > 0 {
            self.write_timestamp(doc);
            report.timestamp_written = true;
        }

        report
    }

    fn reconcile_device(
        &mut self,
        doc: &mut Document,
        source: BatchSource,
        device_id: &str,
        state: &Value,
        now: Instant,
        report: &mut ReconcileReport,
    ) -> Classification {
        let serialized = canonical_json(state);
        let classification = self.cache.classify(device_id, &serialized);
        debug!("[{}] {} from {}", device_id, classification, source);

        if classification == Classification::Unchanged {
            return classification;
        }

        self.cache.store(device_id, serialized);

        let flash = classification == Classification::Changed && source.flashes_changes();
        if flash {
            info!("[{}] state changed ({})", device_id, source);
        }

        let Some(renderer) = self.renderers.for_device(device_id) else {
            debug!("[{}] no renderer for device, not displayed", device_id);
            return classification;
        };

        match renderer.render(doc, device_id, state, flash) {
            Ok(()) => {
                if flash {
                    self.cache
                        .arm_flash(device_id, now + renderer.flash_duration());
                    report.flashed.push(device_id.to_string());
                }
            }
            Err(e) => {
                warn!("[{}] render skipped: {}", device_id, e);
                report.render_failures.push(device_id.to_string());
            }
        }

        classification
    }

    fn write_timestamp(&self, doc: &mut Document) {
        match doc.get_element_by_id(LAST_UPDATE_ELEMENT) {
            Some(el) => {
                let now = chrono::Local::now().format("%H:%M:%S");
                doc.set_text(el, &format!("Last updated: {}", now));
            }
            None => warn!("Element #{} not found, timestamp not shown", LAST_UPDATE_ELEMENT),
        }
    }

    /// Record a connectivity report; the badge is only written when the value flips.
    pub fn set_connected(&mut self, doc: &mut Document, connected: bool) -> bool {
        self.connection.update(doc, connected)
    }

    pub fn next_flash_deadline(&self) -> Option<Instant> {
        self.cache.next_flash_deadline()
    }

    /// Remove highlights whose deadline has passed. Returns how many were cleared.
    pub fn expire_flashes(&mut self, doc: &mut Document, now: Instant) -> usize {
        let expired = self.cache.take_expired_flashes(now);
        for device_id in &expired {
            let Some(renderer) = self.renderers.for_device(device_id) else {
                continue;
            };
            if let Err(e) = renderer.clear_flash(doc, device_id) {
                warn!("[{}] could not clear highlight: {}", device_id, e);
            }
        }
        expired.len()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Renderers::default())
    }
}
