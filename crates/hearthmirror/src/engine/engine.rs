use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::event::Fetched;
use super::reconciler::BatchSource;
use super::reconciler::ReconcileReport;
use super::reconciler::Reconciler;
use crate::api::DeviceApi;
use crate::channel::ChannelEvent;
use crate::channel::PushChannel;
use crate::device::Batch;
use crate::document::Document;
use crate::keys::Command;
use crate::poll::spawn_poll_loop;
use crate::render::Renderers;

/// Capacity for the fetch-result channel shared by the poll loop and one-off fetches
const FETCH_CHANNEL_SIZE: usize = 64;

type Presenter = Box<dyn FnMut(&Document) + Send>;

/// hearthmirror engine
///
/// Owns the document and the reconciler, and funnels every source of device state through one
/// loop: push channel events, poll results, one-off fetches, user commands and flash expiry.
pub struct Engine<C: PushChannel> {
    document: Document,
    reconciler: Reconciler,

    channel: C,

    /// Cleared once the channel reports it has shut down for good
    channel_open: bool,

    api: Arc<dyn DeviceApi>,

    /// Fetch results from the poll loop and spawned fetches
    fetch_tx: mpsc::Sender<Fetched>,
    fetch_rx: mpsc::Receiver<Fetched>,

    /// Called after any step that wrote to the document
    presenter: Option<Presenter>,
    presented_writes: Option<usize>,
}

impl<C: PushChannel> Engine<C> {
    pub fn new(channel: C, api: Arc<dyn DeviceApi>, renderers: Renderers) -> Self {
        let (fetch_tx, fetch_rx) = mpsc::channel(FETCH_CHANNEL_SIZE);
        Self {
            document: Document::dashboard(),
            reconciler: Reconciler::new(renderers),
            channel,
            channel_open: true,
            api,
            fetch_tx,
            fetch_rx,
            presenter: None,
            presented_writes: None,
        }
    }

    pub fn with_presenter(mut self, presenter: impl FnMut(&Document) + Send + 'static) -> Self {
        self.presenter = Some(Box::new(presenter));
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Run the engine's main event loop until a quit command arrives or the command sender is
    /// dropped.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>, poll_period: Duration) {
        info!("Engine starting");

        let poll = spawn_poll_loop(self.api.clone(), poll_period, self.fetch_tx.clone());
        self.present();

        loop {
            let deadline = self.reconciler.next_flash_deadline();

            tokio::select! {
                event = self.channel.next_event(), if self.channel_open => match event {
                    Some(event) => self.handle_channel_event(event),
                    None => {
                        warn!("Push channel closed, continuing with polling only");
                        self.channel_open = false;
                    }
                },
                Some(fetched) = self.fetch_rx.recv() => self.handle_fetched(fetched),
                command = commands.recv() => match command {
                    Some(Command::Sync(device_id)) => self.request_sync(device_id),
                    Some(Command::Quit) | None => break,
                },
                _ = flash_expiry(deadline) => {
                    let cleared = self
                        .reconciler
                        .expire_flashes(&mut self.document, Instant::now());
                    debug!("Cleared {} highlights", cleared);
                }
            }

            self.present();
        }

        poll.abort();
        info!("Engine shutting down");
    }

    fn ingest(&mut self, source: BatchSource, batch: &Batch) -> ReconcileReport {
        let report = self
            .reconciler
            .ingest_batch(&mut self.document, source, batch, Instant::now());
        if report.changed_count() > 0 {
            debug!(
                "{}: {} of {} devices changed",
                source,
                report.changed_count(),
                report.outcomes.len()
            );
        }
        report
    }

    /// Handle one event from the push channel
    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connectivity(connected) => {
                self.reconciler.set_connected(&mut self.document, connected);
            }
            ChannelEvent::Status { status, message } => {
                info!(
                    "Server status: {} ({})",
                    status,
                    message.as_deref().unwrap_or("no message")
                );
            }
            ChannelEvent::InitialState(devices) => {
                info!("Received initial state for {} devices", devices.len());
                self.ingest(BatchSource::InitialState, &devices);
            }
            ChannelEvent::DeviceUpdate { device_id, device } => {
                let mut batch = Batch::new();
                batch.insert(device_id, device);
                self.ingest(BatchSource::DeviceUpdate, &batch);
            }
            ChannelEvent::Reconnected => {
                info!("Push channel reconnected, resyncing");
                self.spawn_fetch(BatchSource::Resync);
            }
            ChannelEvent::ReconnectFailed => {
                error!("Push channel reconnection failed, relying on polling");
            }
        }
    }

    /// Handle the result of a full-state fetch
    pub fn handle_fetched(&mut self, fetched: Fetched) {
        let Fetched { source, result } = fetched;
        match result {
            Ok(devices) => {
                self.ingest(source, &devices);
                self.reconciler.set_connected(&mut self.document, true);
            }
            Err(e) if e.is_unreachable() => {
                if self.reconciler.set_connected(&mut self.document, false) {
                    warn!("{} fetch failed, server unreachable: {}", source, e);
                } else {
                    debug!("{} fetch failed: {}", source, e);
                }
            }
            Err(e) => debug!("{} fetch failed: {}", source, e),
        }
    }

    /// Ask the server to resync `device_id` (or everything). Goes over the push channel when it
    /// is up, otherwise over HTTP followed by a full fetch.
    pub fn request_sync(&mut self, device_id: Option<String>) {
        info!(
            "Requesting sync for {}",
            device_id.as_deref().unwrap_or("all devices")
        );

        if self.channel.is_connected() {
            match self.channel.request_sync(device_id.clone()) {
                Ok(()) => return,
                Err(e) => warn!("Push channel sync failed ({}), falling back to HTTP", e),
            }
        } else {
            debug!("Push channel not connected, syncing over HTTP");
        }

        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            match api.request_sync(device_id.as_deref()).await {
                Ok(response) if response.success => {
                    info!("Sync succeeded: {}", response.message);
                    let result = api.fetch_devices().await;
                    let fetched = Fetched {
                        source: BatchSource::ManualSync,
                        result,
                    };
                    let _ = tx.send(fetched).await;
                }
                Ok(response) => warn!("Sync rejected by server: {}", response.message),
                Err(e) => error!("Sync request failed: {}", e),
            }
        });
    }

    fn spawn_fetch(&self, source: BatchSource) {
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_devices().await;
            let _ = tx.send(Fetched { source, result }).await;
        });
    }

    fn present(&mut self) {
        let writes = self.document.writes();
        if self.presented_writes == Some(writes) {
            return;
        }
        self.presented_writes = Some(writes);
        if let Some(presenter) = self.presenter.as_mut() {
            presenter(&self.document);
        }
    }
}

/// Resolves at `deadline`, or never when there is nothing to expire.
async fn flash_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::api::ApiError;
    use crate::api::MockDeviceApi;
    use crate::channel::MockPushChannel;
    use crate::device::AIR_CONDITIONER;
    use crate::device::LIGHT_LIVING;

    fn batch(ac_on: bool, light_on: bool) -> Batch {
        let mut batch = Batch::new();
        batch.insert(
            AIR_CONDITIONER.to_string(),
            json!({ "is_on": ac_on, "mode": "cool", "fan_speed": "low", "temperature": 24 }),
        );
        batch.insert(LIGHT_LIVING.to_string(), json!({ "is_on": light_on }));
        batch
    }

    fn engine(channel: MockPushChannel, api: Arc<MockDeviceApi>) -> Engine<MockPushChannel> {
        Engine::new(channel, api, Renderers::default())
    }

    fn highlighted(engine: &Engine<MockPushChannel>, id: &str) -> bool {
        let doc = engine.document();
        let el = doc.get_element_by_id(id).unwrap();
        doc.has_class(el, "highlight")
    }

    #[tokio::test]
    async fn test_disconnect_then_reconnect_resyncs() {
        let api = Arc::new(MockDeviceApi::new());
        // Light was switched on while the channel was down
        api.push_fetch(Ok(batch(false, true)));
        let mut engine = engine(MockPushChannel::default(), api);

        engine.handle_channel_event(ChannelEvent::Connectivity(true));
        engine.handle_channel_event(ChannelEvent::InitialState(batch(false, false)));
        assert!(!highlighted(&engine, AIR_CONDITIONER));
        assert!(!highlighted(&engine, LIGHT_LIVING));

        engine.handle_channel_event(ChannelEvent::Connectivity(false));
        assert_eq!(engine.reconciler().connected(), Some(false));
        engine.handle_channel_event(ChannelEvent::Connectivity(true));
        engine.handle_channel_event(ChannelEvent::Reconnected);

        let fetched = engine.fetch_rx.recv().await.unwrap();
        assert_eq!(fetched.source, BatchSource::Resync);
        engine.handle_fetched(fetched);

        assert!(highlighted(&engine, LIGHT_LIVING));
        assert!(!highlighted(&engine, AIR_CONDITIONER));
        assert_eq!(engine.reconciler().connected(), Some(true));
        // connected, disconnected, connected: text and class written once each
        assert_eq!(engine.document().writes_to("connection-status"), 6);
    }

    #[tokio::test]
    async fn test_device_update_flashes_only_that_card() {
        let api = Arc::new(MockDeviceApi::new());
        let mut engine = engine(MockPushChannel::default(), api);
        engine.handle_channel_event(ChannelEvent::InitialState(batch(false, false)));

        engine.handle_channel_event(ChannelEvent::DeviceUpdate {
            device_id: AIR_CONDITIONER.to_string(),
            device: batch(true, false)[AIR_CONDITIONER].clone(),
        });
        assert!(highlighted(&engine, AIR_CONDITIONER));
        assert!(!highlighted(&engine, LIGHT_LIVING));

        // Same record again is a no-op
        let writes = engine.document().writes();
        engine.handle_channel_event(ChannelEvent::DeviceUpdate {
            device_id: AIR_CONDITIONER.to_string(),
            device: batch(true, false)[AIR_CONDITIONER].clone(),
        });
        assert_eq!(engine.document().writes(), writes);
    }

    #[tokio::test]
    async fn test_failed_poll_marks_disconnected() {
        let api = Arc::new(MockDeviceApi::new());
        let mut engine = engine(MockPushChannel::default(), api);

        engine.handle_fetched(Fetched {
            source: BatchSource::Poll,
            result: Err(ApiError::Status(502)),
        });
        assert_eq!(engine.reconciler().connected(), Some(false));
        assert!(engine.reconciler().cache().is_empty());

        // A refusal is not a connectivity signal
        engine.handle_fetched(Fetched {
            source: BatchSource::Poll,
            result: Ok(batch(false, false)),
        });
        engine.handle_fetched(Fetched {
            source: BatchSource::Poll,
            result: Err(ApiError::Rejected),
        });
        assert_eq!(engine.reconciler().connected(), Some(true));
        assert_eq!(engine.reconciler().cache().len(), 2);
    }

    #[tokio::test]
    async fn test_sync_uses_push_channel_when_connected() {
        let api = Arc::new(MockDeviceApi::new());
        let channel = MockPushChannel {
            connected: true,
            ..Default::default()
        };
        let mut engine = engine(channel, api.clone());

        engine.request_sync(None);
        assert_eq!(engine.channel.sync_requests, vec![None]);
        assert!(api.sync_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_falls_back_to_http() {
        let api = Arc::new(MockDeviceApi {
            sync_success: true,
            ..Default::default()
        });
        api.push_fetch(Ok(batch(false, true)));
        let mut engine = engine(MockPushChannel::default(), api.clone());

        engine.request_sync(Some(LIGHT_LIVING.to_string()));

        let fetched = engine.fetch_rx.recv().await.unwrap();
        assert_eq!(fetched.source, BatchSource::ManualSync);
        engine.handle_fetched(fetched);

        assert_eq!(
            *api.sync_requests.lock().unwrap(),
            vec![Some(LIGHT_LIVING.to_string())]
        );
        let doc = engine.document();
        let status = doc.get_element_by_id("light-living-status").unwrap();
        assert_eq!(doc.element(status).text, "On");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_renders_and_expires_flashes() {
        let api = Arc::new(MockDeviceApi::new());
        for _ in 0..10 {
            api.push_fetch(Ok(batch(false, true)));
        }
        let channel = MockPushChannel {
            events: [
                ChannelEvent::Connectivity(true),
                ChannelEvent::InitialState(batch(false, false)),
                ChannelEvent::DeviceUpdate {
                    device_id: LIGHT_LIVING.to_string(),
                    device: json!({ "is_on": true }),
                },
            ]
            .into(),
            connected: true,
            ..Default::default()
        };

        let presented = Arc::new(AtomicUsize::new(0));
        let counter = presented.clone();
        let mut engine = engine(channel, api).with_presenter(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let _ = tx.send(Command::Quit).await;
        });

        engine.run(rx, Duration::from_secs(1)).await;

        let doc = engine.document();
        let status = doc.get_element_by_id("light-living-status").unwrap();
        assert_eq!(doc.element(status).text, "On");
        assert!(!highlighted(&engine, LIGHT_LIVING));
        assert!(!highlighted(&engine, AIR_CONDITIONER));
        assert_eq!(engine.reconciler().connected(), Some(true));
        assert_eq!(engine.reconciler().cache().len(), 2);
        assert!(presented.load(Ordering::SeqCst) > 0);
    }
}
