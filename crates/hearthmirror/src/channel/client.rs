use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rust_socketio::Event;
use rust_socketio::Payload;
use rust_socketio::asynchronous::Client;
use rust_socketio::asynchronous::ClientBuilder;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use url::Url;

use super::protocol;
use super::protocol::ClientMessage;
use super::protocol::ServerEvent;
use crate::config::ChannelConfig;
use crate::device::Batch;

/// Events the push channel delivers to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The socket opened (`true`) or dropped (`false`)
    Connectivity(bool),

    /// Server greeting, informational only
    Status {
        status: String,
        message: Option<String>,
    },

    /// Full state of every device
    InitialState(Batch),

    /// Fresh state of one device
    DeviceUpdate { device_id: String, device: Value },

    /// The socket came back after a disconnect
    Reconnected,

    /// Reconnection attempts are exhausted; the channel stays down
    ReconnectFailed,
}

impl From<ServerEvent> for ChannelEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::ConnectionStatus { status, message } => {
                ChannelEvent::Status { status, message }
            }
            ServerEvent::InitialState { devices } => ChannelEvent::InitialState(devices),
            ServerEvent::DeviceUpdate {
                device_id, device, ..
            } => ChannelEvent::DeviceUpdate { device_id, device },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("push channel is not connected")]
    NotConnected,

    #[error("push channel task has stopped")]
    Closed,
}

/// Trait for push channel operations
///
/// This trait allows for mocking the channel for testing purposes
#[async_trait]
pub trait PushChannel: Send {
    /// Wait for the next event. Returns None once the channel has shut down for good.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Ask the server to push fresh state for one device, or all devices
    fn request_sync(&mut self, device_id: Option<String>) -> Result<(), ChannelError>;

    fn is_connected(&self) -> bool;
}

/// Mock push channel for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockPushChannel {
    pub events: std::collections::VecDeque<ChannelEvent>,
    pub sync_requests: Vec<Option<String>>,
    pub connected: bool,
}

#[cfg(test)]
#[async_trait]
impl PushChannel for MockPushChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        match self.events.pop_front() {
            Some(event) => Some(event),
            None => std::future::pending().await,
        }
    }

    fn request_sync(&mut self, device_id: Option<String>) -> Result<(), ChannelError> {
        if !self.connected {
            return Err(ChannelError::NotConnected);
        }
        self.sync_requests.push(device_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Push channel over Socket.IO
///
/// `rust_socketio` owns the session and reconnects it; its callbacks translate into
/// [`ChannelEvent`]s. A background task holds the client and emits outbound messages.
pub struct SocketIoChannel {
    events_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    outbound_tx: mpsc::UnboundedSender<ClientMessage>,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SocketIoChannel {
    /// Start connecting to `url` in the background
    pub fn spawn(url: Url, config: &ChannelConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handlers = Handlers::new(events_tx, config);
        let connected = handlers.connected.clone();

        let task = tokio::spawn(connection_task(url, config.clone(), handlers, outbound_rx));

        Self {
            events_rx,
            outbound_tx,
            connected,
            task: Some(task),
        }
    }
}

#[async_trait]
impl PushChannel for SocketIoChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events_rx.recv().await
    }

    fn request_sync(&mut self, device_id: Option<String>) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        self.outbound_tx
            .send(ClientMessage::RequestSync { device_id })
            .map_err(|_| ChannelError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// State shared by the Socket.IO callbacks
#[derive(Clone)]
struct Handlers {
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    connected: Arc<AtomicBool>,
    ever_connected: Arc<AtomicBool>,

    /// Bumped on every open and close
    generation: Arc<AtomicU64>,

    /// How long after a close to wait for an open before giving up
    give_up_after: Duration,
}

impl Handlers {
    fn new(events_tx: mpsc::UnboundedSender<ChannelEvent>, config: &ChannelConfig) -> Self {
        Self {
            events_tx,
            connected: Arc::new(AtomicBool::new(false)),
            ever_connected: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            give_up_after: config.reconnect_delay() * (config.reconnect_attempts + 1),
        }
    }

    fn builder(&self, url: &Url, config: &ChannelConfig) -> ClientBuilder {
        let attempts = u8::try_from(config.reconnect_attempts).unwrap_or(u8::MAX);
        let on_open = self.clone();
        let on_close = self.clone();

        ClientBuilder::new(url.as_str())
            .reconnect(true)
            .reconnect_on_disconnect(true)
            .reconnect_delay(config.reconnect_delay_ms, config.reconnect_delay_ms)
            .max_reconnect_attempts(attempts)
            .on(Event::Connect, move |_: Payload, _: Client| {
                on_open.opened();
                async {}.boxed()
            })
            .on(Event::Close, move |_: Payload, _: Client| {
                on_close.closed();
                async {}.boxed()
            })
            .on(Event::Error, |payload: Payload, _: Client| {
                warn!("Push channel error: {:?}", payload);
                async {}.boxed()
            })
            .on(protocol::CONNECTION_STATUS, self.forward(protocol::CONNECTION_STATUS))
            .on(protocol::INITIAL_STATE, self.forward(protocol::INITIAL_STATE))
            .on(protocol::DEVICE_UPDATE, self.forward(protocol::DEVICE_UPDATE))
    }

    fn send(&self, event: ChannelEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Push channel receiver gone, dropping event");
        }
    }

    fn opened(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        info!("Push channel connected");
        self.send(ChannelEvent::Connectivity(true));
        if self.ever_connected.swap(true, Ordering::SeqCst) {
            self.send(ChannelEvent::Reconnected);
        }
    }

    fn closed(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        warn!("Push channel disconnected");
        self.send(ChannelEvent::Connectivity(false));

        // The client reconnects on its own but never reports giving up
        let handlers = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(handlers.give_up_after).await;
            if handlers.generation.load(Ordering::SeqCst) == generation {
                error!("Push channel did not come back after {:?}", handlers.give_up_after);
                handlers.send(ChannelEvent::ReconnectFailed);
            }
        });
    }

    fn server_event(&self, event: &str, payload: Payload) {
        match payload {
            Payload::Text(args) => match ServerEvent::decode(event, &args) {
                Ok(decoded) => {
                    debug!("Push event: {:?}", decoded);
                    self.send(decoded.into());
                }
                Err(e) => warn!("Ignoring push event: {}", e),
            },
            other => warn!("Ignoring non-JSON {} payload: {:?}", event, other),
        }
    }

    fn forward(
        &self,
        event: &'static str,
    ) -> impl FnMut(Payload, Client) -> BoxFuture<'static, ()> + Send + Sync + 'static {
        let handlers = self.clone();
        move |payload: Payload, _: Client| {
            handlers.server_event(event, payload);
            async {}.boxed()
        }
    }
}

async fn connection_task(
    url: Url,
    config: ChannelConfig,
    handlers: Handlers,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
) {
    // Reconnection in the client only starts once a session has been established
    let mut attempt: u32 = 0;
    let client = loop {
        match handlers.builder(&url, &config).connect().await {
            Ok(client) => break client,
            Err(e) => {
                warn!("Push channel connect to {} failed: {}", url, e);
                if attempt == 0 {
                    handlers.send(ChannelEvent::Connectivity(false));
                }
            }
        }

        attempt += 1;
        if attempt > config.reconnect_attempts {
            error!(
                "Push channel gave up after {} connect attempts",
                config.reconnect_attempts
            );
            handlers.send(ChannelEvent::ReconnectFailed);
            return;
        }
        debug!(
            "Push channel connect attempt {}/{} in {:?}",
            attempt,
            config.reconnect_attempts,
            config.reconnect_delay()
        );
        tokio::time::sleep(config.reconnect_delay()).await;
    };

    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = client.emit(msg.event(), msg.data()).await {
            warn!("Failed to send {}: {}", msg.event(), e);
        }
    }

    if let Err(e) = client.disconnect().await {
        debug!("Push channel disconnect: {}", e);
    }
}
