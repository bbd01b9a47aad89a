//! Socket.IO events exchanged with the device server.
//!
//! Every event carries a name and a single JSON object argument. Packet framing, the
//! websocket/long-polling transport and reconnection are handled by `rust_socketio`; this module
//! only maps event names and arguments onto typed values.

use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::device::Batch;

pub const CONNECTION_STATUS: &str = "connection_status";
pub const INITIAL_STATE: &str = "initial_state";
pub const DEVICE_UPDATE: &str = "device_update";
pub const REQUEST_SYNC: &str = "request_sync";

/// Events sent from the server to the client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Greeting sent right after the socket opens
    ConnectionStatus {
        status: String,
        message: Option<String>,
    },

    /// Full state of every device, sent on connect
    InitialState { devices: Batch },

    /// Fresh state of one device
    DeviceUpdate {
        device_id: String,
        device: Value,
        from_user: bool,
    },
}

#[derive(Deserialize)]
struct ConnectionStatusData {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct InitialStateData {
    #[serde(default)]
    devices: Batch,
}

#[derive(Deserialize)]
struct DeviceUpdateData {
    device_id: String,
    device: Value,
    #[serde(default)]
    from_user: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown event {0}")]
    UnknownEvent(String),

    #[error("event {0} carries no data")]
    MissingData(String),

    #[error("malformed {0} data: {1}")]
    Malformed(String, #[source] serde_json::Error),
}

impl ServerEvent {
    /// Decode an event from its name and the arguments it was emitted with.
    pub fn decode(event: &str, args: &[Value]) -> Result<Self, ProtocolError> {
        let data = args
            .first()
            .cloned()
            .ok_or_else(|| ProtocolError::MissingData(event.to_string()))?;
        let malformed = |e| ProtocolError::Malformed(event.to_string(), e);

        match event {
            CONNECTION_STATUS => {
                let d: ConnectionStatusData = serde_json::from_value(data).map_err(malformed)?;
                Ok(ServerEvent::ConnectionStatus {
                    status: d.status,
                    message: d.message,
                })
            }
            INITIAL_STATE => {
                let d: InitialStateData = serde_json::from_value(data).map_err(malformed)?;
                Ok(ServerEvent::InitialState { devices: d.devices })
            }
            DEVICE_UPDATE => {
                let d: DeviceUpdateData = serde_json::from_value(data).map_err(malformed)?;
                Ok(ServerEvent::DeviceUpdate {
                    device_id: d.device_id,
                    device: d.device,
                    from_user: d.from_user,
                })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

/// Messages sent from the client to the server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Ask the server to push fresh state for one device, or all when `device_id` is null
    RequestSync { device_id: Option<String> },
}

impl ClientMessage {
    pub fn event(&self) -> &'static str {
        match self {
            ClientMessage::RequestSync { .. } => REQUEST_SYNC,
        }
    }

    pub fn data(&self) -> Value {
        match self {
            ClientMessage::RequestSync { device_id } => json!({ "device_id": device_id }),
        }
    }
}
