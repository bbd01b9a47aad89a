//! HTTP client for the device server.
//!
//! - `GET /api/devices` returns the full state of every device
//! - `POST /api/sync` asks the server to refresh one device (or all) from its upstream

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::device::Batch;

/// Response for GET /api/devices
#[derive(Debug, Deserialize)]
struct DevicesResponse {
    success: bool,
    #[serde(default)]
    devices: Batch,
}

/// Request body for POST /api/sync
#[derive(Debug, Serialize)]
struct SyncRequest<'a> {
    device_id: Option<&'a str>,
}

/// Response for POST /api/sync
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("server rejected the request")]
    Rejected,
}

impl ApiError {
    /// Whether the server could not be reached at all, as opposed to answering with a refusal.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Status(_))
    }
}

/// Trait for device server operations
///
/// This trait allows for mocking the HTTP API for testing purposes
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Fetch the full state of every device
    async fn fetch_devices(&self) -> Result<Batch, ApiError>;

    /// Ask the server to resync `device_id`, or every device when `None`
    async fn request_sync(&self, device_id: Option<&str>) -> Result<SyncResponse, ApiError>;
}

/// Mock device API for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockDeviceApi {
    /// Responses handed out by `fetch_devices`, front first; an empty queue fails with HTTP 503
    pub fetches: std::sync::Mutex<std::collections::VecDeque<Result<Batch, ApiError>>>,
    pub sync_requests: std::sync::Mutex<Vec<Option<String>>>,
    pub sync_success: bool,
}

#[cfg(test)]
impl MockDeviceApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fetch(&self, result: Result<Batch, ApiError>) {
        self.fetches.lock().unwrap().push_back(result);
    }
}

#[cfg(test)]
#[async_trait]
impl DeviceApi for MockDeviceApi {
    async fn fetch_devices(&self) -> Result<Batch, ApiError> {
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ApiError::Status(503)))
    }

    async fn request_sync(&self, device_id: Option<&str>) -> Result<SyncResponse, ApiError> {
        self.sync_requests
            .lock()
            .unwrap()
            .push(device_id.map(str::to_string));
        Ok(SyncResponse {
            success: self.sync_success,
            message: "synced".to_string(),
        })
    }
}

/// Real API client using reqwest
pub struct HttpDeviceApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpDeviceApi {
    /// `timeout` bounds each request end to end, so a hung server shows up as a failed fetch.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn fetch_devices(&self) -> Result<Batch, ApiError> {
        let url = self.endpoint("/api/devices")?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let body: DevicesResponse = response.json().await?;
        if !body.success {
            return Err(ApiError::Rejected);
        }
        debug!("Fetched {} devices", body.devices.len());
        Ok(body.devices)
    }

    async fn request_sync(&self, device_id: Option<&str>) -> Result<SyncResponse, ApiError> {
        let url = self.endpoint("/api/sync")?;
        // Failed syncs come back as HTTP 500 with a JSON body, so the status is not checked
        let response = self
            .client
            .post(url)
            .json(&SyncRequest { device_id })
            .send()
            .await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(800);

    #[test]
    fn test_endpoint_joins_base_url() {
        let api = HttpDeviceApi::new("http://10.0.0.2:5000", TIMEOUT).unwrap();
        assert_eq!(
            api.endpoint("/api/devices").unwrap().as_str(),
            "http://10.0.0.2:5000/api/devices"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpDeviceApi::new("::nope::", TIMEOUT),
            Err(ApiError::Url(_))
        ));
    }

    #[test]
    fn test_decode_devices_response() {
        let body = r#"{
            "success": true,
            "devices": {
                "air_conditioner": {"is_on": true, "mode": "cool"},
                "light_living": {"is_on": false}
            },
            "timestamp": "2024-05-01T10:00:00"
        }"#;
        let response: DevicesResponse = serde_json::from_str(body).unwrap();
        assert!(response.success);
        assert_eq!(response.devices.len(), 2);
    }

    #[test]
    fn test_encode_sync_request() {
        assert_eq!(
            serde_json::to_string(&SyncRequest { device_id: None }).unwrap(),
            r#"{"device_id":null}"#
        );
        assert_eq!(
            serde_json::to_string(&SyncRequest {
                device_id: Some("air_conditioner")
            })
            .unwrap(),
            r#"{"device_id":"air_conditioner"}"#
        );
    }

    #[test]
    fn test_unreachable_classification() {
        assert!(ApiError::Status(502).is_unreachable());
        assert!(!ApiError::Rejected.is_unreachable());
    }

    #[tokio::test]
    async fn test_fetch_from_closed_port_is_unreachable() {
        let api = HttpDeviceApi::new("http://127.0.0.1:1", TIMEOUT).unwrap();
        let err = api.fetch_devices().await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_fetch_from_silent_server_times_out() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let api = HttpDeviceApi::new(&format!("http://{}", addr), Duration::from_millis(200))
            .unwrap();
        let started = std::time::Instant::now();
        let err = api.fetch_devices().await.unwrap_err();
        assert!(err.is_unreachable());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
