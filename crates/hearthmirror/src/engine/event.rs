use super::reconciler::BatchSource;
use crate::api::ApiError;
use crate::device::Batch;

/// Result of a full-state fetch, delivered back to the engine loop.
///
/// Fetches run in their own tasks so the loop keeps handling push events while a request is in
/// flight; responses are processed in arrival order, whichever source they came from.
#[derive(Debug)]
pub struct Fetched {
    pub source: BatchSource,
    pub result: Result<Batch, ApiError>,
}
