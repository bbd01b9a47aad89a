mod connection;
mod engine;
mod event;
mod reconciler;
mod snapshot;

pub use connection::ConnectionTracker;
pub use engine::Engine;
pub use event::Fetched;
pub use reconciler::BatchSource;
pub use reconciler::ReconcileReport;
pub use reconciler::Reconciler;
pub use snapshot::Classification;
pub use snapshot::SnapshotCache;
pub use snapshot::canonical_json;
