pub mod api;
pub mod channel;
pub mod config;
pub mod device;
pub mod document;
pub mod engine;
pub mod keys;
pub mod poll;
pub mod render;
pub mod terminal;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use document::Document;
pub use engine::BatchSource;
pub use engine::Classification;
pub use engine::Engine;
pub use engine::Reconciler;
pub use keys::Command;
