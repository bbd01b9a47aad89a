//! Real-time push channel.
//!
//! The server pushes device updates as Socket.IO events; the client can ask it to resync. The
//! adapter turns events into [`ChannelEvent`]s for the engine and reconnects on its own.

mod client;
pub mod protocol;

pub use client::ChannelError;
pub use client::ChannelEvent;
#[cfg(test)]
pub use client::MockPushChannel;
pub use client::PushChannel;
pub use client::SocketIoChannel;
