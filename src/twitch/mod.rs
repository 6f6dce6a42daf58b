/// Twitch chat integration module
///
/// Connects to Twitch chat over the IRC WebSocket gateway, forwards every
/// inbound channel message to the automation webhook, and dispatches
/// outbound sends requested through the control API. The connection
/// lifecycle (authenticate, join, reconnect, shutdown) lives in
/// [`ChatClient::run`]; other components interact only through the
/// cloneable [`ChatHandle`].
mod client;
mod error;
mod messages;

// Re-export public types
pub use client::{ChatClient, ChatHandle, ConnectionState};
pub use messages::ChatMessage;

#[cfg(test)]
pub(crate) use client::testing;
