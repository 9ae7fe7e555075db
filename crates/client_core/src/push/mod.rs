//! Server push channel: one frame parser behind two transport adapters.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::protocol::PushFrame;

mod sse;
mod websocket;

pub use sse::{SseDecoder, SseSource};
pub use websocket::{WebSocketCommandTransport, WebSocketSource};

/// Lifecycle and payload notifications from a push source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Opened,
    Frame(PushFrame),
    /// Transport failure. The source yields nothing further until re-armed.
    Error(String),
    /// The server ended the stream.
    Closed,
}

/// A long-lived subscription to the server push channel.
///
/// The first call to [`PushSource::next_event`] opens the connection. After an
/// `Error` or `Closed` event the source returns `None` until [`PushSource::rearm`]
/// allows one more connection attempt.
#[async_trait]
pub trait PushSource: Send {
    async fn next_event(&mut self) -> Option<PushEvent>;

    /// Releases the connection. Idempotent.
    async fn close(&mut self);

    fn rearm(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushBinding {
    #[default]
    Sse,
    #[serde(rename = "websocket", alias = "ws", alias = "web_socket")]
    WebSocket,
}

impl FromStr for PushBinding {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sse" => Ok(PushBinding::Sse),
            "ws" | "websocket" | "web_socket" => Ok(PushBinding::WebSocket),
            other => Err(format!(
                "unknown push transport `{other}`; expected `sse` or `websocket`"
            )),
        }
    }
}

impl fmt::Display for PushBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushBinding::Sse => f.write_str("sse"),
            PushBinding::WebSocket => f.write_str("websocket"),
        }
    }
}

#[cfg(test)]
#[path = "../tests/push_tests.rs"]
mod tests;
