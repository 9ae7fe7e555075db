//! Client-side synchronization and control core for a Chronono remote.
//!
//! A [`session::RemoteSession`] subscribes to the server's push channel,
//! keeps the local view of the countdown in step with it through
//! [`sync::SyncCore`], and forwards operator intents as control commands.

pub mod client_list;
pub mod clock;
pub mod dial;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod push;
pub mod session;
pub mod sync;

pub use client_list::{ClientListStore, JsonFileClientListStore, MemoryClientListStore};
pub use dispatcher::{CommandDispatcher, CommandTransport, HttpCommandTransport};
pub use endpoint::ServerEndpoint;
pub use error::ClientError;
pub use push::{PushBinding, PushEvent, PushSource};
pub use session::{RemoteSession, SessionConfig, SessionEvent, SessionHandle};
pub use sync::{Effects, Gesture, LogLine, SessionSnapshot, SyncCore};
