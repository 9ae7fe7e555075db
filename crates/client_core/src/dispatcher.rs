//! Fire-and-forget delivery of control commands.
//!
//! Every intent becomes exactly one outbound request. Nothing is retried or
//! coalesced; a failed request is logged and dropped, and the push channel
//! remains the only confirmation of what the server accepted.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::ControlCommand;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, warn};

use crate::endpoint::ServerEndpoint;

const COMMAND_QUEUE_CAPACITY: usize = 64;

#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn send(&self, command: &ControlCommand) -> Result<()>;
}

/// Issues commands as `GET` requests against the control endpoints.
pub struct HttpCommandTransport {
    http: Client,
    endpoint: ServerEndpoint,
}

impl HttpCommandTransport {
    pub fn new(http: Client, endpoint: ServerEndpoint) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl CommandTransport for HttpCommandTransport {
    async fn send(&self, command: &ControlCommand) -> Result<()> {
        let url = self.endpoint.command_url(command)?;
        self.http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()?;
        Ok(())
    }
}

async fn deliver(transport: Arc<dyn CommandTransport>, command: ControlCommand) {
    match transport.send(&command).await {
        Ok(()) => debug!(command = command.name(), "command delivered"),
        Err(err) => warn!(
            command = command.name(),
            error = %err,
            "command request failed; not retried"
        ),
    }
}

/// Queue in front of a [`CommandTransport`].
///
/// Commands are issued in the order they were dispatched, each as its own
/// request, so a stalled request never holds back the next one. The worker
/// exits once every dispatcher clone is dropped and in-flight requests end.
#[derive(Clone)]
pub struct CommandDispatcher {
    queue: mpsc::Sender<ControlCommand>,
}

impl CommandDispatcher {
    pub fn spawn(transport: Arc<dyn CommandTransport>) -> (Self, JoinHandle<()>) {
        let (queue, mut rx) = mpsc::channel::<ControlCommand>(COMMAND_QUEUE_CAPACITY);
        let worker = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    command = rx.recv() => {
                        let Some(command) = command else { break };
                        in_flight.spawn(deliver(Arc::clone(&transport), command));
                    }
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }
            while in_flight.join_next().await.is_some() {}
        });
        (Self { queue }, worker)
    }

    /// Queues one command. Returns `false` when the command was dropped.
    pub fn dispatch(&self, command: ControlCommand) -> bool {
        let name = command.name();
        match self.queue.try_send(command) {
            Ok(()) => {
                debug!(command = name, "queued command");
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(command = name, "command queue is full; dropping command");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(command = name, "command worker stopped; dropping command");
                false
            }
        }
    }

    pub fn start(&self) -> bool {
        self.dispatch(ControlCommand::Start)
    }

    pub fn stop(&self) -> bool {
        self.dispatch(ControlCommand::Stop)
    }

    pub fn reset(&self) -> bool {
        self.dispatch(ControlCommand::Reset)
    }

    /// Negative totals are sent as zero.
    pub fn set_time(&self, total_seconds: i64) -> bool {
        self.dispatch(ControlCommand::set_time_seconds(total_seconds))
    }

    pub fn set_time_millis(&self, total_millis: i64) -> bool {
        self.dispatch(ControlCommand::set_time_millis(total_millis))
    }

    pub fn set_clients(&self, list: &str) -> bool {
        self.dispatch(ControlCommand::set_clients(list))
    }
}
