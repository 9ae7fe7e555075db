//! Owns one push-channel subscription and its synchronization state for the
//! lifetime of a [`SessionHandle`].

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use shared::protocol::ControlCommand;
use tokio::{
    sync::{broadcast, mpsc, oneshot, RwLock},
    task::JoinHandle,
    time::sleep,
};
use tracing::{info, warn};

use crate::{
    client_list::ClientListStore,
    dispatcher::{CommandDispatcher, CommandTransport, HttpCommandTransport},
    endpoint::ServerEndpoint,
    push::{
        PushBinding, PushEvent, PushSource, SseSource, WebSocketCommandTransport, WebSocketSource,
    },
    sync::{Effects, Gesture, LogLine, SessionSnapshot, SyncCore},
};

const SESSION_EVENT_CAPACITY: usize = 256;
const PUMP_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_url: String,
    pub binding: PushBinding,
    /// `None` leaves a dropped channel down until the session is recreated.
    pub reconnect_after: Option<Duration>,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>, binding: PushBinding) -> Self {
        Self {
            server_url: server_url.into(),
            binding,
            reconnect_after: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    Snapshot(SessionSnapshot),
    LogAppended(LogLine),
    LogsCleared,
}

/// Scoped handle to a running session. Dropping it tears the session down.
pub struct SessionHandle {
    gestures: mpsc::UnboundedSender<Gesture>,
    events: broadcast::Sender<SessionEvent>,
    latest: Arc<RwLock<SessionSnapshot>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Returns `false` once the session has stopped.
    pub fn send(&self, gesture: Gesture) -> bool {
        self.gestures.send(gesture).is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.latest.read().await.clone()
    }

    /// Closes the push channel and waits for the session task to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub struct RemoteSession;

impl RemoteSession {
    /// Connects to `config.server_url` with the configured binding.
    ///
    /// With the SSE binding commands go to the HTTP control endpoints; with
    /// the WebSocket binding they travel as text frames on the same socket,
    /// except the client list, which always goes to `/config`.
    pub fn spawn(config: SessionConfig, store: Arc<dyn ClientListStore>) -> Result<SessionHandle> {
        let endpoint = ServerEndpoint::parse(&config.server_url)?;
        let (source, transport): (Box<dyn PushSource>, Arc<dyn CommandTransport>) =
            match config.binding {
                PushBinding::Sse => {
                    let http = Client::new();
                    let source = SseSource::new(http.clone(), endpoint.sse_url()?);
                    (
                        Box::new(source),
                        Arc::new(HttpCommandTransport::new(http, endpoint)),
                    )
                }
                PushBinding::WebSocket => {
                    let (source, socket) = WebSocketSource::new(endpoint.websocket_url()?);
                    let transport = SocketCommandRouter {
                        socket,
                        http: HttpCommandTransport::new(Client::new(), endpoint),
                    };
                    (Box::new(source), Arc::new(transport))
                }
            };
        info!(
            server_url = %config.server_url,
            binding = %config.binding,
            "starting remote session"
        );
        Ok(Self::spawn_with(
            source,
            transport,
            store,
            config.reconnect_after,
        ))
    }

    pub fn spawn_with(
        source: Box<dyn PushSource>,
        transport: Arc<dyn CommandTransport>,
        store: Arc<dyn ClientListStore>,
        reconnect_after: Option<Duration>,
    ) -> SessionHandle {
        let client_list = match store.load() {
            Ok(list) => list,
            Err(err) => {
                warn!(error = %err, "failed to load cached client list");
                None
            }
        };
        let core = SyncCore::new(client_list);
        let (dispatcher, _worker) = CommandDispatcher::spawn(transport);
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let latest = Arc::new(RwLock::new(core.snapshot()));
        let (gesture_tx, gesture_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = Driver {
            core,
            dispatcher,
            store,
            events: events.clone(),
            latest: Arc::clone(&latest),
        };
        let task = tokio::spawn(run(
            driver,
            source,
            gesture_rx,
            shutdown_rx,
            reconnect_after,
        ));

        SessionHandle {
            gestures: gesture_tx,
            events,
            latest,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Command transport for the WebSocket binding.
struct SocketCommandRouter {
    socket: WebSocketCommandTransport,
    http: HttpCommandTransport,
}

#[async_trait]
impl CommandTransport for SocketCommandRouter {
    async fn send(&self, command: &ControlCommand) -> Result<()> {
        match command {
            ControlCommand::SetClients { .. } => self.http.send(command).await,
            _ => self.socket.send(command).await,
        }
    }
}

struct Driver {
    core: SyncCore,
    dispatcher: CommandDispatcher,
    store: Arc<dyn ClientListStore>,
    events: broadcast::Sender<SessionEvent>,
    latest: Arc<RwLock<SessionSnapshot>>,
}

impl Driver {
    async fn apply(&mut self, effects: Effects) {
        for command in effects.commands {
            self.dispatcher.dispatch(command);
        }
        if let Some(list) = effects.client_list_changed {
            if let Err(err) = self.store.save(&list) {
                warn!(error = %err, "failed to persist client list");
            }
        }
        if let Some(line) = effects.log_appended {
            let _ = self.events.send(SessionEvent::LogAppended(line));
        }
        if effects.logs_cleared {
            let _ = self.events.send(SessionEvent::LogsCleared);
        }
        self.publish().await;
    }

    async fn publish(&self) {
        let snapshot = self.core.snapshot();
        {
            let mut latest = self.latest.write().await;
            if *latest == snapshot {
                return;
            }
            *latest = snapshot.clone();
        }
        let _ = self.events.send(SessionEvent::Snapshot(snapshot));
    }
}

enum PumpMessage {
    Event(PushEvent),
    Reconnecting,
}

/// Drives the push source on its own task so that connection attempts are
/// never cancelled by unrelated gestures.
async fn pump(
    mut source: Box<dyn PushSource>,
    tx: mpsc::Sender<PumpMessage>,
    mut stop: oneshot::Receiver<()>,
    reconnect_after: Option<Duration>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = source.next_event() => match event {
                Some(event) => {
                    if tx.send(PumpMessage::Event(event)).await.is_err() {
                        break;
                    }
                }
                None => match reconnect_after {
                    Some(delay) => {
                        tokio::select! {
                            _ = &mut stop => break,
                            _ = sleep(delay) => {}
                        }
                        source.rearm();
                        if tx.send(PumpMessage::Reconnecting).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        info!("push channel settled; not reconnecting");
                        let _ = (&mut stop).await;
                        break;
                    }
                },
            },
        }
    }
    source.close().await;
}

async fn run(
    mut driver: Driver,
    source: Box<dyn PushSource>,
    mut gestures: mpsc::UnboundedReceiver<Gesture>,
    mut shutdown: oneshot::Receiver<()>,
    reconnect_after: Option<Duration>,
) {
    let (pump_tx, mut pump_rx) = mpsc::channel(PUMP_CAPACITY);
    let (stop_pump, stop_rx) = oneshot::channel();
    let pump_task = tokio::spawn(pump(source, pump_tx, stop_rx, reconnect_after));

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            gesture = gestures.recv() => {
                let Some(gesture) = gesture else { break };
                let effects = driver.core.on_gesture(gesture);
                driver.apply(effects).await;
            }
            message = pump_rx.recv() => match message {
                Some(PumpMessage::Event(event)) => {
                    let effects = driver.core.on_push(event);
                    driver.apply(effects).await;
                }
                Some(PumpMessage::Reconnecting) => {
                    driver.core.reconnecting();
                    driver.publish().await;
                }
                None => break,
            },
        }
    }

    let _ = stop_pump.send(());
    if let Err(err) = pump_task.await {
        warn!(error = %err, "push task ended abnormally");
    }
    driver.core.teardown();
    driver.publish().await;
    info!("remote session closed");
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
