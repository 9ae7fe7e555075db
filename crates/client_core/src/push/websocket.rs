use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::protocol::{ControlCommand, PushFrame};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::{PushEvent, PushSource};
use crate::{dispatcher::CommandTransport, error::ClientError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sender into the writer of the currently open socket, if any.
type Outbound = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

fn outbound_slot(outbound: &Outbound) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Message>>> {
    outbound.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Phase {
    Idle,
    Streaming(SplitStream<Socket>),
    Finished,
}

struct Writer {
    task: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// Push source over the legacy WebSocket binding.
///
/// Commands for the same server travel back over this socket; see
/// [`WebSocketCommandTransport`]. Each connection gets its own outbound
/// queue, so nothing sent while the socket is down reaches a later one.
pub struct WebSocketSource {
    url: Url,
    phase: Phase,
    outbound: Outbound,
    writer: Option<Writer>,
}

impl WebSocketSource {
    pub fn new(url: Url) -> (Self, WebSocketCommandTransport) {
        let outbound: Outbound = Arc::new(Mutex::new(None));
        let transport = WebSocketCommandTransport {
            outbound: Arc::clone(&outbound),
        };
        let source = Self {
            url,
            phase: Phase::Idle,
            outbound,
            writer: None,
        };
        (source, transport)
    }

    fn spawn_writer(&mut self, mut sink: SplitSink<Socket, Message>) {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        *outbound_slot(&self.outbound) = Some(outbound_tx);
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        if let Err(err) = sink.send(message).await {
                            warn!(error = %err, "websocket send failed");
                            break;
                        }
                    }
                }
            }
        });
        self.writer = Some(Writer { task, shutdown });
    }

    fn stop_writer(&mut self) {
        outbound_slot(&self.outbound).take();
        if let Some(writer) = self.writer.take() {
            writer.task.abort();
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.stop_writer();
    }
}

impl Drop for WebSocketSource {
    fn drop(&mut self) {
        self.stop_writer();
    }
}

#[async_trait]
impl PushSource for WebSocketSource {
    async fn next_event(&mut self) -> Option<PushEvent> {
        loop {
            let reader = match &mut self.phase {
                Phase::Finished => return None,
                Phase::Idle => {
                    return match connect_async(self.url.as_str()).await {
                        Ok((socket, _)) => {
                            info!(url = %self.url, "websocket push channel open");
                            let (sink, reader) = socket.split();
                            self.spawn_writer(sink);
                            self.phase = Phase::Streaming(reader);
                            Some(PushEvent::Opened)
                        }
                        Err(err) => {
                            warn!(url = %self.url, error = %err, "websocket connect failed");
                            self.phase = Phase::Finished;
                            Some(PushEvent::Error(format!(
                                "failed to connect websocket {}: {err}",
                                self.url
                            )))
                        }
                    };
                }
                Phase::Streaming(reader) => reader,
            };
            let next = reader.next().await;
            match next {
                Some(Ok(Message::Text(text))) => {
                    debug!(frame = %text, "websocket frame");
                    return Some(PushEvent::Frame(PushFrame::parse(&text)));
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(url = %self.url, "websocket closed by server");
                    self.finish();
                    return Some(PushEvent::Closed);
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    warn!(url = %self.url, error = %err, "websocket receive failed");
                    self.finish();
                    return Some(PushEvent::Error(format!("websocket receive failed: {err}")));
                }
            }
        }
    }

    async fn close(&mut self) {
        outbound_slot(&self.outbound).take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.shutdown.send(());
            let _ = writer.task.await;
        }
        self.finish();
    }

    fn rearm(&mut self) {
        if matches!(self.phase, Phase::Finished) {
            self.phase = Phase::Idle;
        }
    }
}

/// Sends commands as legacy text frames over the companion [`WebSocketSource`].
///
/// Fails while no socket is open, and for commands the socket does not carry.
#[derive(Clone)]
pub struct WebSocketCommandTransport {
    outbound: Outbound,
}

#[async_trait]
impl CommandTransport for WebSocketCommandTransport {
    async fn send(&self, command: &ControlCommand) -> Result<()> {
        let text = command
            .to_legacy_text()
            .ok_or(ClientError::NoSocketForm(command.name()))?;
        let slot = outbound_slot(&self.outbound);
        let outbound = slot.as_ref().ok_or(ClientError::SocketNotConnected)?;
        outbound
            .send(Message::Text(text))
            .map_err(|_| ClientError::SocketNotConnected)?;
        Ok(())
    }
}
