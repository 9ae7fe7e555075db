use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocketUpgrade},
        State,
    },
    http::Uri,
    response::IntoResponse,
    routing::get,
    Router,
};
use shared::{
    domain::{ConnectionState, TimerField},
    protocol::{ControlCommand, PushFrame},
};
use tokio::{net::TcpListener, sync::Mutex};

use super::*;
use crate::client_list::MemoryClientListStore;

struct ScriptedSource {
    events: mpsc::UnboundedReceiver<PushEvent>,
    settled: bool,
    closed: Arc<AtomicBool>,
    rearms: Arc<AtomicUsize>,
}

#[async_trait]
impl PushSource for ScriptedSource {
    async fn next_event(&mut self) -> Option<PushEvent> {
        if self.settled {
            return None;
        }
        let event = self.events.recv().await?;
        if matches!(event, PushEvent::Error(_) | PushEvent::Closed) {
            self.settled = true;
        }
        Some(event)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn rearm(&mut self) {
        self.rearms.fetch_add(1, Ordering::SeqCst);
        self.settled = false;
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<ControlCommand>>,
}

#[async_trait]
impl CommandTransport for RecordingTransport {
    async fn send(&self, command: &ControlCommand) -> Result<()> {
        self.sent.lock().await.push(command.clone());
        Ok(())
    }
}

struct Harness {
    handle: SessionHandle,
    push: mpsc::UnboundedSender<PushEvent>,
    transport: Arc<RecordingTransport>,
    store: Arc<MemoryClientListStore>,
    closed: Arc<AtomicBool>,
    rearms: Arc<AtomicUsize>,
}

impl Harness {
    fn start(cached_list: Option<&str>, reconnect_after: Option<Duration>) -> Self {
        let (push, events) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let rearms = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            events,
            settled: false,
            closed: Arc::clone(&closed),
            rearms: Arc::clone(&rearms),
        };
        let transport = Arc::new(RecordingTransport::default());
        let store = Arc::new(MemoryClientListStore::new(cached_list.map(str::to_string)));
        let handle = RemoteSession::spawn_with(
            Box::new(source),
            Arc::clone(&transport) as Arc<dyn CommandTransport>,
            Arc::clone(&store) as Arc<dyn ClientListStore>,
            reconnect_after,
        );
        Self {
            handle,
            push,
            transport,
            store,
            closed,
            rearms,
        }
    }

    fn push(&self, event: PushEvent) {
        self.push.send(event).expect("session alive");
    }

    fn frame(&self, raw: &str) {
        self.push(PushEvent::Frame(PushFrame::parse(raw)));
    }

    async fn wait_for_snapshot(&self, predicate: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        for _ in 0..200 {
            let snapshot = self.handle.snapshot().await;
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("snapshot condition not reached: {:?}", self.handle.snapshot().await);
    }

    async fn wait_for_commands(&self, count: usize) -> Vec<ControlCommand> {
        for _ in 0..200 {
            let sent = self.transport.sent.lock().await.clone();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} commands, got {:?}",
            self.transport.sent.lock().await
        );
    }
}

#[tokio::test]
async fn client_list_replay_precedes_other_commands() {
    let harness = Harness::start(Some("10.0.0.7:9000"), None);
    harness.push(PushEvent::Opened);
    harness
        .wait_for_snapshot(|s| s.connection == ConnectionState::Open)
        .await;
    assert!(harness.handle.send(Gesture::Start));

    let sent = harness.wait_for_commands(2).await;
    assert_eq!(
        sent,
        vec![
            ControlCommand::set_clients("10.0.0.7:9000"),
            ControlCommand::Start
        ]
    );
}

#[tokio::test]
async fn pushed_time_reaches_snapshot() {
    let harness = Harness::start(None, None);
    harness.push(PushEvent::Opened);
    harness.frame("time=61000");
    let snapshot = harness
        .wait_for_snapshot(|s| s.elapsed_millis == 61000)
        .await;
    assert_eq!(snapshot.display.to_string(), "00:01:01");
}

#[tokio::test]
async fn field_under_edit_ignores_pushes() {
    let harness = Harness::start(None, None);
    harness.push(PushEvent::Opened);
    harness.handle.send(Gesture::EditValue(TimerField::Minutes, 7));
    harness.wait_for_snapshot(|s| s.entry.minutes).await;

    harness.frame("time=3723000");
    let snapshot = harness
        .wait_for_snapshot(|s| s.elapsed_millis == 3_723_000)
        .await;
    assert_eq!(snapshot.display.hours, 1);
    assert_eq!(snapshot.display.minutes, 7);
    assert_eq!(snapshot.display.seconds, 3);
}

#[tokio::test]
async fn nudge_past_zero_sends_zero() {
    let harness = Harness::start(None, None);
    harness.push(PushEvent::Opened);
    harness.frame("time=30000");
    harness
        .wait_for_snapshot(|s| s.elapsed_millis == 30000)
        .await;
    harness.handle.send(Gesture::Nudge(-60));
    assert_eq!(
        harness.wait_for_commands(1).await,
        vec![ControlCommand::SetTime { millis: 0 }]
    );
}

#[tokio::test]
async fn client_list_edits_are_persisted() {
    let harness = Harness::start(None, None);
    harness
        .handle
        .send(Gesture::EditClientList("a:1 b:2".to_string()));
    harness.handle.send(Gesture::CommitClientList);

    assert_eq!(
        harness.wait_for_commands(1).await,
        vec![ControlCommand::set_clients("a:1 b:2")]
    );
    assert_eq!(
        harness.store.load().expect("load").as_deref(),
        Some("a:1 b:2")
    );
}

#[tokio::test]
async fn log_lines_are_broadcast() {
    let harness = Harness::start(None, None);
    let mut events = harness.handle.subscribe();
    harness.push(PushEvent::Opened);
    harness.frame("foo bar");

    let line = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::LogAppended(line)) => return line,
                Ok(_) => continue,
                Err(err) => panic!("event stream ended: {err}"),
            }
        }
    })
    .await
    .expect("log event");
    assert_eq!(line.text, "foo bar");
    assert!(line.to_string().ends_with("] foo bar"));
}

#[tokio::test]
async fn dropped_channel_is_not_reconnected_by_default() {
    let harness = Harness::start(None, None);
    harness.push(PushEvent::Opened);
    harness.push(PushEvent::Closed);
    let snapshot = harness
        .wait_for_snapshot(|s| s.connection == ConnectionState::Closed)
        .await;
    assert_eq!(
        snapshot.banner.map(|b| b.message),
        Some("Server lost".to_string())
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.rearms.load(Ordering::SeqCst), 0);
    assert_eq!(
        harness.handle.snapshot().await.connection,
        ConnectionState::Closed
    );
}

#[tokio::test]
async fn reconnect_policy_reopens_and_replays_client_list() {
    let harness = Harness::start(Some("a:1"), Some(Duration::from_millis(20)));
    harness.push(PushEvent::Opened);
    harness.wait_for_commands(1).await;

    harness.push(PushEvent::Error("reset by peer".to_string()));
    harness
        .wait_for_snapshot(|s| s.connection == ConnectionState::Connecting)
        .await;
    assert_eq!(harness.rearms.load(Ordering::SeqCst), 1);

    harness.push(PushEvent::Opened);
    let sent = harness.wait_for_commands(2).await;
    assert_eq!(
        sent,
        vec![
            ControlCommand::set_clients("a:1"),
            ControlCommand::set_clients("a:1")
        ]
    );
}

#[tokio::test]
async fn shutdown_closes_source_and_reports_closed() {
    let harness = Harness::start(None, None);
    harness.push(PushEvent::Opened);
    harness
        .wait_for_snapshot(|s| s.connection == ConnectionState::Open)
        .await;

    let mut events = harness.handle.subscribe();
    let closed = Arc::clone(&harness.closed);
    harness.handle.shutdown().await;

    assert!(closed.load(Ordering::SeqCst));
    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Snapshot(snapshot) = event {
            last = Some(snapshot);
        }
    }
    assert_eq!(
        last.map(|s| s.connection),
        Some(ConnectionState::Closed)
    );
}

#[derive(Clone, Default)]
struct ServerLog {
    requests: Arc<Mutex<Vec<String>>>,
    frames: Arc<Mutex<Vec<String>>>,
}

async fn record_request(State(log): State<ServerLog>, uri: Uri) -> &'static str {
    log.requests.lock().await.push(uri.to_string());
    "ok"
}

async fn record_frames(ws: WebSocketUpgrade, State(log): State<ServerLog>) -> impl IntoResponse {
    ws.on_upgrade(move |mut socket| async move {
        while let Some(Ok(message)) = socket.recv().await {
            if let WsMessage::Text(text) = message {
                log.frames.lock().await.push(text);
            }
        }
    })
}

#[tokio::test]
async fn websocket_binding_sends_client_list_over_http() -> Result<()> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let log = ServerLog::default();
    let app = Router::new()
        .route("/time", get(record_frames))
        .route("/config", get(record_request))
        .with_state(log.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let store = Arc::new(MemoryClientListStore::new(Some("a:1 b:2".to_string())));
    let handle = RemoteSession::spawn(
        SessionConfig::new(format!("http://{addr}"), PushBinding::WebSocket),
        store,
    )?;

    let expected = "/config?clients=a:1%20b:2".to_string();
    for _ in 0..300 {
        if log.requests.lock().await.contains(&expected) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*log.requests.lock().await, vec![expected]);

    handle.send(Gesture::Start);
    for _ in 0..300 {
        if !log.frames.lock().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*log.frames.lock().await, vec!["start".to_string()]);

    handle.shutdown().await;
    Ok(())
}
