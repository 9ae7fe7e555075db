mod config;
mod input;
mod render;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    push::{SseSource, WebSocketSource},
    ClientListStore, CommandTransport, HttpCommandTransport, JsonFileClientListStore,
    PushBinding, PushEvent, PushSource, RemoteSession, ServerEndpoint, SessionConfig,
    SessionEvent,
};
use reqwest::Client;
use shared::protocol::{ControlCommand, PushFrame};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    config::Settings,
    input::{OperatorInput, HELP},
};

const FIRST_TIME_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "remote", about = "Terminal remote for a Chronono countdown server")]
struct Cli {
    /// TOML settings file (defaults to ./remote.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    server_url: Option<String>,
    /// `sse` or `websocket`.
    #[arg(long, global = true)]
    transport: Option<PushBinding>,
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Re-open a lost push channel after this many milliseconds (0 disables).
    #[arg(long, global = true)]
    reconnect_ms: Option<u64>,
    /// Tracing filter, e.g. `debug` or `client_core=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the server clock and read operator commands from stdin.
    Watch {
        /// Print session events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    Start,
    Stop,
    Reset,
    /// Set the clock to `H:MM:SS`, `M:SS` or a number of seconds.
    SetTime { value: String },
    /// Move the clock by a signed number of seconds.
    Nudge {
        #[arg(allow_negative_numbers = true)]
        seconds: i64,
    },
    /// Replace the OSC client list and remember it locally.
    Clients { list: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(v) = cli.server_url {
        settings.server_url = v;
    }
    if let Some(v) = cli.transport {
        settings.transport = v;
    }
    if let Some(v) = cli.state_dir {
        settings.state_dir = Some(v);
    }
    if let Some(v) = cli.reconnect_ms {
        settings.reconnect_ms = Some(v);
    }

    match cli.command.unwrap_or(Command::Watch { json: false }) {
        Command::Watch { json } => watch(settings, json).await,
        Command::Start => send_once(&settings, ControlCommand::Start).await,
        Command::Stop => send_once(&settings, ControlCommand::Stop).await,
        Command::Reset => send_once(&settings, ControlCommand::Reset).await,
        Command::SetTime { value } => {
            let seconds = input::parse_clock_value(&value)?;
            let seconds = i64::try_from(seconds).context("time value out of range")?;
            send_once(&settings, ControlCommand::set_time_seconds(seconds)).await
        }
        Command::Nudge { seconds } => nudge(&settings, seconds).await,
        Command::Clients { list } => {
            let store = JsonFileClientListStore::in_dir(settings.resolve_state_dir()?);
            store.save(&list)?;
            send_once(&settings, ControlCommand::set_clients(list)).await
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn send_once(settings: &Settings, command: ControlCommand) -> Result<()> {
    let endpoint = ServerEndpoint::parse(&settings.server_url)?;
    let transport = HttpCommandTransport::new(Client::new(), endpoint);
    transport
        .send(&command)
        .await
        .with_context(|| format!("{} failed", command.name()))?;
    info!(command = command.name(), "command sent");
    Ok(())
}

/// A nudge is relative to the server clock, so read one time update first.
async fn nudge(settings: &Settings, delta_seconds: i64) -> Result<()> {
    let endpoint = ServerEndpoint::parse(&settings.server_url)?;
    let http = Client::new();
    let mut source: Box<dyn PushSource> = match settings.transport {
        PushBinding::Sse => Box::new(SseSource::new(http.clone(), endpoint.sse_url()?)),
        PushBinding::WebSocket => Box::new(WebSocketSource::new(endpoint.websocket_url()?).0),
    };
    let elapsed = tokio::time::timeout(FIRST_TIME_TIMEOUT, first_time_update(source.as_mut())).await;
    source.close().await;
    let elapsed = elapsed.context("timed out waiting for the server clock")??;

    let total = i64::try_from(elapsed)
        .unwrap_or(i64::MAX)
        .saturating_add(delta_seconds.saturating_mul(1000));
    let transport = HttpCommandTransport::new(http, endpoint);
    let command = ControlCommand::set_time_millis(total);
    transport.send(&command).await.context("nudge failed")?;
    info!(from_ms = elapsed, delta_seconds, "nudge sent");
    Ok(())
}

async fn first_time_update(source: &mut dyn PushSource) -> Result<u64> {
    while let Some(event) = source.next_event().await {
        match event {
            PushEvent::Frame(PushFrame::TimeUpdate { millis }) => return Ok(millis),
            PushEvent::Error(reason) => bail!("push channel failed: {reason}"),
            PushEvent::Closed => bail!("server closed the push channel"),
            PushEvent::Opened | PushEvent::Frame(_) => {}
        }
    }
    Err(anyhow!("push channel ended before a time update"))
}

async fn watch(settings: Settings, json: bool) -> Result<()> {
    let state_dir = settings.resolve_state_dir()?;
    let store = Arc::new(JsonFileClientListStore::in_dir(&state_dir));
    let mut config = SessionConfig::new(settings.server_url.clone(), settings.transport);
    config.reconnect_after = settings.reconnect_after();
    let session = RemoteSession::spawn(config, store)?;
    let mut events = session.subscribe();

    if !json {
        eprintln!("{HELP}");
    }
    let initial = SessionEvent::Snapshot(session.snapshot().await);
    println!("{}", render::render_event(&initial, json)?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", render::render_event(&event, json)?),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "renderer fell behind"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line.context("failed to read stdin")? {
                Some(line) => match input::parse_line(&line) {
                    Ok(Some(OperatorInput::Quit)) => break,
                    Ok(Some(OperatorInput::Gesture(gesture))) => {
                        if !session.send(gesture) {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => warn!(error = %format!("{err:#}"), "ignored input"),
                },
                None => stdin_open = false,
            },
        }
    }

    session.shutdown().await;
    Ok(())
}
