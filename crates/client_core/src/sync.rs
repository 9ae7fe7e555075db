//! Reconciles optimistic local edits with the server's push stream.
//!
//! [`SyncCore`] is a plain state machine: it performs no IO and never blocks.
//! Push events and operator gestures go in; the commands to dispatch and the
//! notifications to render come out as [`Effects`]. Callers feed it from a
//! single event queue, so ordering between pushes and gestures is exactly
//! the order of calls.

use std::fmt;

use chrono::{Local, NaiveTime};
use serde::Serialize;
use shared::{
    domain::{ClockReading, ConnectionState, InfoBanner, TimerField},
    protocol::{ControlCommand, PushFrame},
};
use tracing::{debug, info};

use crate::{clock::decompose_millis, dial::dial_value, push::PushEvent};

pub const SERVER_LOST_MESSAGE: &str = "Server lost";
pub const CONNECTION_ERROR_PREFIX: &str = "Connection error";

/// The client's belief about the authoritative clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimerState {
    elapsed_millis: u64,
    display: ClockReading,
}

impl TimerState {
    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed_millis
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_millis as f64 / 1000.0
    }

    pub fn display(&self) -> ClockReading {
        self.display
    }

    /// Replaces the elapsed time and re-derives every field not under edit.
    fn overwrite(&mut self, elapsed_millis: u64, entry: &EntryMode) {
        self.elapsed_millis = elapsed_millis;
        let fresh = decompose_millis(elapsed_millis);
        for field in TimerField::ALL {
            if !entry.is_active(field) {
                self.display = self.display.with_field(field, fresh.field(field));
            }
        }
    }

    fn set_field(&mut self, field: TimerField, value: u64) {
        self.display = self.display.with_field(field, value);
    }

    fn restore_field(&mut self, field: TimerField) {
        let fresh = decompose_millis(self.elapsed_millis);
        self.display = self.display.with_field(field, fresh.field(field));
    }
}

/// Per-field flag suspending server authority while the operator edits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EntryMode {
    pub hours: bool,
    pub minutes: bool,
    pub seconds: bool,
}

impl EntryMode {
    pub fn is_active(&self, field: TimerField) -> bool {
        match field {
            TimerField::Hours => self.hours,
            TimerField::Minutes => self.minutes,
            TimerField::Seconds => self.seconds,
        }
    }

    pub fn any(&self) -> bool {
        self.hours || self.minutes || self.seconds
    }

    fn set(&mut self, field: TimerField, active: bool) {
        match field {
            TimerField::Hours => self.hours = active,
            TimerField::Minutes => self.minutes = active,
            TimerField::Seconds => self.seconds = active,
        }
    }
}

/// A log line stamped with the client's local receipt time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub received_at: NaiveTime,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.received_at.format("%H:%M:%S"), self.text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBuffer {
    lines: Vec<LogLine>,
}

impl LogBuffer {
    pub fn push(&mut self, text: impl Into<String>, received_at: NaiveTime) -> &LogLine {
        self.lines.push(LogLine {
            received_at,
            text: text.into(),
        });
        &self.lines[self.lines.len() - 1]
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The OSC destination list. `None` means nothing has been loaded yet;
/// `Some("")` is an explicit empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientListConfig {
    value: Option<String>,
}

impl ClientListConfig {
    pub fn loaded(value: Option<String>) -> Self {
        Self { value }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The list to replay on (re)connect, if there is anything to replay.
    pub fn replay_value(&self) -> Option<&str> {
        self.value.as_deref().filter(|list| !list.is_empty())
    }
}

/// An operator action from the presentation shell.
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Start,
    Stop,
    Reset,
    /// Relative adjustment in seconds from the last known elapsed time.
    Nudge(i64),
    BeginEdit(TimerField),
    /// Typed value for a field; negative input is corrected to zero.
    EditValue(TimerField, i64),
    CommitEdit(TimerField),
    CancelEdit(TimerField),
    DialDrag {
        field: TimerField,
        dx: f64,
        dy: f64,
    },
    DialRelease(TimerField),
    /// Click without drag: pick the value and commit at once.
    DialClick {
        field: TimerField,
        dx: f64,
        dy: f64,
    },
    EditClientList(String),
    CommitClientList,
    ClearLogs,
}

/// What a caller has to do after feeding an input to [`SyncCore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub commands: Vec<ControlCommand>,
    pub log_appended: Option<LogLine>,
    pub logs_cleared: bool,
    /// New client list text to persist.
    pub client_list_changed: Option<String>,
}

/// Renderable view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub display: ClockReading,
    pub elapsed_millis: u64,
    pub entry: EntryMode,
    pub connection: ConnectionState,
    pub banner: Option<InfoBanner>,
    pub client_list: Option<String>,
    pub log_lines: usize,
}

#[derive(Debug, Clone)]
pub struct SyncCore {
    timer: TimerState,
    entry: EntryMode,
    connection: ConnectionState,
    banner: Option<InfoBanner>,
    logs: LogBuffer,
    client_list: ClientListConfig,
}

impl SyncCore {
    pub fn new(client_list: Option<String>) -> Self {
        Self {
            timer: TimerState::default(),
            entry: EntryMode::default(),
            connection: ConnectionState::Connecting,
            banner: None,
            logs: LogBuffer::default(),
            client_list: ClientListConfig::loaded(client_list),
        }
    }

    pub fn timer(&self) -> &TimerState {
        &self.timer
    }

    pub fn entry(&self) -> &EntryMode {
        &self.entry
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn banner(&self) -> Option<&InfoBanner> {
        self.banner.as_ref()
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn client_list(&self) -> &ClientListConfig {
        &self.client_list
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            display: self.timer.display(),
            elapsed_millis: self.timer.elapsed_millis(),
            entry: self.entry,
            connection: self.connection.clone(),
            banner: self.banner.clone(),
            client_list: self.client_list.value().map(str::to_string),
            log_lines: self.logs.len(),
        }
    }

    pub fn on_push(&mut self, event: PushEvent) -> Effects {
        self.on_push_at(event, Local::now().time())
    }

    /// Applies a push event received at the given local wall-clock time.
    pub fn on_push_at(&mut self, event: PushEvent, received_at: NaiveTime) -> Effects {
        let mut effects = Effects::default();
        match event {
            PushEvent::Opened => {
                if self.connection != ConnectionState::Connecting {
                    debug!(state = self.connection.label(), "ignoring open outside connecting");
                    return effects;
                }
                info!("push channel open");
                self.connection = ConnectionState::Open;
                if let Some(list) = self.client_list.replay_value() {
                    effects.commands.push(ControlCommand::set_clients(list));
                }
            }
            PushEvent::Frame(frame) => {
                if self.connection == ConnectionState::Closed {
                    debug!("dropping frame after close");
                    return effects;
                }
                self.apply_frame(frame, received_at, &mut effects);
            }
            PushEvent::Error(reason) => {
                if self.connection == ConnectionState::Closed {
                    return effects;
                }
                self.banner = Some(InfoBanner::error(format!(
                    "{CONNECTION_ERROR_PREFIX}: {reason}"
                )));
                self.connection = ConnectionState::Degraded { reason };
            }
            PushEvent::Closed => {
                if self.connection == ConnectionState::Closed {
                    return effects;
                }
                self.connection = ConnectionState::Closed;
                self.banner = Some(InfoBanner::error(SERVER_LOST_MESSAGE));
            }
        }
        effects
    }

    fn apply_frame(&mut self, frame: PushFrame, received_at: NaiveTime, effects: &mut Effects) {
        match frame {
            PushFrame::TimeUpdate { millis } => self.timer.overwrite(millis, &self.entry),
            PushFrame::Info(message) => self.banner = Some(InfoBanner::info(message)),
            PushFrame::LogLine(text) => {
                let line = self.logs.push(text, received_at).clone();
                effects.log_appended = Some(line);
            }
        }
    }

    pub fn on_gesture(&mut self, gesture: Gesture) -> Effects {
        let mut effects = Effects::default();
        match gesture {
            Gesture::Start => effects.commands.push(ControlCommand::Start),
            Gesture::Stop => effects.commands.push(ControlCommand::Stop),
            Gesture::Reset => effects.commands.push(ControlCommand::Reset),
            Gesture::Nudge(delta_seconds) => {
                // No local preview: the next push carries the result.
                let total = i64::try_from(self.timer.elapsed_millis())
                    .unwrap_or(i64::MAX)
                    .saturating_add(delta_seconds.saturating_mul(1000));
                effects.commands.push(ControlCommand::set_time_millis(total));
            }
            Gesture::BeginEdit(field) => self.entry.set(field, true),
            Gesture::EditValue(field, value) => self.edit(field, value.max(0) as u64),
            Gesture::CommitEdit(field) | Gesture::DialRelease(field) => {
                self.commit(field, &mut effects)
            }
            Gesture::CancelEdit(field) => {
                self.entry.set(field, false);
                self.timer.restore_field(field);
            }
            Gesture::DialDrag { field, dx, dy } => {
                self.edit(field, u64::from(dial_value(dx, dy, field.unit_count())))
            }
            Gesture::DialClick { field, dx, dy } => {
                self.edit(field, u64::from(dial_value(dx, dy, field.unit_count())));
                self.commit(field, &mut effects);
            }
            Gesture::EditClientList(list) => {
                self.client_list = ClientListConfig::loaded(Some(list.clone()));
                effects.client_list_changed = Some(list);
            }
            Gesture::CommitClientList => {
                let list = self.client_list.value().unwrap_or_default();
                effects.commands.push(ControlCommand::set_clients(list));
            }
            Gesture::ClearLogs => {
                self.logs.clear();
                effects.logs_cleared = true;
            }
        }
        effects
    }

    fn edit(&mut self, field: TimerField, value: u64) {
        self.entry.set(field, true);
        self.timer.set_field(field, value);
    }

    /// Sends the total rebuilt from the displayed fields and shows it at once.
    fn commit(&mut self, field: TimerField, effects: &mut Effects) {
        if !self.entry.is_active(field) {
            debug!(field = field.label(), "commit without an active edit");
            return;
        }
        self.entry.set(field, false);
        let total_seconds = self.timer.display().total_seconds();
        let total_millis = total_seconds.saturating_mul(1000);
        self.timer.overwrite(total_millis, &self.entry);
        effects.commands.push(ControlCommand::SetTime {
            millis: total_millis,
        });
    }

    /// Marks an explicit new connection attempt.
    pub fn reconnecting(&mut self) {
        info!(previous = self.connection.label(), "re-opening push channel");
        self.connection = ConnectionState::Connecting;
    }

    /// Local teardown: closes without touching the banner.
    pub fn teardown(&mut self) {
        self.connection = ConnectionState::Closed;
    }
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
