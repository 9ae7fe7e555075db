//! Text vocabulary shared by the push channel and the control endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const TIME_PREFIX: &str = "time=";
pub const INFO_PREFIX: &str = "http=";
pub const CLIENTS_PREFIX: &str = "clients=";

/// A decoded server push frame.
///
/// Frames are line-oriented text matched by prefix, in priority order:
/// `time=<ms>`, then `http=<message>`, then anything else as a log line.
/// A `time=` frame whose payload is not a number falls through to a log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PushFrame {
    TimeUpdate { millis: u64 },
    Info(String),
    LogLine(String),
}

impl PushFrame {
    pub fn parse(raw: &str) -> Self {
        if let Some(payload) = raw.strip_prefix(TIME_PREFIX) {
            return match parse_millis(payload) {
                Some(millis) => PushFrame::TimeUpdate { millis },
                None => PushFrame::LogLine(raw.to_string()),
            };
        }
        if let Some(message) = raw.strip_prefix(INFO_PREFIX) {
            return PushFrame::Info(message.to_string());
        }
        PushFrame::LogLine(raw.to_string())
    }
}

impl fmt::Display for PushFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushFrame::TimeUpdate { millis } => write!(f, "{TIME_PREFIX}{millis}"),
            PushFrame::Info(message) => write!(f, "{INFO_PREFIX}{message}"),
            PushFrame::LogLine(line) => f.write_str(line),
        }
    }
}

/// Negative values normalise to zero; a decimal payload is truncated.
fn parse_millis(payload: &str) -> Option<u64> {
    let payload = payload.trim();
    if let Ok(value) = payload.parse::<i64>() {
        return Some(value.max(0) as u64);
    }
    match payload.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(if value <= 0.0 {
            0
        } else {
            value.trunc() as u64
        }),
        _ => None,
    }
}

/// A one-shot request against the timer authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ControlCommand {
    Start,
    Stop,
    Reset,
    SetTime { millis: u64 },
    SetClients { list: String },
}

impl ControlCommand {
    /// Absolute time in whole seconds; negative totals clamp to zero.
    pub fn set_time_seconds(total_seconds: i64) -> Self {
        Self::set_time_millis(total_seconds.saturating_mul(1000))
    }

    pub fn set_time_millis(total_millis: i64) -> Self {
        ControlCommand::SetTime {
            millis: total_millis.max(0) as u64,
        }
    }

    pub fn set_clients(list: impl Into<String>) -> Self {
        ControlCommand::SetClients { list: list.into() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
            ControlCommand::Reset => "reset",
            ControlCommand::SetTime { .. } => "set_time",
            ControlCommand::SetClients { .. } => "set_clients",
        }
    }

    /// Endpoint path relative to the server base URL.
    pub fn http_path(&self) -> &'static str {
        match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
            ControlCommand::Reset => "reset",
            ControlCommand::SetTime { .. } | ControlCommand::SetClients { .. } => "config",
        }
    }

    /// Unencoded query string, if the endpoint takes one.
    pub fn http_query(&self) -> Option<String> {
        match self {
            ControlCommand::SetTime { millis } => Some(format!("{TIME_PREFIX}{millis}")),
            ControlCommand::SetClients { list } => Some(format!("{CLIENTS_PREFIX}{list}")),
            _ => None,
        }
    }

    /// Text form used when commands travel over the WebSocket binding.
    ///
    /// The socket only understands transport commands and `time=`; a client
    /// list has no socket form and must go to `/config`.
    pub fn to_legacy_text(&self) -> Option<String> {
        match self {
            ControlCommand::Start => Some("start".to_string()),
            ControlCommand::Stop => Some("stop".to_string()),
            ControlCommand::Reset => Some("reset".to_string()),
            ControlCommand::SetTime { millis } => Some(format!("{TIME_PREFIX}{millis}")),
            ControlCommand::SetClients { .. } => None,
        }
    }
}
