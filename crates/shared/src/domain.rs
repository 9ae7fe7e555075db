use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three editable clock fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerField {
    Hours,
    Minutes,
    Seconds,
}

impl TimerField {
    pub const ALL: [TimerField; 3] = [TimerField::Hours, TimerField::Minutes, TimerField::Seconds];

    /// Number of discrete positions on this field's dial.
    pub fn unit_count(self) -> u32 {
        match self {
            TimerField::Hours => 12,
            TimerField::Minutes | TimerField::Seconds => 60,
        }
    }

    pub fn seconds_per_unit(self) -> u64 {
        match self {
            TimerField::Hours => 3600,
            TimerField::Minutes => 60,
            TimerField::Seconds => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimerField::Hours => "hours",
            TimerField::Minutes => "minutes",
            TimerField::Seconds => "seconds",
        }
    }

    /// Accepts `h`/`hours`, `m`/`minutes`, `s`/`seconds` (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "h" | "hour" | "hours" => Some(TimerField::Hours),
            "m" | "min" | "minute" | "minutes" => Some(TimerField::Minutes),
            "s" | "sec" | "second" | "seconds" => Some(TimerField::Seconds),
            _ => None,
        }
    }
}

impl fmt::Display for TimerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hours/minutes/seconds as shown on the clock face. Hours are not wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClockReading {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl ClockReading {
    pub fn new(hours: u64, minutes: u64, seconds: u64) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.hours
            .saturating_mul(3600)
            .saturating_add(self.minutes.saturating_mul(60))
            .saturating_add(self.seconds)
    }

    pub fn field(&self, field: TimerField) -> u64 {
        match field {
            TimerField::Hours => self.hours,
            TimerField::Minutes => self.minutes,
            TimerField::Seconds => self.seconds,
        }
    }

    pub fn with_field(mut self, field: TimerField, value: u64) -> Self {
        match field {
            TimerField::Hours => self.hours = value,
            TimerField::Minutes => self.minutes = value,
            TimerField::Seconds => self.seconds = value,
        }
        self
    }
}

impl fmt::Display for ClockReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Lifecycle of the push channel as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Degraded { reason: String },
    Closed,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Degraded { .. } => "degraded",
            ConnectionState::Closed => "closed",
        }
    }

    /// True once the channel can no longer deliver frames without a new connection.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ConnectionState::Degraded { .. } | ConnectionState::Closed
        )
    }
}

/// Last informational or error text; replaced wholesale, never queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoBanner {
    pub message: String,
    pub is_error: bool,
}

impl InfoBanner {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
        }
    }
}
