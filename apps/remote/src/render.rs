use anyhow::Result;
use client_core::{SessionEvent, SessionSnapshot};
use shared::domain::TimerField;

pub fn status_line(snapshot: &SessionSnapshot) -> String {
    let mut line = format!("{}  [{}]", snapshot.display, snapshot.connection.label());
    let editing: Vec<&str> = TimerField::ALL
        .into_iter()
        .filter(|field| snapshot.entry.is_active(*field))
        .map(TimerField::label)
        .collect();
    if !editing.is_empty() {
        line.push_str(&format!("  editing {}", editing.join(",")));
    }
    if let Some(banner) = &snapshot.banner {
        let marker = if banner.is_error { "!" } else { "i" };
        line.push_str(&format!("  {marker} {}", banner.message));
    }
    line
}

/// One output line per event, or JSON when `json` is set.
pub fn render_event(event: &SessionEvent, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string(event)?);
    }
    Ok(match event {
        SessionEvent::Snapshot(snapshot) => status_line(snapshot),
        SessionEvent::LogAppended(line) => line.to_string(),
        SessionEvent::LogsCleared => "-- log cleared --".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use client_core::SyncCore;
    use shared::domain::{ConnectionState, InfoBanner};

    use super::*;

    fn snapshot() -> SessionSnapshot {
        SyncCore::new(None).snapshot()
    }

    #[test]
    fn status_shows_clock_and_state() {
        assert_eq!(status_line(&snapshot()), "00:00:00  [connecting]");
    }

    #[test]
    fn status_shows_edits_and_banner() {
        let mut snapshot = snapshot();
        snapshot.connection = ConnectionState::Closed;
        snapshot.entry.minutes = true;
        snapshot.banner = Some(InfoBanner::error("Server lost"));
        assert_eq!(
            status_line(&snapshot),
            "00:00:00  [closed]  editing minutes  ! Server lost"
        );
    }

    #[test]
    fn wide_hours_are_not_truncated() {
        let mut snapshot = snapshot();
        snapshot.display = shared::domain::ClockReading::new(123, 4, 5);
        assert!(status_line(&snapshot).starts_with("123:04:05"));
    }

    #[test]
    fn json_mode_tags_events() {
        let text = render_event(&SessionEvent::LogsCleared, true).expect("json");
        assert_eq!(text, r#"{"event":"logs_cleared"}"#);
        assert_eq!(
            render_event(&SessionEvent::LogsCleared, false).expect("text"),
            "-- log cleared --"
        );
    }
}
