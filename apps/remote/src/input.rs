//! Operator line grammar for the watch shell.

use anyhow::{anyhow, bail, Context, Result};
use client_core::Gesture;
use shared::domain::TimerField;

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorInput {
    Gesture(Gesture),
    Quit,
}

pub const HELP: &str = "commands: start | stop | reset | +N | -N | edit <h|m|s> | <h|m|s> <value> \
| commit <f> | cancel <f> | dial <f> <dx> <dy> | release <f> | click <f> <dx> <dy> \
| clients <list> | save-clients | clear | quit";

/// Parses one line typed by the operator. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<OperatorInput>> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let gesture = match head.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => return Ok(Some(OperatorInput::Quit)),
        "start" => Gesture::Start,
        "stop" => Gesture::Stop,
        "reset" => Gesture::Reset,
        "edit" => Gesture::BeginEdit(field(words.next())?),
        "commit" => Gesture::CommitEdit(field(words.next())?),
        "cancel" => Gesture::CancelEdit(field(words.next())?),
        "release" => Gesture::DialRelease(field(words.next())?),
        "dial" => {
            let field = field(words.next())?;
            let (dx, dy) = offset(&mut words)?;
            Gesture::DialDrag { field, dx, dy }
        }
        "click" => {
            let field = field(words.next())?;
            let (dx, dy) = offset(&mut words)?;
            Gesture::DialClick { field, dx, dy }
        }
        "clients" => Gesture::EditClientList(line[head.len()..].trim().to_string()),
        "save-clients" => Gesture::CommitClientList,
        "clear" => Gesture::ClearLogs,
        other if other.starts_with('+') || other.starts_with('-') => {
            let delta = other
                .parse::<i64>()
                .with_context(|| format!("invalid nudge `{other}`"))?;
            Gesture::Nudge(delta)
        }
        other => match TimerField::from_name(other) {
            Some(field) => {
                let raw = words
                    .next()
                    .ok_or_else(|| anyhow!("missing value for {field}"))?;
                let value = raw
                    .parse::<i64>()
                    .with_context(|| format!("invalid {field} value `{raw}`"))?;
                Gesture::EditValue(field, value)
            }
            None => bail!("unknown command `{other}`"),
        },
    };
    Ok(Some(OperatorInput::Gesture(gesture)))
}

fn field(word: Option<&str>) -> Result<TimerField> {
    let word = word.ok_or_else(|| anyhow!("missing field (h, m or s)"))?;
    TimerField::from_name(word).ok_or_else(|| anyhow!("unknown field `{word}`"))
}

fn offset<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<(f64, f64)> {
    let mut coordinate = |axis: &str| -> Result<f64> {
        let raw = words
            .next()
            .ok_or_else(|| anyhow!("missing {axis} offset"))?;
        raw.parse::<f64>()
            .with_context(|| format!("invalid {axis} offset `{raw}`"))
    };
    let dx = coordinate("dx")?;
    let dy = coordinate("dy")?;
    Ok((dx, dy))
}

/// `H:MM:SS`, `M:SS` or plain seconds, as total seconds.
pub fn parse_clock_value(text: &str) -> Result<u64> {
    let text = text.trim();
    if text.is_empty() {
        bail!("empty time value");
    }
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        bail!("invalid time `{text}`: expected H:MM:SS");
    }
    parts.iter().try_fold(0u64, |total, part| {
        let value = part
            .parse::<u64>()
            .with_context(|| format!("invalid time `{text}`: expected H:MM:SS"))?;
        Ok(total.saturating_mul(60).saturating_add(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture(line: &str) -> Gesture {
        match parse_line(line).expect("parses") {
            Some(OperatorInput::Gesture(gesture)) => gesture,
            other => panic!("expected gesture for `{line}`, got {other:?}"),
        }
    }

    #[test]
    fn transport_words() {
        assert_eq!(gesture("start"), Gesture::Start);
        assert_eq!(gesture("  STOP "), Gesture::Stop);
        assert_eq!(gesture("reset"), Gesture::Reset);
        assert_eq!(parse_line("quit").expect("parses"), Some(OperatorInput::Quit));
        assert_eq!(parse_line("   ").expect("parses"), None);
    }

    #[test]
    fn nudges_keep_sign() {
        assert_eq!(gesture("+10"), Gesture::Nudge(10));
        assert_eq!(gesture("-60"), Gesture::Nudge(-60));
        assert!(parse_line("+ten").is_err());
    }

    #[test]
    fn field_edits() {
        assert_eq!(gesture("edit m"), Gesture::BeginEdit(TimerField::Minutes));
        assert_eq!(gesture("m 5"), Gesture::EditValue(TimerField::Minutes, 5));
        assert_eq!(gesture("h -2"), Gesture::EditValue(TimerField::Hours, -2));
        assert_eq!(gesture("commit s"), Gesture::CommitEdit(TimerField::Seconds));
        assert_eq!(gesture("cancel hours"), Gesture::CancelEdit(TimerField::Hours));
        assert!(parse_line("m").is_err());
        assert!(parse_line("edit x").is_err());
    }

    #[test]
    fn dial_gestures_take_offsets() {
        assert_eq!(
            gesture("dial m 10 -2.5"),
            Gesture::DialDrag {
                field: TimerField::Minutes,
                dx: 10.0,
                dy: -2.5
            }
        );
        assert_eq!(gesture("release m"), Gesture::DialRelease(TimerField::Minutes));
        assert_eq!(
            gesture("click h 0 5"),
            Gesture::DialClick {
                field: TimerField::Hours,
                dx: 0.0,
                dy: 5.0
            }
        );
        assert!(parse_line("dial m 10").is_err());
    }

    #[test]
    fn client_list_keeps_inner_spacing() {
        assert_eq!(
            gesture("clients 10.0.0.7:9000 10.0.0.8:9000"),
            Gesture::EditClientList("10.0.0.7:9000 10.0.0.8:9000".to_string())
        );
        assert_eq!(gesture("clients"), Gesture::EditClientList(String::new()));
        assert_eq!(gesture("save-clients"), Gesture::CommitClientList);
        assert_eq!(gesture("clear"), Gesture::ClearLogs);
    }

    #[test]
    fn unknown_words_are_rejected() {
        let err = parse_line("launch").expect_err("unknown");
        assert!(err.to_string().contains("launch"));
    }

    #[test]
    fn clock_values() {
        assert_eq!(parse_clock_value("1:02:03").expect("hms"), 3723);
        assert_eq!(parse_clock_value("5:00").expect("ms"), 300);
        assert_eq!(parse_clock_value("90").expect("secs"), 90);
        assert!(parse_clock_value("").is_err());
        assert!(parse_clock_value("1:2:3:4").is_err());
        assert!(parse_clock_value("1::3").is_err());
        assert!(parse_clock_value("-5").is_err());
    }
}
