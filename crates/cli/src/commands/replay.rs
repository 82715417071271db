//! `steward replay`: Replay a session from the runtime event log.

use steward_telemetry::{LogRecord, SessionDigest, replay, summarize_sessions};

use super::{load_config, preview};

pub fn run(session_id: Option<String>, list: bool, max_events: usize) -> anyhow::Result<()> {
    let config = load_config()?;
    let path = &config.storage.event_log;

    if list {
        let digests = summarize_sessions(path, 20)?;
        if digests.is_empty() {
            println!("No sessions in {}", path.display());
        }
        for d in &digests {
            println!("{}", format_digest(d));
        }
        return Ok(());
    }

    let session = replay(path, session_id.as_deref(), max_events.max(1))?;
    println!(
        "Replay {} · {} events{}",
        session.session_id,
        session.records.len(),
        if session.truncated { " (earlier events omitted)" } else { "" }
    );
    for line in render_records(&session.records) {
        println!("{line}");
    }
    Ok(())
}

fn format_digest(d: &SessionDigest) -> String {
    let started = chrono::DateTime::from_timestamp(d.started_at as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    format!(
        "{:<28} {started}  {:>6.1}s  {:>4} events  {} tools ({} failed)  {}/{}  {}",
        d.session_id,
        d.duration_s(),
        d.events,
        d.tool_calls,
        d.tool_failures,
        d.provider,
        d.model,
        if d.reason.is_empty() { "-" } else { &d.reason }
    )
}

/// One line per record, with streamed tokens joined into their message.
fn render_records(records: &[LogRecord]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut stream: Option<(String, String)> = None;
    let flush = |stream: &mut Option<(String, String)>, lines: &mut Vec<String>| {
        if let Some((head, text)) = stream.take() {
            lines.push(format!("{head}{text}"));
        }
    };

    for rec in records {
        let time = rec.at_iso.get(11..19).unwrap_or(&rec.at_iso);
        let line = match rec.event.as_str() {
            "assistant.stream.token" | "assistant.reasoning.token" => {
                let token = rec.payload_str("token");
                match &mut stream {
                    Some((_, text)) => text.push_str(token),
                    None => stream = Some((format!("{time} assistant> "), token.to_string())),
                }
                continue;
            }
            "status.stage" | "status.clear" | "agent.step" => continue,
            "assistant.stream.start" | "assistant.reasoning.start" => {
                flush(&mut stream, &mut lines);
                let who = if rec.event.contains("reasoning") { "thinking" } else { "assistant" };
                stream = Some((format!("{time} {who}> "), String::new()));
                continue;
            }
            "assistant.stream.end" | "assistant.reasoning.end" => {
                flush(&mut stream, &mut lines);
                continue;
            }
            "turn.user" => format!("{time} you> {}", rec.payload_str("text")),
            "system.message" => format!("{time} · {}", rec.payload_str("text")),
            "tool.call" => format!(
                "{time} ⚙ {} {}",
                rec.payload_str("name"),
                preview(&rec.payload["args"].to_string(), 160)
            ),
            "tool.result" => format!(
                "{time} ↳ {} {}: {}",
                rec.payload_str("name"),
                if rec.payload["success"].as_bool().unwrap_or(false) { "ok" } else { "failed" },
                preview(rec.payload_str("result"), 200)
            ),
            other => format!("{time} [{other}] {}", preview(&rec.payload.to_string(), 160)),
        };
        flush(&mut stream, &mut lines);
        lines.push(line);
    }
    flush(&mut stream, &mut lines);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(event: &str, payload: serde_json::Value) -> LogRecord {
        LogRecord {
            session_id: "s".into(),
            at: 0.0,
            at_iso: "2026-01-02T03:04:05Z".into(),
            event: event.into(),
            payload,
            stats: Default::default(),
        }
    }

    #[test]
    fn tokens_are_joined_per_message() {
        let records = vec![
            rec("turn.user", json!({"text": "hi"})),
            rec("status.stage", json!({"label": "model reasoning", "detail": "step 1/15"})),
            rec("assistant.stream.start", json!({"model": "m"})),
            rec("assistant.stream.token", json!({"token": "Hel"})),
            rec("assistant.stream.token", json!({"token": "lo"})),
            rec("assistant.stream.end", json!({})),
            rec("usage.tokens", json!({"total_tokens": 9})),
        ];
        let lines = render_records(&records);
        assert_eq!(lines[0], "03:04:05 you> hi");
        assert_eq!(lines[1], "03:04:05 assistant> Hello");
        assert!(lines[2].starts_with("03:04:05 [usage.tokens]"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn window_starting_mid_stream_still_renders() {
        let records = vec![
            rec("assistant.stream.token", json!({"token": "tail"})),
            rec("tool.result", json!({"name": "read_file", "success": true, "result": "x"})),
        ];
        let lines = render_records(&records);
        assert_eq!(lines, ["03:04:05 assistant> tail", "03:04:05 ↳ read_file ok: x"]);
    }

    #[test]
    fn digest_line_shows_counters() {
        let d = SessionDigest {
            session_id: "sess_1".into(),
            provider: "openai".into(),
            model: "gpt-4.1-mini".into(),
            started_at: 10.0,
            finished_at: 12.5,
            events: 30,
            tool_calls: 2,
            tool_failures: 1,
            reason: "stop".into(),
        };
        let line = format_digest(&d);
        assert!(line.contains("2.5s"));
        assert!(line.contains("2 tools (1 failed)"));
        assert!(line.ends_with("stop"));
    }
}
