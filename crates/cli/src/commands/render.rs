//! Terminal rendering of runtime events.

use std::io::Write;
use std::sync::Arc;

use steward_core::event::{EventKind, RuntimeEvent};
use tokio::sync::broadcast;

use super::preview;

/// What to print for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Written to stdout without a newline.
    Inline(String),
    /// A full line on stdout.
    Line(String),
    /// A full line on stderr.
    Note(String),
}

pub fn render(kind: &EventKind) -> Option<Output> {
    let out = match kind {
        EventKind::StreamStart { .. } => Output::Inline("\nassistant> ".into()),
        EventKind::StreamToken { token } => Output::Inline(token.clone()),
        EventKind::StreamEnd => Output::Line(String::new()),
        EventKind::ReasoningStart => Output::Inline("\n(thinking) ".into()),
        EventKind::ReasoningToken { token } => Output::Inline(token.clone()),
        EventKind::ReasoningEnd => Output::Line(String::new()),
        EventKind::SystemMessage { text } => Output::Note(format!("  · {text}")),
        EventKind::ToolCall { name, args, risky } => Output::Note(format!(
            "  ⚙ {name}{} {}",
            if *risky { " [risky]" } else { "" },
            preview(&args.to_string(), 160)
        )),
        EventKind::ToolResult {
            name,
            result,
            success,
            elapsed_ms,
        } => Output::Note(format!(
            "  ↳ {name} {} in {elapsed_ms:.0}ms: {}",
            if *success { "ok" } else { "failed" },
            preview(result, 200)
        )),
        EventKind::StepLimit { max_steps } => Output::Note(format!(
            "  · step limit reached ({max_steps} steps); try /build deep or ask again"
        )),
        EventKind::ProviderChanged { provider } => Output::Note(format!("  · provider: {provider}")),
        EventKind::ModelChanged { model } => Output::Note(format!("  · model: {model}")),
        EventKind::ModeChanged {
            build_mode,
            max_steps,
        } => Output::Note(format!("  · build mode: {build_mode} (max {max_steps} steps)")),
        _ => return None,
    };
    Some(out)
}

/// Print events until the channel closes.
pub async fn print_events(mut rx: broadcast::Receiver<Arc<RuntimeEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(out) = render(&event.kind) {
                    emit(out);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!(skipped = n, "Renderer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn emit(out: Output) {
    match out {
        Output::Inline(text) => {
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, "{text}");
            let _ = stdout.flush();
        }
        Output::Line(text) => println!("{text}"),
        Output::Note(text) => eprintln!("{text}"),
    }
}
