//! Reading from the terminal: input lines and approval answers.

use std::io::Write;

use async_trait::async_trait;
use serde_json::Value;
use steward_security::{ApprovalDecider, ApprovalDecision};

/// Read one line from stdin off the async runtime. `None` at end of input.
pub async fn read_line(prompt: &str) -> anyhow::Result<Option<String>> {
    let prompt = prompt.to_string();
    let line = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let mut buf = String::new();
        let n = std::io::stdin().read_line(&mut buf)?;
        Ok((n > 0).then_some(buf))
    })
    .await??;
    Ok(line)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Yes,
    No,
    Edit,
}

/// Empty and unrecognised answers mean no.
pub fn parse_answer(input: &str) -> Answer {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "e" | "edit" => Answer::Edit,
        _ => Answer::No,
    }
}

/// Asks the person at the terminal before a risky tool runs.
pub struct TerminalDecider;

#[async_trait]
impl ApprovalDecider for TerminalDecider {
    async fn decide(&self, tool: &str, args: &Value) -> ApprovalDecision {
        let pretty = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
        eprintln!("\n  ⚠ {tool} wants to run with:\n{pretty}");
        let answer = match read_line("  Allow? [y]es / [n]o / [e]dit arguments: ").await {
            Ok(Some(line)) => parse_answer(&line),
            _ => Answer::No,
        };
        match answer {
            Answer::Yes => ApprovalDecision::allow(),
            Answer::No => ApprovalDecision::reject("Tool call rejected by user."),
            Answer::Edit => match read_line("  New arguments (JSON, one line): ").await {
                Ok(Some(line)) => match serde_json::from_str::<Value>(line.trim()) {
                    Ok(edited) if edited.is_object() => ApprovalDecision::allow_with(edited),
                    _ => ApprovalDecision::reject("Edited arguments were not a JSON object; call skipped."),
                },
                _ => ApprovalDecision::reject("Tool call rejected by user."),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers() {
        assert_eq!(parse_answer(" Y\n"), Answer::Yes);
        assert_eq!(parse_answer("edit"), Answer::Edit);
        assert_eq!(parse_answer(""), Answer::No);
        assert_eq!(parse_answer("sure"), Answer::No);
    }
}
