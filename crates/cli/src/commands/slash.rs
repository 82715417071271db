//! Slash commands understood by the interactive chat.

use steward_core::ExecutionMode;

pub const HELP: &str = "\
  /help               show this help
  /provider [name]    show or switch the provider
  /providers          list known providers
  /model [name]       show or switch the model
  /build [mode]       show or set the execution mode (fast / balanced / deep)
  /approve [on|off]   show or toggle auto-approval of risky tools
  /sessions           list saved sessions
  /session <id>       switch to a saved session
  /new                start a new session
  /doctor [provider]  diagnose provider keys
  /stats              runtime counters for this process
  /exit               quit (Ctrl-C cancels a running turn)";

#[derive(Debug, Clone, PartialEq)]
pub enum SlashCommand {
    Help,
    Provider(Option<String>),
    Providers,
    Model(Option<String>),
    Build(Option<ExecutionMode>),
    Approve(Option<bool>),
    Sessions,
    Session(String),
    New,
    Doctor(Option<String>),
    Stats,
    Exit,
}

/// `None` when `line` is not a slash command; `Err` carries a usage hint.
pub fn parse(line: &str) -> Option<Result<SlashCommand, String>> {
    let line = line.trim();
    let rest = line.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or("").to_ascii_lowercase();
    let arg = parts.next().map(str::to_string);

    let cmd = match name.as_str() {
        "help" | "?" => Ok(SlashCommand::Help),
        "provider" => Ok(SlashCommand::Provider(arg)),
        "providers" => Ok(SlashCommand::Providers),
        "model" => Ok(SlashCommand::Model(arg)),
        "build" | "mode" => match arg {
            None => Ok(SlashCommand::Build(None)),
            Some(a) => a.parse().map(|m| SlashCommand::Build(Some(m))),
        },
        "approve" => match arg.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None => Ok(SlashCommand::Approve(None)),
            Some("on" | "true" | "1") => Ok(SlashCommand::Approve(Some(true))),
            Some("off" | "false" | "0") => Ok(SlashCommand::Approve(Some(false))),
            Some(other) => Err(format!("usage: /approve on|off (got {other})")),
        },
        "sessions" => Ok(SlashCommand::Sessions),
        "session" => arg
            .map(SlashCommand::Session)
            .ok_or_else(|| "usage: /session <id>".to_string()),
        "new" => Ok(SlashCommand::New),
        "doctor" => Ok(SlashCommand::Doctor(arg)),
        "stats" => Ok(SlashCommand::Stats),
        "exit" | "quit" | "q" => Ok(SlashCommand::Exit),
        other => Err(format!("Unknown command: /{other} (try /help)")),
    };
    Some(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse("hello /world"), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(
            parse(" /provider kimi "),
            Some(Ok(SlashCommand::Provider(Some("kimi".into()))))
        );
        assert_eq!(parse("/build deep"), Some(Ok(SlashCommand::Build(Some(ExecutionMode::Deep)))));
        assert_eq!(parse("/approve ON"), Some(Ok(SlashCommand::Approve(Some(true)))));
        assert_eq!(parse("/session sess_1"), Some(Ok(SlashCommand::Session("sess_1".into()))));
        assert_eq!(parse("/EXIT"), Some(Ok(SlashCommand::Exit)));
    }

    #[test]
    fn bad_input_gives_usage() {
        assert!(matches!(parse("/build turbo"), Some(Err(e)) if e.contains("unknown build mode")));
        assert!(matches!(parse("/session"), Some(Err(e)) if e.contains("usage")));
        assert!(matches!(parse("/approve maybe"), Some(Err(_))));
        assert!(matches!(parse("/frobnicate"), Some(Err(e)) if e.contains("/help")));
    }
}
