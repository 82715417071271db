//! `steward sessions`: List saved sessions.

use steward_core::session::{SessionStore, SessionSummary};
use steward_session::FileSessionStore;

use super::{load_config, preview};

pub async fn run(limit: usize) -> anyhow::Result<()> {
    let config = load_config()?;
    let store = FileSessionStore::new(&config.storage.history_dir);
    let sessions = store.list(limit).await?;
    let latest = store.latest_id().await?;

    if sessions.is_empty() {
        println!("No saved sessions in {}", store.sessions_dir().display());
        return Ok(());
    }
    for s in &sessions {
        println!("{}", format_row(s, latest.as_deref() == Some(s.session_id.as_str())));
    }
    println!("\n{} session(s)", sessions.len());
    Ok(())
}

fn format_row(s: &SessionSummary, latest: bool) -> String {
    format!(
        "{} {:<28} {}  {:<8} {:>4} msgs  {}/{}  {}",
        if latest { "*" } else { " " },
        s.session_id,
        s.updated_at.format("%Y-%m-%d %H:%M"),
        s.build_mode.as_str(),
        s.message_count,
        s.provider,
        s.model,
        preview(&s.title, 48)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::ExecutionMode;
    use steward_core::message::Message;
    use steward_core::session::Session;

    #[test]
    fn row_marks_latest_session() {
        let mut session = Session::new("sess_1_1234", "openai", "gpt-4.1-mini", ExecutionMode::Deep, "sys");
        session.push(Message::user("rename the photos"));
        session.refresh_title();
        let row = format_row(&session.summary(), true);
        assert!(row.starts_with("* sess_1_1234"));
        assert!(row.contains("deep"));
        assert!(row.contains("openai/gpt-4.1-mini"));
        assert!(row.contains("rename the photos"));
    }
}
