use anyhow::Result;
use owo_colors::OwoColorize;

use crate::session::Session;
use crate::utils::progress;

pub async fn run(session: &Session, event_id: &str) -> Result<()> {
    let title = session
        .engine
        .snapshot()
        .event(event_id)
        .map(|e| e.title.clone())
        .unwrap_or_else(|| event_id.to_string());

    progress::while_waiting(
        format!("Cancelling {}", title),
        session.engine.reconciler().cancel_event(event_id),
    )
    .await?;

    println!("{} Cancelled {}", "✓".green(), title.bold());
    Ok(())
}
