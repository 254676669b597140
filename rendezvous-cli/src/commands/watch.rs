//! Applies push notifications read from stdin, one JSON object per line.

use anyhow::Result;
use owo_colors::OwoColorize;
use rendezvous_core::{BridgeAction, PushEvent};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::session::Session;

pub async fn run(session: &Session) -> Result<()> {
    let bridge = session.engine.bridge();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("{}", "Reading push events from stdin (Ctrl-D to stop)".dimmed());

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let push: PushEvent = match serde_json::from_str(line) {
            Ok(push) => push,
            Err(e) => {
                println!("{} {}", "✗".red(), format!("Invalid push: {}", e).red());
                continue;
            }
        };
        let event_id = push.event_id().to_string();

        match bridge.handle(push).await {
            Ok(action) => {
                println!("{} {}", render_action(action), event_id.dimmed());
                session.save()?;
            }
            Err(e) if e.is_soft() => println!("{} {}", "~".yellow(), e.to_string().yellow()),
            Err(e) => println!("{} {}", "✗".red(), e.to_string().red()),
        }
    }

    Ok(())
}

fn render_action(action: BridgeAction) -> String {
    match action {
        BridgeAction::Applied => "applied".green().to_string(),
        BridgeAction::Refetched => "refetched".green().to_string(),
        BridgeAction::Purged => "purged".red().to_string(),
        BridgeAction::Deferred => "deferred".yellow().to_string(),
        BridgeAction::Ignored => "ignored".dimmed().to_string(),
    }
}
