use anyhow::Result;
use chrono::Local;
use owo_colors::OwoColorize;

use crate::render::{self, format_date_label};
use crate::session::Session;

pub fn run(session: &Session, include_past: bool) -> Result<()> {
    let engine = &session.engine;
    let today = Local::now().date_naive();
    let horizon = engine.config().horizon_days();
    let events = engine.events(include_past, today);

    if events.is_empty() {
        println!("{}", "No events found".dimmed());
        println!("{}", "Run `rendezvous sync` to fetch events from the server.".dimmed());
        return Ok(());
    }

    // Group events by their next date
    let mut current_label: Option<String> = None;

    for event in &events {
        let label = match event.next_date(today, horizon) {
            Some(date) => format_date_label(date, today),
            None => "Past".to_string(),
        };

        if current_label.as_ref() != Some(&label) {
            if current_label.is_some() {
                println!();
            }
            println!("{}", label.bold());
            current_label = Some(label);
        }

        let relationship = engine.classify(&event.id, session.user_id())?;
        let accepted = engine.accepted_participants(&event.id)?.len();
        println!("  {}", render::render_event(event, relationship, accepted));
    }

    Ok(())
}
