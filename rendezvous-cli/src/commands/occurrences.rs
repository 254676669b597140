use anyhow::Result;
use chrono::Local;
use owo_colors::OwoColorize;
use rendezvous_core::DateRange;

use crate::render::format_date_label;
use crate::session::Session;

pub fn run(
    session: &Session,
    event_id: &str,
    months: Option<u32>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let engine = &session.engine;
    let today = Local::now().date_naive();
    let months = months.unwrap_or(engine.config().occurrence_window_months);
    let range = DateRange::from_args(from, to, today, months)?;

    let dates = engine.occurrences(event_id, Some(range), today)?;
    let title = engine
        .snapshot()
        .event(event_id)
        .map(|e| e.title.clone())
        .unwrap_or_default();

    println!("{} {}", title.bold(), format!("{} to {}", range.from, range.to).dimmed());

    if dates.is_empty() {
        println!("   {}", "No occurrences in this window".dimmed());
        return Ok(());
    }

    for date in dates {
        let label = format_date_label(date, today);
        if date < today {
            println!("   {}", label.dimmed());
        } else {
            println!("   {}", label);
        }
    }

    Ok(())
}
