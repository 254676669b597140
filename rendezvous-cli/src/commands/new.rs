use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use owo_colors::OwoColorize;
use rendezvous_core::{EventDraft, Schedule, Visibility};

use crate::render::Render;
use crate::session::Session;

pub struct NewEventArgs {
    pub title: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub max: u32,
    pub description: Option<String>,
    pub location: Option<String>,
}

pub async fn run(session: &Session, args: NewEventArgs) -> Result<()> {
    let draft = EventDraft {
        title: args.title,
        description: args.description,
        location: args.location,
        schedule: Schedule::Once {
            date: args.date,
            time: args.time,
        },
        max_participants: args.max,
        visibility: Visibility::All,
        excluded_users: Vec::new(),
    };

    let event = session.engine.reconciler().create_event(&draft).await?;

    println!(
        "{} Created {} {} {}",
        "✓".green(),
        event.title.bold(),
        event.schedule.render().dimmed(),
        event.id.dimmed()
    );
    Ok(())
}
