use anyhow::Result;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::session::Session;
use crate::utils::progress;

pub async fn run(session: &Session) -> Result<()> {
    let report = progress::while_waiting("Syncing", session.engine.sync_all()).await;

    println!("{}", "Synced with server".bold());
    println!("{}", report.render());

    if report.has_failures() {
        println!(
            "\n{}",
            "Some sources could not be fetched; cached data was kept for them.".yellow()
        );
    }

    Ok(())
}
