//! Membership mutations. Each applies locally first, then waits for the
//! server to confirm before the cache is saved.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use rendezvous_core::{Completion, Outcome};

use crate::render::Render;
use crate::session::Session;
use crate::utils::progress;

async fn confirm(session: &Session, event_id: &str, completion: Completion) -> Result<Outcome> {
    let outcome = progress::while_waiting("Waiting for server", completion.wait())
        .await
        .context("Server did not accept the change")?;
    println!("{}", outcome.render());

    if let Ok(relationship) = session.engine.classify(event_id, session.user_id()) {
        println!("   {} {}", "Now:".dimmed(), relationship.render());
    }
    Ok(outcome)
}

pub async fn join(session: &Session, event_id: &str) -> Result<()> {
    let completion = session
        .engine
        .reconciler()
        .request_join(event_id, session.user_id())?;
    confirm(session, event_id, completion).await?;
    Ok(())
}

pub async fn invite(session: &Session, event_id: &str, invitee: &str) -> Result<()> {
    let completion = session
        .engine
        .reconciler()
        .invite(event_id, session.user_id(), invitee)?;
    confirm(session, event_id, completion).await?;
    Ok(())
}

pub async fn respond(session: &Session, request_id: &str, accept: bool) -> Result<()> {
    let event_id = session
        .engine
        .snapshot()
        .request(request_id)
        .map(|r| r.event_id.clone())
        .with_context(|| format!("Request '{}' not found. Try `rendezvous sync` first.", request_id))?;

    let completion = session.engine.reconciler().respond(request_id, accept)?;
    confirm(session, &event_id, completion).await?;
    Ok(())
}

pub async fn cancel(session: &Session, event_id: &str) -> Result<()> {
    let completion = session
        .engine
        .reconciler()
        .cancel_request(event_id, session.user_id())?;
    confirm(session, event_id, completion).await?;
    Ok(())
}

pub async fn leave(session: &Session, event_id: &str) -> Result<()> {
    let completion = session
        .engine
        .reconciler()
        .cancel_participation(event_id, session.user_id())?;
    confirm(session, event_id, completion).await?;
    Ok(())
}
