use anyhow::Result;
use owo_colors::OwoColorize;
use rendezvous_core::{MembershipRequest, RequestKind};

use crate::render::Render;
use crate::session::Session;

pub fn run(session: &Session, pending_only: bool) -> Result<()> {
    let state = session.engine.snapshot();
    let me = session.user_id();

    let mut events: Vec<_> = state.events.values().collect();
    events.sort_by(|a, b| a.title.cmp(&b.title));

    let mut printed = false;
    for event in events {
        let mut requests: Vec<&MembershipRequest> = state
            .requests_for(&event.id)
            .filter(|r| !pending_only || r.is_pending())
            .collect();
        if requests.is_empty() {
            continue;
        }
        requests.sort_by_key(|r| r.created_at);

        if printed {
            println!();
        }
        println!("{} {}", event.title.bold(), event.id.dimmed());
        for request in requests {
            println!("   {}{}", request.render(), hint(request, me, event.is_organizer(me)));
        }
        printed = true;
    }

    if !printed {
        println!("{}", "No requests".dimmed());
    }

    Ok(())
}

/// What the current user can do about a pending request, if anything.
fn hint(request: &MembershipRequest, me: &str, organizer: bool) -> String {
    if !request.is_pending() || request.is_local() {
        return String::new();
    }
    let action = match request.kind {
        RequestKind::Invite if request.target_id == me => "respond --accept|--reject",
        RequestKind::Join if organizer => "respond --accept|--reject",
        RequestKind::Join if request.requester_id == me => "cancel",
        _ => return String::new(),
    };
    format!("  {}", format!("(rendezvous {})", action).dimmed())
}
