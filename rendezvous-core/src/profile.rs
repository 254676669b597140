//! User profiles and typed profile patches.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::event::{EventId, UserId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Business-tier organizers accept join requests without confirmation
    #[serde(default)]
    pub auto_accept: bool,
    /// Events this user participates in, as recorded on the profile
    #[serde(default)]
    pub joined_events: BTreeSet<EventId>,
    #[serde(default)]
    pub friends: BTreeSet<UserId>,
}

/// Partial update of a [`Profile`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_accept: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub join_events: Vec<EventId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leave_events: Vec<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friends: Option<BTreeSet<UserId>>,
}

impl Profile {
    pub fn new(id: &str) -> Self {
        Profile {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Return a copy of this profile with `patch` applied.
    pub fn patched(&self, patch: &ProfilePatch) -> Profile {
        let mut next = self.clone();
        if let Some(name) = &patch.display_name {
            next.display_name = name.clone();
        }
        if let Some(auto_accept) = patch.auto_accept {
            next.auto_accept = auto_accept;
        }
        next.joined_events.extend(patch.join_events.iter().cloned());
        for event_id in &patch.leave_events {
            next.joined_events.remove(event_id);
        }
        if let Some(friends) = &patch.friends {
            next.friends = friends.clone();
        }
        next
    }
}

impl ProfilePatch {
    pub fn joined(event_id: &str) -> Self {
        ProfilePatch {
            join_events: vec![event_id.to_string()],
            ..Default::default()
        }
    }

    pub fn left(event_id: &str) -> Self {
        ProfilePatch {
            leave_events: vec![event_id.to_string()],
            ..Default::default()
        }
    }

    /// Combine two patches; fields set in `later` win.
    pub fn then(mut self, later: ProfilePatch) -> ProfilePatch {
        if later.display_name.is_some() {
            self.display_name = later.display_name;
        }
        if later.auto_accept.is_some() {
            self.auto_accept = later.auto_accept;
        }
        for event_id in later.join_events {
            self.leave_events.retain(|e| *e != event_id);
            if !self.join_events.contains(&event_id) {
                self.join_events.push(event_id);
            }
        }
        for event_id in later.leave_events {
            self.join_events.retain(|e| *e != event_id);
            if !self.leave_events.contains(&event_id) {
                self.leave_events.push(event_id);
            }
        }
        if later.friends.is_some() {
            self.friends = later.friends;
        }
        self
    }
}
