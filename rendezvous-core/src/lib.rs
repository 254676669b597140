//! Event relationship and synchronization engine.
//!
//! This crate provides the client-side core shared by every rendezvous front end:
//! - pure derivations: relationship classification, recurrence, capacity
//! - a single-writer [`Store`] holding the cached events and requests
//! - the [`Reconciler`] for optimistic membership mutations
//! - the [`Synchronizer`] for full and targeted syncs
//! - the [`InvalidationBridge`] for push notifications

pub mod bridge;
pub mod cache;
pub mod capacity;
pub mod config;
pub mod date_range;
pub mod engine;
pub mod error;
pub mod event;
pub mod profile;
pub mod reconciler;
pub mod recurrence;
pub mod relationship;
pub mod remote;
pub mod request;
pub mod store;
pub mod sync;

pub use bridge::{BridgeAction, InvalidationBridge};
pub use cache::Cache;
pub use config::EngineConfig;
pub use date_range::DateRange;
pub use engine::Engine;
pub use error::{EngineError, EngineResult, RemoteError};
pub use event::{Event, EventDraft, EventId, RequestId, Schedule, UserId, Visibility};
pub use profile::{Profile, ProfilePatch};
pub use reconciler::{Completion, Outcome, Reconciler};
pub use recurrence::{RecurrenceKind, RecurrenceRule};
pub use relationship::{Relationship, classify};
pub use remote::protocol::{InviteParams, PushEvent, RequestScope};
pub use remote::reauth::{CredentialRefresher, Reauthenticating};
pub use remote::{Authority, ChannelService, NoChannels, RemoteResult};
pub use request::{MembershipRequest, RequestKind, RequestStatus};
pub use store::{State, Store};
pub use sync::{SourceOutcome, SyncReport, Synchronizer};
