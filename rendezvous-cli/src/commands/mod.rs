pub mod delete;
pub mod events;
pub mod membership;
pub mod new;
pub mod occurrences;
pub mod requests;
pub mod sync;
pub mod watch;
