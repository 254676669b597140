pub mod merge;
mod synchronizer;

pub use synchronizer::{SourceOutcome, SyncReport, Synchronizer};
