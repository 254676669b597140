//! Translates push notifications into store updates.
//!
//! Pushes that carry the full record are applied directly. Pushes that only
//! name ids trigger a targeted re-fetch. Request pushes for a pair with a local
//! mutation in flight are deferred to that mutation's own reconciliation.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{EngineError, EngineResult};
use crate::remote::Authority;
use crate::remote::protocol::PushEvent;
use crate::request::MembershipRequest;
use crate::sync::Synchronizer;

/// What handling one push did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAction {
    Applied,
    Refetched,
    Purged,
    Deferred,
    Ignored,
}

pub struct InvalidationBridge<A> {
    sync: Synchronizer<A>,
}

impl<A> Clone for InvalidationBridge<A> {
    fn clone(&self) -> Self {
        InvalidationBridge {
            sync: self.sync.clone(),
        }
    }
}

impl<A: Authority + 'static> InvalidationBridge<A> {
    pub fn new(sync: Synchronizer<A>) -> Self {
        InvalidationBridge { sync }
    }

    pub async fn handle(&self, push: PushEvent) -> EngineResult<BridgeAction> {
        tracing::debug!(?push, "Handling push");
        let store = self.sync.store();

        match push {
            PushEvent::EventCreated { event_id, event }
            | PushEvent::EventUpdated { event_id, event } => match event {
                Some(event) if event.id == event_id => {
                    store.apply(|state| state.upsert_event(event));
                    Ok(BridgeAction::Applied)
                }
                _ => self.refetch_event(&event_id).await,
            },

            PushEvent::EventDeleted { event_id } => {
                let removed = store.apply(|state| state.remove_event(&event_id));
                Ok(if removed.is_some() {
                    BridgeAction::Purged
                } else {
                    BridgeAction::Ignored
                })
            }

            PushEvent::RequestCreated {
                event_id,
                subject_id,
                request,
                ..
            }
            | PushEvent::RequestUpdated {
                event_id,
                subject_id,
                request,
                ..
            } => {
                let pair = (event_id.clone(), subject_id);
                if store.snapshot().is_in_flight(&pair) {
                    tracing::debug!(%event_id, "Deferring push for pair with a mutation in flight");
                    return Ok(BridgeAction::Deferred);
                }

                if store.snapshot().event(&event_id).is_none() {
                    match self.sync.refresh_event(&event_id).await {
                        Ok(_) => {}
                        Err(EngineError::Stale(_)) => return Ok(BridgeAction::Ignored),
                        Err(e) => return Err(e),
                    }
                }

                match request.filter(|r| r.event_id == event_id) {
                    Some(record) => self.apply_record(record),
                    None => {
                        self.sync.resync_event_requests(&event_id).await?;
                        Ok(BridgeAction::Refetched)
                    }
                }
            }

            PushEvent::RequestDeleted {
                request_id,
                event_id,
                subject_id,
            } => {
                let pair = (event_id, subject_id);
                if store.snapshot().is_in_flight(&pair) {
                    return Ok(BridgeAction::Deferred);
                }
                let removed = store.apply(|state| state.remove_request(&request_id));
                Ok(if removed.is_some() {
                    BridgeAction::Purged
                } else {
                    BridgeAction::Ignored
                })
            }
        }
    }

    fn apply_record(&self, record: MembershipRequest) -> EngineResult<BridgeAction> {
        let pair = record.pair();
        let applied = self.sync.store().apply(|state| {
            // Re-checked under the write lock: a mutation may have started since.
            if state.is_in_flight(&pair) {
                return false;
            }
            state.apply_server_request(record);
            true
        });
        Ok(if applied {
            BridgeAction::Applied
        } else {
            BridgeAction::Deferred
        })
    }

    async fn refetch_event(&self, event_id: &str) -> EngineResult<BridgeAction> {
        match self.sync.refresh_event(event_id).await {
            Ok(_) => Ok(BridgeAction::Refetched),
            Err(EngineError::Stale(_)) => Ok(BridgeAction::Purged),
            Err(e) => Err(e),
        }
    }

    /// Handle pushes until the sender side closes.
    pub async fn run(self, mut pushes: mpsc::Receiver<PushEvent>) {
        while let Some(push) = pushes.recv().await {
            match self.handle(push).await {
                Ok(action) => tracing::debug!(?action, "Push handled"),
                Err(e) => tracing::warn!(error = %e, "Push handling failed"),
            }
        }
        tracing::debug!("Push channel closed");
    }

    pub fn spawn(self, pushes: mpsc::Receiver<PushEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(pushes))
    }
}
