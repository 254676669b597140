//! Credential refresh around any [`Authority`].
//!
//! An `Unauthorized` answer takes the gate exclusively, so calls started after
//! it wait for the refresh instead of failing the same way. Each call is
//! retried at most once.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RemoteError;
use crate::event::{Event, EventDraft};
use crate::remote::protocol::{InviteParams, RequestScope};
use crate::remote::{Authority, RemoteResult};
use crate::request::MembershipRequest;

/// Obtains a fresh credential for the wrapped authority.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self) -> RemoteResult<()>;
}

pub struct Reauthenticating<A, R> {
    inner: A,
    refresher: R,
    gate: RwLock<()>,
    generation: AtomicU64,
}

impl<A: Authority, R: CredentialRefresher> Reauthenticating<A, R> {
    pub fn new(inner: A, refresher: R) -> Self {
        Reauthenticating {
            inner,
            refresher,
            gate: RwLock::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of completed refreshes.
    pub fn refreshes(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn call<'a, T, F, Fut>(&'a self, f: F) -> RemoteResult<T>
    where
        F: Fn(&'a A) -> Fut + Send + Sync,
        Fut: Future<Output = RemoteResult<T>> + Send,
        T: Send,
    {
        let seen = {
            let _pass = self.gate.read().await;
            let seen = self.generation.load(Ordering::SeqCst);
            match f(&self.inner).await {
                Err(RemoteError::Unauthorized) => seen,
                other => return other,
            }
        };

        {
            let _exclusive = self.gate.write().await;
            // Another caller may have refreshed while we waited for the gate.
            if self.generation.load(Ordering::SeqCst) == seen {
                tracing::info!("Credential expired, refreshing");
                self.refresher.refresh().await?;
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
        }

        let _pass = self.gate.read().await;
        f(&self.inner).await
    }
}

#[async_trait]
impl<A: Authority, R: CredentialRefresher> Authority for Reauthenticating<A, R> {
    fn identity(&self) -> &str {
        self.inner.identity()
    }

    async fn list_events(&self) -> RemoteResult<Vec<Event>> {
        self.call(|a| a.list_events()).await
    }

    async fn list_requests(&self, scope: RequestScope) -> RemoteResult<Vec<MembershipRequest>> {
        self.call(|a| a.list_requests(scope)).await
    }

    async fn fetch_event(&self, event_id: &str) -> RemoteResult<Event> {
        self.call(|a| a.fetch_event(event_id)).await
    }

    async fn fetch_event_requests(&self, event_id: &str) -> RemoteResult<Vec<MembershipRequest>> {
        self.call(|a| a.fetch_event_requests(event_id)).await
    }

    async fn create_event(&self, draft: &EventDraft) -> RemoteResult<Event> {
        self.call(|a| a.create_event(draft)).await
    }

    async fn delete_event(&self, event_id: &str) -> RemoteResult<()> {
        self.call(|a| a.delete_event(event_id)).await
    }

    async fn join(&self, event_id: &str) -> RemoteResult<MembershipRequest> {
        self.call(|a| a.join(event_id)).await
    }

    async fn invite(&self, event_id: &str, params: &InviteParams) -> RemoteResult<MembershipRequest> {
        self.call(|a| a.invite(event_id, params)).await
    }

    async fn respond_invitation(
        &self,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest> {
        self.call(|a| a.respond_invitation(request_id, accept)).await
    }

    async fn decide_join(
        &self,
        event_id: &str,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest> {
        self.call(|a| a.decide_join(event_id, request_id, accept))
            .await
    }

    async fn cancel_request(&self, event_id: &str, request_id: &str) -> RemoteResult<()> {
        self.call(|a| a.cancel_request(event_id, request_id)).await
    }

    async fn cancel_participation(&self, event_id: &str) -> RemoteResult<()> {
        self.call(|a| a.cancel_participation(event_id)).await
    }
}
