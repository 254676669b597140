//! HTTP transport for the rendezvous server.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rendezvous_core::remote::protocol::{ChannelParams, Method, Route};
use rendezvous_core::{
    Authority, ChannelService, CredentialRefresher, Event, EventDraft, InviteParams,
    MembershipRequest, RemoteError, RemoteResult, RequestScope, UserId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    token: String,
}

/// Bearer token shared between the transport and its refresher.
#[derive(Clone, Default)]
pub struct Token(Arc<RwLock<Option<String>>>);

impl Token {
    pub fn new(token: Option<String>) -> Self {
        Token(Arc::new(RwLock::new(token)))
    }

    fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, token: String) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }
}

/// Calls the server's REST API as one user.
#[derive(Clone)]
pub struct HttpAuthority {
    http: reqwest::Client,
    base_url: String,
    user_id: UserId,
    token: Token,
}

impl HttpAuthority {
    pub fn new(base_url: &str, user_id: &str, token: Token) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(HttpAuthority {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        route: &Route,
        body: Option<&B>,
    ) -> RemoteResult<reqwest::Response> {
        let method = match route.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut req = self.http.request(method, self.url(&route.path));
        if let Some(token) = self.token.get() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        tracing::debug!(method = ?route.method, path = %route.path, "Calling server");
        let resp = req
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error)
            .unwrap_or(text);
        Err(RemoteError::from_status(status, message))
    }

    async fn call<T: DeserializeOwned>(&self, route: Route) -> RemoteResult<T> {
        self.call_with::<(), T>(route, None).await
    }

    async fn call_with<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        route: Route,
        body: Option<&B>,
    ) -> RemoteResult<T> {
        self.send(&route, body)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn call_unit<B: Serialize + ?Sized>(
        &self,
        route: Route,
        body: Option<&B>,
    ) -> RemoteResult<()> {
        self.send(&route, body).await.map(|_| ())
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    fn identity(&self) -> &str {
        &self.user_id
    }

    async fn list_events(&self) -> RemoteResult<Vec<Event>> {
        self.call(Route::list_events()).await
    }

    async fn list_requests(&self, scope: RequestScope) -> RemoteResult<Vec<MembershipRequest>> {
        self.call(Route::list_requests(scope)).await
    }

    async fn fetch_event(&self, event_id: &str) -> RemoteResult<Event> {
        self.call(Route::fetch_event(event_id)).await
    }

    async fn fetch_event_requests(&self, event_id: &str) -> RemoteResult<Vec<MembershipRequest>> {
        self.call(Route::event_requests(event_id)).await
    }

    async fn create_event(&self, draft: &EventDraft) -> RemoteResult<Event> {
        self.call_with(Route::create_event(), Some(draft)).await
    }

    async fn delete_event(&self, event_id: &str) -> RemoteResult<()> {
        self.call_unit::<()>(Route::delete_event(event_id), None).await
    }

    async fn join(&self, event_id: &str) -> RemoteResult<MembershipRequest> {
        self.call(Route::join(event_id)).await
    }

    async fn invite(&self, event_id: &str, params: &InviteParams) -> RemoteResult<MembershipRequest> {
        self.call_with(Route::invite(event_id), Some(params)).await
    }

    async fn respond_invitation(
        &self,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest> {
        self.call(Route::respond_invitation(request_id, accept)).await
    }

    async fn decide_join(
        &self,
        event_id: &str,
        request_id: &str,
        accept: bool,
    ) -> RemoteResult<MembershipRequest> {
        self.call(Route::decide_join(event_id, request_id, accept))
            .await
    }

    async fn cancel_request(&self, event_id: &str, request_id: &str) -> RemoteResult<()> {
        self.call_unit::<()>(Route::cancel_request(event_id, request_id), None)
            .await
    }

    async fn cancel_participation(&self, event_id: &str) -> RemoteResult<()> {
        self.call_unit::<()>(Route::cancel_participation(event_id), None)
            .await
    }
}

#[async_trait]
impl ChannelService for HttpAuthority {
    async fn ensure_channel(&self, event_id: &str, member_id: &UserId) -> RemoteResult<()> {
        let params = ChannelParams {
            member_id: member_id.clone(),
        };
        self.call_unit(Route::ensure_channel(event_id), Some(&params))
            .await
    }
}

/// Trades the configured refresh token for a new bearer token.
pub struct TokenRefresher {
    http: reqwest::Client,
    url: String,
    refresh_token: Option<String>,
    token: Token,
}

impl TokenRefresher {
    pub fn new(authority: &HttpAuthority, refresh_token: Option<String>) -> Self {
        TokenRefresher {
            http: authority.http.clone(),
            url: authority.url("auth/refresh"),
            refresh_token,
            token: authority.token.clone(),
        }
    }
}

#[async_trait]
impl CredentialRefresher for TokenRefresher {
    async fn refresh(&self) -> RemoteResult<()> {
        let Some(refresh_token) = self.refresh_token.as_deref() else {
            return Err(RemoteError::Unauthorized);
        };

        let resp = self
            .http
            .post(&self.url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status, message));
        }

        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.token.set(body.token);
        Ok(())
    }
}
