//! One CLI invocation's engine, loaded from and saved back to the cache.

use std::sync::Arc;

use anyhow::{Context, Result};
use rendezvous_core::{Cache, Engine, Reauthenticating};

use crate::config::ClientConfig;
use crate::remote::{HttpAuthority, Token, TokenRefresher};

pub type SessionAuthority = Reauthenticating<HttpAuthority, TokenRefresher>;

pub struct Session {
    pub engine: Engine<SessionAuthority>,
    cache: Cache,
}

impl Session {
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let user_id = config.require_user()?;
        let http = HttpAuthority::new(&config.server_url, user_id, Token::new(config.token.clone()))
            .context("Could not set up HTTP client")?;
        let refresher = TokenRefresher::new(&http, config.refresh_token.clone());
        let channels = Arc::new(http.clone());

        let cache = Cache::new(config.cache_path());
        let state = cache.load().with_context(|| {
            format!("Could not read cache at {}", cache.path().display())
        })?;

        let engine = Engine::with_state(
            Reauthenticating::new(http, refresher),
            channels,
            config.engine.clone(),
            state,
        )?;

        Ok(Session { engine, cache })
    }

    pub fn user_id(&self) -> &str {
        self.engine.identity()
    }

    pub fn save(&self) -> Result<()> {
        self.cache
            .save(&self.engine.snapshot())
            .with_context(|| format!("Could not write cache at {}", self.cache.path().display()))
    }
}
