//! Client configuration at ~/.config/rendezvous/config.toml
//!
//! Every field can be overridden from the environment with a `RENDEZVOUS_`
//! prefix, e.g. `RENDEZVOUS_TOKEN` or `RENDEZVOUS_ENGINE__PAST_GRACE_DAYS`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use rendezvous_core::EngineConfig;
use serde::{Deserialize, Serialize};

static DEFAULT_SERVER_URL: &str = "http://127.0.0.1:4080/api";
static DEFAULT_CACHE_DIR: &str = "~/.cache/rendezvous";

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Identity every call is made as
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    /// Exchanged for a new token when the current one expires
    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl ClientConfig {
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("rendezvous");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the config file (creating a commented default on first run),
    /// then layer `RENDEZVOUS_*` environment variables on top.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: ClientConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("RENDEZVOUS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Could not read config")?
            .try_deserialize()
            .context("Invalid config")?;

        config.engine.validate()?;
        Ok(config)
    }

    pub fn cache_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.cache_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    /// The configured identity, or an error telling the user how to set one.
    pub fn require_user(&self) -> Result<&str> {
        self.user_id.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No user configured.\n\n\
                Set your identity in {} with:\n  \
                user_id = \"<your id>\"\n\n\
                or export RENDEZVOUS_USER_ID",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "the config file".into())
            )
        })
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> Result<()> {
        let defaults = EngineConfig::default();
        let contents = format!(
            "\
# rendezvous configuration

# Server to sync with:
# server_url = \"{}\"

# Who you are, and your API credentials:
# user_id = \"alice\"
# token = \"...\"
# refresh_token = \"...\"

# Where the local cache lives:
# cache_dir = \"{}\"

# [engine]
# occurrence_window_months = {}
# past_grace_days = {}
# channel_retry_attempts = {}
# channel_retry_delay_ms = {}
",
            DEFAULT_SERVER_URL,
            DEFAULT_CACHE_DIR,
            defaults.occurrence_window_months,
            defaults.past_grace_days,
            defaults.channel_retry_attempts,
            defaults.channel_retry_delay_ms,
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Could not create config directory")?;
        }

        std::fs::write(path, contents).context("Could not write config file")?;

        Ok(())
    }
}
