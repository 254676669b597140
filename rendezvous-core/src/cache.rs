//! On-disk snapshot of the store between sessions.

use std::path::PathBuf;

use crate::error::{EngineError, EngineResult};
use crate::store::State;

const CACHE_FILE: &str = "state.json";

pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Cache { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Load the cached state, or an empty one if nothing was saved yet.
    pub fn load(&self) -> EngineResult<State> {
        let path = self.path();
        if !path.exists() {
            return Ok(State::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| EngineError::Serialization(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, state: &State) -> EngineResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path();
        let temp = self.dir.join(CACHE_FILE.to_string() + ".tmp");

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;

        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;

    #[test]
    fn test_missing_cache_loads_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().join("nested"));
        let state = cache.load().unwrap();
        assert!(state.events.is_empty());
    }

    #[test]
    fn test_save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path());

        let mut state = State::default();
        state.profiles.insert("u1".into(), Profile::new("u1"));
        cache.save(&state).unwrap();

        assert!(!dir.path().join("state.json.tmp").exists());
        let loaded = cache.load().unwrap();
        assert!(loaded.profiles.contains_key("u1"));
    }
}
