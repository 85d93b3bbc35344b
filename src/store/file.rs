//! JSON-file state store.
//!
//! Layout inside the state directory:
//!
//! ```text
//! rate_limits.json   -> RateLimitState
//! tokens.json        -> TokenState
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{RateLimitState, StateStore, StoreError, TokenState};

const RATE_LIMITS_FILE: &str = "rate_limits.json";
const TOKENS_FILE: &str = "tokens.json";

#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.dir.join(name);
        if !path.exists() {
            debug!(path = %path.display(), "State file missing, starting empty");
            return T::default();
        }

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read state file, starting empty");
                return T::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "State file corrupted, starting empty");
                T::default()
            }
        }
    }

    /// Write to a temp file next to the target, then rename over it so
    /// readers see either the old or the new snapshot.
    fn save<T: Serialize>(&self, name: &str, state: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_vec_pretty(state)?;

        let target = self.dir.join(name);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));

        let written = write_private(&tmp, &content).and_then(|_| fs::rename(&tmp, &target));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

impl StateStore for FileStateStore {
    fn load_rate_limits(&self) -> RateLimitState {
        self.load(RATE_LIMITS_FILE)
    }

    fn save_rate_limits(&self, state: &RateLimitState) -> Result<(), StoreError> {
        self.save(RATE_LIMITS_FILE, state)
    }

    fn load_tokens(&self) -> TokenState {
        self.load(TOKENS_FILE)
    }

    fn save_tokens(&self, state: &TokenState) -> Result<(), StoreError> {
        self.save(TOKENS_FILE, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TokenRecord;
    use tempfile::TempDir;

    fn test_store() -> (FileStateStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStateStore::new(temp_dir.path().join("state"));
        (store, temp_dir)
    }

    #[test]
    fn test_missing_files_load_empty() {
        let (store, _temp) = test_store();
        assert!(store.load_rate_limits().is_empty());
        assert!(store.load_tokens().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let (store, _temp) = test_store();

        let mut limits = RateLimitState::default();
        limits.append("a@x.com", 10);
        limits.append("b@x.com", 20);
        store.save_rate_limits(&limits).unwrap();

        let mut tokens = TokenState::default();
        tokens.push(TokenRecord::new("abc", "a@x.com", 10, 3_600_010));
        store.save_tokens(&tokens).unwrap();

        assert_eq!(store.load_rate_limits(), limits);
        assert_eq!(store.load_tokens(), tokens);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let (store, _temp) = test_store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join(RATE_LIMITS_FILE), "{ not json").unwrap();

        assert!(store.load_rate_limits().is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let (store, _temp) = test_store();
        store.save_tokens(&TokenState::default()).unwrap();
        store.save_tokens(&TokenState::default()).unwrap();

        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![TOKENS_FILE.to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_state_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _temp) = test_store();
        store.save_tokens(&TokenState::default()).unwrap();

        let mode = fs::metadata(store.dir().join(TOKENS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_save_fails_when_dir_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let store = FileStateStore::new(&blocker);
        assert!(store.save_rate_limits(&RateLimitState::default()).is_err());
        assert!(store.load_rate_limits().is_empty());
    }
}
