//! Configuration loading, resolution, and persistence.
//!
//! Handles the TOML config file (~/.config/tictacdog/config.toml) with a
//! `[session]`, `[api]` and `[hub]` section plus indexed `[webserver.<id>]`
//! sections.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub use tictacdog::{SessionSection, TicTacDogConfig};

/// Build a global ID from a type prefix and index: `"webserver.0"`, `"hub.0"`.
pub fn global_id(prefix: &str, index: &str) -> String {
    format!("{prefix}.{index}")
}

/// Short unique ID (first 8 hex chars of a v4 uuid). Used for request
/// correlation and WebSocket source IDs (`ws.{hex}`).
pub fn generate_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

// ---------------------------------------------------------------------------
// Persistence I/O
// ---------------------------------------------------------------------------

/// Returns `~/.config/tictacdog/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tictacdog")
        .join("config.toml")
}

/// Load persisted config from disk. A missing file is created with
/// defaults; an unreadable or unparsable one falls back to defaults and is
/// left untouched.
pub fn load(path: &Path) -> TicTacDogConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<TicTacDogConfig>(&contents) {
            Ok(config) => {
                tracing::info!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("failed to parse {}: {e}", path.display());
                TicTacDogConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let defaults = TicTacDogConfig::default();
            tracing::info!("no config file found, creating {}", path.display());
            save_to(path, &defaults);
            defaults
        }
        Err(e) => {
            tracing::warn!("failed to read {}: {e}", path.display());
            TicTacDogConfig::default()
        }
    }
}

/// Write config to `path`, creating parent dirs. Failures are logged.
pub fn save_to(path: &Path, config: &TicTacDogConfig) {
    if let Some(dir) = path.parent()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        tracing::warn!("failed to create config dir {}: {e}", dir.display());
        return;
    }
    match toml::to_string_pretty(config) {
        Ok(contents) => {
            if let Err(e) = std::fs::write(path, contents) {
                tracing::warn!("failed to write {}: {e}", path.display());
            }
        }
        Err(e) => {
            tracing::warn!("failed to serialize config: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Cached config
// ---------------------------------------------------------------------------

/// Configuration backed by a TOML file, cached behind a `RwLock`.
///
/// Command-line overrides are applied to the cache only, so a one-off
/// `--user` never rewrites the file.
pub struct SystemConfig {
    inner: RwLock<TicTacDogConfig>,
}

impl SystemConfig {
    /// Load config from disk (or create defaults) and cache it.
    pub fn new(path: PathBuf) -> Self {
        let config = load(&path);
        Self {
            inner: RwLock::new(config),
        }
    }

    pub fn snapshot(&self) -> TicTacDogConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Mutate the cached session without persisting.
    pub fn override_session(&self, f: impl FnOnce(&mut SessionSection)) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("tictacdog-test-{}", uuid::Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let path = temp_path();
        let config = load(&path);
        assert_eq!(config, TicTacDogConfig::default());
        assert!(path.exists());
        assert_eq!(load(&path), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn parses_hand_written_file() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"
[session]
user_id = "alice"
opponent_id = "bob"
token = "secret"

[api]
base_url = "http://chat.local:5266"

[webserver.1]
name = "Control"
bind = "0.0.0.0:4000"
"#,
        )
        .unwrap();

        let config = load(&path);
        assert_eq!(config.session.user_id, "alice");
        assert_eq!(config.session.token.as_deref(), Some("secret"));
        assert_eq!(config.api.base_url, "http://chat.local:5266");
        assert_eq!(config.api.timeout_secs, 10);
        assert!(config.hub.is_none());
        assert_eq!(config.webserver["1"].bind, "0.0.0.0:4000");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn unparsable_file_falls_back_without_overwrite() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[session\nuser_id = ").unwrap();

        assert_eq!(load(&path), TicTacDogConfig::default());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[session\nuser_id = "
        );
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn session_override_is_not_persisted() {
        let path = temp_path();
        let system = SystemConfig::new(path.clone());
        system.override_session(|s| s.user_id = "carol".into());
        assert_eq!(system.snapshot().session.user_id, "carol");
        assert_eq!(load(&path).session.user_id, "");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn generated_ids_are_short_and_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
        assert_eq!(global_id("webserver", "0"), "webserver.0");
    }
}
