//! Configuration file watcher for hot reload.
//!
//! A change event reloads, validates and normalizes the file. Only a config
//! that survives all three steps is sent on; any failure keeps the running
//! routes in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_normalized, ConfigError};
use crate::config::normalize::NormalizeOptions;
use crate::config::schema::NormalizedConfig;

/// Watches one configuration file and emits freshly normalized configs.
pub struct ConfigWatcher {
    path: PathBuf,
    options: NormalizeOptions,
    sender: mpsc::UnboundedSender<NormalizedConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of its updates.
    pub fn new(path: &Path, options: NormalizeOptions) -> (Self, mpsc::UnboundedReceiver<NormalizedConfig>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            options,
            sender,
        };
        (watcher, receiver)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, options, sender } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_change(&event.kind) => {
                    tracing::info!(path = %watched.display(), "Config file changed, reloading");
                    if let Some(normalized) = reload(&watched, &options) {
                        let _ = sender.send(normalized);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn is_change(kind: &EventKind) -> bool {
    kind.is_modify() || kind.is_create()
}

/// Load the file again, logging why it was rejected if it was.
pub fn reload(path: &Path, options: &NormalizeOptions) -> Option<NormalizedConfig> {
    match load_normalized(path, options) {
        Ok(normalized) => {
            tracing::debug!(sockets = normalized.ports.len(), "Reloaded configuration normalized");
            Some(normalized)
        }
        Err(ConfigError::Io(e)) => {
            tracing::warn!(error = %e, "Config file unreadable, keeping current routes");
            None
        }
        Err(e @ (ConfigError::Toml(_) | ConfigError::Json(_))) => {
            tracing::error!(error = %e, "Config file does not parse, keeping current routes");
            None
        }
        Err(ConfigError::Validation(errors)) => {
            for error in &errors {
                tracing::error!(error = %error, "Config validation error");
            }
            tracing::error!(count = errors.len(), "Config rejected, keeping current routes");
            None
        }
        Err(ConfigError::Normalize(e)) => {
            tracing::error!(error = %e, "Config cannot be normalized, keeping current routes");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_reload_accepts_valid_config() {
        let file = config_file("http = 8080\n[routes]\n\"a.com\" = 3000\n");
        let normalized = reload(file.path(), &NormalizeOptions::default()).unwrap();
        assert!(normalized.ports["8080"].proxy.contains_key("a.com"));
    }

    #[test]
    fn test_reload_rejects_broken_configs() {
        let options = NormalizeOptions::default();
        assert!(reload(config_file("http = [").path(), &options).is_none());
        assert!(reload(config_file("http = 0").path(), &options).is_none());
        assert!(reload(Path::new("/nonexistent/dispatch-proxy.toml"), &options).is_none());
    }

    #[test]
    fn test_only_modify_and_create_trigger_reload() {
        assert!(is_change(&EventKind::Create(notify::event::CreateKind::File)));
        assert!(is_change(&EventKind::Modify(notify::event::ModifyKind::Any)));
        assert!(!is_change(&EventKind::Access(notify::event::AccessKind::Any)));
        assert!(!is_change(&EventKind::Remove(notify::event::RemoveKind::File)));
    }
}
