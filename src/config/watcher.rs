//! Hot reload of the configuration file.
//!
//! The parent directory is watched rather than the file itself: editors and
//! deploy tools usually replace the file, which drops a watch on the old inode.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{parse_config, ConfigError};
use crate::config::schema::ServerConfig;

/// Sends a freshly validated [`ServerConfig`] whenever the file changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ServerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for reloaded configs.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. Keep the returned watcher alive for as long as
    /// reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let ConfigWatcher { path, update_tx } = self;
        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let last = Mutex::new(std::fs::read_to_string(&path).ok());
        let target = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &target) => {
                    let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                    match reload(&target, last.as_deref()) {
                        Ok(Some((contents, config))) => {
                            tracing::info!(path = %target.display(), "Configuration reloaded");
                            *last = Some(contents);
                            let _ = update_tx.send(config);
                        }
                        Ok(None) => {}
                        Err(e) => tracing::error!(
                            path = %target.display(),
                            error = %e,
                            "Reload rejected, keeping current configuration"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Whether `event` is a write, create or rename that involves `path`.
fn touches(event: &Event, path: &Path) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_)
    );
    relevant && event.paths.iter().any(|p| same_file_name(p, path))
}

fn same_file_name(a: &Path, b: &Path) -> bool {
    a.file_name().is_some() && a.file_name() == b.file_name()
}

/// Read and validate `path`. `Ok(None)` when the contents did not change
/// since `previous`.
fn reload(path: &Path, previous: Option<&str>) -> Result<Option<(String, ServerConfig)>, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    if previous == Some(contents.as_str()) {
        return Ok(None);
    }
    let config = parse_config(&contents)?;
    Ok(Some((contents, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_events_for_the_config_file_count() {
        let config = Path::new("/etc/warden/warden.toml");

        assert!(touches(&event(EventKind::Modify(ModifyKind::Any), "/etc/warden/warden.toml"), config));
        assert!(touches(&event(EventKind::Create(CreateKind::File), "/etc/warden/warden.toml"), config));
        assert!(!touches(&event(EventKind::Modify(ModifyKind::Any), "/etc/warden/other.toml"), config));
        assert!(!touches(&event(EventKind::Remove(RemoveKind::File), "/etc/warden/warden.toml"), config));
    }

    #[test]
    fn unchanged_or_invalid_contents_are_not_sent() {
        let path = std::env::temp_dir().join(format!("warden-watch-{}.toml", std::process::id()));
        std::fs::write(&path, "[server]\nname = \"reloaded\"\n").unwrap();

        let (contents, config) = reload(&path, None).unwrap().unwrap();
        assert_eq!(config.server.name, "reloaded");
        assert!(reload(&path, Some(&contents)).unwrap().is_none());

        std::fs::write(&path, "[server]\nport = 0\n").unwrap();
        assert!(reload(&path, Some(&contents)).is_err());

        std::fs::remove_file(&path).unwrap();
    }
}
