//! Config document watcher that triggers a renewal check when the file changes on disk

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::coordinator::{RenewalCoordinator, Trigger};

/// Watches the directory holding the config document
#[derive(Debug)]
pub struct ChangeDetector {
    coordinator: Arc<RenewalCoordinator>,
    /// Path of the config document
    config_path: PathBuf,
    /// Debounce duration to coalesce bursts of events
    debounce_duration: Duration,
}

impl ChangeDetector {
    /// Create a new change detector
    ///
    /// # Arguments
    /// * `coordinator` - Coordinator to call on relevant changes
    /// * `config_path` - Path to the watched config document
    /// * `debounce_millis` - Debounce window in milliseconds, `0` disables it
    pub fn new(
        coordinator: Arc<RenewalCoordinator>,
        config_path: impl Into<PathBuf>,
        debounce_millis: u64,
    ) -> Self {
        Self {
            coordinator,
            config_path: config_path.into(),
            debounce_duration: Duration::from_millis(debounce_millis),
        }
    }

    /// Extract directory path from file path
    ///
    /// The parent directory is watched rather than the file itself, since the
    /// document is usually replaced rather than edited in place.
    fn extract_directory(path: &Path) -> Result<PathBuf> {
        match path.parent() {
            Some(p) if p.as_os_str().is_empty() => Ok(PathBuf::from(".")),
            Some(p) => Ok(p.to_path_buf()),
            None => Err(anyhow::anyhow!(
                "Failed to extract parent directory from path: {:?}",
                path
            )),
        }
    }

    /// Whether `event` is a create/modify touching the config document
    pub fn is_relevant(event: &Event, config_path: &Path) -> bool {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return false;
        }
        let Some(config_name) = config_path.file_name() else {
            return false;
        };
        event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(config_name))
    }

    /// Exists and is non-empty; editors and writers often truncate first
    async fn has_content(path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    /// Start the file watcher as a background task
    ///
    /// The `notify` watcher lives inside the spawned task, so the watch stays
    /// active until the task ends or is aborted.
    ///
    /// # Errors
    /// Returns error if the watcher cannot be created or the directory cannot be watched
    pub fn start(self) -> Result<tokio::task::JoinHandle<()>> {
        let dir = Self::extract_directory(&self.config_path)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        debug!("Watcher event dropped, receiver closed");
                    }
                }
                Err(e) => error!("File watcher error: {}", e),
            }
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {:?}", dir))?;

        info!(
            directory = %dir.display(),
            config = %self.config_path.display(),
            "Config watcher started"
        );

        let handle = tokio::spawn(async move {
            let _watcher = watcher;

            while let Some(event) = rx.recv().await {
                if !Self::is_relevant(&event, &self.config_path) {
                    debug!("Ignoring file event: {:?}", event.kind);
                    continue;
                }
                debug!("Config change detected: {:?}", event.kind);

                if !self.debounce_duration.is_zero() {
                    sleep(self.debounce_duration).await;
                    // Anything queued meanwhile is covered by the evaluation below
                    while rx.try_recv().is_ok() {}
                }

                if !Self::has_content(&self.config_path).await {
                    debug!("Config document empty or absent, waiting for next change");
                    continue;
                }

                self.coordinator.evaluate(Trigger::FileChange).await;
            }

            warn!("Config watcher event loop terminated");
        });

        Ok(handle)
    }
}
