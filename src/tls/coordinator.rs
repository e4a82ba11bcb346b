//! Renewal coordination: the single place where a marker change turns into a write
//!
//! Every trigger source funnels into [`RenewalCoordinator::evaluate`]. The
//! load-compare-write sequence runs under one fair lock, so concurrent or duplicate
//! triggers are serialized and a marker is applied at most once per change.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::expiry;
use super::source::{ConfigSource, Marker};
use super::writer::CertificateWriter;
use crate::error::{ConfigError, RenewalError, WriteError};

/// What caused an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    FileChange,
    Timer,
    Signal,
    Shutdown,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Startup => "startup",
            Trigger::FileChange => "file-change",
            Trigger::Timer => "timer",
            Trigger::Signal => "signal",
            Trigger::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Coordinator progress through one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Evaluating = 1,
    Applying = 2,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Evaluating,
            2 => Phase::Applying,
            _ => Phase::Idle,
        }
    }
}

/// Result of a single evaluation
#[derive(Debug)]
pub enum Evaluation {
    /// The pair was written and the marker advanced
    Applied(Marker),
    /// The document carries the marker that is already applied
    Unchanged,
    /// The document could not be loaded; nothing happened
    ConfigUnavailable(ConfigError),
    /// The write failed; the marker stays pending and will be retried
    WriteFailed(WriteError),
}

impl Evaluation {
    pub fn is_applied(&self) -> bool {
        matches!(self, Evaluation::Applied(_))
    }
}

#[derive(Debug, Default)]
struct RenewalState {
    last_applied: Option<Marker>,
}

/// Owns the applied marker and decides when to republish
pub struct RenewalCoordinator {
    source: Arc<dyn ConfigSource>,
    writer: Arc<dyn CertificateWriter>,
    state: Mutex<RenewalState>,
    phase: AtomicU8,
}

impl RenewalCoordinator {
    pub fn new(source: Arc<dyn ConfigSource>, writer: Arc<dyn CertificateWriter>) -> Self {
        Self {
            source,
            writer,
            state: Mutex::new(RenewalState::default()),
            phase: AtomicU8::new(Phase::Idle as u8),
        }
    }

    /// Mandatory first evaluation; an unreadable document here is fatal
    pub async fn initialize(&self) -> Result<Evaluation, ConfigError> {
        match self.evaluate(Trigger::Startup).await {
            Evaluation::ConfigUnavailable(e) => Err(e),
            other => Ok(other),
        }
    }

    /// Startup evaluation for one-shot runs: succeeds only if the pair is on disk
    pub async fn publish_once(&self) -> Result<(), RenewalError> {
        match self.initialize().await? {
            Evaluation::Applied(_) | Evaluation::Unchanged => Ok(()),
            Evaluation::WriteFailed(e) => Err(e.into()),
            Evaluation::ConfigUnavailable(e) => Err(e.into()),
        }
    }

    /// Load the document and republish the pair if its marker differs from the
    /// applied one. Waits for any in-flight evaluation to finish first.
    pub async fn evaluate(&self, trigger: Trigger) -> Evaluation {
        let mut state = self.state.lock().await;
        self.set_phase(Phase::Evaluating);

        let evaluation = self.evaluate_locked(&mut state, trigger).await;

        self.set_phase(Phase::Idle);
        evaluation
    }

    async fn evaluate_locked(&self, state: &mut RenewalState, trigger: Trigger) -> Evaluation {
        let snapshot = match self.source.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%trigger, source = %self.source.describe(), error = %e, "Config document unavailable, skipping");
                return Evaluation::ConfigUnavailable(e);
            }
        };

        if state.last_applied.as_ref() == Some(&snapshot.marker) {
            debug!(%trigger, marker = %snapshot.marker, "Certificate already current");
            return Evaluation::Unchanged;
        }

        self.set_phase(Phase::Applying);
        match self.writer.write(&snapshot.cert, &snapshot.key).await {
            Ok(()) => {
                info!(
                    %trigger,
                    marker = %snapshot.marker,
                    previous = state.last_applied.as_ref().map(Marker::as_str).unwrap_or("<none>"),
                    "Certificate extracted successfully"
                );
                if let Some(valid_until) = expiry::describe(&snapshot.marker) {
                    info!("Certificate valid until: {}", valid_until);
                }
                state.last_applied = Some(snapshot.marker.clone());
                Evaluation::Applied(snapshot.marker)
            }
            Err(e) => {
                error!(%trigger, marker = %snapshot.marker, error = %e, "Failed to write certificate, will retry on next trigger");
                Evaluation::WriteFailed(e)
            }
        }
    }

    /// Marker of the pair currently on disk, if any was written by this process
    pub async fn applied_marker(&self) -> Option<Marker> {
        self.state.lock().await.last_applied.clone()
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}

impl fmt::Debug for RenewalCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewalCoordinator")
            .field("source", &self.source.describe())
            .field("phase", &self.phase())
            .finish()
    }
}
