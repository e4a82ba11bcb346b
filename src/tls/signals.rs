//! Operator signal handling.
//!
//! SIGHUP/SIGUSR1 request an immediate recheck; SIGINT/SIGTERM run a final check
//! and then let the process exit.

use anyhow::{Context, Result};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::coordinator::{RenewalCoordinator, Trigger};

/// Signal type for cross-task communication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// Re-evaluate the config document now (SIGHUP, SIGUSR1)
    Recheck,
    /// Final evaluation, then stop (SIGTERM, SIGINT)
    Shutdown,
}

/// OS signal streams the trap listens on
#[cfg(unix)]
struct OsSignals {
    hangup: tokio::signal::unix::Signal,
    user1: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?,
            user1: signal(SignalKind::user_defined1())
                .context("Failed to install SIGUSR1 handler")?,
            interrupt: signal(SignalKind::interrupt())
                .context("Failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?,
        })
    }

    async fn next(&mut self) -> SignalType {
        tokio::select! {
            _ = self.hangup.recv() => SignalType::Recheck,
            _ = self.user1.recv() => SignalType::Recheck,
            _ = self.interrupt.recv() => SignalType::Shutdown,
            _ = self.terminate.recv() => SignalType::Shutdown,
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> SignalType {
        match tokio::signal::ctrl_c().await {
            Ok(()) => SignalType::Shutdown,
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<SignalType>().await
            }
        }
    }
}

/// Turns operator signals into coordinator evaluations
#[derive(Debug)]
pub struct SignalTrap {
    coordinator: Arc<RenewalCoordinator>,
}

impl SignalTrap {
    pub fn new(coordinator: Arc<RenewalCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Evaluate for one signal and report whether to keep listening
    ///
    /// Returns only after the evaluation has finished, waiting behind any
    /// evaluation already in flight.
    pub async fn handle(&self, signal: SignalType) -> ControlFlow<()> {
        debug!(signal = ?signal, "Received signal");
        match signal {
            SignalType::Recheck => {
                info!("Recheck requested");
                self.coordinator.evaluate(Trigger::Signal).await;
                ControlFlow::Continue(())
            }
            SignalType::Shutdown => {
                info!("Shutdown requested, running final certificate check");
                self.coordinator.evaluate(Trigger::Shutdown).await;
                ControlFlow::Break(())
            }
        }
    }

    /// Listen for OS signals until shutdown is requested
    ///
    /// Signals arriving during an evaluation queue up and are handled in order.
    pub async fn run(self) -> Result<()> {
        let mut signals = OsSignals::install()?;
        let (tx, rx) = mpsc::channel(8);

        let forwarder = tokio::spawn(async move {
            loop {
                let signal = signals.next().await;
                if tx.send(signal).await.is_err() {
                    break;
                }
            }
        });

        self.serve(rx).await;
        forwarder.abort();
        Ok(())
    }

    /// Process signals from a channel until shutdown or until every sender is dropped
    async fn serve(self, mut signals: mpsc::Receiver<SignalType>) {
        while let Some(signal) = signals.recv().await {
            if self.handle(signal).await.is_break() {
                return;
            }
        }
        debug!("Signal channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::coordinator::tests::{MemorySource, RecordingWriter};
    use crate::tls::source::Marker;

    fn setup() -> (Arc<MemorySource>, Arc<RecordingWriter>, Arc<RenewalCoordinator>) {
        let source = Arc::new(MemorySource::default());
        let writer = Arc::new(RecordingWriter::default());
        let coordinator = Arc::new(RenewalCoordinator::new(source.clone(), writer.clone()));
        (source, writer, coordinator)
    }

    #[tokio::test]
    async fn test_recheck_evaluates_and_continues() {
        let (source, writer, coordinator) = setup();
        source.set("A", "B", "v1");
        let trap = SignalTrap::new(coordinator.clone());

        let flow = trap.handle(SignalType::Recheck).await;
        assert!(flow.is_continue());
        assert_eq!(writer.write_count(), 1);
        assert_eq!(coordinator.applied_marker().await, Some(Marker::new("v1")));
    }

    #[tokio::test]
    async fn test_shutdown_runs_final_evaluation() {
        let (source, writer, coordinator) = setup();
        source.set("A", "B", "v1");
        coordinator.evaluate(Trigger::Startup).await;
        source.set("C", "D", "v2");

        let flow = SignalTrap::new(coordinator.clone())
            .handle(SignalType::Shutdown)
            .await;
        assert!(flow.is_break());
        assert_eq!(writer.write_count(), 2);
    }

    #[tokio::test]
    async fn test_recheck_with_missing_document_does_not_stop_trap() {
        let (_source, writer, coordinator) = setup();
        let trap = SignalTrap::new(coordinator);

        assert!(trap.handle(SignalType::Recheck).await.is_continue());
        assert_eq!(writer.write_count(), 0);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (source, writer, coordinator) = setup();
        source.set("A", "B", "v1");
        let (tx, rx) = mpsc::channel(4);

        tx.send(SignalType::Recheck).await.unwrap();
        tx.send(SignalType::Recheck).await.unwrap();
        tx.send(SignalType::Shutdown).await.unwrap();

        SignalTrap::new(coordinator).serve(rx).await;
        assert_eq!(writer.write_count(), 1);
        assert!(tx.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_recheck_during_slow_evaluation_does_not_deadlock() {
        let source = Arc::new(MemorySource::default());
        let writer = Arc::new(RecordingWriter::slow(100));
        let coordinator = Arc::new(RenewalCoordinator::new(source.clone(), writer.clone()));
        source.set("A", "B", "v1");

        let in_flight = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.evaluate(Trigger::FileChange).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let flow = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            SignalTrap::new(coordinator.clone()).handle(SignalType::Recheck),
        )
        .await
        .expect("signal handling timed out");

        assert!(flow.is_continue());
        in_flight.await.unwrap();
        assert_eq!(coordinator.applied_marker().await, Some(Marker::new("v1")));
        assert_eq!(writer.write_count(), 1);
        assert!(!writer.overlapped());
    }
}
