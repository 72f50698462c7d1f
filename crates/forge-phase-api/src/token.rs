//! Epoch-based generation tokens.
//!
//! Each document owns an [`EpochCounter`]. Starting or cancelling a generation
//! advances the epoch; a [`GenerationToken`] is current only while its epoch
//! still equals the counter's. Executors check the token at every suspension
//! point and drop their result when it has gone stale.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

use forge_utils::error::PhaseError;
use forge_utils::types::PipelinePhase;

#[derive(Debug, Default)]
pub struct EpochCounter {
    epoch: AtomicU64,
    changed: Notify,
}

impl EpochCounter {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Invalidate every outstanding token and wake anyone waiting on one.
    /// Returns the new epoch.
    pub fn advance(&self) -> u64 {
        let next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.changed.notify_waiters();
        next
    }

    /// Advance and hand out a token for the new epoch.
    #[must_use]
    pub fn next_token(self: &Arc<Self>) -> GenerationToken {
        let epoch = self.advance();
        GenerationToken {
            epoch,
            counter: Arc::clone(self),
        }
    }
}

/// Identity of one generation attempt.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    epoch: u64,
    counter: Arc<EpochCounter>,
}

impl GenerationToken {
    /// Token on a private counter, for running executors outside an orchestrator.
    #[must_use]
    pub fn detached() -> Self {
        EpochCounter::new().next_token()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn is_current(&self) -> bool {
        self.counter.current() == self.epoch
    }

    /// # Errors
    ///
    /// Returns `PhaseError::Cancelled` when the token is stale.
    pub fn ensure_current(&self, phase: PipelinePhase) -> Result<(), PhaseError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(PhaseError::Cancelled {
                phase: phase.as_str().to_string(),
            })
        }
    }

    /// Resolves once this token is no longer current.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so an advance between the two is not missed
            let notified = self.counter.changed.notified();
            if !self.is_current() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` as a suspension point: check the token before, race the
    /// future against cancellation, and check again after it resolves.
    ///
    /// The future is dropped as soon as the token goes stale, which aborts any
    /// request it was driving.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::Cancelled` when the token is or becomes stale.
    pub async fn guard<F, T>(&self, phase: PipelinePhase, fut: F) -> Result<T, PhaseError>
    where
        F: Future<Output = T>,
    {
        self.ensure_current(phase)?;
        let output = tokio::select! {
            biased;
            () = self.cancelled() => None,
            output = fut => Some(output),
        };
        match output {
            Some(output) => {
                self.ensure_current(phase)?;
                Ok(output)
            }
            None => Err(PhaseError::Cancelled {
                phase: phase.as_str().to_string(),
            }),
        }
    }
}
