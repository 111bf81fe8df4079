//! Ordered, time-bounded fallback across transports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DispatchConfig;
use crate::transport::{AlertTransport, TransportError};
use crate::types::{
    AlertPayload, AttemptOutcome, DispatchProgress, DispatchResult, FailureReason, Transport,
    TransportAttempt, TriggerContext,
};

const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("A dispatch is already in flight")]
    InFlight,

    #[error("Dispatch cancelled after {} attempt(s)", attempts.len())]
    Cancelled { attempts: Vec<TransportAttempt> },
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Walks the transports in order until one delivers.
///
/// Every attempt runs under its transport's budget, so a hung transport costs
/// at most that budget before the next one is tried. One dispatch at a time.
pub struct AlertDispatcher {
    transports: Vec<Box<dyn AlertTransport>>,
    progress_after: Duration,
    progress: Option<mpsc::Sender<DispatchProgress>>,
    in_flight: AtomicBool,
}

impl AlertDispatcher {
    /// `transports` are tried in the order given (mesh, gateway, cloud).
    pub fn new(transports: Vec<Box<dyn AlertTransport>>, config: &DispatchConfig) -> Self {
        Self {
            transports,
            progress_after: config.progress_after().max(MIN_PROGRESS_INTERVAL),
            progress: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Report progress on `sender`. Events are dropped, never awaited, when it is full.
    pub fn with_progress(mut self, sender: mpsc::Sender<DispatchProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn transports(&self) -> Vec<Transport> {
        self.transports.iter().map(|t| t.transport()).collect()
    }

    /// Sum of all transport budgets: the longest a dispatch can take.
    pub fn worst_case(&self) -> Duration {
        self.transports.iter().map(|t| t.budget()).sum()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Deliver one alert built from `ctx`.
    ///
    /// Returns the attempt log whether or not delivery succeeded. Cancelling
    /// `cancel` drops the running attempt (releasing its link or socket) and
    /// returns [`DispatchError::Cancelled`] with the log so far.
    pub async fn dispatch(
        &self,
        ctx: &TriggerContext,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult, DispatchError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(DispatchError::InFlight)?;

        let payload = ctx.payload();
        info!(
            subject = %payload.subject_id(),
            lat = payload.latitude(),
            lon = payload.longitude(),
            transports = self.transports.len(),
            "Dispatching alert"
        );

        let mut attempts = Vec::with_capacity(self.transports.len());

        for transport in &self.transports {
            if cancel.is_cancelled() {
                warn!(attempts = attempts.len(), "Dispatch cancelled");
                return Err(DispatchError::Cancelled { attempts });
            }

            let kind = transport.transport();
            let mut attempt = TransportAttempt::start(kind);
            self.emit(DispatchProgress::Attempting { transport: kind });

            let started = Instant::now();
            let result = self.run_attempt(transport.as_ref(), &payload, cancel).await;
            let elapsed = started.elapsed();

            match result {
                Ok(()) => {
                    attempt.finish(elapsed, AttemptOutcome::Success);
                    attempts.push(attempt);
                    info!(transport = %kind, elapsed_ms = elapsed.as_millis() as u64, "Alert delivered");
                    self.emit(DispatchProgress::Delivered { transport: kind });
                    return Ok(DispatchResult {
                        transport_used: Some(kind),
                        attempts,
                    });
                }
                Err(TransportError::Cancelled) => {
                    let reason = FailureReason::from(&TransportError::Cancelled);
                    attempt.finish(elapsed, AttemptOutcome::Failed(reason));
                    attempts.push(attempt);
                    warn!(transport = %kind, "Dispatch cancelled mid-attempt");
                    return Err(DispatchError::Cancelled { attempts });
                }
                Err(e) => {
                    let reason = FailureReason::from(&e);
                    warn!(
                        transport = %kind,
                        kind = %reason.kind,
                        error = %e,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Transport attempt failed"
                    );
                    self.emit(DispatchProgress::AttemptFailed {
                        transport: kind,
                        reason: reason.clone(),
                    });
                    attempt.finish(elapsed, AttemptOutcome::Failed(reason));
                    attempts.push(attempt);
                }
            }
        }

        error!(attempts = attempts.len(), "Alert could not be delivered on any transport");
        self.emit(DispatchProgress::Exhausted);
        Ok(DispatchResult {
            transport_used: None,
            attempts,
        })
    }

    async fn run_attempt(
        &self,
        transport: &dyn AlertTransport,
        payload: &AlertPayload,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let kind = transport.transport();
        let budget = transport.budget();
        let started = Instant::now();

        let attempt = transport.attempt(payload);
        tokio::pin!(attempt);
        let deadline = tokio::time::sleep(budget);
        tokio::pin!(deadline);
        let mut still_trying =
            tokio::time::interval_at(started + self.progress_after, self.progress_after);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                result = &mut attempt => return result,
                _ = &mut deadline => {
                    return Err(TransportError::Timeout { transport: kind, after: budget });
                }
                _ = still_trying.tick() => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    self.emit(DispatchProgress::StillTrying { transport: kind, elapsed_ms });
                }
            }
        }
    }

    fn emit(&self, event: DispatchProgress) {
        if let Some(tx) = &self.progress {
            if tx.try_send(event).is_err() {
                tracing::debug!("Progress listener full or gone; event dropped");
            }
        }
    }
}
