//! Sample-to-alert loop: detector in front, dispatcher behind.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::dispatcher::{AlertDispatcher, DispatchError};
use super::source::{SampleEvent, SampleSource};
use crate::config::{defaults, TriggerConfig};
use crate::detection::ShakeDetector;
use crate::types::{
    DispatchProgress, DispatchResult, GeoPoint, SubjectInfo, TransportAttempt, TriggerContext,
    TriggerEvent,
};

/// Supplies the position attached to an alert at trigger time.
#[async_trait]
pub trait LocationSource: Send + Sync + 'static {
    async fn current_location(&self) -> Option<GeoPoint>;
}

/// A fixed position (CLI use, tests, or a host that pushes its own fixes).
#[derive(Debug, Clone, Copy)]
pub struct StaticLocation(pub GeoPoint);

#[async_trait]
impl LocationSource for StaticLocation {
    async fn current_location(&self) -> Option<GeoPoint> {
        self.0.is_valid().then_some(self.0)
    }
}

/// What the monitor reports to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    TriggerFired(TriggerEvent),
    /// Fired while an earlier dispatch was still running
    TriggerDropped(TriggerEvent),
    /// No usable position; nothing was sent
    LocationUnavailable(TriggerEvent),
    Progress(DispatchProgress),
    Dispatched(DispatchResult),
    DispatchCancelled { attempts: Vec<TransportAttempt> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub samples: u64,
    pub triggers: u64,
    pub dispatches: u64,
    pub dropped: u64,
}

/// Owns the shake detector and runs at most one dispatch at a time.
pub struct AlertMonitor<L: LocationSource> {
    detector: ShakeDetector,
    dispatcher: Arc<AlertDispatcher>,
    location: Arc<L>,
    subject: SubjectInfo,
    events: mpsc::Sender<MonitorEvent>,
    progress_forwarder: JoinHandle<()>,
}

impl<L: LocationSource> AlertMonitor<L> {
    /// Wire the dispatcher's progress into `events`.
    pub fn new(
        trigger: &TriggerConfig,
        subject: SubjectInfo,
        dispatcher: AlertDispatcher,
        location: L,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        let (progress_tx, mut progress_rx) = mpsc::channel(defaults::MONITOR_EVENT_QUEUE);
        let dispatcher = Arc::new(dispatcher.with_progress(progress_tx));

        let forward = events.clone();
        let progress_forwarder = tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                if forward.send(MonitorEvent::Progress(progress)).await.is_err() {
                    break;
                }
            }
        });

        Self {
            detector: ShakeDetector::new(trigger),
            dispatcher,
            location: Arc::new(location),
            subject,
            events,
            progress_forwarder,
        }
    }

    /// Run until the source ends or `cancel` fires.
    ///
    /// At end of input the running dispatch is awaited; on cancellation it is
    /// cancelled too.
    pub async fn run<S: SampleSource>(mut self, source: &mut S, cancel: CancellationToken) -> MonitorStats {
        let mut stats = MonitorStats::default();
        let mut in_flight: Option<JoinHandle<()>> = None;

        info!(source = source.source_name(), "Monitoring for shake trigger");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Monitor] Shutdown signal received");
                    break;
                }
                result = source.next_sample() => match result {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!("[Monitor] Source error: {}", e);
                        break;
                    }
                }
            };

            let sample = match event {
                SampleEvent::Sample(s) => s,
                SampleEvent::Eof => {
                    info!(samples = stats.samples, "[Monitor] Source reached end");
                    break;
                }
            };
            stats.samples += 1;

            let Some(trigger) = self.detector.observe(sample) else {
                continue;
            };
            stats.triggers += 1;

            if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                warn!(fired_at_ms = trigger.fired_at_ms, "Trigger dropped: dispatch already in flight");
                stats.dropped += 1;
                self.emit(MonitorEvent::TriggerDropped(trigger)).await;
                continue;
            }

            self.emit(MonitorEvent::TriggerFired(trigger)).await;
            stats.dispatches += 1;
            in_flight = Some(self.spawn_dispatch(trigger, cancel.child_token()));
        }

        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatch task ended abnormally");
            }
        }
        // Let queued progress drain before the forwarder goes away
        drop(self.dispatcher);
        if let Err(e) = self.progress_forwarder.await {
            warn!(error = %e, "Progress forwarder ended abnormally");
        }

        info!(
            samples = stats.samples,
            triggers = stats.triggers,
            dispatches = stats.dispatches,
            dropped = stats.dropped,
            "[Monitor] Stopped"
        );
        stats
    }

    fn spawn_dispatch(&self, trigger: TriggerEvent, cancel: CancellationToken) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let location = Arc::clone(&self.location);
        let subject = self.subject.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let Some(point) = location.current_location().await else {
                warn!("No location fix; alert not sent");
                let _ = events.send(MonitorEvent::LocationUnavailable(trigger)).await;
                return;
            };

            let ctx = TriggerContext::new(subject, point);
            let event = match dispatcher.dispatch(&ctx, &cancel).await {
                Ok(result) => {
                    info!(summary = %result.summary(), "Dispatch finished");
                    MonitorEvent::Dispatched(result)
                }
                Err(DispatchError::Cancelled { attempts }) => {
                    MonitorEvent::DispatchCancelled { attempts }
                }
                Err(DispatchError::InFlight) => MonitorEvent::TriggerDropped(trigger),
            };
            let _ = events.send(event).await;
        })
    }

    async fn emit(&self, event: MonitorEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("Monitor event receiver gone");
        }
    }
}
