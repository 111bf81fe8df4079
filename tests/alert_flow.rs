//! End-to-end alert flow
//!
//! Replayed accelerometer traces through the monitor into a dispatcher with
//! scripted transports, and cloud traffic through the inbound router.

use alertmate::config::{DispatchConfig, TriggerConfig};
use alertmate::dispatch::{
    AlertDispatcher, AlertMonitor, LocationSource, MonitorEvent, ReplaySource, StaticLocation,
};
use alertmate::inbound::InboundAlertRouter;
use alertmate::transport::{AlertTransport, MeshError, TransportError};
use alertmate::types::{
    AccelerationSample, AlertKind, AlertPayload, GeoPoint, NotificationStyle, RawMessage,
    SubjectInfo, Transport,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fixtures
// ============================================================================

struct RecordingTransport {
    kind: Transport,
    failure: Option<TransportError>,
    delay: Duration,
    delivered: Arc<Mutex<Vec<AlertPayload>>>,
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    fn transport(&self) -> Transport {
        self.kind
    }

    fn budget(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn attempt(&self, payload: &AlertPayload) -> Result<(), TransportError> {
        tokio::time::sleep(self.delay).await;
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

struct NoFix;

#[async_trait]
impl LocationSource for NoFix {
    async fn current_location(&self) -> Option<GeoPoint> {
        None
    }
}

fn subject() -> SubjectInfo {
    SubjectInfo {
        id: "user-42".to_string(),
        phone: "+15550100".to_string(),
        name: "Ana".to_string(),
    }
}

/// Rest, then three hard direction changes 300ms apart.
fn shake_trace(start_ms: u64) -> Vec<AccelerationSample> {
    (0..4)
        .map(|i| {
            let x = if i % 2 == 0 { 0.0 } else { 3.0 };
            AccelerationSample::new(x, 0.0, 1.0, start_ms + 300 * i)
        })
        .collect()
}

/// Mesh fails, cloud delivers. Returns the dispatcher and what cloud received.
fn mesh_down_cloud_up(delay: Duration) -> (AlertDispatcher, Arc<Mutex<Vec<AlertPayload>>>) {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let transports: Vec<Box<dyn AlertTransport>> = vec![
        Box::new(RecordingTransport {
            kind: Transport::Mesh,
            failure: Some(MeshError::NotConnected.into()),
            delay: Duration::ZERO,
            delivered: Arc::new(Mutex::new(Vec::new())),
        }),
        Box::new(RecordingTransport {
            kind: Transport::Cloud,
            failure: None,
            delay,
            delivered: Arc::clone(&delivered),
        }),
    ];
    (
        AlertDispatcher::new(transports, &DispatchConfig::default()),
        delivered,
    )
}

async fn drain(mut rx: mpsc::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// ============================================================================
// Monitor
// ============================================================================

#[tokio::test]
async fn shake_trace_dispatches_one_alert_with_location() {
    let (dispatcher, delivered) = mesh_down_cloud_up(Duration::ZERO);
    let (tx, rx) = mpsc::channel(256);
    let location = StaticLocation(GeoPoint::new(12.5, 77.25).with_accuracy(5.0));
    let monitor = AlertMonitor::new(&TriggerConfig::default(), subject(), dispatcher, location, tx);

    let mut source = ReplaySource::new(shake_trace(0), 0);
    let stats = monitor.run(&mut source, CancellationToken::new()).await;
    let events = drain(rx).await;

    assert_eq!(stats.samples, 4);
    assert_eq!(stats.triggers, 1);
    assert_eq!(stats.dispatches, 1);

    assert!(matches!(events.first(), Some(MonitorEvent::TriggerFired(t)) if t.pulses == 3));
    let result = events
        .iter()
        .find_map(|e| match e {
            MonitorEvent::Dispatched(r) => Some(r.clone()),
            _ => None,
        })
        .expect("dispatch result reported");
    assert_eq!(result.transport_used, Some(Transport::Cloud));
    assert_eq!(result.attempts.len(), 2);
    assert!(events.iter().any(|e| matches!(e, MonitorEvent::Progress(_))));

    let sent = delivered.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject_id(), "user-42");
    assert_eq!(sent[0].accuracy_m(), Some(5.0));
}

#[tokio::test]
async fn trace_without_shake_sends_nothing() {
    let (dispatcher, delivered) = mesh_down_cloud_up(Duration::ZERO);
    let (tx, rx) = mpsc::channel(256);
    let monitor = AlertMonitor::new(
        &TriggerConfig::default(),
        subject(),
        dispatcher,
        StaticLocation(GeoPoint::new(1.0, 2.0)),
        tx,
    );

    let calm: Vec<_> = (0..50)
        .map(|i| AccelerationSample::new(0.01 * (i % 3) as f64, 0.0, 1.0, i * 100))
        .collect();
    let stats = monitor.run(&mut ReplaySource::new(calm, 0), CancellationToken::new()).await;

    assert_eq!(stats.samples, 50);
    assert_eq!(stats.triggers, 0);
    assert!(drain(rx).await.is_empty());
    assert!(delivered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_location_reports_and_sends_nothing() {
    let (dispatcher, delivered) = mesh_down_cloud_up(Duration::ZERO);
    let (tx, rx) = mpsc::channel(256);
    let monitor = AlertMonitor::new(&TriggerConfig::default(), subject(), dispatcher, NoFix, tx);

    monitor
        .run(&mut ReplaySource::new(shake_trace(0), 0), CancellationToken::new())
        .await;
    let events = drain(rx).await;

    assert!(events
        .iter()
        .any(|e| matches!(e, MonitorEvent::LocationUnavailable(_))));
    assert!(!events.iter().any(|e| matches!(e, MonitorEvent::Dispatched(_))));
    assert!(delivered.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_shake_during_dispatch_is_dropped() {
    // Cloud takes 5s; the second shake arrives while it is still sending
    let (dispatcher, delivered) = mesh_down_cloud_up(Duration::from_secs(5));
    let (tx, rx) = mpsc::channel(256);
    let monitor = AlertMonitor::new(
        &TriggerConfig::default(),
        subject(),
        dispatcher,
        StaticLocation(GeoPoint::new(1.0, 2.0)),
        tx,
    );

    let mut trace = shake_trace(0);
    trace.extend(shake_trace(3_000));
    // 200ms of paced replay between samples keeps the trace inside the dispatch
    let stats = monitor
        .run(&mut ReplaySource::new(trace, 200), CancellationToken::new())
        .await;
    let events = drain(rx).await;

    assert_eq!(stats.triggers, 2);
    assert_eq!(stats.dispatches, 1);
    assert_eq!(stats.dropped, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, MonitorEvent::TriggerDropped(_))));
    assert_eq!(delivered.lock().unwrap().len(), 1);
}

// ============================================================================
// Inbound router
// ============================================================================

#[tokio::test]
async fn router_forwards_known_alerts_and_skips_the_rest() {
    let (inbound_tx, inbound_rx) = broadcast::channel(16);
    let (sink_tx, mut sink_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let router = tokio::spawn(InboundAlertRouter::new().run(inbound_rx, sink_tx, cancel.clone()));

    for value in [
        json!({"type": "SOS_ALERT", "userId": "u1", "userName": "Kim", "latitude": 1.0, "longitude": 2.0}),
        json!({"type": "helper_location_update", "latitude": 1.0}),
        json!("plain text"),
        json!({"type": "help_accepted", "helperId": "h1", "helperName": "Sam"}),
    ] {
        inbound_tx.send(RawMessage(value)).unwrap();
    }

    let first = sink_rx.recv().await.unwrap();
    assert_eq!(first.alert.kind, AlertKind::Sos);
    assert_eq!(first.notification.body, "Kim needs help! Tap to view location.");
    assert_eq!(first.notification.policy.style, NotificationStyle::Critical);

    let second = sink_rx.recv().await.unwrap();
    assert_eq!(second.alert.kind, AlertKind::HelpAccepted);
    assert_eq!(second.notification.title, "HELP IS ON THE WAY!");

    drop(inbound_tx);
    let stats = router.await.unwrap();
    assert_eq!(stats.received, 4);
    assert_eq!(stats.routed, 2);
    assert_eq!(stats.ignored, 2);
    assert!(sink_rx.recv().await.is_none());
}

#[tokio::test]
async fn router_stops_on_cancel() {
    let (_inbound_tx, inbound_rx) = broadcast::channel::<RawMessage>(4);
    let (sink_tx, _sink_rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let router = tokio::spawn(InboundAlertRouter::new().run(inbound_rx, sink_tx, cancel.clone()));

    cancel.cancel();
    let stats = router.await.unwrap();
    assert_eq!(stats.received, 0);
}
