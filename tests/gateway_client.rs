//! Rescue Gateway Client Tests
//!
//! Runs the client against a throwaway axum server on a loopback port.

use alertmate::config::GatewayConfig;
use alertmate::transport::{
    AlertTransport, GatewayClient, GatewayError, GatewayTransport, TransportError,
    UnreachableCause,
};
use alertmate::types::{AlertPayload, GeoPoint, SubjectInfo};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test server
// ============================================================================

#[derive(Clone)]
struct GatewayState {
    status: &'static str,
    status_delay: Duration,
    sos_status: StatusCode,
    sos_reply: Value,
    sos_delay: Duration,
    received: Arc<Mutex<Vec<Value>>>,
}

impl GatewayState {
    fn online() -> Self {
        Self {
            status: "online",
            status_delay: Duration::ZERO,
            sos_status: StatusCode::OK,
            sos_reply: json!({"message": "SOS relayed to rescue team"}),
            sos_delay: Duration::ZERO,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

async fn status(State(state): State<GatewayState>) -> Json<Value> {
    if !state.status_delay.is_zero() {
        tokio::time::sleep(state.status_delay).await;
    }
    Json(json!({ "status": state.status }))
}

async fn sos(State(state): State<GatewayState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.received.lock().unwrap().push(body);
    if !state.sos_delay.is_zero() {
        tokio::time::sleep(state.sos_delay).await;
    }
    (state.sos_status, Json(state.sos_reply.clone()))
}

async fn banner() -> &'static str {
    "AlertMate rescue gateway v1\n"
}

/// Serve `state` on an ephemeral port; returns the base URL.
async fn serve(state: GatewayState) -> String {
    let app = Router::new()
        .route("/", get(banner))
        .route("/status", get(status))
        .route("/sos", post(sos))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(base_url: String) -> GatewayConfig {
    GatewayConfig {
        base_url,
        status_timeout_ms: 500,
        send_timeout_ms: 500,
        network_name: "AlertMate_SOS".to_string(),
    }
}

fn payload() -> AlertPayload {
    let subject = SubjectInfo {
        id: "user-42".to_string(),
        phone: "+15550100".to_string(),
        name: "Ana".to_string(),
    };
    AlertPayload::new(&subject, GeoPoint::new(12.5, 77.25).with_accuracy(6.0))
}

/// A loopback port nobody is listening on.
async fn closed_port() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// ============================================================================
// Status probe
// ============================================================================

#[tokio::test]
async fn online_gateway_reports_online() {
    let client = GatewayClient::new(&config(serve(GatewayState::online()).await)).unwrap();
    assert!(client.check_online().await);
}

#[tokio::test]
async fn any_other_status_is_offline() {
    let state = GatewayState {
        status: "maintenance",
        ..GatewayState::online()
    };
    let client = GatewayClient::new(&config(serve(state).await)).unwrap();
    assert!(!client.check_online().await);
}

#[tokio::test]
async fn unreachable_gateway_is_offline_not_an_error() {
    let client = GatewayClient::new(&config(closed_port().await)).unwrap();
    assert!(!client.check_online().await);
}

#[tokio::test]
async fn hung_status_probe_gives_up_within_its_timeout() {
    let state = GatewayState {
        status_delay: Duration::from_secs(3),
        ..GatewayState::online()
    };
    let client = GatewayClient::new(&config(serve(state).await)).unwrap();

    let started = std::time::Instant::now();
    assert!(!client.check_online().await);
    assert!(started.elapsed() < Duration::from_secs(2));

    match client.probe_status().await {
        Err(GatewayError::Unreachable { cause, .. }) => assert_eq!(cause, UnreachableCause::Timeout),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn describe_returns_banner() {
    let client = GatewayClient::new(&config(serve(GatewayState::online()).await)).unwrap();
    assert_eq!(client.describe().await.unwrap(), "AlertMate rescue gateway v1\n");
    assert_eq!(
        client.connection_report().await,
        "Connected! Gateway says: AlertMate rescue gateway v1"
    );
}

#[tokio::test]
async fn connection_report_explains_refusal() {
    let client = GatewayClient::new(&config(closed_port().await)).unwrap();
    let report = client.connection_report().await;
    assert!(report.starts_with("Not connected: "), "{report}");
    assert!(report.contains("busy"));
}

// ============================================================================
// Sending
// ============================================================================

#[tokio::test]
async fn send_posts_gateway_body_and_returns_ack() {
    let state = GatewayState::online();
    let received = Arc::clone(&state.received);
    let client = GatewayClient::new(&config(serve(state).await)).unwrap();

    let ack = client.send_alert(&payload()).await.unwrap();
    assert_eq!(ack.message, "SOS relayed to rescue team");

    let bodies = received.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["userId"], "user-42");
    assert_eq!(bodies[0]["phone"], "+15550100");
    assert_eq!(bodies[0]["lat"], 12.5);
    assert_eq!(bodies[0]["lon"], 77.25);
    assert_eq!(bodies[0]["accuracy"], 6.0);
    assert!(bodies[0]["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn success_without_message_gets_default_ack() {
    let state = GatewayState {
        sos_reply: json!({}),
        ..GatewayState::online()
    };
    let client = GatewayClient::new(&config(serve(state).await)).unwrap();
    let ack = client.send_alert(&payload()).await.unwrap();
    assert!(!ack.message.is_empty());
}

#[tokio::test]
async fn error_reply_is_rejected_with_server_message() {
    let state = GatewayState {
        sos_status: StatusCode::SERVICE_UNAVAILABLE,
        sos_reply: json!({"error": "LoRa radio not ready"}),
        ..GatewayState::online()
    };
    let client = GatewayClient::new(&config(serve(state).await)).unwrap();

    let err = client.send_alert(&payload()).await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::Rejected {
            status: 503,
            message: "LoRa radio not ready".to_string()
        }
    );
    assert!(err.user_message().contains("LoRa radio not ready"));
}

#[tokio::test]
async fn refused_connection_is_classified_as_refused() {
    let client = GatewayClient::new(&config(closed_port().await)).unwrap();
    match client.send_alert(&payload()).await {
        Err(GatewayError::Unreachable { cause, network, .. }) => {
            assert_eq!(cause, UnreachableCause::Refused);
            assert_eq!(network, "AlertMate_SOS");
        }
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_gateway_times_out_and_names_the_network() {
    let state = GatewayState {
        sos_delay: Duration::from_secs(3),
        ..GatewayState::online()
    };
    let client = GatewayClient::new(&config(serve(state).await)).unwrap();

    let err = client.send_alert(&payload()).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Unreachable {
            cause: UnreachableCause::Timeout,
            ..
        }
    ));
    assert_eq!(
        err.user_message(),
        "Not connected to the rescue network. Connect to \"AlertMate_SOS\" WiFi first."
    );
}

// ============================================================================
// As a transport
// ============================================================================

#[tokio::test]
async fn transport_skips_send_when_gateway_offline() {
    let state = GatewayState {
        status: "offline",
        ..GatewayState::online()
    };
    let received = Arc::clone(&state.received);
    let cfg = config(serve(state).await);
    let transport = GatewayTransport::new(GatewayClient::new(&cfg).unwrap(), &cfg);

    let err = transport.attempt(&payload()).await.unwrap_err();
    assert!(matches!(
        err,
        TransportError::Gateway(GatewayError::Unreachable {
            cause: UnreachableCause::Offline,
            ..
        })
    ));
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(transport.budget(), Duration::from_millis(1_000));
}

#[tokio::test]
async fn transport_keeps_refusal_distinct_from_offline() {
    let cfg = config(closed_port().await);
    let transport = GatewayTransport::new(GatewayClient::new(&cfg).unwrap(), &cfg);

    let err = transport.attempt(&payload()).await.unwrap_err();
    assert!(matches!(
        err,
        TransportError::Gateway(GatewayError::Unreachable {
            cause: UnreachableCause::Refused,
            ..
        })
    ));
    assert!(err.user_message().contains("busy"));
}

#[tokio::test]
async fn transport_delivers_through_online_gateway() {
    let state = GatewayState::online();
    let received = Arc::clone(&state.received);
    let cfg = config(serve(state).await);
    let transport = GatewayTransport::new(GatewayClient::new(&cfg).unwrap(), &cfg);

    transport.attempt(&payload()).await.unwrap();
    assert_eq!(received.lock().unwrap().len(), 1);
}
