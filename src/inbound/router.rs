//! Classification of inbound messages into typed alerts.
//!
//! Classification is total: any input, including non-objects and messages
//! with missing or mistyped fields, yields an [`InboundAlert`]. Unrecognised
//! types come back as [`AlertKind::Unknown`] and are never forwarded.

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::mesh::wire;
use crate::types::{
    AlertKind, FeedbackPolicy, InboundAlert, Notification, NotificationStyle, RawMessage,
};

const URGENT_PATTERN: &[u64] = &[0, 1000, 500, 1000, 500, 1000];
const CONFIRM_PATTERN: &[u64] = &[0, 500, 200, 500];

const SOS_POLICY: FeedbackPolicy = FeedbackPolicy {
    vibration_ms: URGENT_PATTERN,
    display_for: Duration::from_secs(8),
    style: NotificationStyle::Critical,
};

const CROWD_POLICY: FeedbackPolicy = FeedbackPolicy {
    vibration_ms: URGENT_PATTERN,
    display_for: Duration::from_secs(10),
    style: NotificationStyle::Critical,
};

const HELP_POLICY: FeedbackPolicy = FeedbackPolicy {
    vibration_ms: CONFIRM_PATTERN,
    display_for: Duration::from_secs(10),
    style: NotificationStyle::Success,
};

/// Map a `type` discriminator to its kind. The match is exact.
fn kind_of(message_type: &str) -> AlertKind {
    match message_type {
        "SOS_ALERT" => AlertKind::Sos,
        "CROWD_ALERT" => AlertKind::CrowdAlert,
        "help_accepted" => AlertKind::HelpAccepted,
        _ => AlertKind::Unknown,
    }
}

/// Classify one raw message. Never fails.
pub fn classify(raw: &RawMessage) -> InboundAlert {
    let kind = raw.message_type().map(kind_of).unwrap_or(AlertKind::Unknown);

    let (id_key, name_key) = match kind {
        AlertKind::Sos | AlertKind::CrowdAlert => ("userId", "userName"),
        AlertKind::HelpAccepted => ("helperId", "helperName"),
        AlertKind::Unknown => return InboundAlert::unknown(),
    };

    InboundAlert {
        kind,
        originator_id: raw.str_field(id_key),
        originator_name: raw.str_field(name_key),
        latitude: raw.f64_field("latitude"),
        longitude: raw.f64_field("longitude"),
        distance_km: match kind {
            AlertKind::CrowdAlert => raw.f64_field("distance").filter(|d| *d >= 0.0),
            _ => None,
        },
    }
}

/// Classify text received over the radio mesh. Only `SOS:` records are alerts.
pub fn classify_mesh_text(text: &str) -> InboundAlert {
    match wire::decode_sos(text) {
        Some(record) => InboundAlert {
            kind: AlertKind::Sos,
            originator_id: Some(record.subject_id).filter(|id| !id.is_empty()),
            originator_name: None,
            latitude: Some(record.latitude),
            longitude: Some(record.longitude),
            distance_km: None,
        },
        None => InboundAlert::unknown(),
    }
}

/// Feedback for a kind; `None` for [`AlertKind::Unknown`].
pub fn feedback_policy(kind: AlertKind) -> Option<FeedbackPolicy> {
    match kind {
        AlertKind::Sos => Some(SOS_POLICY),
        AlertKind::CrowdAlert => Some(CROWD_POLICY),
        AlertKind::HelpAccepted => Some(HELP_POLICY),
        AlertKind::Unknown => None,
    }
}

impl InboundAlert {
    /// Title, body and feedback for the UI. `None` for unknown alerts.
    pub fn notification(&self) -> Option<Notification> {
        let policy = feedback_policy(self.kind)?;
        let (title, body) = match self.kind {
            AlertKind::Sos => {
                let name = self.originator_name.as_deref().unwrap_or("Someone");
                (
                    "🚨 SOS ALERT!".to_string(),
                    format!("{name} needs help! Tap to view location."),
                )
            }
            AlertKind::CrowdAlert => {
                let distance = self
                    .distance_km
                    .map(|d| format!("{d:.1}km"))
                    .unwrap_or_else(|| "unknown distance".to_string());
                (
                    "🛡️ CROWD SHIELD ALERT!".to_string(),
                    format!("Emergency nearby ({distance}). Tap to respond."),
                )
            }
            AlertKind::HelpAccepted => {
                let name = self.originator_name.as_deref().unwrap_or("A helper");
                (
                    "HELP IS ON THE WAY!".to_string(),
                    format!("{name} is coming to help you! Tap to track."),
                )
            }
            AlertKind::Unknown => return None,
        };
        Some(Notification {
            title,
            body,
            policy,
        })
    }
}

/// A classified alert with its rendered notification.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedAlert {
    pub alert: InboundAlert,
    pub notification: Notification,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub received: u64,
    pub routed: u64,
    pub ignored: u64,
    pub lagged: u64,
}

/// Consumes raw cloud messages and forwards typed alerts.
///
/// Holds no state beyond its counters; the outbound dispatch path shares nothing with it.
#[derive(Debug, Default)]
pub struct InboundAlertRouter {
    stats: RouterStats,
}

impl InboundAlertRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Classify one message; `Some` for anything but unknown.
    pub fn route(&mut self, raw: &RawMessage) -> Option<RoutedAlert> {
        self.stats.received += 1;
        let alert = classify(raw);
        self.finish(alert, raw.message_type())
    }

    /// Same as [`route`](Self::route) for a radio mesh notification.
    pub fn route_mesh_text(&mut self, text: &str) -> Option<RoutedAlert> {
        self.stats.received += 1;
        let alert = classify_mesh_text(text);
        self.finish(alert, None)
    }

    fn finish(&mut self, alert: InboundAlert, message_type: Option<&str>) -> Option<RoutedAlert> {
        match alert.notification() {
            Some(notification) => {
                self.stats.routed += 1;
                info!(
                    kind = %alert.kind,
                    from = alert.originator_name.as_deref().unwrap_or("-"),
                    "Inbound alert"
                );
                Some(RoutedAlert {
                    alert,
                    notification,
                })
            }
            None => {
                self.stats.ignored += 1;
                debug!(message_type = message_type.unwrap_or("-"), "Ignoring unclassified message");
                None
            }
        }
    }

    /// Route everything from `inbound` into `sink` until the channel closes,
    /// the sink is dropped, or `cancel` fires.
    pub async fn run(
        mut self,
        mut inbound: broadcast::Receiver<RawMessage>,
        sink: mpsc::Sender<RoutedAlert>,
        cancel: CancellationToken,
    ) -> RouterStats {
        loop {
            let raw = tokio::select! {
                _ = cancel.cancelled() => break,
                received = inbound.recv() => match received {
                    Ok(raw) => raw,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Inbound router fell behind; messages lost");
                        self.stats.lagged += skipped;
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            if let Some(routed) = self.route(&raw) {
                if sink.send(routed).await.is_err() {
                    debug!("Alert sink closed; router stopping");
                    break;
                }
            }
        }
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: serde_json::Value) -> RawMessage {
        RawMessage(v)
    }

    #[test]
    fn sos_carries_originator_and_position() {
        let alert = classify(&raw(json!({
            "type": "SOS_ALERT",
            "userId": "u7",
            "userName": "Ana",
            "latitude": 12.5,
            "longitude": "77.25"
        })));
        assert_eq!(alert.kind, AlertKind::Sos);
        assert_eq!(alert.originator_id.as_deref(), Some("u7"));
        assert_eq!(alert.originator_name.as_deref(), Some("Ana"));
        assert_eq!(alert.latitude, Some(12.5));
        assert_eq!(alert.longitude, Some(77.25));
        assert_eq!(alert.distance_km, None);
    }

    #[test]
    fn help_accepted_reads_helper_fields() {
        let alert = classify(&raw(json!({
            "type": "help_accepted",
            "helperId": "h1",
            "helperName": "Sam"
        })));
        assert_eq!(alert.kind, AlertKind::HelpAccepted);
        assert_eq!(alert.originator_name.as_deref(), Some("Sam"));
        let n = alert.notification().unwrap();
        assert_eq!(n.body, "Sam is coming to help you! Tap to track.");
        assert_eq!(n.policy.style, NotificationStyle::Success);
        assert_eq!(n.policy.vibration_ms, &[0, 500, 200, 500]);
    }

    #[test]
    fn crowd_alert_formats_distance() {
        let alert = classify(&raw(json!({"type": "CROWD_ALERT", "distance": 1.234})));
        let n = alert.notification().unwrap();
        assert_eq!(n.title, "🛡️ CROWD SHIELD ALERT!");
        assert_eq!(n.body, "Emergency nearby (1.2km). Tap to respond.");
        assert_eq!(n.policy.display_for, Duration::from_secs(10));
    }

    #[test]
    fn crowd_alert_without_distance_says_unknown() {
        let alert = classify(&raw(json!({"type": "CROWD_ALERT", "distance": "far"})));
        assert!(alert.notification().unwrap().body.contains("unknown distance"));
    }

    #[test]
    fn sos_policy_is_urgent_for_eight_seconds() {
        let n = classify(&raw(json!({"type": "SOS_ALERT"}))).notification().unwrap();
        assert_eq!(n.body, "Someone needs help! Tap to view location.");
        assert_eq!(n.policy.vibration_ms, &[0, 1000, 500, 1000, 500, 1000]);
        assert_eq!(n.policy.display_for, Duration::from_secs(8));
        assert_eq!(n.policy.style, NotificationStyle::Critical);
    }

    #[test]
    fn garbage_is_unknown_not_a_panic() {
        for v in [
            json!(null),
            json!(42),
            json!("SOS_ALERT"),
            json!([1, 2, 3]),
            json!({"type": 7}),
            json!({"type": "PING"}),
            json!({"userId": "u1"}),
        ] {
            let alert = classify(&raw(v));
            assert_eq!(alert.kind, AlertKind::Unknown);
            assert!(alert.notification().is_none());
        }
    }

    #[test]
    fn type_discriminator_is_case_sensitive() {
        for t in ["sos_alert", "Crowd_Alert", "HELP_ACCEPTED", " SOS_ALERT"] {
            let alert = classify(&raw(json!({"type": t, "userId": "u1"})));
            assert_eq!(alert.kind, AlertKind::Unknown, "{t}");
            assert!(alert.notification().is_none());
        }
    }

    #[test]
    fn mesh_sos_record_classifies_as_sos() {
        let alert = classify_mesh_text("SOS:u1,12.345678,98.765432");
        assert_eq!(alert.kind, AlertKind::Sos);
        assert_eq!(alert.originator_id.as_deref(), Some("u1"));
        assert_eq!(classify_mesh_text("ACK").kind, AlertKind::Unknown);
    }

    #[test]
    fn router_counts_ignored_messages() {
        let mut router = InboundAlertRouter::new();
        assert!(router.route(&raw(json!({"type": "helper_location_update"}))).is_none());
        assert!(router.route(&raw(json!({"type": "SOS_ALERT"}))).is_some());
        let stats = router.stats();
        assert_eq!((stats.received, stats.routed, stats.ignored), (2, 1, 1));
    }
}
