//! Cloud frame format
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": <any>}`.
//! The server also pushes bare objects carrying their own `type`; both
//! shapes normalise to the same [`RawMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{AlertPayload, RawMessage};

/// Event names on the wire
pub mod events {
    pub const REGISTER: &str = "register";
    pub const SOS_ALERT: &str = "sos_alert";
    pub const CROWD_ALERT: &str = "crowd_alert";
    pub const RESPOND_TO_SOS: &str = "respond_to_sos";
    pub const HELP_ACCEPTED: &str = "help_accepted";
    pub const UPDATE_HELPER_LOCATION: &str = "update_helper_location";
    pub const HELPER_LOCATION_UPDATE: &str = "helper_location_update";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: &str, data: impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn register(user_id: &str) -> Self {
        Self {
            event: events::REGISTER.to_string(),
            data: Value::String(user_id.to_string()),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `sos_alert` data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSosData {
    pub user_id: String,
    pub phone: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub timestamp: String,
}

impl From<&AlertPayload> for CloudSosData {
    fn from(p: &AlertPayload) -> Self {
        Self {
            user_id: p.subject_id().to_string(),
            phone: p.phone().to_string(),
            latitude: p.latitude(),
            longitude: p.longitude(),
            accuracy: p.accuracy_m(),
            timestamp: p.created_at().to_rfc3339(),
        }
    }
}

/// A responder accepting someone's SOS. The victim receives it as `help_accepted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpResponse {
    pub victim_id: String,
    pub helper_id: String,
    pub helper_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A responder's live position, relayed to the victim as `helper_location_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperLocation {
    pub victim_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Canonical `type` for an event whose data omitted it.
fn type_for_event(event: &str) -> &str {
    match event {
        events::SOS_ALERT => "SOS_ALERT",
        events::CROWD_ALERT => "CROWD_ALERT",
        other => other,
    }
}

/// Turn one inbound text frame into a [`RawMessage`].
///
/// - `{event, data}` envelopes unwrap to `data`, with `type` filled in from
///   the event when absent (`help_accepted` always gets `type = help_accepted`)
/// - bare objects pass through unchanged
/// - non-JSON text becomes a JSON string, which never classifies
pub fn normalize_inbound(text: &str) -> RawMessage {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return RawMessage(Value::String(text.to_string()));
    };

    let is_envelope = value
        .as_object()
        .is_some_and(|o| o.contains_key("event") && !o.contains_key("type"));
    if !is_envelope {
        return RawMessage(value);
    }

    let Ok(Frame { event, data }) = serde_json::from_value::<Frame>(value.clone()) else {
        return RawMessage(value);
    };

    match data {
        Value::Object(mut fields) => {
            if event == events::HELP_ACCEPTED {
                fields.insert("type".to_string(), Value::String(event));
            } else if !fields.contains_key("type") {
                let kind = type_for_event(&event).to_string();
                fields.insert("type".to_string(), Value::String(kind));
            }
            RawMessage(Value::Object(fields))
        }
        other => RawMessage(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_frame_carries_plain_user_id() {
        let text = Frame::register("u42").to_text().unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, json!({"event": "register", "data": "u42"}));
    }

    #[test]
    fn help_response_uses_camel_case() {
        let frame = Frame::new(
            events::RESPOND_TO_SOS,
            HelpResponse {
                victim_id: "v1".into(),
                helper_id: "h1".into(),
                helper_name: "Sam".into(),
                latitude: 1.0,
                longitude: 2.0,
            },
        )
        .unwrap();
        assert_eq!(frame.data["victimId"], "v1");
        assert_eq!(frame.data["helperName"], "Sam");
    }

    #[test]
    fn helper_location_frame_names_the_victim() {
        let frame = Frame::new(
            events::UPDATE_HELPER_LOCATION,
            HelperLocation {
                victim_id: "v1".into(),
                latitude: 12.5,
                longitude: 77.25,
            },
        )
        .unwrap();
        assert_eq!(frame.event, "update_helper_location");
        assert_eq!(frame.data, json!({"victimId": "v1", "latitude": 12.5, "longitude": 77.25}));
    }

    #[test]
    fn helper_location_envelope_keeps_event_as_type() {
        let raw = normalize_inbound(
            r#"{"event":"helper_location_update","data":{"latitude":1.0,"longitude":2.0}}"#,
        );
        assert_eq!(raw.message_type(), Some(events::HELPER_LOCATION_UPDATE));
    }

    #[test]
    fn help_accepted_envelope_gets_type_injected() {
        let raw = normalize_inbound(r#"{"event":"help_accepted","data":{"helperName":"Sam"}}"#);
        assert_eq!(raw.message_type(), Some("help_accepted"));
        assert_eq!(raw.str_field("helperName").as_deref(), Some("Sam"));
    }

    #[test]
    fn envelope_keeps_server_supplied_type() {
        let raw = normalize_inbound(
            r#"{"event":"sos_alert","data":{"type":"SOS_ALERT","userName":"Ana"}}"#,
        );
        assert_eq!(raw.message_type(), Some("SOS_ALERT"));
    }

    #[test]
    fn crowd_envelope_without_type_is_labelled() {
        let raw = normalize_inbound(r#"{"event":"crowd_alert","data":{"distance":1.2}}"#);
        assert_eq!(raw.message_type(), Some("CROWD_ALERT"));
    }

    #[test]
    fn bare_object_passes_through() {
        let raw = normalize_inbound(r#"{"type":"CROWD_ALERT","distance":0.4}"#);
        assert_eq!(raw.message_type(), Some("CROWD_ALERT"));
    }

    #[test]
    fn non_json_becomes_string() {
        let raw = normalize_inbound("hello there");
        assert_eq!(raw.0, Value::String("hello there".into()));
        assert_eq!(raw.message_type(), None);
    }
}
