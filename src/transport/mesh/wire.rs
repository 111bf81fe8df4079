//! Radio mesh wire format
//!
//! The peripheral exposes one GATT service with a write/notify pair:
//! - `4fafc201-1fb5-459e-8fcc-c5c9c331914b` - Mesh service
//! - `beb5483e-36e1-4688-b7f5-ea07361b26a8` - Notify (peripheral → phone)
//! - `beb5483e-36e1-4688-b7f5-ea07361b26a9` - Write with response (phone → peripheral)
//!
//! Messages are ASCII text. Outbound alerts use
//! `SOS:<subjectId>,<lat:6dp>,<lon:6dp>`; inbound notifications are opaque.
//!
//! SECURITY: the format carries no authentication or integrity check. Any
//! device advertising the expected name can inject or receive messages.

use uuid::Uuid;

use crate::types::AlertPayload;

/// Mesh service UUID
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Notify characteristic (peripheral → phone)
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Write characteristic (phone → peripheral)
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a9);

/// Prefix of outbound alert records
pub const SOS_PREFIX: &str = "SOS:";

/// Advertised name prefix; the role suffix completes it.
pub const DEVICE_NAME_PREFIX: &str = "AlertMate_";

/// Text record for an alert: `SOS:<subjectId>,<lat>,<lon>` with 6 decimal places.
pub fn encode_sos(payload: &AlertPayload) -> String {
    format!(
        "{SOS_PREFIX}{},{:.6},{:.6}",
        payload.subject_id(),
        payload.latitude(),
        payload.longitude()
    )
}

/// A parsed `SOS:` record, as a peer or relay would read it.
#[derive(Debug, Clone, PartialEq)]
pub struct SosRecord {
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Parse an `SOS:` record. The subject id may itself contain commas, so the
/// coordinates are taken from the right.
pub fn decode_sos(text: &str) -> Option<SosRecord> {
    let body = text.trim().strip_prefix(SOS_PREFIX)?;
    let mut parts = body.rsplitn(3, ',');
    let longitude = parts.next()?.trim().parse().ok()?;
    let latitude = parts.next()?.trim().parse().ok()?;
    let subject_id = parts.next()?.to_string();
    Some(SosRecord {
        subject_id,
        latitude,
        longitude,
    })
}

/// Bytes written to the write characteristic.
pub fn encode_frame(message: &str) -> Vec<u8> {
    message.as_bytes().to_vec()
}

/// Text carried by a notification. Invalid UTF-8 is replaced, never rejected.
pub fn decode_frame(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoPoint, SubjectInfo};

    fn payload(id: &str, lat: f64, lon: f64) -> AlertPayload {
        let subject = SubjectInfo {
            id: id.to_string(),
            ..SubjectInfo::default()
        };
        AlertPayload::new(&subject, GeoPoint::new(lat, lon))
    }

    #[test]
    fn encodes_literal_sos_record() {
        let text = encode_sos(&payload("u1", 12.345678, 98.765432));
        assert_eq!(text, "SOS:u1,12.345678,98.765432");
        assert_eq!(decode_frame(&encode_frame(&text)), "SOS:u1,12.345678,98.765432");
    }

    #[test]
    fn pads_and_rounds_to_six_places() {
        assert_eq!(encode_sos(&payload("u2", 1.5, -0.1234567)), "SOS:u2,1.500000,-0.123457");
    }

    #[test]
    fn decodes_record_with_comma_in_subject() {
        let record = decode_sos("SOS:team,7,-33.000001,151.250000").unwrap();
        assert_eq!(record.subject_id, "team,7");
        assert!((record.latitude + 33.000001).abs() < 1e-9);
        assert!((record.longitude - 151.25).abs() < 1e-9);
    }

    #[test]
    fn non_sos_text_does_not_decode() {
        assert!(decode_sos("ACK:u1").is_none());
        assert!(decode_sos("SOS:u1,not-a-number,2").is_none());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(decode_frame(&[b'O', b'K', 0xFF]), "OK\u{FFFD}");
    }

    #[test]
    fn uuids_are_distinct() {
        assert_ne!(NOTIFY_CHAR_UUID, WRITE_CHAR_UUID);
        assert!(!SERVICE_UUID.is_nil());
    }
}
