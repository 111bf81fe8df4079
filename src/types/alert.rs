//! Outbound alert payloads and the context a trigger carries into dispatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A WGS84 position as reported by the location collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in metres, when the provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Who is raising the alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SubjectInfo {
    pub id: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub name: String,
}

/// The alert handed to each transport.
///
/// Fields are private: a payload is built once per dispatch and never
/// mutated afterwards. A retry builds a fresh payload with a fresh timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    subject_id: String,
    phone: String,
    latitude: f64,
    longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy_m: Option<f64>,
    created_at: DateTime<Utc>,
}

impl AlertPayload {
    /// Build a payload stamped with the current time.
    pub fn new(subject: &SubjectInfo, location: GeoPoint) -> Self {
        Self::at(subject, location, Utc::now())
    }

    /// Build a payload with an explicit creation time.
    pub fn at(subject: &SubjectInfo, location: GeoPoint, created_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject.id.clone(),
            phone: subject.phone.clone(),
            latitude: location.latitude,
            longitude: location.longitude,
            accuracy_m: location.accuracy_m,
            created_at,
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn accuracy_m(&self) -> Option<f64> {
        self.accuracy_m
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Everything a confirmed trigger brings to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerContext {
    pub subject: SubjectInfo,
    pub location: GeoPoint,
}

impl TriggerContext {
    pub fn new(subject: SubjectInfo, location: GeoPoint) -> Self {
        Self { subject, location }
    }

    /// Fresh payload for one dispatch call.
    pub fn payload(&self) -> AlertPayload {
        AlertPayload::new(&self.subject, self.location)
    }
}
