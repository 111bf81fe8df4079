//! Inbound alert routing: raw channel messages → typed alerts with feedback policy.

mod router;

pub use router::{
    classify, classify_mesh_text, feedback_policy, InboundAlertRouter, RoutedAlert, RouterStats,
};
