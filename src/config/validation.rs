//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! The raw TOML is parsed into `toml::Value`, every dotted key path is
//! compared against the known field names, and unknown ones become warnings
//! with a "did you mean?" hint. Warnings never block loading; range checks
//! live in `AlertConfig::validate`.

use std::collections::HashSet;

/// A non-fatal config warning (typo, unused key).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ": did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `AlertConfig`.
///
/// Must be kept in step with the structs in alert_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [subject]
        "subject",
        "subject.id",
        "subject.phone",
        "subject.name",
        // [trigger]
        "trigger",
        "trigger.intensity_threshold",
        "trigger.debounce_window_ms",
        "trigger.reset_window_ms",
        "trigger.confirm_threshold",
        "trigger.sample_interval_ms",
        // [mesh]
        "mesh",
        "mesh.role",
        "mesh.discover_timeout_ms",
        "mesh.attempt_timeout_ms",
        // [gateway]
        "gateway",
        "gateway.base_url",
        "gateway.status_timeout_ms",
        "gateway.send_timeout_ms",
        "gateway.network_name",
        // [cloud]
        "cloud",
        "cloud.url",
        "cloud.connect_timeout_ms",
        "cloud.send_timeout_ms",
        "cloud.reconnect_initial_ms",
        "cloud.reconnect_max_ms",
        "cloud.max_reconnect_attempts",
        // [dispatch]
        "dispatch",
        "dispatch.progress_after_ms",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect dotted key paths: `{ a = { b = 1 } }` yields `["a", "a.b"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest known key within edit distance 3. Ties resolve alphabetically.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut candidates: Vec<&str> = known.iter().copied().collect();
    candidates.sort_unstable();
    candidates
        .into_iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|&(_, d)| d <= 3)
        .min_by_key(|&(_, d)| d)
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation
// ============================================================================

/// Warn about every key in `raw_toml` that `AlertConfig` does not know.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // serde reports the parse error
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}
