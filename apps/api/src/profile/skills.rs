//! Skill normalization: raw 1-5 Likert responses to [0, 1].
//!
//! Stored skills are always kept on the raw scale; every consumer that needs
//! normalized values (recommendation calls, repair) renormalizes here on use.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::models::derived::RawResponses;

/// Normalizes a raw skill map to [0, 1] via `(value - 1) / 4`.
///
/// Entries that do not parse to an integer in 1..=5 are dropped with a log,
/// never coerced. An empty result means "no usable skill data" and is a
/// valid outcome, not an error.
pub fn normalize_skills(raw: &RawResponses) -> BTreeMap<String, f64> {
    let mut normalized = BTreeMap::new();
    for (name, value) in raw {
        match parse_likert(value) {
            Some(v) => {
                normalized.insert(name.clone(), (v - 1) as f64 / 4.0);
            }
            None => warn!("dropping skill '{name}': value {value} is not on the 1-5 scale"),
        }
    }
    normalized
}

/// Parses a raw response (number or numeric string) to an integer in 1..=5.
fn parse_likert(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (1..=5).contains(&n).then_some(n)
}
