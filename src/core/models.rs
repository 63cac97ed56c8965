//! Data types shared by every stage of the enrichment pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Enrichment fields produced by a lookup, in the order the service reported them.
pub type Fields = Map<String, Value>;

/// One lead row. Field names are whatever the input carried; there is no
/// fixed schema, so access goes through alias-aware helpers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Finds a field by exact name first, then case-insensitively.
    pub fn lookup_alias(&self, alias: &str) -> Option<(&str, &Value)> {
        self.0
            .iter()
            .find(|(k, _)| k.as_str() == alias)
            .or_else(|| self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(alias)))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Non-empty text of the first alias that carries one.
    pub fn first_text(&self, aliases: &[&str]) -> Option<String> {
        aliases
            .iter()
            .filter_map(|alias| self.lookup_alias(alias))
            .find_map(|(_, v)| value_to_text(v))
    }

    /// True when any alias holds a non-empty value.
    pub fn has_any(&self, aliases: &[&str]) -> bool {
        self.first_text(aliases).is_some()
    }

    /// True when `key` is absent or holds an empty value. Matches exactly.
    pub fn is_blank(&self, key: &str) -> bool {
        self.0.get(key).map_or(true, value_is_empty)
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Null, blank strings and empty lists count as empty.
pub fn value_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(value_is_empty),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Renders a scalar or list-of-scalar value as trimmed text, `None` when empty.
pub fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_to_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Stable identity of a record within one logical run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn from_key(value: &str) -> Self {
        Self(value.trim().to_string())
    }

    pub fn from_position(position: usize) -> Self {
        Self(format!("#{}", position))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs extracted from a record for one lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupInputs {
    /// Normalized website URL with scheme.
    pub website: Option<String>,
    /// Bare lowercase domain without `www.`.
    pub domain: Option<String>,
    pub company_name: Option<String>,
}

/// A record's pending lookup. Consumed exactly once by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub identity: Identity,
    pub position: usize,
    pub inputs: LookupInputs,
}

impl WorkUnit {
    /// Short label for log lines.
    pub fn label(&self) -> String {
        let target = self
            .inputs
            .domain
            .as_deref()
            .or(self.inputs.company_name.as_deref())
            .or(self.inputs.website.as_deref())
            .unwrap_or("N/A");
        format!("{} / {}", self.identity, target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retryable class (429, 5xx, timeouts, resets) that exhausted its attempts.
    Transient,
    /// Not worth retrying (other 4xx, malformed body, worker crash).
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Outcome of one lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LookupResult {
    Success {
        fields: Fields,
    },
    NotFound {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Failed {
        kind: FailureKind,
        detail: String,
    },
}

impl LookupResult {
    pub fn success(fields: Fields) -> Self {
        LookupResult::Success { fields }
    }

    pub fn not_found() -> Self {
        LookupResult::NotFound { detail: None }
    }

    pub fn not_found_with(detail: impl Into<String>) -> Self {
        LookupResult::NotFound {
            detail: Some(detail.into()),
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        LookupResult::Failed {
            kind: FailureKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        LookupResult::Failed {
            kind: FailureKind::Permanent,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, LookupResult::Success { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LookupResult::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            LookupResult::Success { .. } => "success",
            LookupResult::NotFound { .. } => "not_found",
            LookupResult::Failed { .. } => "failed",
        }
    }
}

/// Counts shown to the confirmation gate before a run and reported after it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    /// Units that will be (or were) dispatched in this run.
    pub eligible: usize,
    /// Identities already completed by an earlier, interrupted run.
    pub resumed: usize,
    pub skipped_already_done: usize,
    pub skipped_missing_input: usize,
    /// Eligible records left out by `skip_first` / `max_leads`.
    pub skipped_by_limit: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: usize,
    pub estimated_cost: f64,
}

impl RunSummary {
    pub fn skipped(&self) -> usize {
        self.skipped_already_done + self.skipped_missing_input + self.skipped_by_limit
    }

    pub fn record_outcome(&mut self, result: &LookupResult) {
        self.processed += 1;
        match result {
            LookupResult::Success { .. } => self.succeeded += 1,
            LookupResult::NotFound { .. } => self.not_found += 1,
            LookupResult::Failed { .. } => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record::from_map(map),
            _ => panic!("test records must be objects"),
        }
    }

    #[test]
    fn test_alias_lookup_prefers_exact_then_case_insensitive() {
        let r = record(json!({"Website": "acme.com", "email": ""}));
        assert_eq!(r.lookup_alias("website").map(|(k, _)| k), Some("Website"));
        assert_eq!(r.first_text(&["domain", "website"]), Some("acme.com".into()));
        assert!(!r.has_any(&["email", "Email"]));
    }

    #[test]
    fn test_value_emptiness() {
        assert!(value_is_empty(&json!(null)));
        assert!(value_is_empty(&json!("   ")));
        assert!(value_is_empty(&json!([])));
        assert!(value_is_empty(&json!(["", " "])));
        assert!(!value_is_empty(&json!(0)));
        assert!(!value_is_empty(&json!(["a@b.com"])));
    }

    #[test]
    fn test_value_to_text_joins_lists() {
        assert_eq!(value_to_text(&json!(["a", "b"])), Some("a, b".into()));
        assert_eq!(value_to_text(&json!(42)), Some("42".into()));
        assert_eq!(value_to_text(&json!(" ")), None);
    }

    #[test]
    fn test_lookup_result_serializes_tagged() {
        let r = LookupResult::permanent("404 from service");
        let s = serde_json::to_value(&r).unwrap();
        assert_eq!(s["outcome"], "failed");
        assert_eq!(s["kind"], "permanent");
        let back: LookupResult = serde_json::from_value(s).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = RunSummary::default();
        summary.record_outcome(&LookupResult::success(Fields::new()));
        summary.record_outcome(&LookupResult::not_found());
        summary.record_outcome(&LookupResult::transient("timeout"));
        assert_eq!(summary.processed, 3);
        assert_eq!((summary.succeeded, summary.not_found, summary.failed), (1, 1, 1));
    }
}
