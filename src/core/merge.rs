//! Folds lookup results back onto the original records.

use crate::core::models::{value_is_empty, Identity, LookupResult, Record};
use crate::core::record_store::RecordStore;

use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePolicy {
    /// Keys a lookup may write. Empty means any key the lookup returns.
    pub output_keys: Vec<String>,
    /// Overwrite non-empty existing values.
    pub force: bool,
    /// Give every record every output key, empty when absent.
    pub uniform_columns: bool,
}

impl MergePolicy {
    fn allows(&self, key: &str) -> bool {
        self.output_keys.is_empty() || self.output_keys.iter().any(|k| k == key)
    }
}

/// Applies one result to a record. Returns how many fields were written.
///
/// Only `Success` writes anything, and then only into fields that are blank
/// unless `policy.force` is set. Empty values from the lookup are never
/// written over anything.
pub fn merge_result(record: &mut Record, result: &LookupResult, policy: &MergePolicy) -> usize {
    let LookupResult::Success { fields } = result else {
        return 0;
    };
    let mut written = 0;
    for (key, value) in fields {
        if !policy.allows(key) || value_is_empty(value) {
            continue;
        }
        if policy.force || record.is_blank(key) {
            record.insert(key.clone(), value.clone());
            written += 1;
        }
    }
    written
}

/// Adds each missing key as an empty string. Existing values are untouched.
pub fn ensure_output_columns(record: &mut Record, keys: &[String]) {
    for key in keys {
        if record.get(key).is_none() {
            record.insert(key.clone(), Value::String(String::new()));
        }
    }
}

/// Produces the output collection in input order. Records without a result
/// pass through unchanged apart from uniform columns.
pub fn merge_all(
    store: &RecordStore,
    results: &BTreeMap<Identity, LookupResult>,
    policy: &MergePolicy,
) -> Vec<Record> {
    let mut merged_records = 0usize;
    let mut merged_fields = 0usize;

    let output = store
        .iter()
        .map(|(_, identity, record)| {
            let mut out = record.clone();
            if let Some(result) = results.get(identity) {
                let written = merge_result(&mut out, result, policy);
                if written > 0 {
                    merged_records += 1;
                    merged_fields += written;
                }
            }
            if policy.uniform_columns {
                ensure_output_columns(&mut out, &policy.output_keys);
            }
            out
        })
        .collect();

    tracing::info!(target: "merge",
        "Merged {} fields into {} of {} records", merged_fields, merged_records, store.len());
    output
}
