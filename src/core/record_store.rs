//! Ordered, read-only collection of loaded records with stable identities.

use crate::core::models::{value_to_text, Identity, Record};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct RecordStore {
    source_id: String,
    records: Vec<Record>,
    identities: Vec<Identity>,
}

impl RecordStore {
    /// Builds the store, deriving identities from `key_field` when present.
    ///
    /// A record whose key is empty, or repeats an earlier record's key, is
    /// identified by its position instead, so identities are always unique.
    pub fn new(source_id: impl Into<String>, records: Vec<Record>, key_field: &str) -> Self {
        let mut seen_keys = HashSet::new();
        let mut identities = Vec::with_capacity(records.len());

        for (position, record) in records.iter().enumerate() {
            let keyed = record
                .get(key_field)
                .and_then(value_to_text)
                .filter(|key| !key.starts_with('#'));

            let identity = match keyed {
                Some(key) if seen_keys.insert(key.clone()) => Identity::from_key(&key),
                Some(key) => {
                    tracing::warn!(target: "record_store",
                        "Duplicate {} '{}' at position {}. Falling back to positional identity.",
                        key_field, key, position);
                    Identity::from_position(position)
                }
                None => Identity::from_position(position),
            };
            identities.push(identity);
        }

        Self {
            source_id: source_id.into(),
            records,
            identities,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn identity(&self, position: usize) -> Option<&Identity> {
        self.identities.get(position)
    }

    /// `(position, identity, record)` in original order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Identity, &Record)> {
        self.identities
            .iter()
            .zip(self.records.iter())
            .enumerate()
            .map(|(i, (id, r))| (i, id, r))
    }
}
