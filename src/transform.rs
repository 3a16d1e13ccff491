//! Per-record rewrites applied between scan and write
//!
//! COPY passes every record through [`Identity`]. RENAME uses [`RenameTransform`], which
//! moves attribute values to new names and asks for the original record to be deleted by
//! key before the rewritten one is put back.

use crate::client::Item;
use crate::config::RenameRule;
use crate::error::{Error, Result};
use crate::metrics::TransferMetrics;
use crate::schema::KeyNames;
use std::sync::Arc;
use std::time::Instant;

/// The writes produced for one scanned record
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    /// Key of a record to delete before `put` is written
    pub delete: Option<Item>,
    pub put: Item,
}

/// Turns a scanned record into the writes that replace it
pub trait Transform: Send + Sync {
    /// Returns `None` to leave the record untouched, skipping it entirely
    fn apply(&self, item: Item) -> Option<Rewrite>;
}

/// Writes every record unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, item: Item) -> Option<Rewrite> {
        Some(Rewrite {
            delete: None,
            put: item,
        })
    }
}

/// Rejects rules that would rename a key attribute of the table
pub fn validate_against_keys(rules: &[RenameRule], keys: &KeyNames) -> Result<()> {
    for rule in rules {
        if keys.contains(&rule.before) || keys.contains(&rule.after) {
            return Err(Error::Config(format!(
                "rename rule '{}' touches key attribute(s) {}{}",
                rule.label(),
                keys.partition_key,
                keys.sort_key
                    .as_deref()
                    .map(|s| format!(", {}", s))
                    .unwrap_or_default()
            )));
        }
    }

    Ok(())
}

/// Applies an ordered list of attribute renames
pub struct RenameTransform {
    rules: Vec<RenameRule>,
    keys: KeyNames,
    metrics: Arc<TransferMetrics>,
}

impl RenameTransform {
    /// Creates the transform after checking that no rule touches a key attribute.
    ///
    /// `metrics` must have been created with one rule slot per rule, in the same order.
    pub fn new(
        rules: Vec<RenameRule>,
        keys: KeyNames,
        metrics: Arc<TransferMetrics>,
    ) -> Result<Self> {
        validate_against_keys(&rules, &keys)?;

        Ok(Self {
            rules,
            keys,
            metrics,
        })
    }

    pub fn rules(&self) -> &[RenameRule] {
        &self.rules
    }

    fn key_of(&self, item: &Item) -> Option<Item> {
        let mut key = Item::with_capacity(2);
        key.insert(
            self.keys.partition_key.clone(),
            item.get(&self.keys.partition_key)?.clone(),
        );
        if let Some(sort_key) = &self.keys.sort_key {
            key.insert(sort_key.clone(), item.get(sort_key)?.clone());
        }
        Some(key)
    }
}

impl Transform for RenameTransform {
    fn apply(&self, mut item: Item) -> Option<Rewrite> {
        let started = Instant::now();

        let key = match self.key_of(&item) {
            Some(key) => key,
            None => {
                log::warn!(
                    "skipping record without key attribute {}",
                    self.keys.partition_key
                );
                return None;
            }
        };

        let mut renamed = false;
        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(value) = item.remove(&rule.before) {
                item.insert(rule.after.clone(), value);
                self.metrics.record_rename(index, started.elapsed());
                renamed = true;
            }
        }

        if !renamed {
            return None;
        }

        self.metrics.add_transformed(1);
        Some(Rewrite {
            delete: Some(key),
            put: item,
        })
    }
}
