//! Process-wide table shared by every runtime, exposed to scripts as `share`.
//!
//! Values are copied in on [`SharedTable::publish`] and copied out on
//! [`SharedTable::view`]. A view remembers the generation it was taken at;
//! member writes through it reach the shared entry only while that
//! generation is still current and are dropped otherwise.

use crate::error::Result;
use crate::script::Runtime;
use crate::script::value::{HostObject, TableKey, Value};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

struct SharedEntry {
    value: Value,
    generation: u64,
}

#[derive(Default)]
pub struct SharedTable {
    entries: DashMap<String, SharedEntry>,
}

impl SharedTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install or replace `key`, returning its new generation.
    ///
    /// Publishing `nil` empties the entry but keeps its generation counting,
    /// so views taken before stay stale.
    pub fn publish(&self, key: &str, value: &Value) -> u64 {
        let value = value.deep_copy();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| SharedEntry {
                value: Value::Nil,
                generation: 0,
            });
        entry.value = value;
        entry.generation += 1;
        entry.generation
    }

    /// A private copy of `key` and the generation it was taken at.
    pub fn snapshot(&self, key: &str) -> Option<(Value, u64)> {
        let entry = self.entries.get(key)?;
        Some((entry.value.deep_copy(), entry.generation))
    }

    /// Like [`SharedTable::snapshot`], but a table copy stays linked to the
    /// entry: its member writes are offered back with [`SharedTable::commit`].
    pub fn view(self: &Arc<Self>, key: &str) -> Value {
        let Some((value, generation)) = self.snapshot(key) else {
            return Value::Nil;
        };
        if let Value::Table(table) = &value {
            table.bind(ShareBinding {
                shared: Arc::clone(self),
                key: key.to_string(),
                generation,
            });
        }
        value
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.snapshot(key).map(|(value, _)| value)
    }

    pub fn generation(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.generation)
    }

    /// Write one member of the table stored at `key`, if the entry is still at
    /// `generation`. Returns whether the write landed.
    pub(crate) fn commit(&self, key: &str, generation: u64, member: &TableKey, value: &Value) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            debug!(key, "shared entry is gone, dropping write");
            return false;
        };
        if entry.generation != generation {
            debug!(
                key,
                viewed = generation,
                live = entry.generation,
                "stale view, dropping write"
            );
            return false;
        }
        let Value::Table(canonical) = &entry.value else {
            return false;
        };
        canonical.raw_set(member.clone(), value.deep_copy());
        debug!(key, ?member, "committed write through view");
        true
    }

    /// Forget every entry.
    pub fn reset(&self) {
        self.entries.clear();
    }
}

/// Link from a viewed table back to its shared entry.
#[derive(Clone)]
pub(crate) struct ShareBinding {
    shared: Arc<SharedTable>,
    key: String,
    generation: u64,
}

impl ShareBinding {
    pub(crate) fn commit(&self, member: &TableKey, value: &Value) {
        self.shared
            .commit(&self.key, self.generation, member, value);
    }
}

/// The `share` global: `share.k` views, `share.k = v` publishes.
pub struct ShareNamespace {
    shared: Arc<SharedTable>,
}

impl ShareNamespace {
    pub fn new(shared: Arc<SharedTable>) -> Self {
        Self { shared }
    }
}

impl HostObject for ShareNamespace {
    fn type_name(&self) -> &'static str {
        "share"
    }

    fn index(&self, _rt: &Runtime, key: &str) -> Result<Value> {
        Ok(self.shared.view(key))
    }

    fn new_index(&self, _rt: &Runtime, key: &str, value: Value) -> Result<()> {
        self.shared.publish(key, &value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::Table;
    use std::thread;

    fn table(items: &[&str]) -> Value {
        Value::Table(Table::from_seq(items.iter().copied()))
    }

    #[test]
    fn publish_bumps_generation() {
        let shared = SharedTable::new();
        assert_eq!(shared.generation("k"), None);
        assert_eq!(shared.publish("k", &Value::Integer(1)), 1);
        assert_eq!(shared.publish("k", &Value::Integer(2)), 2);
        assert_eq!(shared.get("k"), Some(Value::Integer(2)));
    }

    #[test]
    fn write_through_fresh_view_commits() {
        let shared = SharedTable::new();
        shared.publish("cfg", &table(&["a"]));

        let view = shared.view("cfg");
        view.as_table().unwrap().set("color", "red");

        let canonical = shared.get("cfg").unwrap();
        assert_eq!(canonical.as_table().unwrap().get("color"), Value::from("red"));
        assert_eq!(shared.generation("cfg"), Some(1));
    }

    #[test]
    fn write_through_stale_view_is_dropped() {
        let shared = SharedTable::new();
        shared.publish("cfg", &table(&["v1"]));
        let stale = shared.view("cfg");

        shared.publish("cfg", &table(&["v2"]));
        stale.as_table().unwrap().set(1, "from stale view");

        let canonical = shared.get("cfg").unwrap();
        assert_eq!(canonical.as_table().unwrap().get(1), Value::from("v2"));
        // The view itself still sees its own write.
        assert_eq!(stale.as_table().unwrap().get(1), Value::from("from stale view"));
    }

    #[test]
    fn published_and_viewed_values_are_copies() {
        let shared = SharedTable::new();
        let source = Table::from_seq(["x"]);
        shared.publish("t", &Value::Table(source.clone()));

        source.raw_set(1, "changed after publish");
        let view = shared.view("t");
        assert_eq!(view.as_table().unwrap().get(1), Value::from("x"));
        assert!(!view.as_table().unwrap().ptr_eq(&source));

        view.as_table().unwrap().raw_set(1, "raw write");
        assert_eq!(shared.get("t").unwrap().as_table().unwrap().get(1), Value::from("x"));
    }

    #[test]
    fn publishing_nil_keeps_views_stale() {
        let shared = SharedTable::new();
        shared.publish("k", &table(&["a"]));
        let view = shared.view("k");
        shared.publish("k", &Value::Nil);
        shared.publish("k", &table(&["b"]));

        view.as_table().unwrap().set(1, "late");
        assert_eq!(shared.get("k").unwrap().as_table().unwrap().get(1), Value::from("b"));
        assert_eq!(shared.generation("k"), Some(3));
    }

    #[test]
    fn concurrent_publishers_never_lose_generations() {
        let shared = SharedTable::new();
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for i in 0..100 {
                        shared.publish("counter", &Value::Integer(i));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(shared.generation("counter"), Some(400));
    }

    #[test]
    fn reset_clears_entries() {
        let shared = SharedTable::new();
        shared.publish("k", &Value::Integer(1));
        shared.reset();
        assert_eq!(shared.get("k"), None);
        assert!(shared.view("k").is_nil());
    }
}
