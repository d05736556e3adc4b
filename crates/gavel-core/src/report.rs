//! Dashboard sinks: tabular raw outputs and summary key/values from the
//! evaluators. Core logic behaves identically whether or not a sink is
//! attached, so a no-op implementation is always available.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use serde_json::{json, Value};

pub trait Dashboard: Send + Sync {
    fn log_table(&self, name: &str, columns: &[&str], rows: Vec<Vec<Value>>);

    fn log_summary(&self, key: &str, value: Value);

    /// Write any buffered output. Default: nothing to write.
    fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Discards everything.
pub struct NullDashboard;

impl Dashboard for NullDashboard {
    fn log_table(&self, _name: &str, _columns: &[&str], _rows: Vec<Vec<Value>>) {}

    fn log_summary(&self, _key: &str, _value: Value) {}
}

/// Buffers tables and summaries, then writes one JSON file per key into an
/// output directory on flush.
pub struct JsonDashboard {
    out_dir: PathBuf,
    cache: Mutex<BTreeMap<String, Value>>,
}

impl JsonDashboard {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            cache: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Dashboard for JsonDashboard {
    fn log_table(&self, name: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        // Tables are stored as one object per row, keyed by column name.
        let table: Vec<Value> = rows
            .into_iter()
            .map(|row| {
                let obj: serde_json::Map<String, Value> = columns
                    .iter()
                    .map(|c| c.to_string())
                    .zip(row)
                    .collect();
                Value::Object(obj)
            })
            .collect();
        self.cache
            .lock()
            .unwrap()
            .insert(name.to_string(), Value::Array(table));
    }

    fn log_summary(&self, key: &str, value: Value) {
        let mut cache = self.cache.lock().unwrap();
        let summary = cache
            .entry("summary".to_string())
            .or_insert_with(|| json!({}));
        summary[key] = value;
    }

    fn flush(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;
        let cache = self.cache.lock().unwrap();
        for (key, value) in cache.iter() {
            let path = self.out_dir.join(format!("{key}.json"));
            let body = serde_json::to_string_pretty(value)?;
            std::fs::write(&path, body)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }
}
