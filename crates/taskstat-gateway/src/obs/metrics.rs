//! Minimal metrics registry.
//!
//! Gauges with dynamic labels backed by `DashMap`. Labels are flattened into
//! sorted key vectors to keep deterministic identity. A `MetricsRegistry` is a
//! plain value: create as many as you like, nothing is process-global.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use taskstat_core::error::{Result, TaskStatError};

/// Content type of the Prometheus text exposition format.
pub const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

type LabelKey = Vec<(String, String)>;

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Anything the registry can render.
pub trait Collector: Send + Sync {
    fn metric_type(&self) -> &'static str;
    /// Write sample lines (no `# HELP`/`# TYPE` header) for metric `name`.
    fn render_samples(&self, name: &str, out: &mut String);
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the value for a label set.
    pub fn set(&self, labels: &[(&str, &str)], v: i64) {
        let key = label_key(labels);
        if let Some(g) = self.map.get(&key) {
            g.store(v, Ordering::Relaxed);
            return;
        }
        self.map
            .entry(key)
            .or_insert_with(|| AtomicI64::new(0))
            .store(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> Option<i64> {
        self.map
            .get(&label_key(labels))
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// Keep only the series whose sorted label pairs satisfy `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&[(String, String)]) -> bool) {
        self.map.retain(|k, _| keep(k.as_slice()));
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Collector for GaugeVec {
    fn metric_type(&self) -> &'static str {
        "gauge"
    }

    fn render_samples(&self, name: &str, out: &mut String) {
        let mut rows: Vec<(String, i64)> = self
            .map
            .iter()
            .map(|r| {
                let label_str = r
                    .key()
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                (label_str, r.value().load(Ordering::Relaxed))
            })
            .collect();
        rows.sort();

        for (label_str, val) in rows {
            if label_str.is_empty() {
                let _ = writeln!(out, "{} {}", name, val);
            } else {
                let _ = writeln!(out, "{}{{{}}} {}", name, label_str, val);
            }
        }
    }
}

struct Family {
    name: String,
    help: String,
    collector: Arc<dyn Collector>,
}

/// Named collection of metric families, rendered together.
#[derive(Default)]
pub struct MetricsRegistry {
    families: RwLock<Vec<Family>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector under `name`. Names are unique per registry.
    pub fn register(
        &self,
        name: &str,
        help: &str,
        collector: Arc<dyn Collector>,
    ) -> Result<()> {
        if !is_valid_metric_name(name) {
            return Err(TaskStatError::BadRequest(format!(
                "invalid metric name: {name:?}"
            )));
        }
        let mut families = self.families.write().unwrap_or_else(PoisonError::into_inner);
        if families.iter().any(|f| f.name == name) {
            return Err(TaskStatError::AlreadyRegistered(name.to_string()));
        }
        families.push(Family {
            name: name.to_string(),
            help: help.to_string(),
            collector,
        });
        families.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(())
    }

    /// Render every family in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let families = self.families.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for f in families.iter() {
            let _ = writeln!(out, "# HELP {} {}", f.name, escape_help(&f.help));
            let _ = writeln!(out, "# TYPE {} {}", f.name, f.collector.metric_type());
            f.collector.render_samples(&f.name, &mut out);
        }
        out
    }
}
