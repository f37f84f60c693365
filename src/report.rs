//! Analysis results handed to reporting collaborators.
//!
//! Everything in here is plain, serializable data: a read-only snapshot
//! of each module's accumulators, its derived metrics and the evaluated
//! severity of every check. The core never renders any of it.

use crate::context::Fight;
use crate::dispatcher::EventFault;
use crate::module_id::ModuleId;
use crate::stats::{Evaluation, Metric, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only copy of a module's accumulators.
///
/// Keys are kept sorted so serialized snapshots are stable.
///
/// # Examples
///
/// ```rust
/// use zzparse::report::ModuleSnapshot;
///
/// let mut snapshot = ModuleSnapshot::new();
/// snapshot.set("hits_with_buff", 12);
/// snapshot.set("hits_per_stack", vec![3, 8, 4]);
///
/// assert_eq!(snapshot.get::<u64>("hits_with_buff"), Some(12));
/// assert_eq!(snapshot.get::<Vec<u64>>("hits_per_stack"), Some(vec![3, 8, 4]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleSnapshot {
    values: BTreeMap<String, serde_json::Value>,
}

impl ModuleSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value. Values that fail to serialize are skipped.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.values.insert(key.into(), json_value);
        }
    }

    /// Read a value back as `T`.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Results of a single module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module_id: ModuleId,
    pub snapshot: ModuleSnapshot,
    pub metrics: Vec<Metric>,
    pub evaluations: Vec<Evaluation>,
    /// Set when at least one event handler of this module failed.
    pub incomplete: bool,
    pub faults: Vec<EventFault>,
}

impl ModuleReport {
    /// Look up a metric by key.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.key == key).map(|m| m.value)
    }

    /// Look up an evaluation by key.
    pub fn evaluation(&self, key: &str) -> Option<&Evaluation> {
        self.evaluations.iter().find(|e| e.key == key)
    }
}

/// Results of a whole run, modules in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub fight: Fight,
    pub events_delivered: usize,
    pub modules: Vec<ModuleReport>,
}

impl AnalysisReport {
    pub fn module(&self, id: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.module_id.as_str() == id)
    }

    /// The worst severity across every evaluation.
    pub fn worst_severity(&self) -> Severity {
        self.modules
            .iter()
            .flat_map(|m| m.evaluations.iter())
            .map(|e| e.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    /// Evaluations that did not pass, most severe first.
    pub fn findings(&self) -> Vec<(&ModuleId, &Evaluation)> {
        let mut findings: Vec<_> = self
            .modules
            .iter()
            .flat_map(|m| m.evaluations.iter().map(move |e| (&m.module_id, e)))
            .filter(|(_, e)| e.severity != Severity::Ok)
            .collect();
        findings.sort_by(|a, b| b.1.severity.cmp(&a.1.severity));
        findings
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
