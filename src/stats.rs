//! Derived statistics and threshold evaluation.
//!
//! Modules expose their results as [`Metric`]s and describe what a good
//! result looks like with [`MetricCheck`]s. The [`StatisticsAggregator`]
//! collects both from a completed run and evaluates every check into a
//! [`Severity`], producing the [`AnalysisReport`] that reporting
//! collaborators read.
//!
//! Everything here is pure: nothing mutates the modules it reads from.

use crate::context::AnalysisContext;
use crate::dispatcher::CompletedRun;
use crate::event::Timestamp;
use crate::report::{AnalysisReport, ModuleReport};
use crate::timeline::StackTimeline;
use serde::{Deserialize, Serialize};

/// How far a metric is from its recommended value.
///
/// Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Minor,
    Regular,
    Major,
}

/// Direction in which a metric fails its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// The metric should be at least the threshold.
    LessThan,
    /// The metric should be at most the threshold.
    GreaterThan,
}

/// The recommended value of a metric and the failing direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub comparison: Comparison,
    pub value: f64,
}

impl Threshold {
    /// Fails when the metric is below `value`.
    pub fn less_than(value: f64) -> Self {
        Self {
            comparison: Comparison::LessThan,
            value,
        }
    }

    /// Fails when the metric is above `value`.
    pub fn greater_than(value: f64) -> Self {
        Self {
            comparison: Comparison::GreaterThan,
            value,
        }
    }

    fn fails(&self, value: f64, boundary: f64) -> bool {
        match self.comparison {
            Comparison::LessThan => value < boundary,
            Comparison::GreaterThan => value > boundary,
        }
    }
}

/// Boundaries beyond the threshold at which a failure escalates.
///
/// Failing the threshold itself is [`Severity::Minor`]; crossing
/// `regular` makes it [`Severity::Regular`], crossing `major`
/// [`Severity::Major`]. Boundaries are checked from most severe down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBands {
    #[serde(default)]
    pub regular: Option<f64>,
    #[serde(default)]
    pub major: Option<f64>,
}

impl SeverityBands {
    pub fn new(regular: f64, major: f64) -> Self {
        Self {
            regular: Some(regular),
            major: Some(major),
        }
    }
}

/// Classify `value` against a threshold and its severity bands.
///
/// # Examples
///
/// ```rust
/// use zzparse::stats::{evaluate, Severity, SeverityBands, Threshold};
///
/// let threshold = Threshold::less_than(0.90);
/// let bands = SeverityBands::new(0.80, 0.70);
///
/// assert_eq!(evaluate(0.95, threshold, &bands), Severity::Ok);
/// assert_eq!(evaluate(0.85, threshold, &bands), Severity::Minor);
/// assert_eq!(evaluate(0.75, threshold, &bands), Severity::Regular);
/// assert_eq!(evaluate(0.50, threshold, &bands), Severity::Major);
/// ```
pub fn evaluate(value: f64, threshold: Threshold, bands: &SeverityBands) -> Severity {
    if !threshold.fails(value, threshold.value) {
        return Severity::Ok;
    }
    if bands.major.is_some_and(|major| threshold.fails(value, major)) {
        Severity::Major
    } else if bands
        .regular
        .is_some_and(|regular| threshold.fails(value, regular))
    {
        Severity::Regular
    } else {
        Severity::Minor
    }
}

/// A named, derived value exposed by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub label: String,
    pub value: f64,
}

impl Metric {
    pub fn new(key: impl Into<String>, label: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            value,
        }
    }
}

/// A threshold a module wants one of its values checked against.
///
/// Built in the order a reader would say it:
///
/// ```rust
/// use zzparse::stats::{MetricCheck, Severity};
///
/// let check = MetricCheck::when("damage_mitigated", 0.76)
///     .is_less_than(0.90)
///     .regular(0.80)
///     .major(0.70);
///
/// assert_eq!(check.evaluate().severity, Severity::Regular);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCheck {
    pub key: String,
    pub value: f64,
    pub threshold: Threshold,
    pub bands: SeverityBands,
}

impl MetricCheck {
    /// Start a check of `value`; until a comparison is chosen the check
    /// fails when the value is below zero.
    pub fn when(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
            threshold: Threshold::less_than(0.0),
            bands: SeverityBands::default(),
        }
    }

    pub fn is_less_than(mut self, recommended: f64) -> Self {
        self.threshold = Threshold::less_than(recommended);
        self
    }

    pub fn is_greater_than(mut self, recommended: f64) -> Self {
        self.threshold = Threshold::greater_than(recommended);
        self
    }

    pub fn regular(mut self, boundary: f64) -> Self {
        self.bands.regular = Some(boundary);
        self
    }

    pub fn major(mut self, boundary: f64) -> Self {
        self.bands.major = Some(boundary);
        self
    }

    pub fn evaluate(&self) -> Evaluation {
        Evaluation {
            key: self.key.clone(),
            value: self.value,
            threshold: self.threshold,
            severity: evaluate(self.value, self.threshold, &self.bands),
        }
    }
}

/// The outcome of a [`MetricCheck`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub key: String,
    pub value: f64,
    pub threshold: Threshold,
    pub severity: Severity,
}

/// `part / whole`, or `None` when `whole` is zero.
pub fn ratio(part: f64, whole: f64) -> Option<f64> {
    if whole == 0.0 {
        None
    } else {
        Some(part / whole)
    }
}

/// Average of a histogram indexed by stack count.
///
/// `histogram[n]` is how many samples saw `n` stacks.
pub fn average_stacks(histogram: &[u64]) -> Option<f64> {
    let samples: u64 = histogram.iter().sum();
    let stacks: u64 = histogram
        .iter()
        .enumerate()
        .map(|(count, &hits)| count as u64 * hits)
        .sum();
    ratio(stacks as f64, samples as f64)
}

/// Share of samples per stack count.
pub fn distribution(histogram: &[u64]) -> Vec<f64> {
    let samples: u64 = histogram.iter().sum();
    histogram
        .iter()
        .map(|&hits| ratio(hits as f64, samples as f64).unwrap_or(0.0))
        .collect()
}

/// Fraction of `[start, end)` during which the timeline was above zero.
pub fn uptime(timeline: &StackTimeline, start: Timestamp, end: Timestamp) -> Option<f64> {
    ratio(
        timeline.active_duration(start, end) as f64,
        (end - start).max(0) as f64,
    )
}

/// Time-weighted average stack count over `[start, end)`.
pub fn time_weighted_average(
    timeline: &StackTimeline,
    start: Timestamp,
    end: Timestamp,
) -> Option<f64> {
    ratio(
        timeline.stack_duration(start, end) as f64,
        (end - start).max(0) as f64,
    )
}

/// Collects metrics and evaluations from every module of a run.
#[derive(Debug, Default)]
pub struct StatisticsAggregator;

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Build the report for a completed run, modules in execution order.
    pub fn collect(&self, run: &CompletedRun, context: &AnalysisContext) -> AnalysisReport {
        let modules = run
            .modules()
            .map(|(id, module)| {
                let faults: Vec<_> = run
                    .faults()
                    .iter()
                    .filter(|fault| &fault.module == id)
                    .cloned()
                    .collect();
                ModuleReport {
                    module_id: id.clone(),
                    snapshot: module.snapshot(),
                    metrics: module.metrics(context),
                    evaluations: module
                        .checks(context)
                        .iter()
                        .map(MetricCheck::evaluate)
                        .collect(),
                    incomplete: !faults.is_empty(),
                    faults,
                }
            })
            .collect();

        AnalysisReport {
            fight: context.fight,
            events_delivered: run.events_delivered(),
            modules,
        }
    }
}
