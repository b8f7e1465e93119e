//! Stability evaluation against an operator-set baseline
//!
//! `check` is a pure function of the window, the baseline, and the previous
//! report. Classification uses ordinal dominance: any tracked metric past the
//! critical deviation makes the whole report critical, any past the degrading
//! deviation makes it degrading, and only when every delta has shrunk versus
//! the previous report does the system count as improving.

use std::sync::RwLock;

use chrono::Utc;
use tracing::info;

use crate::ingest::Window;
use crate::models::{Baseline, MetricSample, StabilityClass, StabilityReport};

/// Metric keys tracked for baseline comparison
const TRACKED_METRICS: &[(&str, fn(&MetricSample) -> Option<f64>)] = &[
    ("cpu_percent", |m| m.cpu_percent),
    ("memory_percent", |m| m.memory_percent),
    ("error_rate", |m| m.error_rate),
    ("latency_ms", |m| m.latency_ms),
];

/// Relative-deviation cutoffs for the ordinal classification
#[derive(Debug, Clone)]
pub struct StabilityThresholds {
    /// Deviation beyond which a metric counts as degrading
    pub degrading_deviation: f64,
    /// Deviation beyond which the whole report is critical
    pub critical_deviation: f64,
    /// Minimum shrink in a delta for it to count as measurable improvement
    pub improving_epsilon: f64,
}

impl Default for StabilityThresholds {
    fn default() -> Self {
        Self {
            degrading_deviation: 0.25,
            critical_deviation: 1.0,
            improving_epsilon: 0.01,
        }
    }
}

/// Compare a window's metric averages against the baseline.
///
/// Deviations are relative to the baseline value; a metric with no baseline
/// entry or no samples in the window is skipped. Never reads incident state.
pub fn check(
    window: &Window,
    baseline: &Baseline,
    previous: Option<&StabilityReport>,
    thresholds: &StabilityThresholds,
) -> StabilityReport {
    let mut deltas = std::collections::HashMap::new();

    for (name, extract) in TRACKED_METRICS {
        let Some(current) = window.metric_average(extract) else {
            continue;
        };
        let Some(reference) = baseline.value(name) else {
            continue;
        };
        deltas.insert((*name).to_string(), relative_deviation(current, reference));
    }

    let worst = deltas.values().fold(0.0_f64, |acc, d| acc.max(d.abs()));
    let classification = if worst > thresholds.critical_deviation {
        StabilityClass::Critical
    } else if worst > thresholds.degrading_deviation {
        StabilityClass::Degrading
    } else if is_improving(&deltas, previous, thresholds.improving_epsilon) {
        StabilityClass::Improving
    } else {
        StabilityClass::Stable
    };

    StabilityReport {
        classification,
        baseline_deltas: deltas,
        evaluated_at: Utc::now(),
    }
}

fn relative_deviation(current: f64, reference: f64) -> f64 {
    if reference.abs() < f64::EPSILON {
        // No meaningful ratio against a zero baseline; use the raw value
        current
    } else {
        (current - reference) / reference.abs()
    }
}

/// Improvement requires every shared delta to have measurably shrunk
fn is_improving(
    deltas: &std::collections::HashMap<String, f64>,
    previous: Option<&StabilityReport>,
    epsilon: f64,
) -> bool {
    let Some(prev) = previous else {
        return false;
    };
    let mut compared = 0;
    for (name, delta) in deltas {
        let Some(old) = prev.baseline_deltas.get(name) else {
            continue;
        };
        if delta.abs() + epsilon > old.abs() {
            return false;
        }
        compared += 1;
    }
    compared > 0
}

impl Baseline {
    /// Capture the window's metric averages as a new baseline
    pub fn from_window(window: &Window) -> Self {
        Self {
            cpu_percent: window.metric_average(|m| m.cpu_percent),
            memory_percent: window.metric_average(|m| m.memory_percent),
            error_rate: window.metric_average(|m| m.error_rate),
            latency_ms: window.metric_average(|m| m.latency_ms),
            set_at: Some(Utc::now()),
        }
    }
}

/// Owns the operator-settable baseline and applies [`check`] against it
#[derive(Debug)]
pub struct StabilityEvaluator {
    thresholds: StabilityThresholds,
    baseline: RwLock<Option<Baseline>>,
}

impl StabilityEvaluator {
    pub fn new(thresholds: StabilityThresholds) -> Self {
        Self {
            thresholds,
            baseline: RwLock::new(None),
        }
    }

    /// Replace the baseline with the window's current averages.
    ///
    /// Explicit operator or scheduled action; evaluation never does this
    /// implicitly.
    pub fn set_baseline(&self, window: &Window) -> Baseline {
        let baseline = Baseline::from_window(window);
        info!(
            cpu = ?baseline.cpu_percent,
            memory = ?baseline.memory_percent,
            error_rate = ?baseline.error_rate,
            latency_ms = ?baseline.latency_ms,
            "baseline replaced"
        );
        if let Ok(mut guard) = self.baseline.write() {
            *guard = Some(baseline.clone());
        }
        baseline
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline.read().ok().and_then(|g| g.clone())
    }

    /// Evaluate the window against the stored baseline.
    ///
    /// Returns `None` until a baseline has been set.
    pub fn evaluate(
        &self,
        window: &Window,
        previous: Option<&StabilityReport>,
    ) -> Option<StabilityReport> {
        let baseline = self.baseline()?;
        Some(check(window, &baseline, previous, &self.thresholds))
    }
}

impl Default for StabilityEvaluator {
    fn default() -> Self {
        Self::new(StabilityThresholds::default())
    }
}

/// Per-service bookkeeping over consecutive stability reports
///
/// Feeds two decisions: whether an incident has been stable long enough to
/// auto-resolve, and whether a root-cause re-run is warranted.
#[derive(Debug)]
pub struct StabilityTracker {
    rerun_degrading_cycles: u32,
    consecutive_stable: u32,
    consecutive_degrading: u32,
    entered_critical: bool,
    previous: Option<StabilityReport>,
}

impl StabilityTracker {
    pub fn new(rerun_degrading_cycles: u32) -> Self {
        Self {
            rerun_degrading_cycles,
            consecutive_stable: 0,
            consecutive_degrading: 0,
            entered_critical: false,
            previous: None,
        }
    }

    /// The last report seen, for the evaluator's improving comparison
    pub fn previous(&self) -> Option<&StabilityReport> {
        self.previous.as_ref()
    }

    pub fn observe(&mut self, report: StabilityReport) {
        let was_critical = self
            .previous
            .as_ref()
            .map(|p| p.classification == StabilityClass::Critical)
            .unwrap_or(false);

        match report.classification {
            StabilityClass::Stable => {
                self.consecutive_stable += 1;
                self.consecutive_degrading = 0;
                self.entered_critical = false;
            }
            StabilityClass::Improving => {
                // Improving breaks a degrading streak but does not yet count
                // toward sustained stability
                self.consecutive_stable = 0;
                self.consecutive_degrading = 0;
                self.entered_critical = false;
            }
            StabilityClass::Degrading => {
                self.consecutive_stable = 0;
                self.consecutive_degrading += 1;
                self.entered_critical = false;
            }
            StabilityClass::Critical => {
                self.consecutive_stable = 0;
                self.consecutive_degrading = 0;
                self.entered_critical = !was_critical;
            }
        }

        self.previous = Some(report);
    }

    /// True once `cycles` consecutive stable reports have been observed
    pub fn sustained_stable(&self, cycles: u32) -> bool {
        self.consecutive_stable >= cycles
    }

    /// True on a fresh transition into critical, or after the configured
    /// run of consecutive degrading reports
    pub fn should_rerun_agent(&self) -> bool {
        self.entered_critical || self.consecutive_degrading >= self.rerun_degrading_cycles
    }
}
