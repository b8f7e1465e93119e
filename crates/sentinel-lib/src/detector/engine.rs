//! Threshold and pattern evaluation engine
//!
//! `evaluate` is a pure function of the window plus operator-configured
//! thresholds. It is deliberately conservative: a verdict fires only when a
//! signal crosses its threshold by the configured margin, or a failure
//! pattern matches an error/critical record.

use super::patterns::match_failure_patterns;
use crate::error::{Result, SentinelError};
use crate::ingest::Window;
use crate::models::{AnomalyCategory, AnomalyVerdict, EvidenceRecord, Severity};

/// Evidence records carried on a verdict are capped to keep incidents small
const MAX_EVIDENCE_RECORDS: usize = 20;

/// Fixed tie-break order when multiple categories fire at equal severity.
///
/// Checked in sequence; never rely on map iteration order.
pub const CATEGORY_PRIORITY: &[AnomalyCategory] = &[
    AnomalyCategory::ErrorRate,
    AnomalyCategory::ResourceExhaustion,
    AnomalyCategory::Latency,
    AnomalyCategory::DependencyFailure,
    AnomalyCategory::PatternMatch,
];

/// Operator-configured detection thresholds
#[derive(Debug, Clone)]
pub struct DetectorThresholds {
    /// Ratio of error/critical logs to all logs in the window
    pub log_error_ratio: f64,
    /// Minimum failure-log count before the ratio check applies
    pub min_error_logs: usize,
    /// Reported error-rate metric (0.0..1.0)
    pub metric_error_rate: f64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub latency_ms: f64,
    /// Fractional margin a signal must cross its threshold by
    pub margin: f64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            log_error_ratio: 0.20,
            min_error_logs: 5,
            metric_error_rate: 0.05,
            cpu_percent: 85.0,
            memory_percent: 90.0,
            latency_ms: 2000.0,
            margin: 0.05,
        }
    }
}

impl DetectorThresholds {
    fn crossed(&self, value: f64, threshold: f64) -> bool {
        value > threshold * (1.0 + self.margin)
    }
}

/// One category that fired during evaluation
struct Candidate {
    category: AnomalyCategory,
    severity: Severity,
    title: String,
    description: String,
    evidence: Vec<EvidenceRecord>,
}

/// Rule-based anomaly detector
///
/// No side effects; safe to call repeatedly with the same window.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: DetectorThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate one window and produce a verdict.
    ///
    /// When several categories fire, the highest severity wins; at equal
    /// severity the category earliest in [`CATEGORY_PRIORITY`] is chosen.
    pub fn evaluate(&self, window: &Window) -> Result<AnomalyVerdict> {
        if window.end < window.start {
            return Err(SentinelError::Detection(format!(
                "window ends at {} before it starts at {}",
                window.end, window.start
            )));
        }

        let mut candidates = Vec::new();
        for category in CATEGORY_PRIORITY {
            match category {
                AnomalyCategory::ErrorRate => self.check_error_rate(window, &mut candidates),
                AnomalyCategory::ResourceExhaustion => self.check_resources(window, &mut candidates),
                AnomalyCategory::Latency => self.check_latency(window, &mut candidates),
                // Both pattern-driven categories come out of one matcher pass
                AnomalyCategory::DependencyFailure => self.check_patterns(window, &mut candidates),
                AnomalyCategory::PatternMatch | AnomalyCategory::Other => {}
            }
        }

        if candidates.is_empty() {
            return Ok(AnomalyVerdict::clear());
        }

        let signal_count = candidates.len();
        // Rank by severity first, then the declared category order; push
        // order is not a ranking (one matcher pass emits several categories).
        let Some(winner) = candidates.into_iter().reduce(|best, next| {
            let outranks = next.severity > best.severity
                || (next.severity == best.severity
                    && priority_index(next.category) < priority_index(best.category));
            if outranks {
                next
            } else {
                best
            }
        }) else {
            return Ok(AnomalyVerdict::clear());
        };

        Ok(AnomalyVerdict {
            detected: true,
            category: winner.category,
            severity: winner.severity,
            title: winner.title,
            description: winner.description,
            evidence: winner.evidence,
            confidence: (0.5 + 0.1 * signal_count as f64).min(0.9),
        })
    }

    fn check_error_rate(&self, window: &Window, out: &mut Vec<Candidate>) {
        let t = &self.thresholds;

        // Log-derived error ratio; debug/info records only count toward the
        // denominator, never as failures.
        let total = window.logs.len();
        let failures: Vec<_> = window.logs.iter().filter(|l| l.level.is_failure()).collect();
        if total > 0 && failures.len() >= t.min_error_logs {
            let ratio = failures.len() as f64 / total as f64;
            if t.crossed(ratio, t.log_error_ratio) {
                let has_critical = failures.iter().any(|l| l.level == crate::models::LogLevel::Critical);
                let severity = if ratio > 0.5 || has_critical {
                    Severity::Critical
                } else {
                    Severity::High
                };
                out.push(Candidate {
                    category: AnomalyCategory::ErrorRate,
                    severity,
                    title: "Elevated error log rate".to_string(),
                    description: format!(
                        "{} of {} log records at error level ({:.0}%, threshold {:.0}%)",
                        failures.len(),
                        total,
                        ratio * 100.0,
                        t.log_error_ratio * 100.0
                    ),
                    evidence: failures
                        .iter()
                        .take(MAX_EVIDENCE_RECORDS)
                        .map(|l| EvidenceRecord::Log((*l).clone()))
                        .collect(),
                });
            }
        }

        // Reported error-rate metric
        if let Some(rate) = window.metric_average(|m| m.error_rate) {
            if t.crossed(rate, t.metric_error_rate) {
                let severity = if rate > 0.2 { Severity::Critical } else { Severity::High };
                out.push(Candidate {
                    category: AnomalyCategory::ErrorRate,
                    severity,
                    title: "Reported error rate above threshold".to_string(),
                    description: format!(
                        "error rate averaging {:.1}% (threshold {:.1}%)",
                        rate * 100.0,
                        t.metric_error_rate * 100.0
                    ),
                    evidence: metric_evidence(window, |m| m.error_rate.is_some()),
                });
            }
        }
    }

    fn check_resources(&self, window: &Window, out: &mut Vec<Candidate>) {
        let t = &self.thresholds;

        if let Some(cpu) = window.metric_average(|m| m.cpu_percent) {
            if t.crossed(cpu, t.cpu_percent) {
                let severity = if cpu > 95.0 { Severity::Critical } else { Severity::High };
                out.push(Candidate {
                    category: AnomalyCategory::ResourceExhaustion,
                    severity,
                    title: "CPU saturation".to_string(),
                    description: format!(
                        "CPU averaging {:.1}% (threshold {:.1}%)",
                        cpu, t.cpu_percent
                    ),
                    evidence: metric_evidence(window, |m| m.cpu_percent.is_some()),
                });
            }
        }

        if let Some(memory) = window.metric_average(|m| m.memory_percent) {
            if t.crossed(memory, t.memory_percent) {
                let severity = if memory > 95.0 { Severity::Critical } else { Severity::High };
                out.push(Candidate {
                    category: AnomalyCategory::ResourceExhaustion,
                    severity,
                    title: "Memory pressure".to_string(),
                    description: format!(
                        "memory averaging {:.1}% (threshold {:.1}%)",
                        memory, t.memory_percent
                    ),
                    evidence: metric_evidence(window, |m| m.memory_percent.is_some()),
                });
            }
        }
    }

    fn check_latency(&self, window: &Window, out: &mut Vec<Candidate>) {
        let t = &self.thresholds;

        if let Some(latency) = window.metric_average(|m| m.latency_ms) {
            if t.crossed(latency, t.latency_ms) {
                let severity = if latency > 5000.0 { Severity::High } else { Severity::Medium };
                out.push(Candidate {
                    category: AnomalyCategory::Latency,
                    severity,
                    title: "Latency above ceiling".to_string(),
                    description: format!(
                        "latency averaging {:.0}ms (ceiling {:.0}ms)",
                        latency, t.latency_ms
                    ),
                    evidence: metric_evidence(window, |m| m.latency_ms.is_some()),
                });
            }
        }
    }

    fn check_patterns(&self, window: &Window, out: &mut Vec<Candidate>) {
        let hits = match_failure_patterns(&window.logs);
        if hits.is_empty() {
            return;
        }

        // One candidate per pattern category, severity is the worst hit
        for category in [AnomalyCategory::ResourceExhaustion, AnomalyCategory::DependencyFailure, AnomalyCategory::PatternMatch] {
            let in_category: Vec<_> = hits
                .iter()
                .filter(|h| h.pattern.category == category)
                .collect();
            let Some(worst) = in_category.iter().map(|h| h.pattern.severity).max() else {
                continue;
            };

            let names: Vec<&str> = {
                let mut seen = Vec::new();
                for hit in &in_category {
                    if !seen.contains(&hit.pattern.name) {
                        seen.push(hit.pattern.name);
                    }
                }
                seen
            };

            out.push(Candidate {
                category,
                severity: worst,
                title: format!("Failure pattern: {}", names.join(", ")),
                description: format!(
                    "{} log records matched known failure patterns [{}]",
                    in_category.len(),
                    names.join(", ")
                ),
                evidence: in_category
                    .iter()
                    .take(MAX_EVIDENCE_RECORDS)
                    .map(|h| EvidenceRecord::Log(h.record.clone()))
                    .collect(),
            });
        }
    }
}

fn priority_index(category: AnomalyCategory) -> usize {
    CATEGORY_PRIORITY
        .iter()
        .position(|c| *c == category)
        .unwrap_or(CATEGORY_PRIORITY.len())
}

fn metric_evidence<F>(window: &Window, keep: F) -> Vec<EvidenceRecord>
where
    F: Fn(&crate::models::MetricSample) -> bool,
{
    window
        .metrics
        .iter()
        .filter(|m| keep(m))
        .take(MAX_EVIDENCE_RECORDS)
        .map(|m| EvidenceRecord::Metric(m.clone()))
        .collect()
}
