//! Known failure-pattern library
//!
//! Keyword matchers applied to log message text. Only error and critical
//! records are eligible; informational noise never trips a pattern.

use crate::models::{AnomalyCategory, LogRecord, Severity};

/// A named failure signature with its classification
#[derive(Debug, Clone, Copy)]
pub struct FailurePattern {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub category: AnomalyCategory,
    pub severity: Severity,
}

/// Library of known failure signatures, checked in declaration order
pub const KNOWN_PATTERNS: &[FailurePattern] = &[
    FailurePattern {
        name: "database_connection_failure",
        keywords: &["connection refused", "connection pool", "database timeout"],
        category: AnomalyCategory::DependencyFailure,
        severity: Severity::High,
    },
    FailurePattern {
        name: "out_of_memory",
        keywords: &["out of memory", "oom", "heap space", "memory allocation"],
        category: AnomalyCategory::ResourceExhaustion,
        severity: Severity::Critical,
    },
    FailurePattern {
        name: "disk_full",
        keywords: &["disk full", "no space left", "disk quota exceeded"],
        category: AnomalyCategory::ResourceExhaustion,
        severity: Severity::Critical,
    },
    FailurePattern {
        name: "authentication_failure",
        keywords: &["authentication failed", "unauthorized", "invalid token"],
        category: AnomalyCategory::PatternMatch,
        severity: Severity::Medium,
    },
    FailurePattern {
        name: "rate_limiting",
        keywords: &["rate limit", "too many requests", "throttled"],
        category: AnomalyCategory::PatternMatch,
        severity: Severity::Medium,
    },
    FailurePattern {
        name: "service_unavailable",
        keywords: &["service unavailable", "upstream", "connection reset"],
        category: AnomalyCategory::DependencyFailure,
        severity: Severity::High,
    },
    FailurePattern {
        name: "tls_certificate_issue",
        keywords: &["certificate", "handshake", "tls error", "ssl error"],
        category: AnomalyCategory::DependencyFailure,
        severity: Severity::High,
    },
    FailurePattern {
        name: "deadlock",
        keywords: &["deadlock", "lock timeout", "waiting for lock"],
        category: AnomalyCategory::PatternMatch,
        severity: Severity::Critical,
    },
    FailurePattern {
        name: "network_failure",
        keywords: &["network unreachable", "dns", "econnrefused", "socket error"],
        category: AnomalyCategory::DependencyFailure,
        severity: Severity::High,
    },
];

/// A pattern firing on a specific log record
#[derive(Debug, Clone)]
pub struct PatternHit<'a> {
    pub pattern: &'static FailurePattern,
    pub record: &'a LogRecord,
}

/// Find pattern hits across error/critical records in the window
pub fn match_failure_patterns(logs: &[LogRecord]) -> Vec<PatternHit<'_>> {
    let mut hits = Vec::new();

    for record in logs {
        if !record.level.is_failure() {
            continue;
        }
        let message = record.message.to_lowercase();
        for pattern in KNOWN_PATTERNS {
            if pattern.keywords.iter().any(|kw| message.contains(kw)) {
                hits.push(PatternHit { pattern, record });
                break;
            }
        }
    }

    hits
}
