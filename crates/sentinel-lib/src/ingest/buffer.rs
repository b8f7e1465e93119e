//! Bounded ingestion buffer with windowed snapshots
//!
//! Producers append concurrently from many connections while the
//! timer-driven monitor takes snapshots. Appends and eviction run under the
//! write lock, snapshots under the read lock, so a snapshot always sees a
//! stable, non-torn set of records.

use crate::error::{Result, SentinelError};
use crate::models::{LogRecord, MetricSample};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

/// Default retention period (1 hour)
const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Default maximum entries per record kind
const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Tolerated clock skew for producer timestamps (5 minutes)
const MAX_FUTURE_SKEW_SECS: i64 = 5 * 60;

/// Configuration for the ingestion buffer
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Maximum record age before eviction
    pub max_age: Duration,
    /// Maximum number of logs and of metrics retained
    pub max_records: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_RETENTION,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

/// Read-only, time-bounded view materialized from the buffer.
///
/// Produced fresh each evaluation cycle and never mutated. Records are in
/// time-ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub logs: Vec<LogRecord>,
    pub metrics: Vec<MetricSample>,
}

impl Window {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.metrics.is_empty()
    }

    /// Distinct services observed in this window, in stable order
    pub fn services(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for log in &self.logs {
            names.insert(log.service.clone());
        }
        for metric in &self.metrics {
            names.insert(metric.service.clone());
        }
        names.into_iter().collect()
    }

    /// Restrict the window to a single service scope
    pub fn scoped_to(&self, service: &str) -> Window {
        Window {
            start: self.start,
            end: self.end,
            logs: self
                .logs
                .iter()
                .filter(|l| l.service == service)
                .cloned()
                .collect(),
            metrics: self
                .metrics
                .iter()
                .filter(|m| m.service == service)
                .cloned()
                .collect(),
        }
    }

    /// Average of one optional metric field over the window
    pub fn metric_average<F>(&self, field: F) -> Option<f64>
    where
        F: Fn(&MetricSample) -> Option<f64>,
    {
        let values: Vec<f64> = self.metrics.iter().filter_map(&field).collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Buffer statistics, queryable so operators can confirm ingestion ran
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferStats {
    pub log_entries: usize,
    pub metric_entries: usize,
    pub capacity: usize,
    pub retention_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_timestamp: Option<DateTime<Utc>>,
    /// Records evicted by the retention ceiling
    pub expired_evictions: u64,
    /// Records rejected at the validation boundary
    pub rejected_records: u64,
}

#[derive(Debug, Default)]
struct BufferInner {
    logs: VecDeque<LogRecord>,
    metrics: VecDeque<MetricSample>,
    expired_evictions: u64,
    rejected_records: u64,
}

/// Bounded, time-windowed store of recent logs and metric samples
pub struct IngestionBuffer {
    inner: RwLock<BufferInner>,
    config: BufferConfig,
}

impl IngestionBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            inner: RwLock::new(BufferInner::default()),
            config,
        }
    }

    /// Append a validated log record, evicting expired entries
    pub fn append_log(&self, record: LogRecord) -> Result<()> {
        validate_log(&record).map_err(|e| {
            self.count_rejection();
            e
        })?;

        let mut inner = self.inner.write().unwrap();
        while inner.logs.len() >= self.config.max_records {
            inner.logs.pop_front();
            inner.expired_evictions += 1;
        }
        inner.logs.push_back(record);
        Self::evict_expired(&mut inner, self.config.max_age);
        Ok(())
    }

    /// Append a validated metric sample, evicting expired entries
    pub fn append_metric(&self, sample: MetricSample) -> Result<()> {
        validate_metric(&sample).map_err(|e| {
            self.count_rejection();
            e
        })?;

        let mut inner = self.inner.write().unwrap();
        while inner.metrics.len() >= self.config.max_records {
            inner.metrics.pop_front();
            inner.expired_evictions += 1;
        }
        inner.metrics.push_back(sample);
        Self::evict_expired(&mut inner, self.config.max_age);
        Ok(())
    }

    /// Materialize a point-in-time window of the last `window_duration`.
    ///
    /// Holds the read lock for the whole materialization so eviction can
    /// never interleave mid-snapshot.
    pub fn snapshot(&self, window_duration: Duration) -> Window {
        let end = Utc::now();
        let start = end
            - ChronoDuration::from_std(window_duration).unwrap_or_else(|_| ChronoDuration::hours(1));

        let inner = self.inner.read().unwrap();
        let mut logs: Vec<LogRecord> = inner
            .logs
            .iter()
            .filter(|l| l.timestamp >= start && l.timestamp <= end)
            .cloned()
            .collect();
        let mut metrics: Vec<MetricSample> = inner
            .metrics
            .iter()
            .filter(|m| m.timestamp >= start && m.timestamp <= end)
            .cloned()
            .collect();
        drop(inner);

        // Producers may deliver slightly out of order; the window contract
        // is time-ascending.
        logs.sort_by_key(|l| l.timestamp);
        metrics.sort_by_key(|m| m.timestamp);

        Window {
            start,
            end,
            logs,
            metrics,
        }
    }

    pub fn stats(&self) -> BufferStats {
        let inner = self.inner.read().unwrap();

        let oldest = inner
            .logs
            .front()
            .map(|l| l.timestamp)
            .into_iter()
            .chain(inner.metrics.front().map(|m| m.timestamp))
            .min();
        let newest = inner
            .logs
            .back()
            .map(|l| l.timestamp)
            .into_iter()
            .chain(inner.metrics.back().map(|m| m.timestamp))
            .max();

        BufferStats {
            log_entries: inner.logs.len(),
            metric_entries: inner.metrics.len(),
            capacity: self.config.max_records,
            retention_seconds: self.config.max_age.as_secs(),
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            expired_evictions: inner.expired_evictions,
            rejected_records: inner.rejected_records,
        }
    }

    fn evict_expired(inner: &mut BufferInner, max_age: Duration) {
        let cutoff =
            Utc::now() - ChronoDuration::from_std(max_age).unwrap_or_else(|_| ChronoDuration::hours(24));

        while let Some(front) = inner.logs.front() {
            if front.timestamp < cutoff {
                inner.logs.pop_front();
                inner.expired_evictions += 1;
            } else {
                break;
            }
        }
        while let Some(front) = inner.metrics.front() {
            if front.timestamp < cutoff {
                inner.metrics.pop_front();
                inner.expired_evictions += 1;
            } else {
                break;
            }
        }
    }

    fn count_rejection(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.rejected_records += 1;
    }
}

impl Default for IngestionBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

fn validate_log(record: &LogRecord) -> Result<()> {
    if record.service.trim().is_empty() {
        return Err(SentinelError::Validation(
            "log record missing service name".to_string(),
        ));
    }
    if record.message.trim().is_empty() {
        return Err(SentinelError::Validation(
            "log record missing message".to_string(),
        ));
    }
    validate_timestamp(record.timestamp)
}

fn validate_metric(sample: &MetricSample) -> Result<()> {
    if sample.service.trim().is_empty() {
        return Err(SentinelError::Validation(
            "metric sample missing service name".to_string(),
        ));
    }

    let named = [
        sample.cpu_percent,
        sample.memory_percent,
        sample.error_rate,
        sample.latency_ms,
    ];
    if named.iter().all(Option::is_none) && sample.custom.is_empty() {
        return Err(SentinelError::Validation(
            "metric sample carries no values".to_string(),
        ));
    }
    for value in named.iter().flatten().chain(sample.custom.values()) {
        if !value.is_finite() {
            return Err(SentinelError::Validation(format!(
                "non-finite metric value for service {}",
                sample.service
            )));
        }
    }
    validate_timestamp(sample.timestamp)
}

fn validate_timestamp(ts: DateTime<Utc>) -> Result<()> {
    let skew = (ts - Utc::now()).num_seconds();
    if skew > MAX_FUTURE_SKEW_SECS {
        return Err(SentinelError::Validation(format!(
            "timestamp {}s in the future exceeds allowed skew",
            skew
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLevel;
    use std::collections::HashMap;

    fn log(service: &str, level: LogLevel, message: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level,
            service: service.to_string(),
            message: message.to_string(),
            attributes: HashMap::new(),
        }
    }

    fn metric(service: &str, cpu: f64) -> MetricSample {
        MetricSample {
            timestamp: Utc::now(),
            service: service.to_string(),
            cpu_percent: Some(cpu),
            memory_percent: None,
            error_rate: None,
            latency_ms: None,
            custom: HashMap::new(),
        }
    }

    #[test]
    fn test_append_and_snapshot() {
        let buffer = IngestionBuffer::default();
        buffer.append_log(log("api", LogLevel::Info, "started")).unwrap();
        buffer.append_metric(metric("api", 40.0)).unwrap();

        let window = buffer.snapshot(Duration::from_secs(300));
        assert_eq!(window.logs.len(), 1);
        assert_eq!(window.metrics.len(), 1);
    }

    #[test]
    fn test_snapshot_excludes_old_records() {
        let buffer = IngestionBuffer::default();
        let mut old = log("api", LogLevel::Error, "ancient failure");
        old.timestamp = Utc::now() - ChronoDuration::minutes(30);
        buffer.append_log(old).unwrap();
        buffer.append_log(log("api", LogLevel::Info, "fresh")).unwrap();

        let window = buffer.snapshot(Duration::from_secs(300));
        assert_eq!(window.logs.len(), 1);
        assert_eq!(window.logs[0].message, "fresh");
    }

    #[test]
    fn test_snapshot_is_time_ascending() {
        let buffer = IngestionBuffer::default();
        let now = Utc::now();
        for offset in [3i64, 1, 2] {
            let mut record = log("api", LogLevel::Info, &format!("t-{}", offset));
            record.timestamp = now - ChronoDuration::seconds(offset);
            buffer.append_log(record).unwrap();
        }

        let window = buffer.snapshot(Duration::from_secs(60));
        let timestamps: Vec<_> = window.logs.iter().map(|l| l.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn test_capacity_ceiling_evicts_oldest() {
        let buffer = IngestionBuffer::new(BufferConfig {
            max_age: Duration::from_secs(3600),
            max_records: 5,
        });

        for i in 0..10 {
            buffer
                .append_log(log("api", LogLevel::Info, &format!("msg-{}", i)))
                .unwrap();
        }

        let stats = buffer.stats();
        assert_eq!(stats.log_entries, 5);
        assert_eq!(stats.expired_evictions, 5);

        let window = buffer.snapshot(Duration::from_secs(3600));
        assert_eq!(window.logs[0].message, "msg-5");
    }

    #[test]
    fn test_rejects_empty_service() {
        let buffer = IngestionBuffer::default();
        let result = buffer.append_log(log("", LogLevel::Error, "orphan"));
        assert!(matches!(result, Err(SentinelError::Validation(_))));
        assert_eq!(buffer.stats().rejected_records, 1);
        assert_eq!(buffer.stats().log_entries, 0);
    }

    #[test]
    fn test_rejects_non_finite_metric() {
        let buffer = IngestionBuffer::default();
        let mut sample = metric("api", 40.0);
        sample.cpu_percent = Some(f64::NAN);
        assert!(buffer.append_metric(sample).is_err());
    }

    #[test]
    fn test_rejects_empty_metric_sample() {
        let buffer = IngestionBuffer::default();
        let mut sample = metric("api", 40.0);
        sample.cpu_percent = None;
        assert!(buffer.append_metric(sample).is_err());
    }

    #[test]
    fn test_rejects_far_future_timestamp() {
        let buffer = IngestionBuffer::default();
        let mut record = log("api", LogLevel::Info, "from tomorrow");
        record.timestamp = Utc::now() + ChronoDuration::hours(6);
        assert!(buffer.append_log(record).is_err());
    }

    #[test]
    fn test_window_services_and_scoping() {
        let buffer = IngestionBuffer::default();
        buffer.append_log(log("api", LogLevel::Info, "a")).unwrap();
        buffer.append_log(log("worker", LogLevel::Info, "b")).unwrap();
        buffer.append_metric(metric("api", 10.0)).unwrap();

        let window = buffer.snapshot(Duration::from_secs(300));
        assert_eq!(window.services(), vec!["api".to_string(), "worker".to_string()]);

        let scoped = window.scoped_to("api");
        assert_eq!(scoped.logs.len(), 1);
        assert_eq!(scoped.metrics.len(), 1);
    }

    #[test]
    fn test_metric_average() {
        let buffer = IngestionBuffer::default();
        buffer.append_metric(metric("api", 40.0)).unwrap();
        buffer.append_metric(metric("api", 60.0)).unwrap();

        let window = buffer.snapshot(Duration::from_secs(300));
        let avg = window.metric_average(|m| m.cpu_percent).unwrap();
        assert!((avg - 50.0).abs() < f64::EPSILON);
        assert!(window.metric_average(|m| m.latency_ms).is_none());
    }

    #[test]
    fn test_concurrent_append_and_snapshot() {
        use std::sync::Arc;

        let buffer = Arc::new(IngestionBuffer::default());
        let mut handles = Vec::new();

        for t in 0..4 {
            let buf = buffer.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    buf.append_log(log("api", LogLevel::Info, &format!("{}-{}", t, i)))
                        .unwrap();
                }
            }));
        }
        for _ in 0..50 {
            let window = buffer.snapshot(Duration::from_secs(300));
            // A snapshot must never observe a torn state
            assert!(window.logs.len() <= 400);
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(buffer.stats().log_entries, 400);
    }
}
