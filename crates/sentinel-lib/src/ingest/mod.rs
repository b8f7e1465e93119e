//! Log and metric ingestion
//!
//! This module provides the bounded, time-windowed store of recent
//! operational signals:
//! - Validation of records at the boundary
//! - Retention by age and by count, independent of snapshot requests
//! - Consistent point-in-time window snapshots for the detector

mod buffer;

pub use buffer::{BufferConfig, BufferStats, IngestionBuffer, Window};
