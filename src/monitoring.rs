// Operation tracking for transfers
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::TransferError;
use crate::types::TransferDirection;

/// Performance metrics of a completed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub operation_id: Uuid,
    pub direction: TransferDirection,
    pub start_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub records_processed: Option<u64>,
    pub bytes_processed: u64,
    /// Records per second
    pub throughput: Option<f64>,
}

/// Tracks a single transfer from start to completion
pub struct OperationTracker {
    pub operation_id: Uuid,
    pub direction: TransferDirection,
    pub target: String,
    pub start_time: DateTime<Utc>,
    started: Instant,
}

impl OperationTracker {
    /// Start tracking a transfer against `target` (file path or table)
    pub fn start(direction: TransferDirection, conn_id: &str, target: impl Into<String>) -> Self {
        let tracker = Self {
            operation_id: Uuid::new_v4(),
            direction,
            target: target.into(),
            start_time: Utc::now(),
            started: Instant::now(),
        };

        info!(
            operation_id = %tracker.operation_id,
            direction = ?direction,
            conn_id = conn_id,
            target = %tracker.target,
            "Started transfer"
        );
        tracker
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Mark the transfer as completed and return its metrics
    pub fn complete_success(&self, records: Option<u64>, bytes: u64) -> PerformanceMetric {
        let duration_ms = self.elapsed_ms();
        let throughput = match (records, duration_ms) {
            (Some(records), ms) if ms > 0 => Some(records as f64 / (ms as f64 / 1000.0)),
            _ => None,
        };

        info!(
            operation_id = %self.operation_id,
            direction = ?self.direction,
            target = %self.target,
            duration_ms = duration_ms,
            records = ?records,
            bytes = bytes,
            throughput = ?throughput,
            "Transfer completed successfully"
        );

        PerformanceMetric {
            operation_id: self.operation_id,
            direction: self.direction,
            start_time: self.start_time,
            duration_ms,
            records_processed: records,
            bytes_processed: bytes,
            throughput,
        }
    }

    /// Log the transfer as failed
    pub fn complete_failure(&self, err: &TransferError) {
        error!(
            operation_id = %self.operation_id,
            direction = ?self.direction,
            target = %self.target,
            duration_ms = self.elapsed_ms(),
            error_kind = err.kind(),
            error = %err,
            "Transfer failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_metric() {
        let tracker = OperationTracker::start(TransferDirection::Export, "warehouse", "/tmp/out.csv");
        let metric = tracker.complete_success(Some(10), 512);

        assert_eq!(metric.operation_id, tracker.operation_id);
        assert_eq!(metric.direction, TransferDirection::Export);
        assert_eq!(metric.records_processed, Some(10));
        assert_eq!(metric.bytes_processed, 512);
        assert_eq!(metric.start_time, tracker.start_time);
    }

    #[test]
    fn test_throughput_needs_records() {
        let tracker = OperationTracker::start(TransferDirection::Import, "warehouse", "events");
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert!(tracker.complete_success(None, 64).throughput.is_none());
        let metric = tracker.complete_success(Some(100), 64);
        assert!(metric.duration_ms > 0);
        assert!(metric.throughput.is_some_and(|t| t > 0.0));

        tracker.complete_failure(&TransferError::file_not_found("in.csv"));
    }
}
