//! Audit sinks that do not need a store: the `audit` tracing target and a fan-out.

use std::sync::Arc;

use crate::models::ActivityRecord;
use crate::traits::AuditSink;

/// Default sink when no persistent activity log is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: ActivityRecord) {
        tracing::info!(
            target: "audit",
            id = %record.id,
            user_id = ?record.user_id,
            action = %record.action,
            timestamp = %record.timestamp.to_rfc3339(),
            metadata = %record.metadata,
            "activity recorded"
        );
    }
}

/// Hands every record to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, record: ActivityRecord) {
        for sink in &self.sinks {
            sink.record(record.clone());
        }
    }
}
