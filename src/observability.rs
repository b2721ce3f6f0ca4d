use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Workflow engine counters
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub advances: AtomicU64,
    pub resumes: AtomicU64,
    pub idempotent_resumes: AtomicU64,
    pub processor_invocations: AtomicU64,
    pub processor_failures: AtomicU64,
    pub policy_rejections: AtomicU64,
    pub completed_tickets: AtomicU64,
    pub broadcasts: AtomicU64,
    pub dropped_observers: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_advance(&self) {
        self.advances.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resume(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idempotent_resume(&self) {
        self.idempotent_resumes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processor_invocation(&self) {
        self.processor_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processor_failure(&self) {
        self.processor_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_policy_rejection(&self) {
        self.policy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_tickets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_observers(&self, count: usize) {
        self.dropped_observers
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            advances: self.advances.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
            idempotent_resumes: self.idempotent_resumes.load(Ordering::Relaxed),
            processor_invocations: self.processor_invocations.load(Ordering::Relaxed),
            processor_failures: self.processor_failures.load(Ordering::Relaxed),
            policy_rejections: self.policy_rejections.load(Ordering::Relaxed),
            completed_tickets: self.completed_tickets.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            dropped_observers: self.dropped_observers.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            advances = stats.advances,
            resumes = stats.resumes,
            idempotent_resumes = stats.idempotent_resumes,
            processor_invocations = stats.processor_invocations,
            processor_failures = stats.processor_failures,
            policy_rejections = stats.policy_rejections,
            completed_tickets = stats.completed_tickets,
            broadcasts = stats.broadcasts,
            dropped_observers = stats.dropped_observers,
            "Workflow engine metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub advances: u64,
    pub resumes: u64,
    pub idempotent_resumes: u64,
    pub processor_invocations: u64,
    pub processor_failures: u64,
    pub policy_rejections: u64,
    pub completed_tickets: u64,
    pub broadcasts: u64,
    pub dropped_observers: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}
