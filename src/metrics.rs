//! Provisioner Metrics
//!
//! Prometheus counters for array writes, readiness checks and compensating
//! deletes. Registered on a caller-supplied [`Registry`] so tests and the
//! CLI each get an isolated set.

use crate::domain::ports::ObjectKind;
use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Counter handles shared by the reconciler and the volume service
#[derive(Debug, Clone)]
pub struct Metrics {
    array_writes: IntCounterVec,
    readiness_attempts: IntCounterVec,
    compensating_deletes: IntCounterVec,
}

impl Metrics {
    /// Create the counters and register them on `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let array_writes = IntCounterVec::new(
            Opts::new(
                "dorado_array_writes_total",
                "State-changing array calls issued by reconciliation",
            ),
            &["kind", "operation"],
        )
        .map_err(metrics_error)?;

        let readiness_attempts = IntCounterVec::new(
            Opts::new(
                "dorado_readiness_attempts_total",
                "Readiness checks after asynchronous creates",
            ),
            &["kind"],
        )
        .map_err(metrics_error)?;

        let compensating_deletes = IntCounterVec::new(
            Opts::new(
                "dorado_compensating_deletes_total",
                "Objects deleted to undo a failed create",
            ),
            &["kind"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(array_writes.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(readiness_attempts.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(compensating_deletes.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            array_writes,
            readiness_attempts,
            compensating_deletes,
        })
    }

    #[inline]
    pub fn record_write(&self, kind: ObjectKind, operation: &str) {
        self.array_writes
            .with_label_values(&[&kind.to_string(), operation])
            .inc();
    }

    #[inline]
    pub fn record_readiness_attempts(&self, kind: ObjectKind, attempts: u32) {
        self.readiness_attempts
            .with_label_values(&[&kind.to_string()])
            .inc_by(u64::from(attempts));
    }

    #[inline]
    pub fn record_compensating_delete(&self, kind: ObjectKind) {
        self.compensating_deletes
            .with_label_values(&[&kind.to_string()])
            .inc();
    }

    pub fn writes(&self, kind: ObjectKind, operation: &str) -> u64 {
        self.array_writes
            .with_label_values(&[&kind.to_string(), operation])
            .get()
    }

    pub fn compensating_deletes(&self, kind: ObjectKind) -> u64 {
        self.compensating_deletes
            .with_label_values(&[&kind.to_string()])
            .get()
    }
}

/// Render every metric in `registry` in the text exposition format
pub fn render(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(metrics_error)?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics encoding: {}", e)))
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("Metrics error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let registry = Registry::new();
        let metrics = Metrics::register(&registry).unwrap();

        metrics.record_write(ObjectKind::Host, "create");
        metrics.record_write(ObjectKind::Host, "create");
        metrics.record_compensating_delete(ObjectKind::Snapshot);

        assert_eq!(metrics.writes(ObjectKind::Host, "create"), 2);
        assert_eq!(metrics.compensating_deletes(ObjectKind::Snapshot), 1);

        let text = render(&registry).unwrap();
        assert!(text.contains("dorado_array_writes_total"));
        assert!(text.contains("kind=\"Host\""));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        Metrics::register(&registry).unwrap();
        assert!(Metrics::register(&registry).is_err());
    }
}
