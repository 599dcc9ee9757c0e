//! Optional periodic memory metric.

use std::time::Duration;

use evo_common::consts::BIZ_WORKER_MEMORY;
use evo_common::worker::WorkerSettings;
use serde_json::{Value, json};

use crate::procfs::ProcSource;

/// Destination of named metrics with a tag dictionary.
pub trait MetricsSink {
    fn emit(&mut self, metric: &str, tags: Value);
}

/// Writes metrics as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn emit(&mut self, metric: &str, tags: Value) {
        tracing::info!(target: "evo_worker::metrics", metric, tags = %tags, "metric");
    }
}

/// Emits the worker memory series when telemetry is enabled; inert otherwise.
#[derive(Debug, Clone)]
pub struct TelemetryReporter {
    worker_id: u32,
    interval: Option<Duration>,
}

impl TelemetryReporter {
    pub fn new(settings: &WorkerSettings) -> Self {
        Self {
            worker_id: settings.worker_id,
            interval: settings.telemetry_interval,
        }
    }

    /// Emission period, `None` when disabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Emit one memory sample.
    pub fn report(&self, source: &dyn ProcSource, sink: &mut dyn MetricsSink) {
        if !self.is_enabled() {
            return;
        }
        let used = source.resident_bytes().unwrap_or(0);
        sink.emit(
            BIZ_WORKER_MEMORY,
            json!({ "used": used, "worker_id": self.worker_id }),
        );
    }
}
