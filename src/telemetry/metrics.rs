//! Metric instruments for the loading engine.
//!
//! Instruments come from the globally registered `MeterProvider`; without
//! one they are no-ops. Each engine builds its instruments once.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

use crate::model::Scope;

/// Returns the shared meter for busflow-loading instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("busflow-loading")
}

/// How a busy episode became visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealMode {
    /// Within the rapid-resume window, no delay.
    Immediate,
    /// After the reveal delay elapsed.
    Delayed,
}

impl RevealMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RevealMode::Immediate => "immediate",
            RevealMode::Delayed => "delayed",
        }
    }
}

#[derive(Clone)]
pub struct EngineMetrics {
    /// Labels: `scope`.
    operations_started: Counter<u64>,
    /// Labels: `mode` ("immediate" | "delayed").
    reveals: Counter<u64>,
    /// Busy episodes that settled before the indicator was ever shown.
    flicker_suppressed: Counter<u64>,
    /// Labels: `scope`.
    operation_duration_ms: Histogram<f64>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        let meter = meter();
        Self {
            operations_started: meter
                .u64_counter("busflow.loading.operations_started")
                .with_description("Number of busy operations started")
                .build(),
            reveals: meter
                .u64_counter("busflow.loading.reveals")
                .with_description("Number of times the busy indicator was revealed")
                .build(),
            flicker_suppressed: meter
                .u64_counter("busflow.loading.flicker_suppressed")
                .with_description("Busy episodes that settled before the reveal delay")
                .build(),
            operation_duration_ms: meter
                .f64_histogram("busflow.loading.operation_duration_ms")
                .with_description("Lifetime of busy operations in milliseconds")
                .with_unit("ms")
                .build(),
        }
    }

    pub fn operation_started(&self, scope: Scope) {
        self.operations_started
            .add(1, &[KeyValue::new("scope", scope.as_str())]);
    }

    pub fn operation_stopped(&self, scope: Scope, duration_ms: u64) {
        self.operation_duration_ms
            .record(duration_ms as f64, &[KeyValue::new("scope", scope.as_str())]);
    }

    pub fn revealed(&self, mode: RevealMode) {
        self.reveals.add(1, &[KeyValue::new("mode", mode.as_str())]);
    }

    pub fn flicker_suppressed(&self) {
        self.flicker_suppressed.add(1, &[]);
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EngineMetrics")
    }
}
