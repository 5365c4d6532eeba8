//! Prometheus registry for pipeline diagnostics.

use crate::assemble::PipelineCounters;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus counters mirroring [`PipelineCounters`].
pub struct MetricsRegistry {
    registry: Registry,

    frames_emitted: IntCounter,
    thermal_desyncs: IntCounter,
    visible_desyncs: IntCounter,
    telemetry_desyncs: IntCounter,
    edge_desyncs: IntCounter,
    thermal_incomplete: IntCounter,
    agc_slices: IntCounter,
    unknown_slices: IntCounter,
}

impl MetricsRegistry {
    /// Creates a registry with every pipeline metric registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_emitted = IntCounter::new(
            "flir_one_frames_emitted_total",
            "Composite frames emitted by the stream",
        )?;
        let thermal_desyncs = IntCounter::new(
            "flir_one_thermal_desyncs_total",
            "Thermal packet streams dropped mid-frame",
        )?;
        let visible_desyncs = IntCounter::new(
            "flir_one_visible_desyncs_total",
            "Visible images rejected at finalization",
        )?;
        let telemetry_desyncs = IntCounter::new(
            "flir_one_telemetry_desyncs_total",
            "Telemetry chunks that failed to parse",
        )?;
        let edge_desyncs = IntCounter::new(
            "flir_one_edge_desyncs_total",
            "Edge slices that failed to expand",
        )?;
        let thermal_incomplete = IntCounter::new(
            "flir_one_thermal_incomplete_total",
            "Thermal rasters dropped for missing rows",
        )?;
        let agc_slices = IntCounter::new(
            "flir_one_agc_slices_total",
            "Legacy AGC slices tagged and dropped",
        )?;
        let unknown_slices = IntCounter::new(
            "flir_one_unknown_slices_total",
            "Unclassifiable slices, heartbeats included",
        )?;

        registry.register(Box::new(frames_emitted.clone()))?;
        registry.register(Box::new(thermal_desyncs.clone()))?;
        registry.register(Box::new(visible_desyncs.clone()))?;
        registry.register(Box::new(telemetry_desyncs.clone()))?;
        registry.register(Box::new(edge_desyncs.clone()))?;
        registry.register(Box::new(thermal_incomplete.clone()))?;
        registry.register(Box::new(agc_slices.clone()))?;
        registry.register(Box::new(unknown_slices.clone()))?;

        Ok(Self {
            registry,
            frames_emitted,
            thermal_desyncs,
            visible_desyncs,
            telemetry_desyncs,
            edge_desyncs,
            thermal_incomplete,
            agc_slices,
            unknown_slices,
        })
    }

    /// Updates the registry from the assembler's counters.
    ///
    /// Counters only move forward; each metric is incremented by the
    /// delta since the last update.
    pub fn update(&self, counters: &PipelineCounters) {
        bump(&self.frames_emitted, counters.frames_emitted);
        bump(&self.thermal_desyncs, counters.thermal_desyncs);
        bump(&self.visible_desyncs, counters.visible_desyncs);
        bump(&self.telemetry_desyncs, counters.telemetry_desyncs);
        bump(&self.edge_desyncs, counters.edge_desyncs);
        bump(&self.thermal_incomplete, counters.thermal_incomplete);
        bump(&self.agc_slices, counters.agc_slices);
        bump(&self.unknown_slices, counters.unknown_slices);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn bump(metric: &IntCounter, observed: u64) {
    let current = metric.get();
    if observed > current {
        metric.inc_by(observed - current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_update_reflects_counters() {
        let registry = MetricsRegistry::new().unwrap();
        let counters = PipelineCounters {
            frames_emitted: 3,
            thermal_desyncs: 1,
            ..Default::default()
        };

        registry.update(&counters);
        // Repeated updates with the same snapshot are no-ops.
        registry.update(&counters);

        let output = registry.encode().unwrap();
        assert!(output.contains("flir_one_frames_emitted_total 3"));
        assert!(output.contains("flir_one_thermal_desyncs_total 1"));
        assert!(output.contains("flir_one_unknown_slices_total 0"));
    }
}
