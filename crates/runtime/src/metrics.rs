// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Forward-pass profiling metrics.
//!
//! [`ForwardMetrics`] collects per-layer durations for one forward call.
//! For layers that run on a GPU entry point the duration covers recording,
//! the device work itself is accounted to the layer that joins on it.

use crate::EntryPoint;
use std::time::Duration;

/// Metrics for a single layer's execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LayerMetrics {
    pub layer_name: String,
    pub kind: &'static str,
    /// The entry point the dispatcher chose.
    pub entry: EntryPoint,
    pub duration: Duration,
}

/// Aggregate metrics for one forward call.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ForwardMetrics {
    /// Wall-clock time of the whole call.
    pub total_duration: Duration,
    /// Sum of the per-layer durations.
    pub total_layer_duration: Duration,
    pub layer_metrics: Vec<LayerMetrics>,
    /// Layers not needed for the requested outputs.
    pub layers_skipped: usize,
}

impl ForwardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_layer(
        &mut self,
        name: &str,
        kind: &'static str,
        entry: EntryPoint,
        duration: Duration,
    ) {
        self.total_layer_duration += duration;
        self.layer_metrics.push(LayerMetrics {
            layer_name: name.to_string(),
            kind,
            entry,
            duration,
        });
    }

    pub fn finalise(&mut self, total: Duration, skipped: usize) {
        self.total_duration = total;
        self.layers_skipped = skipped;
    }

    /// The layer that took longest, if any ran.
    pub fn slowest(&self) -> Option<&LayerMetrics> {
        self.layer_metrics.iter().max_by_key(|m| m.duration)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let slowest = self
            .slowest()
            .map(|m| {
                format!(
                    ", slowest '{}' ({}, {:.3}ms)",
                    m.layer_name,
                    m.kind,
                    m.duration.as_secs_f64() * 1000.0
                )
            })
            .unwrap_or_default();
        format!(
            "Forward: {:.3}ms total, {} layers run, {} skipped, {:.3}ms in layers{}",
            self.total_duration.as_secs_f64() * 1000.0,
            self.layer_metrics.len(),
            self.layers_skipped,
            self.total_layer_duration.as_secs_f64() * 1000.0,
            slowest,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let m = ForwardMetrics::new();
        assert!(m.slowest().is_none());
        assert!(m.summary().contains("0 layers run"));
    }

    #[test]
    fn test_record_and_finalise() {
        let mut m = ForwardMetrics::new();
        m.record_layer("bn", "BatchNorm", EntryPoint::ForwardInplace, Duration::from_millis(4));
        m.record_layer("top", "ArgMax", EntryPoint::Forward, Duration::from_millis(1));
        m.finalise(Duration::from_millis(6), 2);

        assert_eq!(m.layer_metrics.len(), 2);
        assert_eq!(m.total_layer_duration, Duration::from_millis(5));
        assert_eq!(m.layers_skipped, 2);
        assert_eq!(m.slowest().unwrap().layer_name, "bn");
    }

    #[test]
    fn test_summary_format() {
        let mut m = ForwardMetrics::new();
        m.record_layer("bn", "BatchNorm", EntryPoint::ForwardInplaceGpu, Duration::from_millis(2));
        m.finalise(Duration::from_millis(3), 0);
        let s = m.summary();
        assert!(s.contains("Forward:"));
        assert!(s.contains("1 layers run"));
        assert!(s.contains("slowest 'bn' (BatchNorm"));
    }

    #[test]
    fn test_serialize() {
        let mut m = ForwardMetrics::new();
        m.record_layer("bn", "BatchNorm", EntryPoint::ForwardInplace, Duration::from_micros(10));
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"forward_inplace\""));
    }
}
