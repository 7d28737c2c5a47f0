//! Metric declarations for the pipeline.
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! every call is a no-op. Call [`describe_metrics`] once at startup so a
//! recorder can attach units and descriptions.
//!
//! ```rust
//! use topobathy_mosaic::metrics::metric_defs;
//!
//! assert_eq!(metric_defs::TILES_MERGED.name, "topobathy.merge.tiles");
//! metrics::counter!(metric_defs::TILES_MERGED.name).increment(1);
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

/// A metric declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name.
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Registers this metric's description with the metrics recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the pipeline.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Raw tiles rewritten by grid repair.
    pub const TILES_REPAIRED: Metric = Metric::counter("topobathy.repair.tiles")
        .with_description("Tiles successfully grid-repaired")
        .with_unit(Unit::Count);

    /// Tiles whose repair failed.
    pub const REPAIR_FAILURES: Metric = Metric::counter("topobathy.repair.failures")
        .with_description("Tiles whose grid repair failed")
        .with_unit(Unit::Count);

    /// Records that collapsed onto an already-used integer coordinate.
    pub const ROUNDING_COLLISIONS: Metric = Metric::counter("topobathy.repair.collisions")
        .with_description("Records whose rounded coordinate collided with an earlier record")
        .with_unit(Unit::Count);

    /// Tiles folded into a mosaic canvas.
    pub const TILES_MERGED: Metric = Metric::counter("topobathy.merge.tiles")
        .with_description("Tiles folded into a mosaic canvas")
        .with_unit(Unit::Count);

    /// Canvas pixels resolved by a tile.
    pub const PIXELS_RESOLVED: Metric = Metric::counter("topobathy.merge.pixels_resolved")
        .with_description("Canvas pixels resolved by first-wins merging")
        .with_unit(Unit::Count);

    /// Fraction of the canvas holding valid data after a merge.
    pub const CANVAS_COVERAGE: Metric = Metric::gauge("topobathy.merge.coverage")
        .with_description("Percentage of valid canvas pixels after merging")
        .with_unit(Unit::Percent);

    /// Bytes written to raster artifacts.
    pub const BYTES_WRITTEN: Metric = Metric::counter("topobathy.output.bytes")
        .with_description("Bytes written to GeoTIFF artifacts")
        .with_unit(Unit::Bytes);

    /// Wall time of each pipeline stage. Label: `stage`.
    pub const STAGE_DURATION: Metric = Metric::histogram("topobathy.stage.duration")
        .with_description("Wall time of each pipeline stage")
        .with_unit(Unit::Seconds);

    /// Every metric, for bulk registration.
    pub const ALL: &[&Metric] = &[
        &TILES_REPAIRED,
        &REPAIR_FAILURES,
        &ROUNDING_COLLISIONS,
        &TILES_MERGED,
        &PIXELS_RESOLVED,
        &CANVAS_COVERAGE,
        &BYTES_WRITTEN,
        &STAGE_DURATION,
    ];
}

/// Register descriptions for every pipeline metric.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
