//! Frame assembly from classified slices.
//!
//! The assembler owns all per-frame partial state and turns the classified
//! chunk stream into composite frames. A frame spans the interval between
//! two sync boundaries and aggregates whichever artifacts arrived in
//! between; decode desyncs drop the offending artifact only, never the
//! frame or the stream.

use crate::classify::{JpegTracker, SliceClass, UnknownReason};
use crate::decode::thermal::PartialThermalFrame;
use crate::decode::{
    edge, telemetry, EdgeMask, PartialJpeg, Telemetry, ThermalRaster, VisibleImage,
};
use crate::source::Chunk;

/// Running pipeline counters, exposed for diagnostics.
///
/// Desyncs are counted per artifact type so a flaky stream can be
/// attributed to one decoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    /// Composite frames emitted.
    pub frames_emitted: u64,
    /// Thermal packet streams dropped mid-frame.
    pub thermal_desyncs: u64,
    /// Visible images rejected at finalization.
    pub visible_desyncs: u64,
    /// Telemetry chunks that failed to parse.
    pub telemetry_desyncs: u64,
    /// Edge slices that failed to expand.
    pub edge_desyncs: u64,
    /// Thermal rasters dropped for missing rows.
    pub thermal_incomplete: u64,
    /// Legacy AGC slices seen (tagged and dropped).
    pub agc_slices: u64,
    /// Unclassifiable slices, heartbeats included.
    pub unknown_slices: u64,
}

impl PipelineCounters {
    /// Total desyncs across all artifact types.
    pub fn desync_total(&self) -> u64 {
        self.thermal_desyncs + self.visible_desyncs + self.telemetry_desyncs + self.edge_desyncs
    }
}

/// One composite frame: everything that arrived between two boundaries.
///
/// At least one artifact is always present; intervals that accumulate
/// nothing do not produce a frame.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    idx: u64,
    timestamp: Option<u32>,
    thermal: Option<ThermalRaster>,
    visible: Option<VisibleImage>,
    telemetry: Option<Telemetry>,
    edge_mask: Option<EdgeMask>,
}

impl CompositeFrame {
    /// Monotonic frame index, starting at 0 and gap-free.
    #[inline]
    pub fn idx(&self) -> u64 {
        self.idx
    }

    /// Device timestamp of the opening boundary, when reported.
    #[inline]
    pub fn timestamp(&self) -> Option<u32> {
        self.timestamp
    }

    /// Radiometric thermal raster, if one completed this interval.
    #[inline]
    pub fn thermal(&self) -> Option<&ThermalRaster> {
        self.thermal.as_ref()
    }

    /// Visible-camera image, if one completed this interval.
    #[inline]
    pub fn visible(&self) -> Option<&VisibleImage> {
        self.visible.as_ref()
    }

    /// Latest telemetry record of this interval.
    #[inline]
    pub fn telemetry(&self) -> Option<&Telemetry> {
        self.telemetry.as_ref()
    }

    /// Latest edge mask of this interval.
    #[inline]
    pub fn edge_mask(&self) -> Option<&EdgeMask> {
        self.edge_mask.as_ref()
    }
}

/// Accumulates decoded artifacts and emits frames on sync boundaries.
pub struct FrameAssembler {
    thermal: Option<PartialThermalFrame>,
    jpeg: Option<PartialJpeg>,
    visible: Option<VisibleImage>,
    telemetry: Option<Telemetry>,
    edge_mask: Option<EdgeMask>,
    boundary_timestamp: Option<u32>,
    synced: bool,
    next_idx: u64,
    allow_partial_thermal: bool,
    counters: PipelineCounters,
}

impl JpegTracker for FrameAssembler {
    fn jpeg_in_progress(&self) -> bool {
        self.jpeg.is_some()
    }
}

impl FrameAssembler {
    /// Creates an assembler with the given thermal finalization policy.
    pub fn new(allow_partial_thermal: bool) -> Self {
        Self {
            thermal: None,
            jpeg: None,
            visible: None,
            telemetry: None,
            edge_mask: None,
            boundary_timestamp: None,
            synced: false,
            next_idx: 0,
            allow_partial_thermal,
            counters: PipelineCounters::default(),
        }
    }

    /// Current pipeline counters.
    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    /// Feeds one classified chunk; returns a frame on a closing boundary.
    pub fn push(&mut self, class: SliceClass, chunk: &Chunk) -> Option<CompositeFrame> {
        match class {
            SliceClass::FrameSync {
                boundary_id,
                timestamp,
            } => self.on_sync(boundary_id, timestamp),
            SliceClass::ThermalPacket { .. } => {
                self.on_thermal(chunk);
                None
            }
            SliceClass::VisibleJpeg { is_first, is_last } => {
                self.on_visible(chunk, is_first, is_last);
                None
            }
            SliceClass::TelemetryJson => {
                match telemetry::decode(chunk.bytes()) {
                    Ok(record) => self.telemetry = Some(record),
                    Err(desync) => {
                        self.counters.telemetry_desyncs += 1;
                        tracing::debug!(seq = chunk.seq(), %desync, "telemetry chunk dropped");
                    }
                }
                None
            }
            SliceClass::EdgeRle => {
                match edge::decode(chunk.bytes()) {
                    Ok(mask) => self.edge_mask = Some(mask),
                    Err(desync) => {
                        self.counters.edge_desyncs += 1;
                        tracing::debug!(seq = chunk.seq(), %desync, "edge slice dropped");
                    }
                }
                None
            }
            SliceClass::AgcLegacy => {
                self.counters.agc_slices += 1;
                tracing::trace!(seq = chunk.seq(), "legacy agc slice dropped");
                None
            }
            SliceClass::Unknown { reason } => {
                self.counters.unknown_slices += 1;
                if reason != UnknownReason::Empty {
                    tracing::debug!(seq = chunk.seq(), ?reason, "unclassifiable slice");
                }
                None
            }
        }
    }

    fn on_sync(&mut self, boundary_id: u32, timestamp: Option<u32>) -> Option<CompositeFrame> {
        let frame = if self.synced {
            self.finalize_interval()
        } else {
            // First boundary after bring-up: whatever arrived before it
            // belongs to an interval with no observed start. Discard.
            self.clear_partials();
            self.synced = true;
            None
        };
        tracing::trace!(boundary_id, "frame boundary");
        self.boundary_timestamp = timestamp;
        frame
    }

    fn on_thermal(&mut self, chunk: &Chunk) {
        let partial = self
            .thermal
            .get_or_insert_with(PartialThermalFrame::new);
        if let Err(desync) = partial.ingest(chunk.bytes()) {
            self.counters.thermal_desyncs += 1;
            tracing::debug!(seq = chunk.seq(), %desync, "thermal raster dropped");
            self.thermal = None;
            return;
        }
        // Speculative side stream: telemetry rows are not JSON on this
        // generation, so parse failures are ignored without counting.
        for row in partial.take_telemetry_rows() {
            if let Ok(record) = telemetry::decode(&row) {
                self.telemetry = Some(record);
            }
        }
    }

    fn on_visible(&mut self, chunk: &Chunk, is_first: bool, is_last: bool) {
        if is_first {
            if self.jpeg.is_some() {
                tracing::debug!(seq = chunk.seq(), "jpeg restarted before completion");
            }
            self.jpeg = Some(PartialJpeg::new());
        }

        let Some(partial) = self.jpeg.as_mut() else {
            // Continuation without a start; only reachable when fed
            // classes from outside the classifier.
            self.counters.visible_desyncs += 1;
            return;
        };
        partial.append(chunk.bytes());

        if is_last {
            let partial = self.jpeg.take().unwrap_or_default();
            match partial.finalize() {
                Ok(image) => self.visible = Some(image),
                Err(desync) => {
                    self.counters.visible_desyncs += 1;
                    tracing::debug!(seq = chunk.seq(), %desync, "visible image dropped");
                }
            }
        }
    }

    fn finalize_interval(&mut self) -> Option<CompositeFrame> {
        let thermal = match self.thermal.take() {
            Some(partial) if partial.is_complete() => partial.finalize(),
            Some(partial) if self.allow_partial_thermal => partial.finalize_partial(),
            Some(partial) => {
                if partial.rows_received() > 0 {
                    self.counters.thermal_incomplete += 1;
                    tracing::debug!(
                        rows = partial.rows_received(),
                        "incomplete thermal raster dropped"
                    );
                }
                None
            }
            None => None,
        };

        if self.jpeg.take().is_some() {
            // EOI never arrived before the boundary.
            self.counters.visible_desyncs += 1;
            tracing::debug!("unterminated jpeg dropped at frame boundary");
        }

        let visible = self.visible.take();
        // Telemetry is never carried across boundaries.
        let telemetry = self.telemetry.take();
        let edge_mask = self.edge_mask.take();

        if thermal.is_none() && visible.is_none() && telemetry.is_none() && edge_mask.is_none() {
            return None;
        }

        let idx = self.next_idx;
        self.next_idx += 1;
        self.counters.frames_emitted += 1;

        Some(CompositeFrame {
            idx,
            timestamp: self.boundary_timestamp,
            thermal,
            visible,
            telemetry,
            edge_mask,
        })
    }

    fn clear_partials(&mut self) {
        self.thermal = None;
        self.jpeg = None;
        self.visible = None;
        self.telemetry = None;
        self.edge_mask = None;
    }
}
