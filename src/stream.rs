//! Public composite-frame stream.
//!
//! `FrameStream` owns the whole pipeline: a chunk source, the optional
//! recorder, the classifier, and the frame assembler. Each `next_frame`
//! call pulls chunks until a composite frame is emitted or a terminal
//! condition is reached; everything runs on the calling thread.

use crate::assemble::{CompositeFrame, FrameAssembler, PipelineCounters};
use crate::classify::classify;
use crate::source::{
    ChunkSource, ConfigError, OfflineOptions, OfflineSource, Recorder, RecordingError,
    TransportError,
};
use std::path::Path;
use thiserror::Error;

#[cfg(feature = "usb")]
use crate::source::{HandshakeError, LiveOptions, LiveSource};

/// Fatal stream conditions.
///
/// Decode desyncs never appear here; they are absorbed by the assembler
/// and surface only in the pipeline counters.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid options: {0}")]
    Config(#[from] ConfigError),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("recording failed: {0}")]
    Recording(#[from] RecordingError),
    #[cfg(feature = "usb")]
    #[error("device bring-up failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// Pull-based stream of composite frames.
///
/// Dropping the stream (or calling [`close`](FrameStream::close)) releases
/// the transport and any recorder files.
pub struct FrameStream {
    source: Option<Box<dyn ChunkSource>>,
    recorder: Option<Recorder>,
    assembler: FrameAssembler,
}

impl FrameStream {
    /// Opens an offline stream replaying a capture directory.
    pub fn open_offline(
        dir: impl AsRef<Path>,
        options: &OfflineOptions,
    ) -> Result<Self, StreamError> {
        options.validate()?;
        let source = OfflineSource::open(dir.as_ref(), options.repeat)?;
        Ok(Self::assemble_pipeline(
            Box::new(source),
            None,
            options.allow_partial_thermal,
        ))
    }

    /// Opens a live stream from a connected camera.
    ///
    /// Runs the bring-up handshake before returning; a refused handshake
    /// fails construction.
    #[cfg(feature = "usb")]
    pub fn open_live(options: &LiveOptions) -> Result<Self, StreamError> {
        options.validate()?;
        let recorder = options
            .record_dir
            .as_deref()
            .map(Recorder::create)
            .transpose()?;
        let source = LiveSource::open(options)?;
        Ok(Self::assemble_pipeline(
            Box::new(source),
            recorder,
            options.allow_partial_thermal,
        ))
    }

    /// Builds a stream over any chunk source.
    ///
    /// Used with [`MockSource`](crate::source::MockSource) to exercise the
    /// pipeline without hardware.
    pub fn from_source(source: Box<dyn ChunkSource>) -> Self {
        Self::assemble_pipeline(source, None, false)
    }

    /// Builds a stream over any chunk source, recording every chunk.
    pub fn from_source_recording(source: Box<dyn ChunkSource>, recorder: Recorder) -> Self {
        Self::assemble_pipeline(source, Some(recorder), false)
    }

    fn assemble_pipeline(
        source: Box<dyn ChunkSource>,
        recorder: Option<Recorder>,
        allow_partial_thermal: bool,
    ) -> Self {
        Self {
            source: Some(source),
            recorder,
            assembler: FrameAssembler::new(allow_partial_thermal),
        }
    }

    /// Pulls the next composite frame.
    ///
    /// Returns `Ok(None)` once the stream is exhausted or closed. Any
    /// error is terminal: the transport is released before it is
    /// returned, and later calls yield `Ok(None)`.
    pub fn next_frame(&mut self) -> Result<Option<CompositeFrame>, StreamError> {
        loop {
            let step = match self.source.as_mut() {
                Some(source) => source.next_chunk(),
                None => return Ok(None),
            };

            let chunk = match step {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    tracing::debug!("chunk stream exhausted");
                    self.close();
                    return Ok(None);
                }
                Err(error) => {
                    self.close();
                    return Err(error.into());
                }
            };

            if let Some(recorder) = self.recorder.as_mut() {
                if let Err(error) = recorder.record(&chunk) {
                    self.close();
                    return Err(error.into());
                }
            }

            let class = classify(&chunk, &self.assembler);
            if let Some(frame) = self.assembler.push(class, &chunk) {
                tracing::trace!(idx = frame.idx(), "composite frame emitted");
                return Ok(Some(frame));
            }
        }
    }

    /// Current pipeline counters; remain readable after close.
    pub fn counters(&self) -> &PipelineCounters {
        self.assembler.counters()
    }

    /// Releases the transport and recorder. Idempotent.
    pub fn close(&mut self) {
        self.source = None;
        self.recorder = None;
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSource;
    use crate::testutil;
    use std::path::Path;

    /// Chunk payloads for one complete frame carrying every artifact.
    fn full_frame_payloads() -> Vec<Vec<u8>> {
        let jpeg = testutil::encode_test_jpeg(32, 24);
        let mut payloads = vec![testutil::sync_chunk(1, 0)];
        payloads.extend(testutil::thermal_frame_chunks());
        payloads.extend(testutil::split_jpeg(&jpeg, 3));
        payloads.push(testutil::telemetry_chunk(r#"{"batt_pct":73}"#));
        payloads.push(testutil::sync_chunk(2, 0));
        payloads
    }

    fn write_capture(dir: &Path, payloads: &[Vec<u8>]) {
        for (i, payload) in payloads.iter().enumerate() {
            std::fs::write(dir.join(format!("chunk_{i:08}.txt")), hex::encode(payload)).unwrap();
        }
    }

    fn drain(stream: &mut FrameStream) -> Vec<CompositeFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = stream.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_offline_thermal_only_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut payloads = vec![testutil::sync_chunk(1, 0)];
        payloads.extend(testutil::thermal_frame_chunks());
        payloads.push(testutil::sync_chunk(2, 0));
        write_capture(dir.path(), &payloads);

        let mut stream =
            FrameStream::open_offline(dir.path(), &OfflineOptions::default()).unwrap();
        let frames = drain(&mut stream);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].idx(), 0);
        assert!(frames[0].thermal().is_some());
        assert!(frames[0].visible().is_none());
        assert!(frames[0].telemetry().is_none());
        assert!(frames[0].edge_mask().is_none());
    }

    #[test]
    fn test_offline_missing_row_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut payloads = vec![testutil::sync_chunk(1, 0)];
        let mut chunks = testutil::thermal_frame_chunks();
        chunks.remove(37);
        payloads.extend(chunks);
        payloads.push(testutil::sync_chunk(2, 0));
        write_capture(dir.path(), &payloads);

        let mut stream =
            FrameStream::open_offline(dir.path(), &OfflineOptions::default()).unwrap();
        let frames = drain(&mut stream);

        assert!(frames.is_empty());
        assert_eq!(stream.counters().frames_emitted, 0);
    }

    #[test]
    fn test_offline_full_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_capture(dir.path(), &full_frame_payloads());

        let mut stream =
            FrameStream::open_offline(dir.path(), &OfflineOptions::default()).unwrap();
        let frames = drain(&mut stream);

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert!(frame.thermal().is_some());
        assert!(frame.visible().is_some());
        assert_eq!(frame.telemetry().unwrap().battery_percent, Some(73.0));
        assert!(frame.telemetry().unwrap().shutter.is_none());
    }

    #[test]
    fn test_offline_repeat_replays_identically() {
        let dir = tempfile::tempdir().unwrap();
        write_capture(dir.path(), &full_frame_payloads());

        let mut stream =
            FrameStream::open_offline(dir.path(), &OfflineOptions::with_repeat(2)).unwrap();
        let frames = drain(&mut stream);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].idx(), 0);
        assert_eq!(frames[1].idx(), 1);
        assert_eq!(
            frames[0].thermal().unwrap().samples(),
            frames[1].thermal().unwrap().samples()
        );
        assert_eq!(
            frames[0].visible().unwrap().as_jpeg(),
            frames[1].visible().unwrap().as_jpeg()
        );
        assert_eq!(frames[0].telemetry(), frames[1].telemetry());
    }

    #[test]
    fn test_mock_transport_error_after_frame() {
        let mut stream =
            FrameStream::from_source(Box::new(MockSource::failing(full_frame_payloads())));

        let frame = stream.next_frame().unwrap().unwrap();
        assert_eq!(frame.idx(), 0);

        assert!(matches!(
            stream.next_frame(),
            Err(StreamError::Transport(TransportError::Disconnected))
        ));
        // The stream is released after a fatal error.
        assert!(stream.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_recorded_stream_replays_identically() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture");

        let recorder = Recorder::create(&capture).unwrap();
        let mut live = FrameStream::from_source_recording(
            Box::new(MockSource::new(full_frame_payloads())),
            recorder,
        );
        let live_frames = drain(&mut live);
        drop(live);

        let mut replay =
            FrameStream::open_offline(&capture, &OfflineOptions::default()).unwrap();
        let replay_frames = drain(&mut replay);

        assert_eq!(live_frames.len(), replay_frames.len());
        for (a, b) in live_frames.iter().zip(&replay_frames) {
            assert_eq!(a.idx(), b.idx());
            assert_eq!(a.timestamp(), b.timestamp());
            assert_eq!(
                a.thermal().map(|t| t.samples().to_vec()),
                b.thermal().map(|t| t.samples().to_vec())
            );
            assert_eq!(
                a.visible().map(|v| v.as_jpeg().to_vec()),
                b.visible().map(|v| v.as_jpeg().to_vec())
            );
            assert_eq!(a.telemetry(), b.telemetry());
        }
    }

    #[test]
    fn test_corrupted_chunk_isolated_to_its_frame() {
        let jpeg = testutil::encode_test_jpeg(32, 24);
        let pieces = testutil::split_jpeg(&jpeg, 3);

        let mut payloads = vec![testutil::sync_chunk(1, 0)];
        payloads.extend(testutil::thermal_frame_chunks());
        payloads.push(pieces[0].clone());
        let mut garbage = vec![0x11u8; 64];
        garbage[10] = 0xFF;
        garbage[11] = 0xD8;
        payloads.push(garbage);
        payloads.push(pieces[2].clone());
        payloads.push(testutil::telemetry_chunk(r#"{"batt_pct":73}"#));
        payloads.push(testutil::sync_chunk(2, 0));
        // A clean frame follows the corrupted one.
        payloads.extend(testutil::thermal_frame_chunks());
        payloads.extend(pieces.iter().cloned());
        payloads.push(testutil::sync_chunk(3, 0));

        let mut stream = FrameStream::from_source(Box::new(MockSource::new(payloads)));
        let frames = drain(&mut stream);

        assert_eq!(frames.len(), 2);
        assert!(frames[0].visible().is_none());
        assert!(frames[0].thermal().is_some());
        assert_eq!(frames[0].telemetry().unwrap().battery_percent, Some(73.0));
        assert_eq!(stream.counters().desync_total(), 1);

        assert!(frames[1].visible().is_some());
        assert!(frames[1].thermal().is_some());
    }

    #[test]
    fn test_frame_indices_monotonic_and_gap_free() {
        let dir = tempfile::tempdir().unwrap();
        write_capture(dir.path(), &full_frame_payloads());

        let mut stream =
            FrameStream::open_offline(dir.path(), &OfflineOptions::with_repeat(4)).unwrap();
        let frames = drain(&mut stream);

        assert_eq!(frames.len(), 4);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.idx(), i as u64);
        }
    }

    #[test]
    fn test_thermal_samples_within_radiometric_range() {
        let mut stream =
            FrameStream::from_source(Box::new(MockSource::new(full_frame_payloads())));
        let frames = drain(&mut stream);

        let raster = frames[0].thermal().unwrap();
        assert!(raster.samples().iter().all(|&s| s < 16384));
    }

    #[test]
    fn test_emitted_jpeg_well_formed() {
        let mut stream =
            FrameStream::from_source(Box::new(MockSource::new(full_frame_payloads())));
        let frames = drain(&mut stream);

        let jpeg = frames[0].visible().unwrap().as_jpeg();
        assert!(jpeg.starts_with(&[0xFF, 0xD8]));
        assert!(jpeg.ends_with(&[0xFF, 0xD9]));
        assert!(!jpeg[1..]
            .windows(2)
            .any(|w| w == [0xFF, 0xD8]));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut stream =
            FrameStream::from_source(Box::new(MockSource::new(full_frame_payloads())));
        stream.close();
        stream.close();
        assert!(stream.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_invalid_repeat_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = FrameStream::open_offline(dir.path(), &OfflineOptions::with_repeat(-2));
        assert!(matches!(result, Err(StreamError::Config(_))));
    }
}
