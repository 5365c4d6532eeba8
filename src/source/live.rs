//! Live USB transport and device bring-up.
//!
//! The camera enumerates in a file-transfer mode and must be walked
//! through a fixed sequence of control writes and bulk commands before it
//! starts streaming on the bulk IN endpoint. The sequence below is a
//! byte-for-byte reproduction of the vendor host stack's bring-up as
//! captured on the wire; it is not tunable.

use super::{Chunk, ChunkSource, LiveOptions, TransportError, CHUNK_BYTES};
use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;
use thiserror::Error;

/// USB vendor id of the FLIR One Pro.
pub const VENDOR_ID: u16 = 0x09CB;
/// USB product id of the FLIR One Pro Gen-3.
pub const PRODUCT_ID: u16 = 0x1996;

const STREAM_ENDPOINT: u8 = 0x85;
const COMMAND_ENDPOINT: u8 = 0x02;
const ACTIVE_CONFIGURATION: u8 = 3;
const CLAIMED_INTERFACES: [u8; 3] = [0, 1, 2];

/// bmRequestType / bRequest shared by every control step.
const SETUP_REQUEST_TYPE: u8 = 0x01;
const SETUP_REQUEST: u8 = 0x0B;

const STEP_TIMEOUT: Duration = Duration::from_millis(500);
const STEP_ATTEMPTS: u32 = 3;

/// One step of the captured bring-up sequence.
enum HandshakeStep {
    Control {
        value: u16,
        index: u16,
        data: &'static [u8],
    },
    BulkWrite(&'static [u8]),
}

const HANDSHAKE_SEQUENCE: [HandshakeStep; 8] = [
    HandshakeStep::Control {
        value: 0,
        index: 2,
        data: &[],
    },
    HandshakeStep::Control {
        value: 0,
        index: 1,
        data: &[],
    },
    HandshakeStep::Control {
        value: 1,
        index: 1,
        data: &[],
    },
    HandshakeStep::BulkWrite(&[
        0xCC, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00, 0xF8, 0xB3,
        0xF7, 0x00,
    ]),
    HandshakeStep::BulkWrite(
        b"{\"type\":\"openFile\",\"data\":{\"mode\":\"r\",\"path\":\"CameraFiles.zip\"}}\0",
    ),
    HandshakeStep::BulkWrite(&[
        0xCC, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x33, 0x00, 0x00, 0x00, 0xEF, 0xDB,
        0xC1, 0xC1,
    ]),
    HandshakeStep::BulkWrite(b"{\"type\":\"readFile\",\"data\":{\"streamIdentifier\":10}}\0"),
    HandshakeStep::Control {
        value: 1,
        index: 2,
        data: &[0x00, 0x00],
    },
];

/// Errors raised while moving the device into streaming state.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("no device with id {VENDOR_ID:04x}:{PRODUCT_ID:04x} found")]
    DeviceNotFound,
    #[error("usb setup failed: {0}")]
    Usb(#[from] rusb::Error),
    #[error("bring-up step {step} refused after {STEP_ATTEMPTS} attempts: {source}")]
    StepRefused { step: usize, source: rusb::Error },
}

/// Chunk source reading the camera's bulk IN streaming endpoint.
///
/// The device handle is exclusively owned for the lifetime of the source;
/// dropping it releases the claimed interfaces.
pub struct LiveSource {
    handle: DeviceHandle<Context>,
    read_timeout: Duration,
    seq: u64,
}

impl LiveSource {
    /// Opens the camera and runs the bring-up handshake.
    pub fn open(options: &LiveOptions) -> Result<Self, HandshakeError> {
        let context = Context::new()?;
        let mut handle = context
            .open_device_with_vid_pid(VENDOR_ID, PRODUCT_ID)
            .ok_or(HandshakeError::DeviceNotFound)?;

        // Kernel driver detach is unsupported on some platforms.
        let _ = handle.set_auto_detach_kernel_driver(true);

        handle.set_active_configuration(ACTIVE_CONFIGURATION)?;
        for iface in CLAIMED_INTERFACES {
            handle.claim_interface(iface)?;
        }

        run_handshake(&handle)?;
        tracing::info!(endpoint = STREAM_ENDPOINT, "handshake complete, streaming");

        Ok(Self {
            handle,
            read_timeout: Duration::from_millis(options.read_timeout_ms),
            seq: 0,
        })
    }
}

fn run_handshake(handle: &DeviceHandle<Context>) -> Result<(), HandshakeError> {
    for (step, action) in HANDSHAKE_SEQUENCE.iter().enumerate() {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match execute_step(handle, action) {
                Ok(()) => break,
                Err(source) if attempt < STEP_ATTEMPTS && step_retryable(&source) => {
                    tracing::debug!(step, attempt, error = %source, "retrying bring-up step");
                }
                Err(source) => return Err(HandshakeError::StepRefused { step, source }),
            }
        }
    }
    Ok(())
}

fn execute_step(
    handle: &DeviceHandle<Context>,
    action: &HandshakeStep,
) -> Result<(), rusb::Error> {
    match action {
        HandshakeStep::Control { value, index, data } => {
            handle.write_control(
                SETUP_REQUEST_TYPE,
                SETUP_REQUEST,
                *value,
                *index,
                data,
                STEP_TIMEOUT,
            )?;
            Ok(())
        }
        HandshakeStep::BulkWrite(data) => {
            let written = handle.write_bulk(COMMAND_ENDPOINT, data, STEP_TIMEOUT)?;
            if written != data.len() {
                // Short reply; the retry loop treats it like a NAK.
                return Err(rusb::Error::Interrupted);
            }
            Ok(())
        }
    }
}

fn step_retryable(error: &rusb::Error) -> bool {
    matches!(
        error,
        rusb::Error::Pipe | rusb::Error::Timeout | rusb::Error::Interrupted | rusb::Error::Busy
    )
}

impl ChunkSource for LiveSource {
    fn next_chunk(&mut self) -> Result<Option<Chunk>, TransportError> {
        let mut buf = vec![0u8; CHUNK_BYTES];
        let data = match self.handle.read_bulk(STREAM_ENDPOINT, &mut buf, self.read_timeout) {
            Ok(n) => {
                buf.truncate(n);
                buf
            }
            // Nothing ready within the timeout: a zero-length heartbeat.
            Err(rusb::Error::Timeout) => Vec::new(),
            Err(rusb::Error::NoDevice) => return Err(TransportError::Disconnected),
            Err(e) => return Err(TransportError::Usb(e)),
        };

        let chunk = Chunk::new(data, self.seq);
        self.seq += 1;
        Ok(Some(chunk))
    }

    fn sequence(&self) -> u64 {
        self.seq
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        for iface in CLAIMED_INTERFACES {
            let _ = self.handle.release_interface(iface);
        }
        tracing::debug!("released usb interfaces");
    }
}
