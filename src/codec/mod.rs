/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! The boundary contract with the hardware codec resource.
//!
//! The codec itself is an opaque OS-level resource exchanged through buffer
//! indices. It is not thread-safe across arbitrary callers; the pipeline
//! guarantees that input-side calls come only from the submission thread and
//! output-side calls only from the delivery thread, so implementations need
//! no locking beyond their own bookkeeping.

use crate::error::CodecResult;
use crate::yuv::YuvFormat;
use serde::{Deserialize, Serialize};

mod mock;
pub use self::mock::{MockCodec, MockCodecState, QueuedInput};

/// An enumeration of the supported video codec types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodecMimeType {
    Vp8,
    Vp9,
    H264,
    H265,
    Av1,
}

impl VideoCodecMimeType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodecMimeType::Vp8 => "video/x-vnd.on2.vp8",
            VideoCodecMimeType::Vp9 => "video/x-vnd.on2.vp9",
            VideoCodecMimeType::H264 => "video/avc",
            VideoCodecMimeType::H265 => "video/hevc",
            VideoCodecMimeType::Av1 => "video/av01",
        }
    }

    /// Whether key frames must carry the codec's out-of-band parameter sets
    /// (SPS/PPS). These codecs emit the config once and never replay it, so
    /// the pipeline caches it and prepends it to every key frame.
    pub fn prepends_config_to_key_frames(&self) -> bool {
        matches!(self, VideoCodecMimeType::H264 | VideoCodecMimeType::H265)
    }

    /// Codec-level I-frame interval in seconds passed at configure time.
    pub fn default_key_frame_interval_sec(&self) -> u32 {
        match self {
            VideoCodecMimeType::H264 | VideoCodecMimeType::H265 => 20,
            VideoCodecMimeType::Vp8 | VideoCodecMimeType::Vp9 | VideoCodecMimeType::Av1 => 100,
        }
    }
}

/// The format handed to the codec at configure time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecFormat {
    pub mime: VideoCodecMimeType,
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u32,
    pub framerate_fps: f64,
    pub color_format: YuvFormat,
    pub key_frame_interval_sec: u32,
}

/// Live parameters pushed to a running codec.
///
/// A sync-frame request is a hint: the codec produces a key frame "soon",
/// not necessarily for the submission that requested it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecParameters {
    pub video_bitrate_bps: Option<u32>,
    pub request_sync_frame: bool,
}

/// Stride and slice height of the codec's negotiated input layout.
/// Zero means the codec did not report a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFormat {
    pub stride: usize,
    pub slice_height: usize,
}

/// Descriptor of one dequeued output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub index: usize,
    pub offset: usize,
    pub size: usize,
    pub presentation_timestamp_us: i64,
    /// Out-of-band codec config (SPS/PPS analog), not a real frame.
    pub is_config: bool,
    /// The codec flagged this buffer as an independently decodable frame.
    pub is_key_frame: bool,
}

/// Result of polling the codec's output side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// Nothing ready within the timeout.
    Empty,
    /// The output format changed; poll again.
    FormatChanged,
    /// The output buffer set changed; poll again.
    BuffersChanged,
    /// An encoded buffer is ready.
    Data(BufferInfo),
}

/// The asynchronous buffer-exchange surface of a hardware encoder.
///
/// Every method may fail with a recoverable [`crate::error::CodecError`];
/// implementations map their platform's state exceptions rather than
/// panicking.
pub trait HardwareCodec: Send + Sync {
    fn configure(&self, format: &CodecFormat) -> CodecResult<()>;

    fn start(&self) -> CodecResult<()>;

    /// The negotiated input layout. May legitimately report invalid values;
    /// callers sanitize with [`crate::yuv::effective_stride`].
    fn input_format(&self) -> InputFormat;

    /// Returns a free input buffer index, or `None` when the codec has no
    /// capacity. A zero timeout makes this non-blocking.
    fn dequeue_input_buffer(&self, timeout_us: i64) -> CodecResult<Option<usize>>;

    /// Copies packed pixel data into the input buffer at `index`.
    fn write_input_buffer(&self, index: usize, data: &[u8]) -> CodecResult<()>;

    fn queue_input_buffer(
        &self,
        index: usize,
        size: usize,
        presentation_timestamp_us: i64,
    ) -> CodecResult<()>;

    /// Polls the output side, blocking up to `timeout_us`.
    fn dequeue_output_buffer(&self, timeout_us: i64) -> CodecResult<OutputEvent>;

    /// Copies the bitstream out of the output buffer described by `info`.
    fn read_output_buffer(&self, info: &BufferInfo) -> CodecResult<Vec<u8>>;

    /// Returns a dequeued output buffer to the codec for re-use.
    fn release_output_buffer(&self, index: usize) -> CodecResult<()>;

    fn set_parameters(&self, params: &CodecParameters) -> CodecResult<()>;

    /// Average quantizer of the output buffer at `index`, for codecs that
    /// support encoding statistics. Must be queried before the buffer is
    /// released.
    fn average_qp(&self, index: usize) -> Option<i32> {
        let _ = index;
        None
    }

    fn stop(&self) -> CodecResult<()>;

    fn release(&self);
}
