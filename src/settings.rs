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

//! Session settings and pipeline tuning knobs.

use crate::codec::VideoCodecMimeType;
use crate::yuv::YuvFormat;
use serde::{Deserialize, Serialize};

/// Maximum number of submitted frames that may wait for codec output before
/// further submissions are dropped.
pub const DEFAULT_MAX_PENDING_OUTPUTS: usize = 2;

/// How long the delivery thread blocks on one output poll.
pub const DEFAULT_DEQUEUE_OUTPUT_TIMEOUT_US: i64 = 100_000;

/// How long to wait for codec teardown and for the delivery thread to exit
/// before reporting a timeout instead of hanging. Some hardware stacks block
/// in stop() for multiple seconds.
pub const DEFAULT_RELEASE_TIMEOUT_MS: u64 = 5000;

/// Immutable encoder session settings, fixed at `initialize` time.
///
/// Core count, simulcast stream count and the auto-resize flag are carried
/// for the caller's benefit; the pipeline itself does not fan out simulcast
/// streams or resize frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    /// Initial target bitrate in bits per second.
    pub start_bitrate_bps: u32,
    /// Maximum framerate the caller will submit at.
    pub max_framerate: u32,
    pub number_of_cores: u32,
    pub number_of_simulcast_streams: u32,
    pub automatic_resize_on: bool,
}

/// Pipeline tuning knobs.
///
/// The backpressure bound and the forced key-frame interval are deliberate
/// parameters rather than constants: they are tuning decisions, not protocol
/// requirements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mime: VideoCodecMimeType,
    pub color_format: YuvFormat,
    /// Codec-level I-frame interval in seconds, passed at configure time.
    pub key_frame_interval_sec: u32,
    /// Force a key frame whenever this many milliseconds have passed since
    /// the last one. Zero disables forced key frames.
    pub forced_key_frame_interval_ms: u64,
    /// Backpressure bound on frames in flight inside the codec.
    pub max_pending_outputs: usize,
    /// Timeout for one output-side poll by the delivery thread.
    pub dequeue_output_timeout_us: i64,
    /// Timeout for codec stop/release on its dedicated thread.
    pub codec_release_timeout_ms: u64,
    /// Timeout for joining the delivery thread on pipeline release.
    pub release_timeout_ms: u64,
}

impl PipelineConfig {
    pub fn new(mime: VideoCodecMimeType) -> Self {
        Self {
            mime,
            color_format: YuvFormat::I420,
            key_frame_interval_sec: mime.default_key_frame_interval_sec(),
            forced_key_frame_interval_ms: 0,
            max_pending_outputs: DEFAULT_MAX_PENDING_OUTPUTS,
            dequeue_output_timeout_us: DEFAULT_DEQUEUE_OUTPUT_TIMEOUT_US,
            codec_release_timeout_ms: DEFAULT_RELEASE_TIMEOUT_MS,
            release_timeout_ms: DEFAULT_RELEASE_TIMEOUT_MS,
        }
    }
}
