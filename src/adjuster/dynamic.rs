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

use super::BitrateAdjuster;

const BITS_PER_BYTE: f64 = 8.0;
/// Length of the observation window between adjustment decisions, and the
/// cap on accumulated deviation (in multiples of one second of bytes) so
/// stale data stops influencing the correction.
const BITRATE_CORRECTION_SEC: f64 = 3.0;
/// Maximum correction scale: the adjusted bitrate never deviates from the
/// target by more than this factor in either direction.
const BITRATE_CORRECTION_MAX_SCALE: f64 = 2.0;
/// Number of correction steps to reach the maximum scale.
const BITRATE_CORRECTION_STEPS: i32 = 10;

/// Accumulator-based adjustment for encoders whose actual output bitrate
/// deviates too much from the configured value.
///
/// Every reported frame accumulates the signed difference between its size
/// and the size implied by the target bitrate. Once more than
/// [`BITRATE_CORRECTION_SEC`] seconds of frames have been observed and the
/// accumulator has drifted past one second of bytes in either direction, the
/// correction exponent takes one step and the accumulator is reset to the
/// boundary. The configured bitrate is the target scaled by
/// `2^(exp / steps)`, clamped to ±[`BITRATE_CORRECTION_STEPS`] steps.
#[derive(Debug, Default)]
pub struct DynamicBitrateAdjuster {
    target_bitrate_bps: f64,
    target_framerate_fps: f64,
    /// Signed accumulated deviation between actual and expected frame sizes.
    deviation_bytes: f64,
    /// Wall time represented by the frames observed since the last decision.
    observation_time_ms: f64,
    scale_exp: i32,
}

impl DynamicBitrateAdjuster {
    pub fn new() -> Self {
        Self::default()
    }

    /// One second of bytes at the target bitrate; the adjustment threshold.
    fn deviation_max_bytes(&self) -> f64 {
        self.target_bitrate_bps / BITS_PER_BYTE
    }

    fn bitrate_scale(&self) -> f64 {
        BITRATE_CORRECTION_MAX_SCALE
            .powf(self.scale_exp as f64 / BITRATE_CORRECTION_STEPS as f64)
    }
}

impl BitrateAdjuster for DynamicBitrateAdjuster {
    fn set_targets(&mut self, bitrate_bps: u32, framerate_fps: f64) {
        let new_bitrate_bps = bitrate_bps as f64;
        if self.target_bitrate_bps > 0.0 && new_bitrate_bps < self.target_bitrate_bps {
            // Rescale the accumulator level when the accumulator max decreases.
            self.deviation_bytes = self.deviation_bytes * new_bitrate_bps / self.target_bitrate_bps;
        }
        self.target_bitrate_bps = new_bitrate_bps;
        self.target_framerate_fps = framerate_fps;
    }

    fn report_encoded_frame(&mut self, size_bytes: usize) -> bool {
        if self.target_framerate_fps <= 0.0 || self.target_bitrate_bps <= 0.0 {
            return false;
        }

        let expected_bytes_per_frame =
            self.target_bitrate_bps / (BITS_PER_BYTE * self.target_framerate_fps);
        self.deviation_bytes += size_bytes as f64 - expected_bytes_per_frame;
        self.observation_time_ms += 1000.0 / self.target_framerate_fps;

        let deviation_max = self.deviation_max_bytes();
        let deviation_cap = BITRATE_CORRECTION_SEC * deviation_max;
        self.deviation_bytes = self.deviation_bytes.clamp(-deviation_cap, deviation_cap);

        if self.observation_time_ms <= 1000.0 * BITRATE_CORRECTION_SEC {
            return false;
        }

        let mut scale_changed = false;
        if self.deviation_bytes > deviation_max {
            // Encoder produces too much - scale the configured bitrate down.
            self.deviation_bytes = deviation_max;
            self.scale_exp = (self.scale_exp - 1).max(-BITRATE_CORRECTION_STEPS);
            scale_changed = true;
        } else if self.deviation_bytes < -deviation_max {
            // Encoder produces too little - scale the configured bitrate up.
            self.deviation_bytes = -deviation_max;
            self.scale_exp = (self.scale_exp + 1).min(BITRATE_CORRECTION_STEPS);
            scale_changed = true;
        }
        if scale_changed {
            log::debug!(
                "Adjusting bitrate scale to {} ({:.3})",
                self.scale_exp,
                self.bitrate_scale()
            );
        }
        self.observation_time_ms = 0.0;
        scale_changed
    }

    fn adjusted_bitrate_bps(&self) -> u32 {
        (self.target_bitrate_bps * self.bitrate_scale()) as u32
    }

    fn adjusted_framerate_fps(&self) -> f64 {
        self.target_framerate_fps
    }
}
