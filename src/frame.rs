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

//! Contains the fundamental data structures for raw and encoded video frames.

use crate::codec::VideoCodecMimeType;
use serde::{Deserialize, Serialize};

/// The type of a video frame, indicating its dependency on other frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    /// A KeyFrame (or I-frame) can be decoded independently of any other frame.
    KeyFrame,
    /// A DeltaFrame (or P-frame) can only be decoded if the preceding frame has been decoded.
    DeltaFrame,
}

/// Rotation to apply to a frame before display, in degrees clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoRotation {
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl VideoRotation {
    pub fn degrees(&self) -> u32 {
        match self {
            VideoRotation::Rotation0 => 0,
            VideoRotation::Rotation90 => 90,
            VideoRotation::Rotation180 => 180,
            VideoRotation::Rotation270 => 270,
        }
    }
}

/// A planar YUV 4:2:0 pixel buffer with per-plane strides.
///
/// The pipeline does not interpret pixel contents beyond size and stride
/// bookkeeping; packing into the codec's negotiated input layout is handled
/// by [`crate::yuv::YuvFormat`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I420Buffer {
    width: u32,
    height: u32,
    stride_y: usize,
    stride_u: usize,
    stride_v: usize,
    data_y: Vec<u8>,
    data_u: Vec<u8>,
    data_v: Vec<u8>,
}

impl I420Buffer {
    /// Allocate a zeroed, tightly-packed buffer for the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        let chroma_width = (width as usize + 1) / 2;
        let chroma_height = (height as usize + 1) / 2;
        Self {
            width,
            height,
            stride_y: width as usize,
            stride_u: chroma_width,
            stride_v: chroma_width,
            data_y: vec![0; width as usize * height as usize],
            data_u: vec![0; chroma_width * chroma_height],
            data_v: vec![0; chroma_width * chroma_height],
        }
    }

    /// Wrap existing plane data. Plane lengths must match the strides.
    pub fn wrap(
        width: u32,
        height: u32,
        stride_y: usize,
        stride_u: usize,
        stride_v: usize,
        data_y: Vec<u8>,
        data_u: Vec<u8>,
        data_v: Vec<u8>,
    ) -> Self {
        let chroma_height = (height as usize + 1) / 2;
        debug_assert!(data_y.len() >= stride_y * height as usize);
        debug_assert!(data_u.len() >= stride_u * chroma_height);
        debug_assert!(data_v.len() >= stride_v * chroma_height);
        Self {
            width,
            height,
            stride_y,
            stride_u,
            stride_v,
            data_y,
            data_u,
            data_v,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn chroma_width(&self) -> usize {
        (self.width as usize + 1) / 2
    }

    pub fn chroma_height(&self) -> usize {
        (self.height as usize + 1) / 2
    }

    pub fn stride_y(&self) -> usize {
        self.stride_y
    }

    pub fn stride_u(&self) -> usize {
        self.stride_u
    }

    pub fn stride_v(&self) -> usize {
        self.stride_v
    }

    pub fn data_y(&self) -> &[u8] {
        &self.data_y
    }

    pub fn data_u(&self) -> &[u8] {
        &self.data_u
    }

    pub fn data_v(&self) -> &[u8] {
        &self.data_v
    }

    pub fn data_y_mut(&mut self) -> &mut [u8] {
        &mut self.data_y
    }

    pub fn data_u_mut(&mut self) -> &mut [u8] {
        &mut self.data_u
    }

    pub fn data_v_mut(&mut self) -> &mut [u8] {
        &mut self.data_v
    }
}

/// A raw video frame as submitted by the capturer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    pub buffer: I420Buffer,
    pub rotation: VideoRotation,
    /// Capture timestamp in nanoseconds.
    pub timestamp_ns: i64,
}

impl VideoFrame {
    pub fn new(buffer: I420Buffer, rotation: VideoRotation, timestamp_ns: i64) -> Self {
        Self {
            buffer,
            rotation,
            timestamp_ns,
        }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }
}

/// A fully encoded frame, ready for packetization, delivered to the
/// pipeline callback in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedImage {
    /// The compressed bitstream. For codecs that carry out-of-band parameter
    /// sets, key frames include the cached config data as a prefix.
    pub data: Vec<u8>,
    /// Capture timestamp of the source frame in nanoseconds.
    pub timestamp_ns: i64,
    pub encoded_width: u32,
    pub encoded_height: u32,
    pub rotation: VideoRotation,
    pub frame_type: FrameType,
    /// Average quantizer reported by the codec, when encoding statistics
    /// are supported.
    pub qp: Option<i32>,
}

/// Codec-specific metadata delivered alongside every [`EncodedImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSpecificInfo {
    pub mime: VideoCodecMimeType,
}
