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

//! Hardware video encoder session management with adaptive bitrate control.
//!
//! This crate drives an asynchronous hardware codec (an opaque OS resource
//! exchanged through buffer indices) behind a non-blocking encode contract:
//! a submission thread queues raw frames, a dedicated delivery thread
//! completes them with per-frame metadata and hands the encoded images to a
//! callback in submission order. A pluggable [`adjuster::BitrateAdjuster`]
//! corrects for encoders that miss their configured bitrate.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use videocall_hwcodec::adjuster::DynamicBitrateAdjuster;
//! use videocall_hwcodec::codec::{HardwareCodec, MockCodec, VideoCodecMimeType};
//! use videocall_hwcodec::error::CodecResult;
//! use videocall_hwcodec::pipeline::EncodePipeline;
//! use videocall_hwcodec::settings::{EncoderSettings, PipelineConfig};
//! use videocall_hwcodec::frame::{FrameType, I420Buffer, VideoFrame, VideoRotation};
//!
//! let factory = |_mime: VideoCodecMimeType| -> CodecResult<Arc<dyn HardwareCodec>> {
//!     Ok(Arc::new(MockCodec::new()))
//! };
//! let mut pipeline = EncodePipeline::new(
//!     Box::new(factory),
//!     PipelineConfig::new(VideoCodecMimeType::H264),
//!     Box::new(DynamicBitrateAdjuster::new()),
//! );
//! pipeline
//!     .initialize(
//!         EncoderSettings {
//!             width: 640,
//!             height: 480,
//!             start_bitrate_bps: 500_000,
//!             max_framerate: 30,
//!             number_of_cores: 1,
//!             number_of_simulcast_streams: 1,
//!             automatic_resize_on: true,
//!         },
//!         Box::new(|image, _info| println!("encoded {} bytes", image.data.len())),
//!     )
//!     .unwrap();
//!
//! let frame = VideoFrame::new(I420Buffer::new(640, 480), VideoRotation::Rotation0, 0);
//! pipeline.encode(&frame, &[FrameType::KeyFrame]).unwrap();
//! pipeline.release().unwrap();
//! ```

pub mod adjuster;
pub mod codec;
pub mod error;
pub mod frame;
pub mod output_queue;
pub mod pipeline;
pub mod session;
pub mod settings;
pub mod yuv;

pub use adjuster::{
    BaseBitrateAdjuster, BitrateAdjuster, DynamicBitrateAdjuster, FramerateBitrateAdjuster,
};
pub use codec::{
    BufferInfo, CodecFormat, CodecParameters, HardwareCodec, InputFormat, MockCodec, OutputEvent,
    VideoCodecMimeType,
};
pub use error::{CodecError, CodecResult, EncodeError, Result};
pub use frame::{CodecSpecificInfo, EncodedImage, FrameType, I420Buffer, VideoFrame, VideoRotation};
pub use output_queue::{OutputQueue, PendingOutput};
pub use pipeline::{EncodePipeline, EncodedFrameCallback, HardwareCodecFactory, StatsSnapshot};
pub use session::{CodecSession, SessionState};
pub use settings::{EncoderSettings, PipelineConfig};
pub use yuv::YuvFormat;
