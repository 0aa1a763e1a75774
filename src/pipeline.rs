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

//! The encode pipeline: glue between the codec session, the bitrate
//! adjuster and the pending-output queue.
//!
//! Two threads touch an active pipeline: the caller's submission thread
//! (`encode`, `set_rates`, `release`) and a dedicated delivery thread that
//! polls the codec's output side and invokes the callback. `encode` never
//! blocks; exhausted input buffers and a saturated output queue both resolve
//! to silently dropped frames, observable only through counters.

use crate::adjuster::BitrateAdjuster;
use crate::codec::{BufferInfo, CodecFormat, HardwareCodec, OutputEvent, VideoCodecMimeType};
use crate::error::{CodecError, CodecResult, EncodeError, Result};
use crate::frame::{CodecSpecificInfo, EncodedImage, FrameType, VideoFrame};
use crate::output_queue::{OutputQueue, PendingOutput};
use crate::session::CodecSession;
use crate::settings::{EncoderSettings, PipelineConfig};
use crate::yuv::{effective_slice_height, effective_stride};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Hard ceiling on the framerate forwarded to the adjuster and the codec.
pub const MAX_VIDEO_FRAMERATE_FPS: f64 = 30.0;

/// Receives one `(EncodedImage, CodecSpecificInfo)` per delivered frame, in
/// submission order, on the delivery thread. Must not block indefinitely.
pub type EncodedFrameCallback = dyn Fn(EncodedImage, CodecSpecificInfo) + Send + Sync;

/// Creates hardware codec instances. A fresh instance is requested at
/// `initialize` and again whenever a resolution change forces a restart.
pub trait HardwareCodecFactory: Send + Sync {
    fn create(&self, mime: VideoCodecMimeType) -> CodecResult<Arc<dyn HardwareCodec>>;
}

impl<F> HardwareCodecFactory for F
where
    F: Fn(VideoCodecMimeType) -> CodecResult<Arc<dyn HardwareCodec>> + Send + Sync,
{
    fn create(&self, mime: VideoCodecMimeType) -> CodecResult<Arc<dyn HardwareCodec>> {
        self(mime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Uninitialized,
    Running,
    Released,
}

#[derive(Debug, Default)]
struct Counters {
    frames_submitted: AtomicU64,
    frames_dropped_queue_saturated: AtomicU64,
    frames_dropped_no_input_buffer: AtomicU64,
    frames_delivered: AtomicU64,
    key_frames_delivered: AtomicU64,
    bitrate_updates: AtomicU64,
}

/// Point-in-time view of the pipeline's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_submitted: u64,
    pub frames_dropped_queue_saturated: u64,
    pub frames_dropped_no_input_buffer: u64,
    pub frames_delivered: u64,
    pub key_frames_delivered: u64,
    pub bitrate_updates: u64,
    /// Frames discarded in flight at teardown, without a callback.
    pub frames_discarded: u64,
}

struct OutputWorker {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
    done_rx: mpsc::Receiver<()>,
}

/// Everything the delivery thread needs, cloned out of the pipeline so the
/// submission side keeps exclusive ownership of the rest.
struct DeliveryContext {
    session: Arc<CodecSession>,
    queue: Arc<OutputQueue>,
    adjuster: Arc<Mutex<Box<dyn BitrateAdjuster>>>,
    callback: Arc<EncodedFrameCallback>,
    running: Arc<AtomicBool>,
    deferred_error: Arc<Mutex<Option<CodecError>>>,
    counters: Arc<Counters>,
    mime: VideoCodecMimeType,
    dequeue_timeout_us: i64,
}

pub struct EncodePipeline {
    factory: Box<dyn HardwareCodecFactory>,
    config: PipelineConfig,
    adjuster: Arc<Mutex<Box<dyn BitrateAdjuster>>>,
    state: PipelineState,
    settings: Option<EncoderSettings>,
    callback: Option<Arc<EncodedFrameCallback>>,
    session: Option<Arc<CodecSession>>,
    output_queue: Arc<OutputQueue>,
    worker: Option<OutputWorker>,
    deferred_error: Arc<Mutex<Option<CodecError>>>,
    counters: Arc<Counters>,
    last_key_frame_ns: i64,
    next_presentation_timestamp_us: i64,
}

impl EncodePipeline {
    pub fn new(
        factory: Box<dyn HardwareCodecFactory>,
        config: PipelineConfig,
        adjuster: Box<dyn BitrateAdjuster>,
    ) -> Self {
        Self {
            output_queue: Arc::new(OutputQueue::new(config.max_pending_outputs)),
            factory,
            config,
            adjuster: Arc::new(Mutex::new(adjuster)),
            state: PipelineState::Uninitialized,
            settings: None,
            callback: None,
            session: None,
            worker: None,
            deferred_error: Arc::new(Mutex::new(None)),
            counters: Arc::new(Counters::default()),
            last_key_frame_ns: 0,
            next_presentation_timestamp_us: 0,
        }
    }

    /// Configure the codec, start the delivery thread and move to Running.
    /// Double initialization is rejected; a released pipeline is terminal.
    pub fn initialize(
        &mut self,
        settings: EncoderSettings,
        callback: Box<EncodedFrameCallback>,
    ) -> Result<()> {
        if self.state != PipelineState::Uninitialized {
            return Err(EncodeError::AlreadyInitialized);
        }
        let framerate = f64::from(settings.max_framerate).min(MAX_VIDEO_FRAMERATE_FPS);
        self.adjuster
            .lock()
            .unwrap()
            .set_targets(settings.start_bitrate_bps, framerate);
        self.settings = Some(settings);
        self.callback = Some(Arc::from(callback));
        self.spin_up()?;
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Submit one raw frame. Only valid while Running.
    ///
    /// A resolution change restarts the codec in place (frames still in
    /// flight are discarded without callbacks). Queue saturation and input
    /// buffer exhaustion drop the frame silently and return Ok: deliberate
    /// backpressure, not a failure.
    pub fn encode(&mut self, frame: &VideoFrame, frame_types: &[FrameType]) -> Result<()> {
        if self.state != PipelineState::Running {
            return Err(EncodeError::Uninitialized);
        }
        let settings = self.settings.expect("pipeline is running");
        if frame.width() != settings.width || frame.height() != settings.height {
            self.restart_for_resolution(frame.width(), frame.height())?;
        }

        if self.output_queue.is_saturated() {
            self.counters
                .frames_dropped_queue_saturated
                .fetch_add(1, Ordering::Relaxed);
            log::debug!("Dropped frame, encoder queue saturated");
            return Ok(());
        }

        let session = Arc::clone(self.session.as_ref().expect("pipeline is running"));
        let request_key_frame = frame_types.contains(&FrameType::KeyFrame)
            || self.forced_key_frame_due(frame.timestamp_ns);

        let Some(input_index) = session.dequeue_input_buffer()? else {
            self.counters
                .frames_dropped_no_input_buffer
                .fetch_add(1, Ordering::Relaxed);
            log::debug!("Dropped frame, no free input buffer");
            return Ok(());
        };

        if request_key_frame {
            session.request_key_frame()?;
            self.last_key_frame_ns = frame.timestamp_ns;
        }

        let input_format = session.input_format();
        let stride = effective_stride(input_format.stride, frame.width());
        let slice_height = effective_slice_height(input_format.slice_height, frame.height());
        let size = self
            .config
            .color_format
            .buffer_size(frame.height(), stride, slice_height);
        let mut packed = vec![0u8; size];
        self.config
            .color_format
            .fill_buffer(&mut packed, &frame.buffer, stride, slice_height);
        session.write_input_buffer(input_index, &packed)?;

        self.output_queue.push(PendingOutput {
            capture_timestamp_ns: frame.timestamp_ns,
            encoded_width: frame.width(),
            encoded_height: frame.height(),
            rotation: frame.rotation,
        });

        let presentation_timestamp_us = self.next_presentation_timestamp_us;
        if let Err(e) = session.queue_input_buffer(input_index, size, presentation_timestamp_us) {
            // The frame never reached the codec; take its metadata back out.
            self.output_queue.retract_newest();
            return Err(e.into());
        }

        let framerate = self.adjuster.lock().unwrap().adjusted_framerate_fps();
        self.next_presentation_timestamp_us += (1_000_000.0 / framerate.max(1.0)) as i64;
        self.counters
            .frames_submitted
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Update the target operating point. The framerate is clamped to
    /// [`MAX_VIDEO_FRAMERATE_FPS`] before the adjuster sees it, and the
    /// adjusted bitrate is pushed to the live codec immediately.
    pub fn set_rates(&mut self, bitrate_bps: u32, framerate_fps: f64) -> Result<()> {
        if self.state != PipelineState::Running {
            return Err(EncodeError::Uninitialized);
        }
        let framerate = framerate_fps.min(MAX_VIDEO_FRAMERATE_FPS);
        let adjusted_bitrate_bps = {
            let mut adjuster = self.adjuster.lock().unwrap();
            adjuster.set_targets(bitrate_bps, framerate);
            adjuster.adjusted_bitrate_bps()
        };
        self.session
            .as_ref()
            .expect("pipeline is running")
            .set_bitrate(adjusted_bitrate_bps)?;
        self.counters
            .bitrate_updates
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stop the delivery thread and tear the codec down. Idempotent and
    /// terminal; exceeding the join timeout abandons the thread and returns
    /// `EncodeError::Timeout`. An error captured by the delivery thread at
    /// teardown is replayed here.
    pub fn release(&mut self) -> Result<()> {
        match self.state {
            PipelineState::Released => return Ok(()),
            PipelineState::Uninitialized => {
                self.state = PipelineState::Released;
                return Ok(());
            }
            PipelineState::Running => {}
        }
        self.state = PipelineState::Released;
        self.shut_down()?;
        if let Some(e) = self.deferred_error.lock().unwrap().take() {
            return Err(e.into());
        }
        Ok(())
    }

    /// Counter snapshot; drops are visible here, never on the error channel.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_submitted: self.counters.frames_submitted.load(Ordering::Relaxed),
            frames_dropped_queue_saturated: self
                .counters
                .frames_dropped_queue_saturated
                .load(Ordering::Relaxed),
            frames_dropped_no_input_buffer: self
                .counters
                .frames_dropped_no_input_buffer
                .load(Ordering::Relaxed),
            frames_delivered: self.counters.frames_delivered.load(Ordering::Relaxed),
            key_frames_delivered: self.counters.key_frames_delivered.load(Ordering::Relaxed),
            bitrate_updates: self.counters.bitrate_updates.load(Ordering::Relaxed),
            frames_discarded: self.output_queue.discarded(),
        }
    }

    fn forced_key_frame_due(&self, timestamp_ns: i64) -> bool {
        if self.config.forced_key_frame_interval_ms == 0 {
            return false;
        }
        let interval_ns = self.config.forced_key_frame_interval_ms as i64 * 1_000_000;
        timestamp_ns > self.last_key_frame_ns + interval_ns
    }

    /// Create a codec, configure a session around it and start the delivery
    /// thread.
    fn spin_up(&mut self) -> Result<()> {
        let settings = self.settings.expect("settings are set");
        let codec = self.factory.create(self.config.mime)?;
        let session = Arc::new(CodecSession::new(
            codec,
            self.config.codec_release_timeout_ms,
        ));

        let (bitrate_bps, framerate_fps) = {
            let adjuster = self.adjuster.lock().unwrap();
            (
                adjuster.adjusted_bitrate_bps(),
                adjuster.adjusted_framerate_fps(),
            )
        };
        let format = CodecFormat {
            mime: self.config.mime,
            width: settings.width,
            height: settings.height,
            bitrate_bps,
            framerate_fps,
            color_format: self.config.color_format,
            key_frame_interval_sec: self.config.key_frame_interval_sec,
        };
        session.configure(&format)?;

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = mpsc::channel();
        let context = DeliveryContext {
            session: Arc::clone(&session),
            queue: Arc::clone(&self.output_queue),
            adjuster: Arc::clone(&self.adjuster),
            callback: Arc::clone(self.callback.as_ref().expect("callback is set")),
            running: Arc::clone(&running),
            deferred_error: Arc::clone(&self.deferred_error),
            counters: Arc::clone(&self.counters),
            mime: self.config.mime,
            dequeue_timeout_us: self.config.dequeue_output_timeout_us,
        };
        let handle = thread::Builder::new()
            .name("encode-output".to_string())
            .spawn(move || {
                run_delivery_loop(context);
                let _ = done_tx.send(());
            })
            .map_err(|e| {
                let _ = session.release();
                CodecError::Failed(format!("failed to spawn delivery thread: {e}"))
            })?;

        self.session = Some(session);
        self.worker = Some(OutputWorker {
            handle,
            running,
            done_rx,
        });
        self.next_presentation_timestamp_us = 0;
        Ok(())
    }

    /// Resolution changes are not supported in place by the hardware:
    /// restart the codec with the new dimensions.
    fn restart_for_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        {
            let settings = self.settings.as_mut().expect("pipeline is running");
            log::info!(
                "Resolution changed {}x{} -> {}x{}, restarting codec",
                settings.width,
                settings.height,
                width,
                height
            );
            settings.width = width;
            settings.height = height;
        }
        self.shut_down()?;
        if let Some(e) = self.deferred_error.lock().unwrap().take() {
            return Err(e.into());
        }
        self.spin_up()
    }

    /// Signal the delivery thread to exit (it releases the session on the
    /// way out) and join it, bounded by the release timeout.
    fn shut_down(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            self.session = None;
            return Ok(());
        };
        worker.running.store(false, Ordering::Release);
        match worker
            .done_rx
            .recv_timeout(Duration::from_millis(self.config.release_timeout_ms))
        {
            Ok(()) => {
                let _ = worker.handle.join();
            }
            Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("Delivery thread terminated unexpectedly");
                    *self.deferred_error.lock().unwrap() = Some(CodecError::Failed(
                        "output delivery thread panicked".to_string(),
                    ));
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // Abandon the thread; hanging the caller is worse than a leak.
                log::error!(
                    "Delivery thread did not exit within {}ms",
                    self.config.release_timeout_ms
                );
                self.session = None;
                self.output_queue.clear();
                return Err(EncodeError::Timeout(self.config.release_timeout_ms));
            }
        }
        self.session = None;
        let discarded = self.output_queue.clear();
        if discarded > 0 {
            log::debug!("Discarded {discarded} frames in flight at teardown");
        }
        Ok(())
    }
}

impl Drop for EncodePipeline {
    fn drop(&mut self) {
        if self.state == PipelineState::Running {
            if let Err(e) = self.release() {
                log::warn!("Encoder release on drop failed: {e}");
            }
        }
    }
}

/// Body of the delivery thread: poll, complete, deliver, repeat until the
/// running flag clears, then release the session.
fn run_delivery_loop(context: DeliveryContext) {
    // Out-of-band parameter sets for codecs that need them prepended to key
    // frames. The cache dies with the loop, so a codec restart starts clean.
    let mut cached_config_data: Option<Vec<u8>> = None;

    while context.running.load(Ordering::Acquire) {
        let event = match context
            .session
            .dequeue_output_buffer(context.dequeue_timeout_us)
        {
            Ok(event) => event,
            Err(e) => {
                // A single output-side failure does not tear down the session.
                log::warn!("dequeueOutputBuffer failed: {e}");
                continue;
            }
        };
        match event {
            OutputEvent::Empty => continue,
            OutputEvent::FormatChanged | OutputEvent::BuffersChanged => continue,
            OutputEvent::Data(info) => {
                deliver_encoded_image(&context, info, &mut cached_config_data);
            }
        }
    }

    if let Err(e) = context.session.release() {
        log::error!("Codec release failed: {e}");
        *context.deferred_error.lock().unwrap() = Some(e);
    }
}

fn deliver_encoded_image(
    context: &DeliveryContext,
    info: BufferInfo,
    cached_config_data: &mut Option<Vec<u8>>,
) {
    let payload = match context.session.read_output_buffer(&info) {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("Reading output buffer {} failed: {e}", info.index);
            let _ = context.session.release_output_buffer(info.index);
            return;
        }
    };

    if info.is_config {
        log::debug!("Config frame generated. Size: {}", payload.len());
        if context.mime.prepends_config_to_key_frames() && !payload.is_empty() {
            *cached_config_data = Some(payload);
        }
        let _ = context.session.release_output_buffer(info.index);
        return;
    }

    // Encoding statistics must be read before the buffer goes back.
    let qp = context.session.average_qp(info.index);
    let _ = context.session.release_output_buffer(info.index);

    let Some(pending) = context.queue.pop_oldest() else {
        log::error!("Encoded buffer with no pending frame metadata, dropping");
        return;
    };

    let data = match (cached_config_data.as_ref(), info.is_key_frame) {
        (Some(config), true) => {
            let mut joined = Vec::with_capacity(config.len() + payload.len());
            joined.extend_from_slice(config);
            joined.extend_from_slice(&payload);
            joined
        }
        _ => payload,
    };

    let needs_bitrate_update = {
        let mut adjuster = context.adjuster.lock().unwrap();
        adjuster.report_encoded_frame(data.len())
    };
    if needs_bitrate_update {
        let bitrate_bps = context.adjuster.lock().unwrap().adjusted_bitrate_bps();
        match context.session.set_bitrate(bitrate_bps) {
            Ok(()) => {
                context
                    .counters
                    .bitrate_updates
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::warn!("Live bitrate update failed: {e}"),
        }
    }

    let frame_type = if info.is_key_frame {
        FrameType::KeyFrame
    } else {
        FrameType::DeltaFrame
    };
    let image = EncodedImage {
        data,
        timestamp_ns: pending.capture_timestamp_ns,
        encoded_width: pending.encoded_width,
        encoded_height: pending.encoded_height,
        rotation: pending.rotation,
        frame_type,
        qp,
    };
    context
        .counters
        .frames_delivered
        .fetch_add(1, Ordering::Relaxed);
    if info.is_key_frame {
        context
            .counters
            .key_frames_delivered
            .fetch_add(1, Ordering::Relaxed);
    }
    (context.callback)(image, CodecSpecificInfo { mime: context.mime });
}
