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

//! The codec session: exclusive owner of one hardware codec resource.
//!
//! The session drives the codec's lifecycle (Uninitialized → Configured →
//! Running → Draining → Released) and validates every call against it.
//! Input-side methods must only be called from the submission thread and
//! output-side methods only from the delivery thread; the codec itself is
//! not locked beyond that single-writer-per-side invariant.

use crate::codec::{BufferInfo, CodecFormat, CodecParameters, HardwareCodec, InputFormat, OutputEvent};
use crate::error::{CodecError, CodecResult};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Input dequeue never waits: encoding must not block the capture thread.
/// An exhausted codec resolves to a dropped frame instead.
const DEQUEUE_INPUT_TIMEOUT_US: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Configured,
    Running,
    Draining,
    Released,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Configured => "Configured",
            SessionState::Running => "Running",
            SessionState::Draining => "Draining",
            SessionState::Released => "Released",
        }
    }
}

pub struct CodecSession {
    codec: Arc<dyn HardwareCodec>,
    state: Mutex<SessionState>,
    release_timeout_ms: u64,
}

impl CodecSession {
    pub fn new(codec: Arc<dyn HardwareCodec>, release_timeout_ms: u64) -> Self {
        Self {
            codec,
            state: Mutex::new(SessionState::Uninitialized),
            release_timeout_ms,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn ensure_running(&self, op: &'static str) -> CodecResult<()> {
        let state = *self.state.lock().unwrap();
        if state != SessionState::Running {
            return Err(CodecError::InvalidState {
                op,
                state: state.name(),
            });
        }
        Ok(())
    }

    /// Configure and start the codec: Uninitialized → Configured → Running.
    ///
    /// A rejected configuration leaves the session Uninitialized (the caller
    /// falls back to a software implementation). A start failure after a
    /// successful configure releases the codec and moves the session to
    /// Released so no half-configured state is observable.
    pub fn configure(&self, format: &CodecFormat) -> CodecResult<()> {
        let mut state = self.state.lock().unwrap();
        if *state != SessionState::Uninitialized {
            return Err(CodecError::InvalidState {
                op: "configure",
                state: state.name(),
            });
        }
        log::debug!(
            "Configuring codec: {} {}x{} @{}bps {:.1}fps",
            format.mime.mime_type(),
            format.width,
            format.height,
            format.bitrate_bps,
            format.framerate_fps
        );
        self.codec.configure(format)?;
        *state = SessionState::Configured;
        if let Err(e) = self.codec.start() {
            log::error!("Codec start failed, releasing: {e}");
            self.codec.release();
            *state = SessionState::Released;
            return Err(e);
        }
        *state = SessionState::Running;
        Ok(())
    }

    pub fn input_format(&self) -> InputFormat {
        self.codec.input_format()
    }

    /// Non-blocking poll for a free input buffer. `None` tells the caller
    /// to drop the current frame rather than wait.
    pub fn dequeue_input_buffer(&self) -> CodecResult<Option<usize>> {
        self.ensure_running("dequeueInputBuffer")?;
        self.codec.dequeue_input_buffer(DEQUEUE_INPUT_TIMEOUT_US)
    }

    pub fn write_input_buffer(&self, index: usize, data: &[u8]) -> CodecResult<()> {
        self.ensure_running("writeInputBuffer")?;
        self.codec.write_input_buffer(index, data)
    }

    pub fn queue_input_buffer(
        &self,
        index: usize,
        size: usize,
        presentation_timestamp_us: i64,
    ) -> CodecResult<()> {
        self.ensure_running("queueInputBuffer")?;
        self.codec
            .queue_input_buffer(index, size, presentation_timestamp_us)
    }

    /// Ask the codec to produce a key frame soon. The codec does not
    /// guarantee the very next frame honors the request.
    pub fn request_key_frame(&self) -> CodecResult<()> {
        self.ensure_running("requestKeyFrame")?;
        log::debug!("Sync frame request");
        self.codec.set_parameters(&CodecParameters {
            request_sync_frame: true,
            ..Default::default()
        })
    }

    /// Push a new target bitrate to the running codec.
    pub fn set_bitrate(&self, bitrate_bps: u32) -> CodecResult<()> {
        self.ensure_running("setBitrate")?;
        self.codec.set_parameters(&CodecParameters {
            video_bitrate_bps: Some(bitrate_bps),
            ..Default::default()
        })
    }

    pub fn dequeue_output_buffer(&self, timeout_us: i64) -> CodecResult<OutputEvent> {
        self.ensure_running("dequeueOutputBuffer")?;
        self.codec.dequeue_output_buffer(timeout_us)
    }

    pub fn read_output_buffer(&self, info: &BufferInfo) -> CodecResult<Vec<u8>> {
        self.codec.read_output_buffer(info)
    }

    pub fn release_output_buffer(&self, index: usize) -> CodecResult<()> {
        self.codec.release_output_buffer(index)
    }

    pub fn average_qp(&self, index: usize) -> Option<i32> {
        self.codec.average_qp(index)
    }

    /// Tear the codec down: Draining → Released.
    ///
    /// stop() can hang for seconds on some hardware, so it runs on a
    /// dedicated thread while the caller waits up to the configured timeout.
    /// On timeout the codec is abandoned (a leak is preferable to hanging
    /// the caller forever). Safe to call multiple times.
    pub fn release(&self) -> CodecResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                SessionState::Released => return Ok(()),
                SessionState::Uninitialized => {
                    *state = SessionState::Released;
                    return Ok(());
                }
                _ => *state = SessionState::Draining,
            }
        }

        let codec = Arc::clone(&self.codec);
        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let result = codec.stop();
            codec.release();
            let _ = done_tx.send(result);
        });

        let result = match done_rx.recv_timeout(Duration::from_millis(self.release_timeout_ms)) {
            Ok(stop_result) => stop_result,
            Err(_) => {
                log::error!("Codec release timed out after {}ms", self.release_timeout_ms);
                Err(CodecError::ReleaseTimeout(self.release_timeout_ms))
            }
        };
        *self.state.lock().unwrap() = SessionState::Released;
        result
    }
}
