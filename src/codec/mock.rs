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

//! A scriptable in-memory codec for testing and simulation.
//!
//! Tests drive the output side by pushing encoded buffers with
//! [`MockCodec::add_output_data`], and can script failure modes (rejected
//! configuration, input starvation, slow or failing stop) that are hard to
//! reproduce against real hardware.

use super::{BufferInfo, CodecFormat, CodecParameters, HardwareCodec, InputFormat, OutputEvent};
use crate::error::{CodecError, CodecResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Number of input buffers the mock rotates through.
const NUM_INPUT_BUFFERS: usize = 4;

/// Lifecycle states of the mock, mirroring an OS codec's coarse states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCodecState {
    Uninitialized,
    Configured,
    Running,
    Stopped,
    Released,
}

impl MockCodecState {
    fn name(&self) -> &'static str {
        match self {
            MockCodecState::Uninitialized => "Uninitialized",
            MockCodecState::Configured => "Configured",
            MockCodecState::Running => "Running",
            MockCodecState::Stopped => "Stopped",
            MockCodecState::Released => "Released",
        }
    }
}

/// One input buffer the mock has accepted, with a snapshot of its contents.
#[derive(Debug, Clone)]
pub struct QueuedInput {
    pub index: usize,
    pub size: usize,
    pub presentation_timestamp_us: i64,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    state: Option<MockCodecState>,
    configured_format: Option<CodecFormat>,
    input_format: InputFormat,
    input_buffers: Vec<Vec<u8>>,
    free_input_buffers: VecDeque<usize>,
    queued_inputs: Vec<QueuedInput>,
    output_buffers: Vec<Vec<u8>>,
    pending_output_events: VecDeque<OutputEvent>,
    released_outputs: Vec<usize>,
    qp_by_buffer: HashMap<usize, i32>,
    parameter_pushes: Vec<CodecParameters>,
    fail_configure: bool,
    starve_input: bool,
    fail_stop: bool,
    stop_delay: Option<Duration>,
}

impl Inner {
    fn state(&self) -> MockCodecState {
        self.state.unwrap_or(MockCodecState::Uninitialized)
    }

    fn ensure(&self, op: &'static str, expected: MockCodecState) -> CodecResult<()> {
        if self.state() != expected {
            return Err(CodecError::InvalidState {
                op,
                state: self.state().name(),
            });
        }
        Ok(())
    }
}

pub struct MockCodec {
    inner: Mutex<Inner>,
    output_ready: Condvar,
}

impl Default for MockCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCodec {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            output_ready: Condvar::new(),
        }
    }

    // --- Scripting surface ---

    /// Queue an encoded buffer for the output side. Returns the buffer index.
    pub fn add_output_data(
        &self,
        data: &[u8],
        presentation_timestamp_us: i64,
        is_config: bool,
        is_key_frame: bool,
    ) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let index = inner.output_buffers.len();
        inner.output_buffers.push(data.to_vec());
        inner.pending_output_events.push_back(OutputEvent::Data(BufferInfo {
            index,
            offset: 0,
            size: data.len(),
            presentation_timestamp_us,
            is_config,
            is_key_frame,
        }));
        self.output_ready.notify_all();
        index
    }

    /// Queue a non-data output event (format or buffer-set change).
    pub fn push_event(&self, event: OutputEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending_output_events.push_back(event);
        self.output_ready.notify_all();
    }

    /// Report an average quantizer for the output buffer at `index`.
    pub fn set_qp(&self, index: usize, qp: i32) {
        self.inner.lock().unwrap().qp_by_buffer.insert(index, qp);
    }

    pub fn set_input_format(&self, format: InputFormat) {
        self.inner.lock().unwrap().input_format = format;
    }

    /// Make `configure` reject the format, as unsupported hardware would.
    pub fn fail_configure(&self, fail: bool) {
        self.inner.lock().unwrap().fail_configure = fail;
    }

    /// Make `dequeue_input_buffer` report no free buffers.
    pub fn starve_input(&self, starve: bool) {
        self.inner.lock().unwrap().starve_input = starve;
    }

    pub fn fail_stop(&self, fail: bool) {
        self.inner.lock().unwrap().fail_stop = fail;
    }

    /// Make `stop` block for `delay`, as some hardware stacks do.
    pub fn delay_stop(&self, delay: Duration) {
        self.inner.lock().unwrap().stop_delay = Some(delay);
    }

    // --- Introspection ---

    pub fn state(&self) -> MockCodecState {
        self.inner.lock().unwrap().state()
    }

    pub fn configured_format(&self) -> Option<CodecFormat> {
        self.inner.lock().unwrap().configured_format
    }

    pub fn queued_inputs(&self) -> Vec<QueuedInput> {
        self.inner.lock().unwrap().queued_inputs.clone()
    }

    pub fn parameter_pushes(&self) -> Vec<CodecParameters> {
        self.inner.lock().unwrap().parameter_pushes.clone()
    }

    pub fn released_outputs(&self) -> Vec<usize> {
        self.inner.lock().unwrap().released_outputs.clone()
    }
}

impl HardwareCodec for MockCodec {
    fn configure(&self, format: &CodecFormat) -> CodecResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure("configure", MockCodecState::Uninitialized)?;
        if inner.fail_configure {
            return Err(CodecError::Configuration(format!(
                "mock rejects {}x{} {}",
                format.width,
                format.height,
                format.mime.mime_type()
            )));
        }
        inner.configured_format = Some(*format);
        inner.input_buffers = vec![Vec::new(); NUM_INPUT_BUFFERS];
        inner.free_input_buffers = (0..NUM_INPUT_BUFFERS).collect();
        inner.state = Some(MockCodecState::Configured);
        Ok(())
    }

    fn start(&self) -> CodecResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure("start", MockCodecState::Configured)?;
        inner.state = Some(MockCodecState::Running);
        Ok(())
    }

    fn input_format(&self) -> InputFormat {
        self.inner.lock().unwrap().input_format
    }

    fn dequeue_input_buffer(&self, _timeout_us: i64) -> CodecResult<Option<usize>> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure("dequeueInputBuffer", MockCodecState::Running)?;
        if inner.starve_input {
            return Ok(None);
        }
        Ok(inner.free_input_buffers.pop_front())
    }

    fn write_input_buffer(&self, index: usize, data: &[u8]) -> CodecResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure("writeInputBuffer", MockCodecState::Running)?;
        if index >= inner.input_buffers.len() {
            return Err(CodecError::Failed(format!("no input buffer {index}")));
        }
        inner.input_buffers[index] = data.to_vec();
        Ok(())
    }

    fn queue_input_buffer(
        &self,
        index: usize,
        size: usize,
        presentation_timestamp_us: i64,
    ) -> CodecResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure("queueInputBuffer", MockCodecState::Running)?;
        if index >= inner.input_buffers.len() {
            return Err(CodecError::Failed(format!("no input buffer {index}")));
        }
        let len = size.min(inner.input_buffers[index].len());
        let data = inner.input_buffers[index][..len].to_vec();
        inner.queued_inputs.push(QueuedInput {
            index,
            size,
            presentation_timestamp_us,
            data,
        });
        // The mock consumes input instantly, so the buffer is free again.
        inner.free_input_buffers.push_back(index);
        Ok(())
    }

    fn dequeue_output_buffer(&self, timeout_us: i64) -> CodecResult<OutputEvent> {
        let deadline = Instant::now() + Duration::from_micros(timeout_us.max(0) as u64);
        let mut inner = self.inner.lock().unwrap();
        loop {
            inner.ensure("dequeueOutputBuffer", MockCodecState::Running)?;
            if let Some(event) = inner.pending_output_events.pop_front() {
                return Ok(event);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(OutputEvent::Empty);
            }
            let (guard, _) = self
                .output_ready
                .wait_timeout(inner, deadline - now)
                .unwrap();
            inner = guard;
        }
    }

    fn read_output_buffer(&self, info: &BufferInfo) -> CodecResult<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let buffer = inner
            .output_buffers
            .get(info.index)
            .ok_or_else(|| CodecError::Failed(format!("no output buffer {}", info.index)))?;
        Ok(buffer[info.offset..info.offset + info.size].to_vec())
    }

    fn release_output_buffer(&self, index: usize) -> CodecResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.released_outputs.push(index);
        Ok(())
    }

    fn set_parameters(&self, params: &CodecParameters) -> CodecResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure("setParameters", MockCodecState::Running)?;
        inner.parameter_pushes.push(*params);
        Ok(())
    }

    fn average_qp(&self, index: usize) -> Option<i32> {
        self.inner.lock().unwrap().qp_by_buffer.get(&index).copied()
    }

    fn stop(&self) -> CodecResult<()> {
        let (delay, fail) = {
            let inner = self.inner.lock().unwrap();
            (inner.stop_delay, inner.fail_stop)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.state = Some(MockCodecState::Stopped);
        self.output_ready.notify_all();
        if fail {
            return Err(CodecError::Failed("mock stop failure".to_string()));
        }
        Ok(())
    }

    fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = Some(MockCodecState::Released);
        self.output_ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yuv::YuvFormat;

    fn test_format() -> CodecFormat {
        CodecFormat {
            mime: crate::codec::VideoCodecMimeType::Vp8,
            width: 640,
            height: 480,
            bitrate_bps: 300_000,
            framerate_fps: 30.0,
            color_format: YuvFormat::I420,
            key_frame_interval_sec: 100,
        }
    }

    #[test]
    fn lifecycle_and_input_rotation() {
        let codec = MockCodec::new();
        codec.configure(&test_format()).unwrap();
        codec.start().unwrap();
        assert_eq!(codec.state(), MockCodecState::Running);

        let index = codec.dequeue_input_buffer(0).unwrap().unwrap();
        codec.write_input_buffer(index, b"pixels").unwrap();
        codec.queue_input_buffer(index, 6, 0).unwrap();

        let queued = codec.queued_inputs();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].data, b"pixels");
    }

    #[test]
    fn configure_from_running_is_invalid() {
        let codec = MockCodec::new();
        codec.configure(&test_format()).unwrap();
        codec.start().unwrap();
        assert!(matches!(
            codec.configure(&test_format()),
            Err(CodecError::InvalidState { .. })
        ));
    }

    #[test]
    fn dequeue_output_times_out_empty() {
        let codec = MockCodec::new();
        codec.configure(&test_format()).unwrap();
        codec.start().unwrap();
        assert_eq!(
            codec.dequeue_output_buffer(1_000).unwrap(),
            OutputEvent::Empty
        );
    }

    #[test]
    fn dequeue_output_returns_scripted_data() {
        let codec = MockCodec::new();
        codec.configure(&test_format()).unwrap();
        codec.start().unwrap();
        let index = codec.add_output_data(b"frame", 7, false, true);
        match codec.dequeue_output_buffer(0).unwrap() {
            OutputEvent::Data(info) => {
                assert_eq!(info.index, index);
                assert_eq!(info.size, 5);
                assert_eq!(info.presentation_timestamp_us, 7);
                assert!(info.is_key_frame);
                assert_eq!(codec.read_output_buffer(&info).unwrap(), b"frame");
            }
            other => panic!("expected data, got {other:?}"),
        }
    }
}
