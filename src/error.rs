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

use thiserror::Error;

/// Result type for pipeline-level operations
pub type Result<T> = std::result::Result<T, EncodeError>;

/// Result type for codec-level operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Errors raised by the hardware codec resource or the session driving it.
///
/// Hardware codec stacks are unreliable: any call may throw a recoverable
/// state error. The session maps those to `Failed` and leaves the retry /
/// fallback policy to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The codec rejected the requested format or resolution at configure
    /// time. Callers should fall back to a software implementation.
    #[error("Codec rejected configuration: {0}")]
    Configuration(String),

    /// An operation was invoked in a state that does not allow it.
    #[error("Codec operation '{op}' invalid in state {state}")]
    InvalidState { op: &'static str, state: &'static str },

    /// A single codec call failed transiently.
    #[error("Codec call failed: {0}")]
    Failed(String),

    /// Codec stop/release did not complete within the timeout. The
    /// underlying resource may be leaked.
    #[error("Codec release timed out after {0}ms")]
    ReleaseTimeout(u64),
}

/// Errors raised by the encode pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// An operation was invoked before `initialize` or after `release`.
    #[error("Encoder is not initialized")]
    Uninitialized,

    /// `initialize` was called on an already-running pipeline.
    #[error("Encoder is already initialized")]
    AlreadyInitialized,

    /// The output delivery thread did not terminate within the timeout.
    #[error("Encoder release timed out after {0}ms")]
    Timeout(u64),

    /// A codec-level failure surfaced through the pipeline.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
