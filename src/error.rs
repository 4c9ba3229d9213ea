// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error types for the acquisition and processing pipeline.

use std::{fmt, time::Duration};

/// Category of a failure reported by the native driver.
///
/// Mirrors the exception categories of the RealSense SDK, plus the two
/// start-time failures the pipeline needs to tell apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeErrorKind {
    Unknown,
    CameraDisconnected,
    Backend,
    InvalidValue,
    WrongApiCallSequence,
    NotImplemented,
    DeviceInRecoveryMode,
    Io,
    /// No device is attached or enumerable.
    NoDevice,
    /// The requested stream combination cannot be satisfied.
    UnresolvedRequest,
}

/// Failure reported by the native driver.
///
/// Carries the driver's message together with the name and arguments of the
/// call that failed, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeError {
    pub kind: NativeErrorKind,
    pub message: String,
    pub function: String,
    pub args: String,
}

impl NativeError {
    pub fn new(
        kind: NativeErrorKind,
        message: impl Into<String>,
        function: impl Into<String>,
        args: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            function: function.into(),
            args: args.into(),
        }
    }
}

impl std::error::Error for NativeError {}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "realsense error: {} (in {}({}))",
            self.message, self.function, self.args
        )
    }
}

/// Common error type for session, pipeline, frame and stage operations.
#[derive(Debug)]
pub enum Error {
    /// Requested stream/resolution/format/rate combination is unsupported.
    Configuration(NativeError),
    /// No hardware attached or enumerable.
    DeviceNotFound(String),
    /// Operation requires a started pipeline.
    NotStarted,
    /// A bounded wait elapsed without output.
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    /// A lookup found no match, e.g. a stream missing from a partial capture.
    NotFound(String),
    /// Query not supported by this device or sensor.
    NotSupported(String),
    /// Any other failure reported by the native driver.
    Native(NativeError),
    /// The handle was already closed.
    Closed(&'static str),
    /// The owning session was closed.
    SessionClosed,
    /// Frame buffer cannot be viewed as requested.
    InvalidFrame(String),
    /// The native library could not be loaded.
    Library(libloading::Error),
}

impl Error {
    /// True for the transient error callers are expected to loop past.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Configuration(err) | Error::Native(err) => Some(err),
            Error::Library(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(err) => write!(f, "configuration error: {}", err),
            Error::DeviceNotFound(msg) => write!(f, "device not found: {}", msg),
            Error::NotStarted => write!(f, "pipeline not started"),
            Error::Timeout { operation, timeout } => {
                write!(f, "{} timed out after {:?}", operation, timeout)
            }
            Error::NotFound(what) => write!(f, "not found: {}", what),
            Error::NotSupported(what) => write!(f, "not supported: {}", what),
            Error::Native(err) => write!(f, "{}", err),
            Error::Closed(what) => write!(f, "{} already closed", what),
            Error::SessionClosed => write!(f, "session closed"),
            Error::InvalidFrame(msg) => write!(f, "invalid frame: {}", msg),
            Error::Library(err) => write!(f, "cannot load librealsense2: {}", err),
        }
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        Error::Native(err)
    }
}

impl From<libloading::Error> for Error {
    fn from(err: libloading::Error) -> Self {
        Error::Library(err)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_display() {
        let err = NativeError::new(
            NativeErrorKind::InvalidValue,
            "out of range value for argument \"value\"",
            "rs2_set_option",
            "options:0x1, option:Exposure, value:-1",
        );
        assert_eq!(
            err.to_string(),
            "realsense error: out of range value for argument \"value\" \
             (in rs2_set_option(options:0x1, option:Exposure, value:-1))"
        );
    }

    #[test]
    fn test_is_timeout() {
        let err = Error::Timeout {
            operation: "wait_for_frames",
            timeout: Duration::from_millis(5000),
        };
        assert!(err.is_timeout());
        assert!(!Error::NotStarted.is_timeout());
        assert_eq!(err.to_string(), "wait_for_frames timed out after 5s");
    }
}
