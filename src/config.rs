// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Stream requests applied when a [`crate::Pipeline`] starts.

use crate::{
    driver::{Driver, RawConfig},
    error::{Error, Result},
    session::Session,
};
use rs2_sys::*;
use serde::Serialize;
use std::{fmt, sync::Arc};
use tracing::debug;

/// Kind of data stream produced by a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
pub enum StreamKind {
    Any,
    Depth,
    Color,
    Infrared,
    Fisheye,
    Gyro,
    Accel,
}

impl StreamKind {
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Any => RS2_STREAM_ANY,
            Self::Depth => RS2_STREAM_DEPTH,
            Self::Color => RS2_STREAM_COLOR,
            Self::Infrared => RS2_STREAM_INFRARED,
            Self::Fisheye => RS2_STREAM_FISHEYE,
            Self::Gyro => RS2_STREAM_GYRO,
            Self::Accel => RS2_STREAM_ACCEL,
        }
    }

    /// Motion streams carry samples rather than images.
    pub fn is_motion(self) -> bool {
        matches!(self, Self::Gyro | Self::Accel)
    }
}

impl TryFrom<i32> for StreamKind {
    type Error = i32;

    fn try_from(raw: i32) -> Result<Self, i32> {
        let kind = match raw {
            RS2_STREAM_ANY => Self::Any,
            RS2_STREAM_DEPTH => Self::Depth,
            RS2_STREAM_COLOR => Self::Color,
            RS2_STREAM_INFRARED => Self::Infrared,
            RS2_STREAM_FISHEYE => Self::Fisheye,
            RS2_STREAM_GYRO => Self::Gyro,
            RS2_STREAM_ACCEL => Self::Accel,
            other => return Err(other),
        };
        Ok(kind)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Pixel format accepted when enabling a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Format {
    /// Let the device choose.
    Any,
    /// 16-bit depth in device units.
    Z16,
    /// 8-bit interleaved red, green, blue.
    Rgb8,
}

impl Format {
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Any => RS2_FORMAT_ANY,
            Self::Z16 => RS2_FORMAT_Z16,
            Self::Rgb8 => RS2_FORMAT_RGB8,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(format_name(self.as_raw()))
    }
}

/// Name of a raw driver pixel format.
pub fn format_name(raw: i32) -> &'static str {
    match raw {
        RS2_FORMAT_ANY => "ANY",
        RS2_FORMAT_Z16 => "Z16",
        RS2_FORMAT_DISPARITY16 => "DISPARITY16",
        RS2_FORMAT_XYZ32F => "XYZ32F",
        RS2_FORMAT_YUYV => "YUYV",
        RS2_FORMAT_RGB8 => "RGB8",
        RS2_FORMAT_BGR8 => "BGR8",
        RS2_FORMAT_RGBA8 => "RGBA8",
        RS2_FORMAT_BGRA8 => "BGRA8",
        RS2_FORMAT_Y8 => "Y8",
        RS2_FORMAT_Y16 => "Y16",
        RS2_FORMAT_RAW10 => "RAW10",
        RS2_FORMAT_RAW16 => "RAW16",
        RS2_FORMAT_RAW8 => "RAW8",
        RS2_FORMAT_UYVY => "UYVY",
        RS2_FORMAT_MOTION_RAW => "MOTION_RAW",
        RS2_FORMAT_MOTION_XYZ32F => "MOTION_XYZ32F",
        _ => "UNKNOWN",
    }
}

/// One enabled stream. Zero width, height or fps means "any".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    pub stream: StreamKind,
    pub index: i32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: Format,
}

/// Set of stream requests.
///
/// Requests are only validated against the device when the pipeline starts,
/// so [`Config::enable_stream`] accepts any combination.
pub struct Config {
    driver: Arc<dyn Driver>,
    raw: Option<RawConfig>,
    requests: Vec<StreamRequest>,
}

impl Config {
    pub fn new(session: &Session) -> Result<Self> {
        session.ensure_open()?;
        let driver = session.driver().clone();
        let raw = driver.create_config()?;
        debug!("config created");
        Ok(Self {
            driver,
            raw: Some(raw),
            requests: Vec::new(),
        })
    }

    /// Requests `stream` at the given size, rate and format.
    ///
    /// Enabling a stream that is already enabled replaces its request.
    pub fn enable_stream(
        &mut self,
        stream: StreamKind,
        width: u32,
        height: u32,
        fps: u32,
        format: Format,
    ) -> Result<&mut Self> {
        let raw = self.raw()?;
        let request = StreamRequest {
            stream,
            index: 0,
            width,
            height,
            fps,
            format,
        };
        self.driver.config_enable_stream(raw, &request)?;
        self.requests
            .retain(|r| r.stream != stream || r.index != request.index);
        self.requests.push(request);
        debug!(
            "enabled {} stream {}x{}@{} {}",
            stream, width, height, fps, format
        );
        Ok(self)
    }

    /// Streams requested so far, in the order they were enabled.
    pub fn requests(&self) -> &[StreamRequest] {
        &self.requests
    }

    pub(crate) fn raw(&self) -> Result<RawConfig> {
        self.raw.ok_or(Error::Closed("config"))
    }

    /// Releases the native config; later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.driver.delete_config(raw);
            debug!("config closed");
        }
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticDriver;

    #[test]
    fn test_stream_kind_raw() {
        for kind in [
            StreamKind::Any,
            StreamKind::Depth,
            StreamKind::Color,
            StreamKind::Infrared,
            StreamKind::Fisheye,
            StreamKind::Gyro,
            StreamKind::Accel,
        ] {
            assert_eq!(StreamKind::try_from(kind.as_raw()), Ok(kind));
        }
        assert_eq!(StreamKind::try_from(42), Err(42));
        assert_eq!(StreamKind::Depth.to_string(), "Depth");
    }

    #[test]
    fn test_format_names() {
        assert_eq!(Format::Z16.to_string(), "Z16");
        assert_eq!(Format::Rgb8.to_string(), "RGB8");
        assert_eq!(format_name(RS2_FORMAT_Y8), "Y8");
        assert_eq!(format_name(-1), "UNKNOWN");
    }

    #[test]
    fn test_enable_replaces() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let session = Session::with_driver(driver.clone())?;
        let mut config = Config::new(&session)?;
        config
            .enable_stream(StreamKind::Depth, 640, 480, 30, Format::Z16)?
            .enable_stream(StreamKind::Color, 640, 480, 30, Format::Rgb8)?
            .enable_stream(StreamKind::Depth, 848, 480, 30, Format::Z16)?;
        assert_eq!(config.requests().len(), 2);
        assert_eq!(config.requests()[1].width, 848);

        config.close();
        config.close();
        assert!(matches!(
            config.enable_stream(StreamKind::Depth, 0, 0, 0, Format::Any),
            Err(Error::Closed("config"))
        ));
        Ok(())
    }
}
