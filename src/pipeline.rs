// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Streaming pipeline.

use crate::{
    config::Config,
    device::Device,
    driver::{Driver, RawPipeline},
    error::{Error, NativeError, NativeErrorKind, Result},
    frame::FrameSet,
    session::Session,
};
use std::{fmt, time::Duration};
use tracing::{debug, info, instrument, warn};

/// Default bound for [`Pipeline::wait_for_frames`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Lifecycle of a [`Pipeline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Started,
    Stopped,
    Closed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Streams synchronized frame sets from a device.
///
/// ```no_run
/// # use edgefirst_realsense::{Config, Format, Pipeline, Session, StreamKind};
/// # use std::time::Duration;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::new()?;
/// let mut config = Config::new(&session)?;
/// config.enable_stream(StreamKind::Depth, 640, 480, 30, Format::Z16)?;
///
/// let mut pipeline = Pipeline::new(&session)?;
/// pipeline.start(Some(&config))?;
/// let frames = pipeline.wait_for_frames(Duration::from_secs(5))?;
/// let depth = frames.depth_frame()?;
/// println!("{}x{}", depth.width()?, depth.height()?);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    session: Session,
    raw: Option<RawPipeline>,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(session: &Session) -> Result<Self> {
        let context = session.context()?;
        let raw = session.driver().create_pipeline(context)?;
        debug!("pipeline created");
        Ok(Self {
            session: session.clone(),
            raw: Some(raw),
            state: PipelineState::Created,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn driver(&self) -> &dyn Driver {
        self.session.driver().as_ref()
    }

    fn raw(&self) -> Result<RawPipeline> {
        self.session.ensure_open()?;
        self.raw.ok_or(Error::Closed("pipeline"))
    }

    /// Starts streaming with `config`, or the device defaults with `None`.
    ///
    /// Starting a started pipeline stops it first.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceNotFound`] when no device is attached and
    /// [`Error::Configuration`] when the requested streams cannot be
    /// satisfied. The pipeline is left stopped on failure.
    pub fn start(&mut self, config: Option<&Config>) -> Result<()> {
        let raw = self.raw()?;
        if self.state == PipelineState::Started {
            self.stop();
        }
        let config = config.map(Config::raw).transpose()?;

        let profile = self
            .driver()
            .pipeline_start(raw, config)
            .map_err(start_error)?;
        self.driver().delete_profile(profile);

        self.state = PipelineState::Started;
        info!("pipeline started");
        Ok(())
    }

    /// Blocks until the next frame set or until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`Error::NotStarted`] before [`Pipeline::start`] and
    /// [`Error::Timeout`] when no frames arrive in time, which is transient.
    #[instrument(skip_all, level = "trace")]
    pub fn wait_for_frames(&mut self, timeout: Duration) -> Result<FrameSet> {
        let raw = self.raw()?;
        if self.state != PipelineState::Started {
            return Err(Error::NotStarted);
        }
        match self.driver().pipeline_wait_for_frames(raw, timeout)? {
            Some(frames) => Ok(FrameSet::from_raw(self.session.driver().clone(), frames)),
            None => Err(Error::Timeout {
                operation: "wait_for_frames",
                timeout,
            }),
        }
    }

    /// Stops streaming; a no-op unless started. Failures are logged.
    pub fn stop(&mut self) {
        if self.state != PipelineState::Started {
            return;
        }
        if let Some(raw) = self.raw {
            if let Err(err) = self.driver().pipeline_stop(raw) {
                warn!("pipeline stop failed: {}", err);
            }
        }
        self.state = PipelineState::Stopped;
        info!("pipeline stopped");
    }

    /// The streaming device.
    ///
    /// # Errors
    ///
    /// [`Error::NotStarted`] unless the pipeline is started.
    pub fn device(&self) -> Result<Device> {
        let raw = self.raw()?;
        if self.state != PipelineState::Started {
            return Err(Error::NotStarted);
        }
        let driver = self.driver();
        let profile = driver.pipeline_active_profile(raw)?;
        let device = driver.profile_device(profile);
        driver.delete_profile(profile);
        Ok(Device::from_raw(self.session.clone(), device?))
    }

    /// Stops and releases the pipeline; later calls are no-ops.
    pub fn close(&mut self) {
        self.stop();
        if let Some(raw) = self.raw.take() {
            self.session.driver().delete_pipeline(raw);
            self.state = PipelineState::Closed;
            debug!("pipeline closed");
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.close();
    }
}

fn start_error(err: NativeError) -> Error {
    match err.kind {
        NativeErrorKind::NoDevice | NativeErrorKind::CameraDisconnected => {
            Error::DeviceNotFound(err.message)
        }
        NativeErrorKind::UnresolvedRequest | NativeErrorKind::InvalidValue => {
            Error::Configuration(err)
        }
        _ => Error::Native(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticDriver;
    use std::sync::Arc;

    #[test]
    fn test_start_error_mapping() {
        let err = NativeError::new(
            NativeErrorKind::NoDevice,
            "No device connected",
            "rs2_pipeline_start",
            "",
        );
        assert!(matches!(start_error(err), Error::DeviceNotFound(_)));

        let err = NativeError::new(
            NativeErrorKind::UnresolvedRequest,
            "Couldn't resolve requests",
            "rs2_pipeline_start_with_config",
            "",
        );
        assert!(matches!(start_error(err), Error::Configuration(_)));
    }

    #[test]
    fn test_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let session = Session::with_driver(driver.clone())?;
        let mut pipeline = Pipeline::new(&session)?;
        assert_eq!(pipeline.state(), PipelineState::Created);
        assert!(matches!(
            pipeline.wait_for_frames(Duration::from_millis(10)),
            Err(Error::NotStarted)
        ));

        pipeline.start(None)?;
        assert_eq!(pipeline.state(), PipelineState::Started);
        pipeline.start(None)?;
        assert_eq!(pipeline.state(), PipelineState::Started);

        pipeline.stop();
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        pipeline.close();
        pipeline.close();
        assert_eq!(pipeline.state(), PipelineState::Closed);
        assert!(matches!(pipeline.start(None), Err(Error::Closed("pipeline"))));
        Ok(())
    }
}
