// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame processing stages.
//!
//! Each stage pairs a native processing block with a single-slot output
//! queue. Processing a frame submits it, then waits on the queue for the
//! result. The caller's input is never consumed: the stage takes its own
//! reference before submitting, and the block consumes that one.

use crate::{
    config::StreamKind,
    driver::{Driver, OptionsTarget, RawBlock, RawFrame, RawQueue},
    error::{Error, Result},
    frame::{Frame, FrameSet},
    options::Options,
    session::Session,
};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};

/// Default bound on how long a stage waits for its output.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

const QUEUE_CAPACITY: usize = 1;

/// Processing block type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    /// Reduces resolution by an integer factor (option `FILTER_MAGNITUDE`).
    Decimation,
    /// Edge-preserving spatial smoothing.
    Spatial,
    /// Smoothing across consecutive frames.
    Temporal,
    /// Fills invalid (zero) depth pixels.
    HoleFilling,
    /// Maps depth to an RGB8 visualization.
    Colorizer,
    /// Reprojects the frames of a set onto the given stream's viewpoint.
    Align(StreamKind),
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Decimation => f.write_str("decimation"),
            Self::Spatial => f.write_str("spatial"),
            Self::Temporal => f.write_str("temporal"),
            Self::HoleFilling => f.write_str("hole filling"),
            Self::Colorizer => f.write_str("colorizer"),
            Self::Align(to) => write!(f, "align to {}", to),
        }
    }
}

struct Stage {
    driver: Arc<dyn Driver>,
    kind: StageKind,
    block: Option<RawBlock>,
    queue: Option<RawQueue>,
    timeout: Duration,
}

impl Stage {
    fn new(session: &Session, kind: StageKind) -> Result<Self> {
        session.ensure_open()?;
        let driver = session.driver().clone();
        let block = driver.create_block(kind)?;
        let queue = match driver.create_queue(QUEUE_CAPACITY) {
            Ok(queue) => queue,
            Err(err) => {
                driver.delete_block(block);
                return Err(err.into());
            }
        };
        if let Err(err) = driver.start_processing_queue(block, queue) {
            driver.delete_block(block);
            driver.delete_queue(queue);
            return Err(err.into());
        }
        debug!("{} stage created", kind);
        Ok(Self {
            driver,
            kind,
            block: Some(block),
            queue: Some(queue),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    fn handles(&self) -> Result<(RawBlock, RawQueue)> {
        match (self.block, self.queue) {
            (Some(block), Some(queue)) => Ok((block, queue)),
            _ => Err(Error::Closed("processing stage")),
        }
    }

    /// Submits `input` and returns one owned reference to the output.
    fn submit(&mut self, input: RawFrame) -> Result<RawFrame> {
        let (block, queue) = self.handles()?;

        // Output left behind by an earlier timed out call would otherwise be
        // returned in place of this frame's result.
        while let Some(stale) = self.driver.poll_for_frame(queue)? {
            warn!("{} stage discarding stale output", self.kind);
            self.driver.release_frame(stale);
        }

        self.driver.frame_add_ref(input)?;
        self.driver.process_frame(block, input)?;

        match self.driver.wait_for_frame(queue, self.timeout)? {
            Some(output) => Ok(output),
            None => Err(Error::Timeout {
                operation: "process",
                timeout: self.timeout,
            }),
        }
    }

    fn close(&mut self) {
        if self.block.is_none() && self.queue.is_none() {
            return;
        }
        if let Some(block) = self.block.take() {
            self.driver.delete_block(block);
        }
        if let Some(queue) = self.queue.take() {
            self.driver.delete_queue(queue);
        }
        debug!("{} stage closed", self.kind);
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        self.close();
    }
}

/// Single-frame processing stage: decimation, smoothing, hole filling or
/// colorizing.
///
/// # Example
///
/// ```no_run
/// # use edgefirst_realsense::{Filter, Options, OptionId, Session};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::new()?;
/// let mut decimate = Filter::decimation(&session)?;
/// decimate.set_option(OptionId::FILTER_MAGNITUDE, 4.0)?;
/// # Ok(())
/// # }
/// ```
pub struct Filter {
    stage: Stage,
}

impl Filter {
    /// Creates a stage of `kind`.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] for [`StageKind::Align`], which processes
    /// frame sets and is built with [`Align::new`].
    pub fn new(session: &Session, kind: StageKind) -> Result<Self> {
        if let StageKind::Align(_) = kind {
            return Err(Error::NotSupported(
                "align operates on frame sets, use Align".to_owned(),
            ));
        }
        Ok(Self {
            stage: Stage::new(session, kind)?,
        })
    }

    pub fn decimation(session: &Session) -> Result<Self> {
        Self::new(session, StageKind::Decimation)
    }

    pub fn spatial(session: &Session) -> Result<Self> {
        Self::new(session, StageKind::Spatial)
    }

    pub fn temporal(session: &Session) -> Result<Self> {
        Self::new(session, StageKind::Temporal)
    }

    pub fn hole_filling(session: &Session) -> Result<Self> {
        Self::new(session, StageKind::HoleFilling)
    }

    pub fn colorizer(session: &Session) -> Result<Self> {
        Self::new(session, StageKind::Colorizer)
    }

    /// Replaces the output wait bound, [`DEFAULT_TIMEOUT`] otherwise.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stage.timeout = timeout;
        self
    }

    pub fn kind(&self) -> StageKind {
        self.stage.kind
    }

    pub fn timeout(&self) -> Duration {
        self.stage.timeout
    }

    /// Processes `frame` into a new frame.
    ///
    /// `frame` stays valid and unchanged; the output holds its own reference.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when no output arrives within the stage timeout.
    #[instrument(skip_all, fields(stage = %self.stage.kind))]
    pub fn process(&mut self, frame: &Frame) -> Result<Frame> {
        let output = self.stage.submit(frame.raw()?)?;
        Ok(Frame::from_raw(self.stage.driver.clone(), output))
    }

    /// Releases the native block and queue; later calls are no-ops.
    pub fn close(&mut self) {
        self.stage.close();
    }
}

impl Options for Filter {
    fn options_target(&self) -> Result<OptionsTarget> {
        Ok(OptionsTarget::Block(self.stage.handles()?.0))
    }

    fn options_driver(&self) -> &dyn Driver {
        self.stage.driver.as_ref()
    }
}

/// Aligns every frame of a set to the viewpoint of one stream.
pub struct Align {
    stage: Stage,
    to: StreamKind,
}

impl Align {
    pub fn new(session: &Session, to: StreamKind) -> Result<Self> {
        Ok(Self {
            stage: Stage::new(session, StageKind::Align(to))?,
            to,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.stage.timeout = timeout;
        self
    }

    /// Stream the output is aligned to.
    pub fn align_to(&self) -> StreamKind {
        self.to
    }

    /// Produces an aligned frame set; `frames` stays valid and unchanged.
    #[instrument(skip_all, fields(stage = %self.stage.kind))]
    pub fn process(&mut self, frames: &FrameSet) -> Result<FrameSet> {
        let output = self.stage.submit(frames.raw()?)?;
        Ok(FrameSet::from_raw(self.stage.driver.clone(), output))
    }

    pub fn close(&mut self) {
        self.stage.close();
    }
}

impl Options for Align {
    fn options_target(&self) -> Result<OptionsTarget> {
        Ok(OptionsTarget::Block(self.stage.handles()?.0))
    }

    fn options_driver(&self) -> &dyn Driver {
        self.stage.driver.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::OptionId, synthetic::SyntheticDriver};

    #[test]
    fn test_decimation_halves() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let session = Session::with_driver(driver.clone())?;
        let mut decimate = Filter::decimation(&session)?;
        assert_eq!(decimate.get_option(OptionId::FILTER_MAGNITUDE)?, 2.0);

        let frame = driver.depth_frame(640, 480, |_, _| 1000);
        let output = decimate.process(&frame)?;
        assert_eq!(output.width()?, 320);
        assert_eq!(output.height()?, 240);
        assert_eq!(frame.width()?, 640);
        assert_eq!(driver.frame_refs(&frame), Some(1));
        Ok(())
    }

    #[test]
    fn test_align_rejected_by_filter() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let session = Session::with_driver(driver)?;
        assert!(matches!(
            Filter::new(&session, StageKind::Align(StreamKind::Color)),
            Err(Error::NotSupported(_))
        ));
        Ok(())
    }

    #[test]
    fn test_closed_stage() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let session = Session::with_driver(driver.clone())?;
        let mut colorize = Filter::colorizer(&session)?;
        colorize.close();
        colorize.close();

        let frame = driver.depth_frame(4, 4, |_, _| 500);
        assert!(matches!(
            colorize.process(&frame),
            Err(Error::Closed("processing stage"))
        ));
        assert!(colorize.supports(OptionId::COLOR_SCHEME).is_err());
        Ok(())
    }

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::HoleFilling.to_string(), "hole filling");
        assert_eq!(
            StageKind::Align(StreamKind::Color).to_string(),
            "align to Color"
        );
    }
}
