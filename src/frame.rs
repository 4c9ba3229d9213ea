// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Reference counted frames and frame sets.
//!
//! A [`Frame`] or [`FrameSet`] owns exactly one driver reference and gives it
//! back exactly once, on [`Frame::close`] or when dropped. Buffers borrowed
//! from a frame cannot outlive it.

use crate::{
    config::{format_name, StreamKind},
    driver::{Driver, FrameGeometry, RawFrame},
    error::{Error, Result},
};
use std::{fmt, slice, sync::Arc};
use tracing::trace;

/// Clock a frame timestamp was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampDomain {
    HardwareClock,
    SystemTime,
    GlobalTime,
}

impl TimestampDomain {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            rs2_sys::RS2_TIMESTAMP_DOMAIN_HARDWARE_CLOCK => Some(Self::HardwareClock),
            rs2_sys::RS2_TIMESTAMP_DOMAIN_SYSTEM_TIME => Some(Self::SystemTime),
            rs2_sys::RS2_TIMESTAMP_DOMAIN_GLOBAL_TIME => Some(Self::GlobalTime),
            _ => None,
        }
    }
}

impl fmt::Display for TimestampDomain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::HardwareClock => "Hardware Clock",
            Self::SystemTime => "System Time",
            Self::GlobalTime => "Global Time",
        };
        f.write_str(name)
    }
}

/// One owned driver reference.
struct FrameRef {
    driver: Arc<dyn Driver>,
    raw: Option<RawFrame>,
}

impl FrameRef {
    fn raw(&self) -> Result<RawFrame> {
        self.raw.ok_or(Error::Closed("frame"))
    }

    fn try_clone(&self) -> Result<Self> {
        let raw = self.raw()?;
        self.driver.frame_add_ref(raw)?;
        Ok(Self {
            driver: self.driver.clone(),
            raw: Some(raw),
        })
    }

    fn close(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.driver.release_frame(raw);
            trace!("frame released");
        }
    }
}

impl Drop for FrameRef {
    fn drop(&mut self) {
        self.close();
    }
}

/// A single image from one stream.
pub struct Frame {
    inner: FrameRef,
}

impl Frame {
    /// Takes ownership of one reference to `raw`.
    pub(crate) fn from_raw(driver: Arc<dyn Driver>, raw: RawFrame) -> Self {
        Self {
            inner: FrameRef {
                driver,
                raw: Some(raw),
            },
        }
    }

    pub(crate) fn raw(&self) -> Result<RawFrame> {
        self.inner.raw()
    }

    pub fn geometry(&self) -> Result<FrameGeometry> {
        Ok(self.inner.driver.frame_geometry(self.raw()?)?)
    }

    pub fn width(&self) -> Result<u32> {
        Ok(self.geometry()?.width)
    }

    pub fn height(&self) -> Result<u32> {
        Ok(self.geometry()?.height)
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> Result<u32> {
        Ok(self.geometry()?.stride)
    }

    pub fn bits_per_pixel(&self) -> Result<u32> {
        Ok(self.geometry()?.bits_per_pixel)
    }

    /// Stream this frame belongs to.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] if the device reports a stream kind this crate
    /// does not model.
    pub fn stream_kind(&self) -> Result<StreamKind> {
        let profile = self.inner.driver.frame_profile(self.raw()?)?;
        StreamKind::try_from(profile.stream)
            .map_err(|raw| Error::NotSupported(format!("stream kind {}", raw)))
    }

    /// Pixel format name, e.g. `Z16` or `RGB8`.
    pub fn format_name(&self) -> Result<&'static str> {
        let profile = self.inner.driver.frame_profile(self.raw()?)?;
        Ok(format_name(profile.format))
    }

    /// Capture time in milliseconds.
    pub fn timestamp(&self) -> Result<f64> {
        Ok(self.inner.driver.frame_timestamp(self.raw()?)?.0)
    }

    pub fn timestamp_domain(&self) -> Result<TimestampDomain> {
        Ok(self.inner.driver.frame_timestamp(self.raw()?)?.1)
    }

    pub fn frame_number(&self) -> Result<u64> {
        Ok(self.inner.driver.frame_number(self.raw()?)?)
    }

    /// The frame buffer, `stride * height` bytes.
    pub fn raw_bytes(&self) -> Result<&[u8]> {
        let raw = self.raw()?;
        let geometry = self.inner.driver.frame_geometry(raw)?;
        let len = geometry.len();
        if len == 0 {
            return Ok(&[]);
        }
        let data = self.inner.driver.frame_data(raw)?;
        if data.is_null() {
            return Err(Error::InvalidFrame("frame has no data".to_owned()));
        }
        // The driver keeps the buffer alive while this frame holds its
        // reference, and the borrow ties the slice to `self`.
        Ok(unsafe { slice::from_raw_parts(data, len) })
    }

    /// The first `width * height` 16-bit samples of the buffer, row-major.
    ///
    /// Rows are assumed to be tightly packed (stride of `width * 2`). With a
    /// padded stride the slice still has `width * height` elements but rows
    /// no longer start at multiples of `width`; use [`Frame::depth_at`] there.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFrame`] if the frame is not 16 bits per pixel, the
    /// buffer is not 2-byte aligned or it holds fewer than `width * height`
    /// samples.
    pub fn depth_samples(&self) -> Result<&[u16]> {
        let geometry = self.geometry()?;
        let samples = self.padded_samples(&geometry)?;
        let len = geometry.width as usize * geometry.height as usize;
        samples.get(..len).ok_or_else(|| {
            Error::InvalidFrame(format!(
                "buffer of {} samples shorter than {}x{} frame",
                samples.len(),
                geometry.width,
                geometry.height
            ))
        })
    }

    /// Depth sample at column `x`, row `y`, honoring the row stride.
    pub fn depth_at(&self, x: u32, y: u32) -> Result<u16> {
        let geometry = self.geometry()?;
        if x >= geometry.width || y >= geometry.height {
            return Err(Error::InvalidFrame(format!(
                "pixel {}x{} outside {}x{} frame",
                x, y, geometry.width, geometry.height
            )));
        }
        let samples = self.padded_samples(&geometry)?;
        let row = geometry.stride as usize / 2;
        samples
            .get(y as usize * row + x as usize)
            .copied()
            .ok_or_else(|| Error::InvalidFrame(format!("pixel {}x{} outside buffer", x, y)))
    }

    /// Whole buffer as 16-bit samples, row padding included.
    fn padded_samples(&self, geometry: &FrameGeometry) -> Result<&[u16]> {
        if geometry.bits_per_pixel != 16 {
            return Err(Error::InvalidFrame(format!(
                "expected 16 bits per pixel, frame has {}",
                geometry.bits_per_pixel
            )));
        }
        if geometry.stride % 2 != 0 || (geometry.stride / 2) < geometry.width {
            return Err(Error::InvalidFrame(format!(
                "stride {} does not hold {} 16-bit samples",
                geometry.stride, geometry.width
            )));
        }
        let bytes = self.raw_bytes()?;
        if bytes.is_empty() {
            return Ok(&[]);
        }
        if bytes.as_ptr().align_offset(std::mem::align_of::<u16>()) != 0 {
            return Err(Error::InvalidFrame("depth buffer is not aligned".to_owned()));
        }
        Ok(unsafe { slice::from_raw_parts(bytes.as_ptr().cast::<u16>(), bytes.len() / 2) })
    }

    /// Adds a reference, returning an independent handle to the same frame.
    pub fn try_clone(&self) -> Result<Frame> {
        Ok(Self {
            inner: self.inner.try_clone()?,
        })
    }

    /// Releases the reference; later calls are no-ops.
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.raw.is_none()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Frame").field("raw", &self.inner.raw).finish()
    }
}

/// Synchronized frames captured together, one per active stream.
pub struct FrameSet {
    inner: FrameRef,
}

impl FrameSet {
    /// Takes ownership of one reference to `raw`.
    pub(crate) fn from_raw(driver: Arc<dyn Driver>, raw: RawFrame) -> Self {
        Self {
            inner: FrameRef {
                driver,
                raw: Some(raw),
            },
        }
    }

    pub(crate) fn raw(&self) -> Result<RawFrame> {
        self.inner.raw()
    }

    /// Number of frames in the set.
    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.driver.embedded_frames_count(self.raw()?)?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// First frame of stream `kind`, or the first frame of the set for
    /// [`StreamKind::Any`].
    ///
    /// Frames inspected and rejected along the way are released before
    /// returning, so the set's reference counts are unchanged except for the
    /// one reference owned by the returned frame.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the set has no frame of that stream, which
    /// happens with partial captures.
    pub fn frame(&self, kind: StreamKind) -> Result<Frame> {
        let raw = self.raw()?;
        let driver = &self.inner.driver;
        let count = driver.embedded_frames_count(raw)?;
        for index in 0..count {
            let candidate = Frame::from_raw(driver.clone(), driver.extract_frame(raw, index)?);
            if kind == StreamKind::Any {
                return Ok(candidate);
            }
            match candidate.stream_kind() {
                Ok(stream) if stream == kind => return Ok(candidate),
                Ok(_) => {}
                Err(err) => trace!("skipping frame {}: {}", index, err),
            }
        }
        Err(Error::NotFound(format!("no {} frame in frame set", kind)))
    }

    pub fn depth_frame(&self) -> Result<Frame> {
        self.frame(StreamKind::Depth)
    }

    pub fn color_frame(&self) -> Result<Frame> {
        self.frame(StreamKind::Color)
    }

    /// Every frame of the set, each holding its own reference.
    pub fn frames(&self) -> Result<Vec<Frame>> {
        let raw = self.raw()?;
        let driver = &self.inner.driver;
        let count = driver.embedded_frames_count(raw)?;
        (0..count)
            .map(|index| Ok(Frame::from_raw(driver.clone(), driver.extract_frame(raw, index)?)))
            .collect()
    }

    pub fn try_clone(&self) -> Result<FrameSet> {
        Ok(Self {
            inner: self.inner.try_clone()?,
        })
    }

    /// Releases the reference; later calls are no-ops.
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.raw.is_none()
    }
}

impl fmt::Debug for FrameSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FrameSet").field("raw", &self.inner.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticDriver;

    #[test]
    fn test_depth_samples() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let frame = driver.depth_frame(4, 3, |x, y| (y * 10 + x) as u16);
        assert_eq!(frame.stream_kind()?, StreamKind::Depth);
        assert_eq!(frame.format_name()?, "Z16");
        assert_eq!(frame.raw_bytes()?.len(), 4 * 3 * 2);
        assert_eq!(frame.depth_samples()?.len(), 12);
        assert_eq!(frame.depth_at(3, 2)?, 23);
        assert!(frame.depth_at(4, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_padded_depth_samples() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let frame = driver.padded_depth_frame(3, 2, 8, |x, y| (y * 10 + x) as u16 + 1);
        assert_eq!(frame.stride()?, 8);
        assert_eq!(frame.raw_bytes()?.len(), 16);

        let samples = frame.depth_samples()?;
        assert_eq!(samples.len(), 3 * 2);
        assert_eq!(samples, &[1, 2, 3, 0, 11, 12]);
        assert_eq!(frame.depth_at(2, 1)?, 13);
        assert!(frame.depth_at(3, 1).is_err());
        Ok(())
    }

    #[test]
    fn test_clone_and_close() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let mut frame = driver.depth_frame(2, 2, |_, _| 1000);
        let copy = frame.try_clone()?;
        assert_eq!(driver.frame_refs(&frame), Some(2));

        frame.close();
        frame.close();
        assert!(frame.is_closed());
        assert!(matches!(frame.width(), Err(Error::Closed("frame"))));
        assert_eq!(copy.width()?, 2);

        drop(copy);
        assert_eq!(driver.live_frames(), 0);
        assert_eq!(driver.invalid_releases(), 0);
        Ok(())
    }

    #[test]
    fn test_timestamp_domain() {
        assert_eq!(
            TimestampDomain::from_raw(rs2_sys::RS2_TIMESTAMP_DOMAIN_SYSTEM_TIME),
            Some(TimestampDomain::SystemTime)
        );
        assert_eq!(TimestampDomain::from_raw(9), None);
    }
}
