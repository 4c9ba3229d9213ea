// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! C ABI for host applications.
//!
//! A host process drives a single process-wide session through five calls:
//!
//! | Function | Success | Failure codes |
//! |----------|---------|---------------|
//! | `JM_Init` | 0 | -1 context, -2 pipeline, -3 config |
//! | `JM_StartStream` | 0 | -1 not initialized, -2 device or stream |
//! | `JM_WaitForFrames` | 0 | -1 not initialized, -2 stream, -3 buffer |
//! | `JM_GetTelemetry` | 0 | -1 not initialized, -2 device, -3 null info |
//! | `JM_Close` | | |
//!
//! `JM_WaitForFrames` copies tightly packed RGB8 (3 bytes per pixel) and Z16
//! (2 bytes per pixel) images of the size passed to `JM_StartStream`. Either
//! buffer may be null to skip that stream.

use crate::{
    config::{Config, Format, StreamKind},
    device::TelemetryData,
    driver::Driver,
    error::Error,
    frame::Frame,
    native::NativeDriver,
    pipeline::Pipeline,
    session::Session,
};
use libc::{c_char, c_int};
use std::{
    slice,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tracing::{debug, error, info, warn};

pub const JM_OK: c_int = 0;
pub const JM_ERR_CONTEXT: c_int = -1;
pub const JM_ERR_PIPELINE: c_int = -2;
pub const JM_ERR_CONFIG: c_int = -3;
pub const JM_ERR_NOT_INITIALIZED: c_int = -1;
pub const JM_ERR_DEVICE: c_int = -2;
pub const JM_ERR_BUFFER: c_int = -3;

const USB_TYPE_LEN: usize = 32;

/// Telemetry snapshot in host layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TelemetryInfo {
    pub asic_temp: f32,
    pub projector_temp: f32,
    pub sync_mode: f32,
    /// NUL terminated USB type descriptor.
    pub usb_type: [c_char; USB_TYPE_LEN],
}

impl Default for TelemetryInfo {
    fn default() -> Self {
        Self {
            asic_temp: 0.0,
            projector_temp: 0.0,
            sync_mode: 0.0,
            usb_type: [0; USB_TYPE_LEN],
        }
    }
}

impl TelemetryInfo {
    /// Copies `usb_type`, truncated to fit with its terminator.
    pub fn set_usb_type(&mut self, usb_type: &str) {
        self.usb_type = [0; USB_TYPE_LEN];
        for (dst, src) in self
            .usb_type
            .iter_mut()
            .zip(usb_type.bytes().take(USB_TYPE_LEN - 1))
        {
            *dst = src as c_char;
        }
    }

    pub fn usb_type(&self) -> String {
        let bytes: Vec<u8> = self
            .usb_type
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Session, pipeline and config owned on behalf of a host.
pub struct HostSession {
    // Dropped in declaration order: pipeline and config before the session.
    pipeline: Pipeline,
    config: Config,
    session: Session,
    stream: Option<(u32, u32)>,
}

impl HostSession {
    /// Opens a session on `driver`, returning the failure status otherwise.
    pub fn init(driver: Arc<dyn Driver>) -> Result<Self, c_int> {
        let session = Session::with_driver(driver).map_err(|err| {
            error!("cannot create context: {}", err);
            JM_ERR_CONTEXT
        })?;
        let pipeline = Pipeline::new(&session).map_err(|err| {
            error!("cannot create pipeline: {}", err);
            JM_ERR_PIPELINE
        })?;
        let config = Config::new(&session).map_err(|err| {
            error!("cannot create config: {}", err);
            JM_ERR_CONFIG
        })?;
        Ok(Self {
            pipeline,
            config,
            session,
            stream: None,
        })
    }

    /// Enables depth (Z16) and color (RGB8) at one size and rate, and starts.
    pub fn start_stream(&mut self, width: u32, height: u32, fps: u32) -> c_int {
        let enabled = self
            .config
            .enable_stream(StreamKind::Depth, width, height, fps, Format::Z16)
            .and_then(|config| {
                config.enable_stream(StreamKind::Color, width, height, fps, Format::Rgb8)
            });
        if let Err(err) = enabled {
            error!("cannot enable streams: {}", err);
            return JM_ERR_DEVICE;
        }
        if let Err(err) = self.pipeline.start(Some(&self.config)) {
            error!("cannot start stream {}x{}@{}: {}", width, height, fps, err);
            self.stream = None;
            return JM_ERR_DEVICE;
        }
        self.stream = Some((width, height));
        info!("streaming {}x{}@{}", width, height, fps);
        JM_OK
    }

    /// Size passed to the last successful [`HostSession::start_stream`].
    pub fn stream_size(&self) -> Option<(u32, u32)> {
        self.stream
    }

    /// Waits for a frame set and copies its color and depth images.
    ///
    /// A stream missing from the set leaves its buffer untouched.
    pub fn wait_for_frames(
        &mut self,
        rgb: Option<&mut [u8]>,
        depth: Option<&mut [u8]>,
        timeout: Duration,
    ) -> c_int {
        let frames = match self.pipeline.wait_for_frames(timeout) {
            Ok(frames) => frames,
            Err(err @ Error::Timeout { .. }) => {
                debug!("{}", err);
                return JM_ERR_DEVICE;
            }
            Err(err) => {
                warn!("wait for frames failed: {}", err);
                return JM_ERR_DEVICE;
            }
        };

        if let Some(rgb) = rgb {
            if let Ok(color) = frames.color_frame() {
                if let Err(status) = copy_packed(&color, 3, rgb) {
                    return status;
                }
            }
        }
        if let Some(depth) = depth {
            if let Ok(frame) = frames.depth_frame() {
                if let Err(status) = copy_packed(&frame, 2, depth) {
                    return status;
                }
            }
        }
        JM_OK
    }

    /// Reads telemetry from the streaming device.
    pub fn telemetry(&self) -> Result<TelemetryInfo, c_int> {
        let device = self.pipeline.device().map_err(|err| {
            warn!("cannot get device: {}", err);
            JM_ERR_DEVICE
        })?;
        let telemetry = device.telemetry().unwrap_or_else(|err| {
            warn!("cannot read telemetry: {}", err);
            TelemetryData::default()
        });

        let mut info = TelemetryInfo {
            asic_temp: telemetry.asic_temperature,
            projector_temp: telemetry.projector_temperature,
            sync_mode: telemetry.sync_mode,
            ..Default::default()
        };
        match device.usb_type_descriptor() {
            Ok(usb_type) => info.set_usb_type(&usb_type),
            Err(err) => debug!("usb type unavailable: {}", err),
        }
        Ok(info)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Stops streaming and releases the pipeline, config and session.
    pub fn close(mut self) {
        self.pipeline.close();
        self.config.close();
        self.session.close();
    }
}

/// Copies the visible rows of `frame` into `out` without padding.
fn copy_packed(frame: &Frame, bytes_per_pixel: usize, out: &mut [u8]) -> Result<(), c_int> {
    let geometry = frame.geometry().map_err(|_| JM_ERR_DEVICE)?;
    let row = geometry.width as usize * bytes_per_pixel;
    let height = geometry.height as usize;
    if out.len() < row * height {
        warn!(
            "buffer of {} bytes too small for {}x{} frame",
            out.len(),
            geometry.width,
            geometry.height
        );
        return Err(JM_ERR_BUFFER);
    }
    let data = frame.raw_bytes().map_err(|_| JM_ERR_DEVICE)?;
    let stride = geometry.stride as usize;
    if stride < row || data.len() < stride * height {
        return Err(JM_ERR_DEVICE);
    }
    for (dst, src) in out.chunks_exact_mut(row).zip(data.chunks(stride)).take(height) {
        dst.copy_from_slice(&src[..row]);
    }
    Ok(())
}

static HOST: Mutex<Option<HostSession>> = Mutex::new(None);

fn host() -> MutexGuard<'static, Option<HostSession>> {
    HOST.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Installs a session on `driver` as the process-wide one, replacing any
/// previous session. Returns the `JM_Init` status.
pub fn init_host(driver: Arc<dyn Driver>) -> c_int {
    let mut host = host();
    host.take();
    match HostSession::init(driver) {
        Ok(session) => {
            *host = Some(session);
            JM_OK
        }
        Err(status) => status,
    }
}

/// Creates the process-wide session, replacing any previous one.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn JM_Init() -> c_int {
    // Drop the previous session before loading the library again.
    JM_Close();
    match NativeDriver::load(rs2_sys::LIBRARY_NAME) {
        Ok(driver) => init_host(Arc::new(driver)),
        Err(err) => {
            error!("cannot load librealsense2: {}", err);
            JM_ERR_CONTEXT
        }
    }
}

#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn JM_StartStream(width: c_int, height: c_int, fps: c_int) -> c_int {
    let mut host = host();
    let Some(session) = host.as_mut() else {
        return JM_ERR_NOT_INITIALIZED;
    };
    if width <= 0 || height <= 0 || fps < 0 {
        return JM_ERR_DEVICE;
    }
    session.start_stream(width as u32, height as u32, fps as u32)
}

/// Waits up to `timeout_ms` and fills the non-null buffers.
///
/// # Safety
///
/// Non-null `rgb` must be valid for `width * height * 3` bytes and non-null
/// `depth` for `width * height * 2` bytes, for the size passed to
/// `JM_StartStream`.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn JM_WaitForFrames(rgb: *mut u8, depth: *mut u8, timeout_ms: c_int) -> c_int {
    let mut host = host();
    let Some(session) = host.as_mut() else {
        return JM_ERR_NOT_INITIALIZED;
    };
    let Some((width, height)) = session.stream_size() else {
        return JM_ERR_DEVICE;
    };
    let pixels = width as usize * height as usize;
    let rgb = (!rgb.is_null()).then(|| slice::from_raw_parts_mut(rgb, pixels * 3));
    let depth = (!depth.is_null()).then(|| slice::from_raw_parts_mut(depth, pixels * 2));
    let timeout = Duration::from_millis(timeout_ms.max(0) as u64);
    session.wait_for_frames(rgb, depth, timeout)
}

/// Fills `info` with the current telemetry.
///
/// # Safety
///
/// `info` must be null or valid for writing one [`TelemetryInfo`].
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn JM_GetTelemetry(info: *mut TelemetryInfo) -> c_int {
    let host = host();
    let Some(session) = host.as_ref() else {
        return JM_ERR_NOT_INITIALIZED;
    };
    if info.is_null() {
        return JM_ERR_BUFFER;
    }
    match session.telemetry() {
        Ok(telemetry) => {
            info.write(telemetry);
            JM_OK
        }
        Err(status) => status,
    }
}

/// Releases the process-wide session; safe to call repeatedly.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn JM_Close() {
    let session = host().take();
    if let Some(session) = session {
        session.close();
        info!("host session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticDriver;

    #[test]
    fn test_usb_type_truncated() {
        let mut info = TelemetryInfo::default();
        info.set_usb_type("3.2");
        assert_eq!(info.usb_type(), "3.2");

        info.set_usb_type(&"x".repeat(40));
        assert_eq!(info.usb_type().len(), USB_TYPE_LEN - 1);
        assert_eq!(info.usb_type[USB_TYPE_LEN - 1], 0);
    }

    #[test]
    fn test_copy_packed() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let frame = driver.depth_frame(3, 2, |x, y| (y * 3 + x) as u16);

        let mut small = vec![0u8; 11];
        assert_eq!(copy_packed(&frame, 2, &mut small), Err(JM_ERR_BUFFER));

        let mut out = vec![0u8; 12];
        copy_packed(&frame, 2, &mut out).map_err(|status| format!("status {}", status))?;
        let samples: Vec<u16> = out
            .chunks(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(samples, vec![0, 1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn test_uninitialized() {
        let _ = host().take();
        assert_eq!(JM_StartStream(640, 480, 30), JM_ERR_NOT_INITIALIZED);
        let status = unsafe {
            JM_WaitForFrames(std::ptr::null_mut(), std::ptr::null_mut(), 100)
        };
        assert_eq!(status, JM_ERR_NOT_INITIALIZED);
        let mut info = TelemetryInfo::default();
        assert_eq!(unsafe { JM_GetTelemetry(&mut info) }, JM_ERR_NOT_INITIALIZED);
        JM_Close();
        JM_Close();
    }
}
