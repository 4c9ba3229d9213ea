// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Native driver abstraction.
//!
//! Every call into foreign-owned memory goes through the [`Driver`] trait. The
//! safe wrappers ([`crate::Frame`], [`crate::Pipeline`], ...) own raw handles
//! and release them exactly once; the trait itself is a thin, handle-level
//! mirror of the RealSense C API.
//!
//! Two implementations ship with the crate:
//!
//! - [`crate::native::NativeDriver`]: librealsense2 loaded at runtime
//! - [`crate::synthetic::SyntheticDriver`]: simulated device for tests and
//!   development without hardware
//!
//! # Reference counting
//!
//! Frame handles are reference counted by the driver. [`Driver::extract_frame`]
//! and the wait functions hand out one new reference which the caller owns,
//! [`Driver::frame_add_ref`] adds one, and both [`Driver::release_frame`] and
//! [`Driver::process_frame`] consume one.

use crate::{
    config::StreamRequest,
    device::CameraInfo,
    error::NativeError,
    frame::TimestampDomain,
    options::{OptionId, OptionRange},
    processing::StageKind,
};
use std::{ffi::c_void, ptr::NonNull, time::Duration};

macro_rules! raw_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
            pub struct $name(NonNull<c_void>);

            // The driver serializes access to the object behind the address.
            unsafe impl Send for $name {}

            impl $name {
                /// Wraps a driver-owned object address.
                ///
                /// # Safety
                ///
                /// `ptr` must identify a live object of this kind, created by
                /// the driver the handle will be passed to.
                pub unsafe fn from_ptr(ptr: NonNull<c_void>) -> Self {
                    Self(ptr)
                }

                pub fn as_ptr(self) -> *mut c_void {
                    self.0.as_ptr()
                }
            }
        )*
    };
}

raw_handle!(
    /// Driver context (one per [`crate::Session`]).
    RawContext,
    RawConfig,
    RawPipeline,
    /// Pipeline profile, transient result of start / active profile queries.
    RawProfile,
    /// Single frame or composite frame set.
    RawFrame,
    /// Processing block instance.
    RawBlock,
    /// Frame queue used as a processing block sink.
    RawQueue,
    RawDevice,
    RawSensor,
    RawProfileList,
    /// Stream profile borrowed from a [`RawProfileList`].
    RawStreamProfile,
);

/// Object implementing the options interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionsTarget {
    Sensor(RawSensor),
    Block(RawBlock),
}

/// Stream profile fields as reported by the driver.
///
/// Stream and format are kept as raw driver values since devices may report
/// kinds this crate does not model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProfileData {
    pub stream: i32,
    pub format: i32,
    pub index: i32,
    pub unique_id: i32,
    pub fps: i32,
}

/// Frame dimensions and memory layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes, including padding.
    pub stride: u32,
    pub bits_per_pixel: u32,
}

impl FrameGeometry {
    /// Total buffer length in bytes.
    pub fn len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle-level interface to the sensor driver.
///
/// Implementations may assume every handle they receive was produced by them
/// and is still live. The wrappers in this crate uphold that; nothing else
/// should call these methods directly.
pub trait Driver: Send + Sync {
    /// Encoded API version (`major * 10000 + minor * 100 + patch`).
    fn api_version(&self) -> Result<i32, NativeError>;

    fn create_context(&self) -> Result<RawContext, NativeError>;
    fn delete_context(&self, context: RawContext);

    fn create_config(&self) -> Result<RawConfig, NativeError>;
    fn delete_config(&self, config: RawConfig);
    fn config_enable_stream(
        &self,
        config: RawConfig,
        request: &StreamRequest,
    ) -> Result<(), NativeError>;

    fn create_pipeline(&self, context: RawContext) -> Result<RawPipeline, NativeError>;
    fn delete_pipeline(&self, pipeline: RawPipeline);
    /// Starts streaming, returning a profile the caller must delete.
    fn pipeline_start(
        &self,
        pipeline: RawPipeline,
        config: Option<RawConfig>,
    ) -> Result<RawProfile, NativeError>;
    fn pipeline_stop(&self, pipeline: RawPipeline) -> Result<(), NativeError>;
    /// Waits for the next frame set, `Ok(None)` when `timeout` elapses.
    fn pipeline_wait_for_frames(
        &self,
        pipeline: RawPipeline,
        timeout: Duration,
    ) -> Result<Option<RawFrame>, NativeError>;
    fn pipeline_active_profile(&self, pipeline: RawPipeline) -> Result<RawProfile, NativeError>;
    /// Device of an active profile; the caller must delete it.
    fn profile_device(&self, profile: RawProfile) -> Result<RawDevice, NativeError>;
    fn delete_profile(&self, profile: RawProfile);

    fn frame_add_ref(&self, frame: RawFrame) -> Result<(), NativeError>;
    fn release_frame(&self, frame: RawFrame);
    fn embedded_frames_count(&self, frame: RawFrame) -> Result<usize, NativeError>;
    /// Returns a new reference to the embedded frame at `index`.
    fn extract_frame(&self, frame: RawFrame, index: usize) -> Result<RawFrame, NativeError>;
    fn frame_profile(&self, frame: RawFrame) -> Result<ProfileData, NativeError>;
    fn frame_geometry(&self, frame: RawFrame) -> Result<FrameGeometry, NativeError>;
    /// Start of the frame buffer, valid while a reference to `frame` is held.
    fn frame_data(&self, frame: RawFrame) -> Result<*const u8, NativeError>;
    /// Capture time in milliseconds and its clock domain.
    fn frame_timestamp(&self, frame: RawFrame) -> Result<(f64, TimestampDomain), NativeError>;
    fn frame_number(&self, frame: RawFrame) -> Result<u64, NativeError>;

    fn create_block(&self, kind: StageKind) -> Result<RawBlock, NativeError>;
    fn delete_block(&self, block: RawBlock);
    fn create_queue(&self, capacity: usize) -> Result<RawQueue, NativeError>;
    /// Deletes the queue, releasing any frames still held in it.
    fn delete_queue(&self, queue: RawQueue);
    fn start_processing_queue(&self, block: RawBlock, queue: RawQueue)
        -> Result<(), NativeError>;
    /// Submits `frame`, consuming one reference even on failure.
    fn process_frame(&self, block: RawBlock, frame: RawFrame) -> Result<(), NativeError>;
    /// Waits for the next queued frame, `Ok(None)` when `timeout` elapses.
    fn wait_for_frame(
        &self,
        queue: RawQueue,
        timeout: Duration,
    ) -> Result<Option<RawFrame>, NativeError>;
    fn poll_for_frame(&self, queue: RawQueue) -> Result<Option<RawFrame>, NativeError>;

    fn supports_option(&self, target: OptionsTarget, id: OptionId) -> Result<bool, NativeError>;
    fn is_option_read_only(&self, target: OptionsTarget, id: OptionId)
        -> Result<bool, NativeError>;
    fn get_option(&self, target: OptionsTarget, id: OptionId) -> Result<f32, NativeError>;
    fn set_option(&self, target: OptionsTarget, id: OptionId, value: f32)
        -> Result<(), NativeError>;
    fn option_range(&self, target: OptionsTarget, id: OptionId)
        -> Result<OptionRange, NativeError>;

    fn delete_device(&self, device: RawDevice);
    fn supports_device_info(&self, device: RawDevice, info: CameraInfo)
        -> Result<bool, NativeError>;
    fn device_info(&self, device: RawDevice, info: CameraInfo) -> Result<String, NativeError>;
    /// Creates one handle per sensor; the caller must delete each.
    fn query_sensors(&self, device: RawDevice) -> Result<Vec<RawSensor>, NativeError>;

    fn delete_sensor(&self, sensor: RawSensor);
    fn supports_sensor_info(&self, sensor: RawSensor, info: CameraInfo)
        -> Result<bool, NativeError>;
    fn sensor_info(&self, sensor: RawSensor, info: CameraInfo) -> Result<String, NativeError>;
    fn is_depth_sensor(&self, sensor: RawSensor) -> Result<bool, NativeError>;
    fn depth_scale(&self, sensor: RawSensor) -> Result<f32, NativeError>;
    fn sensor_profiles(&self, sensor: RawSensor) -> Result<RawProfileList, NativeError>;
    fn profiles_count(&self, list: RawProfileList) -> Result<usize, NativeError>;
    fn stream_profile(
        &self,
        list: RawProfileList,
        index: usize,
    ) -> Result<RawStreamProfile, NativeError>;
    fn delete_profile_list(&self, list: RawProfileList);
    fn stream_profile_data(&self, profile: RawStreamProfile) -> Result<ProfileData, NativeError>;
    /// Fails for profiles without a video resolution (motion streams).
    fn video_resolution(&self, profile: RawStreamProfile) -> Result<(u32, u32), NativeError>;
    fn is_default_profile(&self, profile: RawStreamProfile) -> Result<bool, NativeError>;
}
