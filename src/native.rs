// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! [`Driver`] backed by the librealsense2 shared library.

use crate::{
    config::StreamRequest,
    device::CameraInfo,
    driver::*,
    error::{NativeError, NativeErrorKind},
    frame::TimestampDomain,
    options::{OptionId, OptionRange},
    processing::StageKind,
};
use libc::{c_char, c_float, c_int, c_uint};
use rs2_sys::*;
use std::{
    ffi::{CStr, OsStr},
    ptr::{self, NonNull},
    time::Duration,
};
use tracing::debug;

/// librealsense2 loaded at runtime.
pub struct NativeDriver {
    api: Realsense2,
}

impl NativeDriver {
    /// Loads librealsense2 from `path`, e.g. [`rs2_sys::LIBRARY_NAME`].
    pub fn load<P: AsRef<OsStr>>(path: P) -> Result<Self, libloading::Error> {
        // SAFETY: only librealsense2 builds are expected at the given path.
        let api = unsafe { Realsense2::new(path)? };
        debug!("librealsense2 loaded");
        Ok(Self { api })
    }

    /// Runs `call` with an error out-parameter, converting a reported error.
    fn call<T>(&self, call: impl FnOnce(*mut *mut rs2_error) -> T) -> Result<T, NativeError> {
        let mut err: *mut rs2_error = ptr::null_mut();
        let value = call(&mut err);
        if err.is_null() {
            Ok(value)
        } else {
            Err(unsafe { self.take_error(err) })
        }
    }

    /// Converts and frees a driver error.
    unsafe fn take_error(&self, err: *mut rs2_error) -> NativeError {
        let message = string((self.api.rs2_get_error_message)(err));
        let function = string((self.api.rs2_get_failed_function)(err));
        let args = string((self.api.rs2_get_failed_args)(err));
        let kind = match (self.api.rs2_get_librealsense_exception_type)(err) {
            _ if message.contains("No device connected") => NativeErrorKind::NoDevice,
            _ if message.contains("Couldn't resolve requests") => {
                NativeErrorKind::UnresolvedRequest
            }
            RS2_EXCEPTION_TYPE_CAMERA_DISCONNECTED => NativeErrorKind::CameraDisconnected,
            RS2_EXCEPTION_TYPE_BACKEND => NativeErrorKind::Backend,
            RS2_EXCEPTION_TYPE_INVALID_VALUE => NativeErrorKind::InvalidValue,
            RS2_EXCEPTION_TYPE_WRONG_API_CALL_SEQUENCE => NativeErrorKind::WrongApiCallSequence,
            RS2_EXCEPTION_TYPE_NOT_IMPLEMENTED => NativeErrorKind::NotImplemented,
            RS2_EXCEPTION_TYPE_DEVICE_IN_RECOVERY_MODE => NativeErrorKind::DeviceInRecoveryMode,
            RS2_EXCEPTION_TYPE_IO => NativeErrorKind::Io,
            _ => NativeErrorKind::Unknown,
        };
        (self.api.rs2_free_error)(err);
        NativeError::new(kind, message, function, args)
    }

    /// Like [`NativeDriver::call`] for functions returning a new object.
    fn create<T>(
        &self,
        function: &'static str,
        call: impl FnOnce(*mut *mut rs2_error) -> *mut T,
    ) -> Result<NonNull<std::ffi::c_void>, NativeError> {
        let ptr = self.call(call)?;
        NonNull::new(ptr.cast()).ok_or_else(|| {
            NativeError::new(NativeErrorKind::Unknown, "null handle returned", function, "")
        })
    }

    fn options(target: OptionsTarget) -> *const rs2_options {
        match target {
            OptionsTarget::Sensor(sensor) => sensor.as_ptr().cast_const().cast(),
            OptionsTarget::Block(block) => block.as_ptr().cast_const().cast(),
        }
    }
}

unsafe fn string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn millis(timeout: Duration) -> c_uint {
    timeout.as_millis().min(c_uint::MAX as u128) as c_uint
}

fn unsigned(value: c_int) -> u32 {
    value.max(0) as u32
}

impl Driver for NativeDriver {
    fn api_version(&self) -> Result<i32, NativeError> {
        self.call(|err| unsafe { (self.api.rs2_get_api_version)(err) })
    }

    fn create_context(&self) -> Result<RawContext, NativeError> {
        let version = self.api_version()?;
        let ptr = self.create("rs2_create_context", |err| unsafe {
            (self.api.rs2_create_context)(version, err)
        })?;
        Ok(unsafe { RawContext::from_ptr(ptr) })
    }

    fn delete_context(&self, context: RawContext) {
        unsafe { (self.api.rs2_delete_context)(context.as_ptr().cast()) }
    }

    fn create_config(&self) -> Result<RawConfig, NativeError> {
        let ptr = self.create("rs2_create_config", |err| unsafe {
            (self.api.rs2_create_config)(err)
        })?;
        Ok(unsafe { RawConfig::from_ptr(ptr) })
    }

    fn delete_config(&self, config: RawConfig) {
        unsafe { (self.api.rs2_delete_config)(config.as_ptr().cast()) }
    }

    fn config_enable_stream(
        &self,
        config: RawConfig,
        request: &StreamRequest,
    ) -> Result<(), NativeError> {
        self.call(|err| unsafe {
            (self.api.rs2_config_enable_stream)(
                config.as_ptr().cast(),
                request.stream.as_raw(),
                request.index,
                request.width as c_int,
                request.height as c_int,
                request.format.as_raw(),
                request.fps as c_int,
                err,
            )
        })
    }

    fn create_pipeline(&self, context: RawContext) -> Result<RawPipeline, NativeError> {
        let ptr = self.create("rs2_create_pipeline", |err| unsafe {
            (self.api.rs2_create_pipeline)(context.as_ptr().cast(), err)
        })?;
        Ok(unsafe { RawPipeline::from_ptr(ptr) })
    }

    fn delete_pipeline(&self, pipeline: RawPipeline) {
        unsafe { (self.api.rs2_delete_pipeline)(pipeline.as_ptr().cast()) }
    }

    fn pipeline_start(
        &self,
        pipeline: RawPipeline,
        config: Option<RawConfig>,
    ) -> Result<RawProfile, NativeError> {
        let ptr = match config {
            Some(config) => self.create("rs2_pipeline_start_with_config", |err| unsafe {
                (self.api.rs2_pipeline_start_with_config)(
                    pipeline.as_ptr().cast(),
                    config.as_ptr().cast(),
                    err,
                )
            })?,
            None => self.create("rs2_pipeline_start", |err| unsafe {
                (self.api.rs2_pipeline_start)(pipeline.as_ptr().cast(), err)
            })?,
        };
        Ok(unsafe { RawProfile::from_ptr(ptr) })
    }

    fn pipeline_stop(&self, pipeline: RawPipeline) -> Result<(), NativeError> {
        self.call(|err| unsafe { (self.api.rs2_pipeline_stop)(pipeline.as_ptr().cast(), err) })
    }

    fn pipeline_wait_for_frames(
        &self,
        pipeline: RawPipeline,
        timeout: Duration,
    ) -> Result<Option<RawFrame>, NativeError> {
        let mut frame: *mut rs2_frame = ptr::null_mut();
        let ready = self.call(|err| unsafe {
            (self.api.rs2_pipeline_try_wait_for_frames)(
                pipeline.as_ptr().cast(),
                &mut frame,
                millis(timeout),
                err,
            )
        })?;
        if ready == 0 {
            return Ok(None);
        }
        Ok(NonNull::new(frame.cast()).map(|ptr| unsafe { RawFrame::from_ptr(ptr) }))
    }

    fn pipeline_active_profile(&self, pipeline: RawPipeline) -> Result<RawProfile, NativeError> {
        let ptr = self.create("rs2_pipeline_get_active_profile", |err| unsafe {
            (self.api.rs2_pipeline_get_active_profile)(pipeline.as_ptr().cast(), err)
        })?;
        Ok(unsafe { RawProfile::from_ptr(ptr) })
    }

    fn profile_device(&self, profile: RawProfile) -> Result<RawDevice, NativeError> {
        let ptr = self.create("rs2_pipeline_profile_get_device", |err| unsafe {
            (self.api.rs2_pipeline_profile_get_device)(profile.as_ptr().cast(), err)
        })?;
        Ok(unsafe { RawDevice::from_ptr(ptr) })
    }

    fn delete_profile(&self, profile: RawProfile) {
        unsafe { (self.api.rs2_delete_pipeline_profile)(profile.as_ptr().cast()) }
    }

    fn frame_add_ref(&self, frame: RawFrame) -> Result<(), NativeError> {
        self.call(|err| unsafe { (self.api.rs2_frame_add_ref)(frame.as_ptr().cast(), err) })
    }

    fn release_frame(&self, frame: RawFrame) {
        unsafe { (self.api.rs2_release_frame)(frame.as_ptr().cast()) }
    }

    fn embedded_frames_count(&self, frame: RawFrame) -> Result<usize, NativeError> {
        let count = self.call(|err| unsafe {
            (self.api.rs2_embedded_frames_count)(frame.as_ptr().cast(), err)
        })?;
        Ok(count.max(0) as usize)
    }

    fn extract_frame(&self, frame: RawFrame, index: usize) -> Result<RawFrame, NativeError> {
        let ptr = self.create("rs2_extract_frame", |err| unsafe {
            (self.api.rs2_extract_frame)(frame.as_ptr().cast(), index as c_int, err)
        })?;
        Ok(unsafe { RawFrame::from_ptr(ptr) })
    }

    fn frame_profile(&self, frame: RawFrame) -> Result<ProfileData, NativeError> {
        let profile = self.call(|err| unsafe {
            (self.api.rs2_get_frame_stream_profile)(frame.as_ptr().cast_const().cast(), err)
        })?;
        if profile.is_null() {
            return Err(NativeError::new(
                NativeErrorKind::Unknown,
                "frame has no stream profile",
                "rs2_get_frame_stream_profile",
                "",
            ));
        }
        // SAFETY: frame profiles are non-null pointers owned by the frame.
        let profile = unsafe { NonNull::new_unchecked(profile.cast_mut().cast()) };
        self.stream_profile_data(unsafe { RawStreamProfile::from_ptr(profile) })
    }

    fn frame_geometry(&self, frame: RawFrame) -> Result<FrameGeometry, NativeError> {
        let frame = frame.as_ptr().cast_const().cast::<rs2_frame>();
        let width = self.call(|err| unsafe { (self.api.rs2_get_frame_width)(frame, err) })?;
        let height = self.call(|err| unsafe { (self.api.rs2_get_frame_height)(frame, err) })?;
        let stride =
            self.call(|err| unsafe { (self.api.rs2_get_frame_stride_in_bytes)(frame, err) })?;
        let bits_per_pixel =
            self.call(|err| unsafe { (self.api.rs2_get_frame_bits_per_pixel)(frame, err) })?;
        Ok(FrameGeometry {
            width: unsigned(width),
            height: unsigned(height),
            stride: unsigned(stride),
            bits_per_pixel: unsigned(bits_per_pixel),
        })
    }

    fn frame_data(&self, frame: RawFrame) -> Result<*const u8, NativeError> {
        let data = self.call(|err| unsafe {
            (self.api.rs2_get_frame_data)(frame.as_ptr().cast_const().cast(), err)
        })?;
        Ok(data.cast())
    }

    fn frame_timestamp(&self, frame: RawFrame) -> Result<(f64, TimestampDomain), NativeError> {
        let frame = frame.as_ptr().cast_const().cast::<rs2_frame>();
        let timestamp =
            self.call(|err| unsafe { (self.api.rs2_get_frame_timestamp)(frame, err) })?;
        let domain =
            self.call(|err| unsafe { (self.api.rs2_get_frame_timestamp_domain)(frame, err) })?;
        let domain = TimestampDomain::from_raw(domain).unwrap_or(TimestampDomain::SystemTime);
        Ok((timestamp, domain))
    }

    fn frame_number(&self, frame: RawFrame) -> Result<u64, NativeError> {
        self.call(|err| unsafe {
            (self.api.rs2_get_frame_number)(frame.as_ptr().cast_const().cast(), err)
        })
    }

    fn create_block(&self, kind: StageKind) -> Result<RawBlock, NativeError> {
        let api = &self.api;
        let ptr = match kind {
            StageKind::Decimation => self.create("rs2_create_decimation_filter_block", |err| unsafe {
                (api.rs2_create_decimation_filter_block)(err)
            }),
            StageKind::Spatial => self.create("rs2_create_spatial_filter_block", |err| unsafe {
                (api.rs2_create_spatial_filter_block)(err)
            }),
            StageKind::Temporal => self.create("rs2_create_temporal_filter_block", |err| unsafe {
                (api.rs2_create_temporal_filter_block)(err)
            }),
            StageKind::HoleFilling => {
                self.create("rs2_create_hole_filling_filter_block", |err| unsafe {
                    (api.rs2_create_hole_filling_filter_block)(err)
                })
            }
            StageKind::Colorizer => self.create("rs2_create_colorizer", |err| unsafe {
                (api.rs2_create_colorizer)(err)
            }),
            StageKind::Align(to) => self.create("rs2_create_align", |err| unsafe {
                (api.rs2_create_align)(to.as_raw(), err)
            }),
        }?;
        Ok(unsafe { RawBlock::from_ptr(ptr) })
    }

    fn delete_block(&self, block: RawBlock) {
        unsafe { (self.api.rs2_delete_processing_block)(block.as_ptr().cast()) }
    }

    fn create_queue(&self, capacity: usize) -> Result<RawQueue, NativeError> {
        let ptr = self.create("rs2_create_frame_queue", |err| unsafe {
            (self.api.rs2_create_frame_queue)(capacity as c_int, err)
        })?;
        Ok(unsafe { RawQueue::from_ptr(ptr) })
    }

    fn delete_queue(&self, queue: RawQueue) {
        unsafe { (self.api.rs2_delete_frame_queue)(queue.as_ptr().cast()) }
    }

    fn start_processing_queue(
        &self,
        block: RawBlock,
        queue: RawQueue,
    ) -> Result<(), NativeError> {
        self.call(|err| unsafe {
            (self.api.rs2_start_processing_queue)(block.as_ptr().cast(), queue.as_ptr().cast(), err)
        })
    }

    fn process_frame(&self, block: RawBlock, frame: RawFrame) -> Result<(), NativeError> {
        self.call(|err| unsafe {
            (self.api.rs2_process_frame)(block.as_ptr().cast(), frame.as_ptr().cast(), err)
        })
    }

    fn wait_for_frame(
        &self,
        queue: RawQueue,
        timeout: Duration,
    ) -> Result<Option<RawFrame>, NativeError> {
        let mut frame: *mut rs2_frame = ptr::null_mut();
        let ready = self.call(|err| unsafe {
            (self.api.rs2_try_wait_for_frame)(queue.as_ptr().cast(), millis(timeout), &mut frame, err)
        })?;
        if ready == 0 {
            return Ok(None);
        }
        Ok(NonNull::new(frame.cast()).map(|ptr| unsafe { RawFrame::from_ptr(ptr) }))
    }

    fn poll_for_frame(&self, queue: RawQueue) -> Result<Option<RawFrame>, NativeError> {
        let mut frame: *mut rs2_frame = ptr::null_mut();
        let ready = self.call(|err| unsafe {
            (self.api.rs2_poll_for_frame)(queue.as_ptr().cast(), &mut frame, err)
        })?;
        if ready == 0 {
            return Ok(None);
        }
        Ok(NonNull::new(frame.cast()).map(|ptr| unsafe { RawFrame::from_ptr(ptr) }))
    }

    fn supports_option(&self, target: OptionsTarget, id: OptionId) -> Result<bool, NativeError> {
        let supported = self.call(|err| unsafe {
            (self.api.rs2_supports_option)(Self::options(target), id.0, err)
        })?;
        Ok(supported != 0)
    }

    fn is_option_read_only(
        &self,
        target: OptionsTarget,
        id: OptionId,
    ) -> Result<bool, NativeError> {
        let read_only = self.call(|err| unsafe {
            (self.api.rs2_is_option_read_only)(Self::options(target), id.0, err)
        })?;
        Ok(read_only != 0)
    }

    fn get_option(&self, target: OptionsTarget, id: OptionId) -> Result<f32, NativeError> {
        self.call(|err| unsafe { (self.api.rs2_get_option)(Self::options(target), id.0, err) })
    }

    fn set_option(
        &self,
        target: OptionsTarget,
        id: OptionId,
        value: f32,
    ) -> Result<(), NativeError> {
        self.call(|err| unsafe {
            (self.api.rs2_set_option)(Self::options(target), id.0, value as c_float, err)
        })
    }

    fn option_range(
        &self,
        target: OptionsTarget,
        id: OptionId,
    ) -> Result<OptionRange, NativeError> {
        let (mut min, mut max, mut step, mut default) = (0.0, 0.0, 0.0, 0.0);
        self.call(|err| unsafe {
            (self.api.rs2_get_option_range)(
                Self::options(target),
                id.0,
                &mut min,
                &mut max,
                &mut step,
                &mut default,
                err,
            )
        })?;
        Ok(OptionRange {
            min,
            max,
            step,
            default,
        })
    }

    fn delete_device(&self, device: RawDevice) {
        unsafe { (self.api.rs2_delete_device)(device.as_ptr().cast()) }
    }

    fn supports_device_info(
        &self,
        device: RawDevice,
        info: CameraInfo,
    ) -> Result<bool, NativeError> {
        let supported = self.call(|err| unsafe {
            (self.api.rs2_supports_device_info)(device.as_ptr().cast_const().cast(), info.as_raw(), err)
        })?;
        Ok(supported != 0)
    }

    fn device_info(&self, device: RawDevice, info: CameraInfo) -> Result<String, NativeError> {
        let value = self.call(|err| unsafe {
            (self.api.rs2_get_device_info)(device.as_ptr().cast_const().cast(), info.as_raw(), err)
        })?;
        Ok(unsafe { string(value) })
    }

    fn query_sensors(&self, device: RawDevice) -> Result<Vec<RawSensor>, NativeError> {
        let list = self.call(|err| unsafe {
            (self.api.rs2_query_sensors)(device.as_ptr().cast_const().cast(), err)
        })?;
        if list.is_null() {
            return Ok(Vec::new());
        }

        let collect = || -> Result<Vec<RawSensor>, NativeError> {
            let count =
                self.call(|err| unsafe { (self.api.rs2_get_sensors_count)(list, err) })?;
            let mut sensors = Vec::with_capacity(count.max(0) as usize);
            for index in 0..count {
                match self.create("rs2_create_sensor", |err| unsafe {
                    (self.api.rs2_create_sensor)(list, index, err)
                }) {
                    Ok(ptr) => sensors.push(unsafe { RawSensor::from_ptr(ptr) }),
                    Err(err) => {
                        for sensor in sensors {
                            self.delete_sensor(sensor);
                        }
                        return Err(err);
                    }
                }
            }
            Ok(sensors)
        };
        let sensors = collect();
        unsafe { (self.api.rs2_delete_sensor_list)(list) };
        sensors
    }

    fn delete_sensor(&self, sensor: RawSensor) {
        unsafe { (self.api.rs2_delete_sensor)(sensor.as_ptr().cast()) }
    }

    fn supports_sensor_info(
        &self,
        sensor: RawSensor,
        info: CameraInfo,
    ) -> Result<bool, NativeError> {
        let supported = self.call(|err| unsafe {
            (self.api.rs2_supports_sensor_info)(sensor.as_ptr().cast_const().cast(), info.as_raw(), err)
        })?;
        Ok(supported != 0)
    }

    fn sensor_info(&self, sensor: RawSensor, info: CameraInfo) -> Result<String, NativeError> {
        let value = self.call(|err| unsafe {
            (self.api.rs2_get_sensor_info)(sensor.as_ptr().cast_const().cast(), info.as_raw(), err)
        })?;
        Ok(unsafe { string(value) })
    }

    fn is_depth_sensor(&self, sensor: RawSensor) -> Result<bool, NativeError> {
        let depth = self.call(|err| unsafe {
            (self.api.rs2_is_sensor_extendable_to)(
                sensor.as_ptr().cast_const().cast(),
                RS2_EXTENSION_DEPTH_SENSOR,
                err,
            )
        })?;
        Ok(depth != 0)
    }

    fn depth_scale(&self, sensor: RawSensor) -> Result<f32, NativeError> {
        self.call(|err| unsafe { (self.api.rs2_get_depth_scale)(sensor.as_ptr().cast(), err) })
    }

    fn sensor_profiles(&self, sensor: RawSensor) -> Result<RawProfileList, NativeError> {
        let ptr = self.create("rs2_get_stream_profiles", |err| unsafe {
            (self.api.rs2_get_stream_profiles)(sensor.as_ptr().cast(), err)
        })?;
        Ok(unsafe { RawProfileList::from_ptr(ptr) })
    }

    fn profiles_count(&self, list: RawProfileList) -> Result<usize, NativeError> {
        let count = self.call(|err| unsafe {
            (self.api.rs2_get_stream_profiles_count)(list.as_ptr().cast_const().cast(), err)
        })?;
        Ok(count.max(0) as usize)
    }

    fn stream_profile(
        &self,
        list: RawProfileList,
        index: usize,
    ) -> Result<RawStreamProfile, NativeError> {
        let ptr = self.create("rs2_get_stream_profile", |err| unsafe {
            (self.api.rs2_get_stream_profile)(
                list.as_ptr().cast_const().cast(),
                index as c_int,
                err,
            )
            .cast_mut()
        })?;
        Ok(unsafe { RawStreamProfile::from_ptr(ptr) })
    }

    fn delete_profile_list(&self, list: RawProfileList) {
        unsafe { (self.api.rs2_delete_stream_profiles_list)(list.as_ptr().cast()) }
    }

    fn stream_profile_data(&self, profile: RawStreamProfile) -> Result<ProfileData, NativeError> {
        let (mut stream, mut format, mut index, mut unique_id, mut fps) = (0, 0, 0, 0, 0);
        self.call(|err| unsafe {
            (self.api.rs2_get_stream_profile_data)(
                profile.as_ptr().cast_const().cast(),
                &mut stream,
                &mut format,
                &mut index,
                &mut unique_id,
                &mut fps,
                err,
            )
        })?;
        Ok(ProfileData {
            stream,
            format,
            index,
            unique_id,
            fps,
        })
    }

    fn video_resolution(&self, profile: RawStreamProfile) -> Result<(u32, u32), NativeError> {
        let (mut width, mut height) = (0, 0);
        self.call(|err| unsafe {
            (self.api.rs2_get_video_stream_resolution)(
                profile.as_ptr().cast_const().cast(),
                &mut width,
                &mut height,
                err,
            )
        })?;
        Ok((unsigned(width), unsigned(height)))
    }

    fn is_default_profile(&self, profile: RawStreamProfile) -> Result<bool, NativeError> {
        let default = self.call(|err| unsafe {
            (self.api.rs2_is_stream_profile_default)(profile.as_ptr().cast_const().cast(), err)
        })?;
        Ok(default != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::from_secs(u64::MAX)), c_uint::MAX);
    }

    #[test]
    fn test_load_missing() {
        assert!(NativeDriver::load("librealsense2-missing.so").is_err());
    }
}
