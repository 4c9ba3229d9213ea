// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Low-level bindings for the librealsense2 C API.
//!
//! The library is loaded at runtime with [`libloading`] rather than linked, so
//! crates depending on these bindings build on hosts without librealsense2
//! installed. Only the subset of the API needed for streaming, processing
//! blocks, options and device queries is exposed.
//!
//! Every function taking a trailing `*mut *mut rs2_error` reports failures
//! through it; the caller owns the returned error and must release it with
//! `rs2_free_error`.

#![allow(non_camel_case_types)]

use libc::{c_char, c_float, c_int, c_uint, c_ulonglong, c_void};
use libloading::Library;
use std::ffi::OsStr;

/// Default shared object name of the RealSense SDK.
pub const LIBRARY_NAME: &str = "librealsense2.so";

macro_rules! opaque {
    ($($name:ident),* $(,)?) => {
        $(
            #[repr(C)]
            pub struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque!(
    rs2_error,
    rs2_context,
    rs2_pipeline,
    rs2_pipeline_profile,
    rs2_config,
    rs2_frame,
    rs2_frame_queue,
    rs2_processing_block,
    rs2_options,
    rs2_device,
    rs2_sensor,
    rs2_sensor_list,
    rs2_stream_profile,
    rs2_stream_profile_list,
);

pub type rs2_stream = c_int;
pub const RS2_STREAM_ANY: rs2_stream = 0;
pub const RS2_STREAM_DEPTH: rs2_stream = 1;
pub const RS2_STREAM_COLOR: rs2_stream = 2;
pub const RS2_STREAM_INFRARED: rs2_stream = 3;
pub const RS2_STREAM_FISHEYE: rs2_stream = 4;
pub const RS2_STREAM_GYRO: rs2_stream = 5;
pub const RS2_STREAM_ACCEL: rs2_stream = 6;

pub type rs2_format = c_int;
pub const RS2_FORMAT_ANY: rs2_format = 0;
pub const RS2_FORMAT_Z16: rs2_format = 1;
pub const RS2_FORMAT_DISPARITY16: rs2_format = 2;
pub const RS2_FORMAT_XYZ32F: rs2_format = 3;
pub const RS2_FORMAT_YUYV: rs2_format = 4;
pub const RS2_FORMAT_RGB8: rs2_format = 5;
pub const RS2_FORMAT_BGR8: rs2_format = 6;
pub const RS2_FORMAT_RGBA8: rs2_format = 7;
pub const RS2_FORMAT_BGRA8: rs2_format = 8;
pub const RS2_FORMAT_Y8: rs2_format = 9;
pub const RS2_FORMAT_Y16: rs2_format = 10;
pub const RS2_FORMAT_RAW10: rs2_format = 11;
pub const RS2_FORMAT_RAW16: rs2_format = 12;
pub const RS2_FORMAT_RAW8: rs2_format = 13;
pub const RS2_FORMAT_UYVY: rs2_format = 14;
pub const RS2_FORMAT_MOTION_RAW: rs2_format = 15;
pub const RS2_FORMAT_MOTION_XYZ32F: rs2_format = 16;

pub type rs2_timestamp_domain = c_int;
pub const RS2_TIMESTAMP_DOMAIN_HARDWARE_CLOCK: rs2_timestamp_domain = 0;
pub const RS2_TIMESTAMP_DOMAIN_SYSTEM_TIME: rs2_timestamp_domain = 1;
pub const RS2_TIMESTAMP_DOMAIN_GLOBAL_TIME: rs2_timestamp_domain = 2;

pub type rs2_option = c_int;

pub type rs2_camera_info = c_int;

pub type rs2_extension = c_int;
pub const RS2_EXTENSION_DEPTH_SENSOR: rs2_extension = 7;

pub type rs2_exception_type = c_int;
pub const RS2_EXCEPTION_TYPE_UNKNOWN: rs2_exception_type = 0;
pub const RS2_EXCEPTION_TYPE_CAMERA_DISCONNECTED: rs2_exception_type = 1;
pub const RS2_EXCEPTION_TYPE_BACKEND: rs2_exception_type = 2;
pub const RS2_EXCEPTION_TYPE_INVALID_VALUE: rs2_exception_type = 3;
pub const RS2_EXCEPTION_TYPE_WRONG_API_CALL_SEQUENCE: rs2_exception_type = 4;
pub const RS2_EXCEPTION_TYPE_NOT_IMPLEMENTED: rs2_exception_type = 5;
pub const RS2_EXCEPTION_TYPE_DEVICE_IN_RECOVERY_MODE: rs2_exception_type = 6;
pub const RS2_EXCEPTION_TYPE_IO: rs2_exception_type = 7;

pub type rs2_time_t = f64;

type ErrorOut = *mut *mut rs2_error;

macro_rules! rs2_functions {
    ($(fn $name:ident($($ty:ty),* $(,)?) $(-> $ret:ty)?;)*) => {
        /// Function table resolved from a loaded librealsense2 shared object.
        ///
        /// The [`Library`] is kept alive for as long as the table, so the
        /// function pointers never dangle.
        pub struct Realsense2 {
            _lib: Library,
            $(pub $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?,)*
        }

        impl Realsense2 {
            /// Loads the shared object at `path` and resolves every symbol.
            ///
            /// # Safety
            ///
            /// Loading a library runs its initialisers. The caller must make
            /// sure `path` names a genuine librealsense2 build whose ABI
            /// matches these declarations.
            pub unsafe fn new<P: AsRef<OsStr>>(path: P) -> Result<Self, libloading::Error> {
                let lib = Library::new(path)?;
                $(
                    let $name = *lib.get::<unsafe extern "C" fn($($ty),*) $(-> $ret)?>(
                        concat!(stringify!($name), "\0").as_bytes(),
                    )?;
                )*
                Ok(Self { _lib: lib, $($name,)* })
            }
        }
    };
}

rs2_functions! {
    fn rs2_get_api_version(ErrorOut) -> c_int;

    fn rs2_get_error_message(*const rs2_error) -> *const c_char;
    fn rs2_get_failed_function(*const rs2_error) -> *const c_char;
    fn rs2_get_failed_args(*const rs2_error) -> *const c_char;
    fn rs2_get_librealsense_exception_type(*const rs2_error) -> rs2_exception_type;
    fn rs2_free_error(*mut rs2_error);

    fn rs2_create_context(c_int, ErrorOut) -> *mut rs2_context;
    fn rs2_delete_context(*mut rs2_context);

    fn rs2_create_config(ErrorOut) -> *mut rs2_config;
    fn rs2_delete_config(*mut rs2_config);
    fn rs2_config_enable_stream(
        *mut rs2_config, rs2_stream, c_int, c_int, c_int, rs2_format, c_int, ErrorOut,
    );

    fn rs2_create_pipeline(*mut rs2_context, ErrorOut) -> *mut rs2_pipeline;
    fn rs2_delete_pipeline(*mut rs2_pipeline);
    fn rs2_pipeline_start(*mut rs2_pipeline, ErrorOut) -> *mut rs2_pipeline_profile;
    fn rs2_pipeline_start_with_config(
        *mut rs2_pipeline, *mut rs2_config, ErrorOut,
    ) -> *mut rs2_pipeline_profile;
    fn rs2_pipeline_stop(*mut rs2_pipeline, ErrorOut);
    fn rs2_pipeline_try_wait_for_frames(
        *mut rs2_pipeline, *mut *mut rs2_frame, c_uint, ErrorOut,
    ) -> c_int;
    fn rs2_pipeline_get_active_profile(*mut rs2_pipeline, ErrorOut) -> *mut rs2_pipeline_profile;
    fn rs2_pipeline_profile_get_device(*mut rs2_pipeline_profile, ErrorOut) -> *mut rs2_device;
    fn rs2_delete_pipeline_profile(*mut rs2_pipeline_profile);

    fn rs2_frame_add_ref(*mut rs2_frame, ErrorOut);
    fn rs2_release_frame(*mut rs2_frame);
    fn rs2_embedded_frames_count(*mut rs2_frame, ErrorOut) -> c_int;
    fn rs2_extract_frame(*mut rs2_frame, c_int, ErrorOut) -> *mut rs2_frame;
    fn rs2_get_frame_stream_profile(*const rs2_frame, ErrorOut) -> *const rs2_stream_profile;
    fn rs2_get_frame_data(*const rs2_frame, ErrorOut) -> *const c_void;
    fn rs2_get_frame_width(*const rs2_frame, ErrorOut) -> c_int;
    fn rs2_get_frame_height(*const rs2_frame, ErrorOut) -> c_int;
    fn rs2_get_frame_stride_in_bytes(*const rs2_frame, ErrorOut) -> c_int;
    fn rs2_get_frame_bits_per_pixel(*const rs2_frame, ErrorOut) -> c_int;
    fn rs2_get_frame_timestamp(*const rs2_frame, ErrorOut) -> rs2_time_t;
    fn rs2_get_frame_timestamp_domain(*const rs2_frame, ErrorOut) -> rs2_timestamp_domain;
    fn rs2_get_frame_number(*const rs2_frame, ErrorOut) -> c_ulonglong;

    fn rs2_create_decimation_filter_block(ErrorOut) -> *mut rs2_processing_block;
    fn rs2_create_spatial_filter_block(ErrorOut) -> *mut rs2_processing_block;
    fn rs2_create_temporal_filter_block(ErrorOut) -> *mut rs2_processing_block;
    fn rs2_create_hole_filling_filter_block(ErrorOut) -> *mut rs2_processing_block;
    fn rs2_create_colorizer(ErrorOut) -> *mut rs2_processing_block;
    fn rs2_create_align(rs2_stream, ErrorOut) -> *mut rs2_processing_block;
    fn rs2_delete_processing_block(*mut rs2_processing_block);
    fn rs2_start_processing_queue(*mut rs2_processing_block, *mut rs2_frame_queue, ErrorOut);
    fn rs2_process_frame(*mut rs2_processing_block, *mut rs2_frame, ErrorOut);

    fn rs2_create_frame_queue(c_int, ErrorOut) -> *mut rs2_frame_queue;
    fn rs2_delete_frame_queue(*mut rs2_frame_queue);
    fn rs2_try_wait_for_frame(*mut rs2_frame_queue, c_uint, *mut *mut rs2_frame, ErrorOut) -> c_int;
    fn rs2_poll_for_frame(*mut rs2_frame_queue, *mut *mut rs2_frame, ErrorOut) -> c_int;

    fn rs2_supports_option(*const rs2_options, rs2_option, ErrorOut) -> c_int;
    fn rs2_is_option_read_only(*const rs2_options, rs2_option, ErrorOut) -> c_int;
    fn rs2_get_option(*const rs2_options, rs2_option, ErrorOut) -> c_float;
    fn rs2_set_option(*const rs2_options, rs2_option, c_float, ErrorOut);
    fn rs2_get_option_range(
        *const rs2_options,
        rs2_option,
        *mut c_float,
        *mut c_float,
        *mut c_float,
        *mut c_float,
        ErrorOut,
    );

    fn rs2_delete_device(*mut rs2_device);
    fn rs2_supports_device_info(*const rs2_device, rs2_camera_info, ErrorOut) -> c_int;
    fn rs2_get_device_info(*const rs2_device, rs2_camera_info, ErrorOut) -> *const c_char;
    fn rs2_query_sensors(*const rs2_device, ErrorOut) -> *mut rs2_sensor_list;
    fn rs2_get_sensors_count(*const rs2_sensor_list, ErrorOut) -> c_int;
    fn rs2_create_sensor(*const rs2_sensor_list, c_int, ErrorOut) -> *mut rs2_sensor;
    fn rs2_delete_sensor_list(*mut rs2_sensor_list);

    fn rs2_delete_sensor(*mut rs2_sensor);
    fn rs2_supports_sensor_info(*const rs2_sensor, rs2_camera_info, ErrorOut) -> c_int;
    fn rs2_get_sensor_info(*const rs2_sensor, rs2_camera_info, ErrorOut) -> *const c_char;
    fn rs2_is_sensor_extendable_to(*const rs2_sensor, rs2_extension, ErrorOut) -> c_int;
    fn rs2_get_depth_scale(*mut rs2_sensor, ErrorOut) -> c_float;
    fn rs2_get_stream_profiles(*mut rs2_sensor, ErrorOut) -> *mut rs2_stream_profile_list;
    fn rs2_get_stream_profiles_count(*const rs2_stream_profile_list, ErrorOut) -> c_int;
    fn rs2_get_stream_profile(
        *const rs2_stream_profile_list, c_int, ErrorOut,
    ) -> *const rs2_stream_profile;
    fn rs2_delete_stream_profiles_list(*mut rs2_stream_profile_list);
    fn rs2_get_stream_profile_data(
        *const rs2_stream_profile,
        *mut rs2_stream,
        *mut rs2_format,
        *mut c_int,
        *mut c_int,
        *mut c_int,
        ErrorOut,
    );
    fn rs2_get_video_stream_resolution(*const rs2_stream_profile, *mut c_int, *mut c_int, ErrorOut);
    fn rs2_is_stream_profile_default(*const rs2_stream_profile, ErrorOut) -> c_int;
}

/// Splits an encoded API version (`major * 10000 + minor * 100 + patch`).
pub const fn decode_api_version(version: c_int) -> (c_int, c_int, c_int) {
    (version / 10000, (version / 100) % 100, version % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_api_version() {
        assert_eq!(decode_api_version(25501), (2, 55, 1));
        assert_eq!(decode_api_version(20000), (2, 0, 0));
    }

    #[test]
    fn test_missing_library() {
        let lib = unsafe { Realsense2::new("librealsense2-does-not-exist.so") };
        assert!(lib.is_err());
    }
}
