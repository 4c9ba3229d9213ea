// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_realsense::{
    export::{
        init_host, HostSession, TelemetryInfo, JM_Close, JM_GetTelemetry, JM_StartStream,
        JM_WaitForFrames, JM_ERR_BUFFER, JM_ERR_DEVICE, JM_ERR_NOT_INITIALIZED, JM_OK,
    },
    synthetic::SyntheticDriver,
};
use serial_test::serial;
use std::{ptr, sync::Arc, time::Duration};

const TIMEOUT: Duration = Duration::from_secs(2);

#[test]
#[serial]
fn test_stream_and_copy() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let mut host = HostSession::init(driver.clone()).map_err(|status| format!("init {}", status))?;
    assert_eq!(host.stream_size(), None);
    assert_eq!(host.start_stream(640, 480, 30), JM_OK);
    assert_eq!(host.stream_size(), Some((640, 480)));

    let mut rgb = vec![0u8; 640 * 480 * 3];
    let mut depth = vec![0u8; 640 * 480 * 2];
    assert_eq!(
        host.wait_for_frames(Some(&mut rgb), Some(&mut depth), TIMEOUT),
        JM_OK
    );
    // Row 1, column 2 of the color pattern.
    let pixel = (640 + 2) * 3;
    assert_eq!(&rgb[pixel..pixel + 2], &[2, 1]);
    assert!(depth.iter().any(|&byte| byte != 0));

    // Either buffer may be skipped.
    assert_eq!(host.wait_for_frames(None, Some(&mut depth), TIMEOUT), JM_OK);
    assert_eq!(host.wait_for_frames(None, None, TIMEOUT), JM_OK);

    host.close();
    assert_eq!(driver.live_objects(), 0);
    assert_eq!(driver.invalid_releases(), 0);
    Ok(())
}

#[test]
#[serial]
fn test_small_buffer() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let mut host = HostSession::init(driver).map_err(|status| format!("init {}", status))?;
    assert_eq!(host.start_stream(640, 480, 30), JM_OK);

    let mut rgb = vec![0u8; 640 * 480 * 3 - 1];
    assert_eq!(
        host.wait_for_frames(Some(&mut rgb), None, TIMEOUT),
        JM_ERR_BUFFER
    );
    assert!(rgb.iter().all(|&byte| byte == 0));
    Ok(())
}

#[test]
#[serial]
fn test_stream_failures() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::disconnected());
    let mut host = HostSession::init(driver.clone()).map_err(|status| format!("init {}", status))?;
    assert_eq!(host.start_stream(640, 480, 30), JM_ERR_DEVICE);
    assert_eq!(host.stream_size(), None);
    assert_eq!(host.wait_for_frames(None, None, TIMEOUT), JM_ERR_DEVICE);
    assert!(host.telemetry().is_err());

    driver.set_connected(true);
    assert_eq!(host.start_stream(321, 123, 30), JM_ERR_DEVICE);
    assert_eq!(host.start_stream(640, 480, 30), JM_OK);
    Ok(())
}

#[test]
#[serial]
fn test_wait_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let mut host = HostSession::init(driver.clone()).map_err(|status| format!("init {}", status))?;
    assert_eq!(host.start_stream(640, 480, 30), JM_OK);

    driver.stall_capture(true);
    while host.wait_for_frames(None, None, Duration::from_millis(100)) == JM_OK {}
    assert_eq!(
        host.wait_for_frames(None, None, Duration::from_millis(50)),
        JM_ERR_DEVICE
    );
    driver.stall_capture(false);
    assert_eq!(host.wait_for_frames(None, None, TIMEOUT), JM_OK);
    Ok(())
}

#[test]
#[serial]
fn test_telemetry() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let mut host = HostSession::init(driver).map_err(|status| format!("init {}", status))?;
    assert_eq!(host.telemetry().err(), Some(JM_ERR_DEVICE));
    assert_eq!(host.start_stream(640, 480, 30), JM_OK);

    let info = host.telemetry().map_err(|status| format!("telemetry {}", status))?;
    assert_eq!(info.asic_temp, 38.0);
    assert_eq!(info.projector_temp, 35.5);
    assert_eq!(info.sync_mode, 0.0);
    assert_eq!(info.usb_type(), "3.2");
    Ok(())
}

#[test]
#[serial]
fn test_telemetry_without_depth_sensor() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let mut host = HostSession::init(driver.clone()).map_err(|status| format!("init {}", status))?;
    assert_eq!(host.start_stream(640, 480, 30), JM_OK);

    driver.hide_depth_sensor(true);
    let info = host.telemetry().map_err(|status| format!("telemetry {}", status))?;
    assert_eq!(info.asic_temp, 0.0);
    assert_eq!(info.projector_temp, 0.0);
    assert_eq!(info.sync_mode, 0.0);
    assert_eq!(info.usb_type(), "3.2");

    driver.hide_depth_sensor(false);
    assert_eq!(host.telemetry().map_err(|status| format!("telemetry {}", status))?.asic_temp, 38.0);
    Ok(())
}

#[test]
#[serial]
fn test_c_entry_points() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    assert_eq!(init_host(driver.clone()), JM_OK);

    let mut info = TelemetryInfo::default();
    assert_eq!(unsafe { JM_GetTelemetry(&mut info) }, JM_ERR_DEVICE);
    assert_eq!(JM_StartStream(0, 480, 30), JM_ERR_DEVICE);
    assert_eq!(JM_StartStream(640, 480, -1), JM_ERR_DEVICE);
    assert_eq!(JM_StartStream(640, 480, 30), JM_OK);

    let mut rgb = vec![0u8; 640 * 480 * 3];
    let mut depth = vec![0u8; 640 * 480 * 2];
    let status = unsafe { JM_WaitForFrames(rgb.as_mut_ptr(), depth.as_mut_ptr(), 2000) };
    assert_eq!(status, JM_OK);
    assert!(depth.iter().any(|&byte| byte != 0));
    let status = unsafe { JM_WaitForFrames(ptr::null_mut(), depth.as_mut_ptr(), 2000) };
    assert_eq!(status, JM_OK);

    assert_eq!(unsafe { JM_GetTelemetry(ptr::null_mut()) }, JM_ERR_BUFFER);
    assert_eq!(unsafe { JM_GetTelemetry(&mut info) }, JM_OK);
    assert_eq!(info.asic_temp, 38.0);
    assert_eq!(info.usb_type(), "3.2");

    JM_Close();
    JM_Close();
    assert_eq!(JM_StartStream(640, 480, 30), JM_ERR_NOT_INITIALIZED);
    assert_eq!(unsafe { JM_GetTelemetry(&mut info) }, JM_ERR_NOT_INITIALIZED);
    assert_eq!(driver.live_objects(), 0);
    assert_eq!(driver.invalid_releases(), 0);
    Ok(())
}

#[test]
#[serial]
fn test_init_replaces_session() -> Result<(), Box<dyn std::error::Error>> {
    let first = Arc::new(SyntheticDriver::new());
    assert_eq!(init_host(first.clone()), JM_OK);
    assert_eq!(JM_StartStream(640, 480, 30), JM_OK);

    let second = Arc::new(SyntheticDriver::new());
    assert_eq!(init_host(second.clone()), JM_OK);
    assert_eq!(first.live_objects(), 0);

    // The new session has no stream yet.
    let status = unsafe { JM_WaitForFrames(ptr::null_mut(), ptr::null_mut(), 100) };
    assert_eq!(status, JM_ERR_DEVICE);
    JM_Close();
    assert_eq!(second.live_objects(), 0);
    Ok(())
}
