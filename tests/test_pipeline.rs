// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_realsense::{
    synthetic::SyntheticDriver, Config, Error, Format, Pipeline, PipelineState, Session,
    StreamKind, TimestampDomain,
};
use serial_test::serial;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

fn synthetic() -> Result<(Arc<SyntheticDriver>, Session), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    Ok((driver, session))
}

fn depth_and_color(session: &Session) -> Result<Config, Error> {
    let mut config = Config::new(session)?;
    config
        .enable_stream(StreamKind::Depth, 640, 480, 30, Format::Z16)?
        .enable_stream(StreamKind::Color, 640, 480, 30, Format::Rgb8)?;
    Ok(config)
}

#[test]
#[serial]
fn test_depth_and_color() -> Result<(), Box<dyn std::error::Error>> {
    let (driver, session) = synthetic()?;
    let config = depth_and_color(&session)?;
    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(Some(&config))?;

    let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
    assert_eq!(frames.len()?, 2);

    let depth = frames.depth_frame()?;
    assert_eq!((depth.width()?, depth.height()?), (640, 480));
    assert_eq!(depth.bits_per_pixel()?, 16);
    assert_eq!(depth.format_name()?, "Z16");
    assert_eq!(depth.raw_bytes()?.len(), 307200);
    assert_eq!(depth.depth_samples()?.len(), 640 * 480);
    assert_eq!(depth.timestamp_domain()?, TimestampDomain::HardwareClock);
    assert!(depth.timestamp()? > 0.0);

    let color = frames.color_frame()?;
    assert_eq!(color.stream_kind()?, StreamKind::Color);
    assert_eq!(color.format_name()?, "RGB8");
    assert_eq!(color.raw_bytes()?.len(), 921600);

    drop(frames);
    assert_eq!(depth.width()?, 640);
    assert_eq!(driver.frame_refs(&depth), Some(1));
    Ok(())
}

#[test]
#[serial]
fn test_frame_numbers_advance() -> Result<(), Box<dyn std::error::Error>> {
    let (_driver, session) = synthetic()?;
    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(None)?;

    let first = pipeline
        .wait_for_frames(Duration::from_secs(2))?
        .depth_frame()?
        .frame_number()?;
    let second = pipeline
        .wait_for_frames(Duration::from_secs(2))?
        .depth_frame()?
        .frame_number()?;
    assert!(second > first);
    Ok(())
}

#[test]
#[serial]
fn test_not_started() -> Result<(), Box<dyn std::error::Error>> {
    let (_driver, session) = synthetic()?;
    let mut pipeline = Pipeline::new(&session)?;
    assert!(matches!(
        pipeline.wait_for_frames(Duration::from_millis(10)),
        Err(Error::NotStarted)
    ));
    assert!(matches!(pipeline.device(), Err(Error::NotStarted)));

    pipeline.start(None)?;
    pipeline.stop();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(matches!(
        pipeline.wait_for_frames(Duration::from_millis(10)),
        Err(Error::NotStarted)
    ));
    Ok(())
}

#[test]
#[serial]
fn test_wait_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let (driver, session) = synthetic()?;
    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(None)?;

    driver.stall_capture(true);
    // Drain anything captured before the stall.
    while pipeline.wait_for_frames(Duration::from_millis(100)).is_ok() {}

    let timeout = Duration::from_millis(200);
    let start = Instant::now();
    let err = pipeline.wait_for_frames(timeout).unwrap_err();
    let elapsed = start.elapsed();
    assert!(err.is_timeout(), "{}", err);
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout * 10);

    driver.stall_capture(false);
    pipeline.wait_for_frames(Duration::from_secs(2))?;
    Ok(())
}

#[test]
#[serial]
fn test_unresolved_config() -> Result<(), Box<dyn std::error::Error>> {
    let (_driver, session) = synthetic()?;
    let mut config = Config::new(&session)?;
    config.enable_stream(StreamKind::Depth, 123, 45, 30, Format::Z16)?;

    let mut pipeline = Pipeline::new(&session)?;
    assert!(matches!(
        pipeline.start(Some(&config)),
        Err(Error::Configuration(_))
    ));
    assert_eq!(pipeline.state(), PipelineState::Created);
    Ok(())
}

#[test]
#[serial]
fn test_no_device() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::disconnected());
    let session = Session::with_driver(driver.clone())?;
    let mut pipeline = Pipeline::new(&session)?;
    assert!(matches!(pipeline.start(None), Err(Error::DeviceNotFound(_))));

    driver.set_connected(true);
    pipeline.start(None)?;
    assert_eq!(pipeline.state(), PipelineState::Started);
    Ok(())
}

#[test]
#[serial]
fn test_missing_stream() -> Result<(), Box<dyn std::error::Error>> {
    let (driver, session) = synthetic()?;
    let config = depth_and_color(&session)?;
    let mut pipeline = Pipeline::new(&session)?;
    driver.drop_stream(Some(StreamKind::Color));
    pipeline.start(Some(&config))?;

    let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
    assert_eq!(frames.len()?, 1);
    assert!(frames.depth_frame().is_ok());
    assert!(matches!(frames.color_frame(), Err(Error::NotFound(_))));
    Ok(())
}

#[test]
#[serial]
fn test_any_stream() -> Result<(), Box<dyn std::error::Error>> {
    let (driver, session) = synthetic()?;
    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(None)?;

    let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
    let first = frames.frame(StreamKind::Any)?;
    let all = frames.frames()?;
    assert_eq!(all.len(), 2);
    assert_eq!(first.stream_kind()?, all[0].stream_kind()?);
    assert_eq!(first.frame_number()?, all[0].frame_number()?);
    assert_eq!(frames.frame(StreamKind::Depth)?.stream_kind()?, StreamKind::Depth);

    // Only the color stream left in the set.
    driver.drop_stream(Some(StreamKind::Depth));
    let frames = loop {
        let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
        if frames.len()? == 1 {
            break frames;
        }
    };
    assert_eq!(frames.frame(StreamKind::Any)?.stream_kind()?, StreamKind::Color);

    drop((first, all, frames));
    pipeline.stop();
    assert_eq!(driver.invalid_releases(), 0);
    Ok(())
}

#[test]
#[serial]
fn test_restart_replaces_streams() -> Result<(), Box<dyn std::error::Error>> {
    let (_driver, session) = synthetic()?;
    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(None)?;
    let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
    assert_eq!(frames.depth_frame()?.width()?, 848);

    let mut config = Config::new(&session)?;
    config.enable_stream(StreamKind::Depth, 1280, 720, 30, Format::Z16)?;
    pipeline.start(Some(&config))?;
    let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
    assert_eq!(frames.len()?, 1);
    assert_eq!(frames.depth_frame()?.width()?, 1280);
    Ok(())
}

#[test]
#[serial]
fn test_session_close() -> Result<(), Box<dyn std::error::Error>> {
    let (_driver, session) = synthetic()?;
    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(None)?;

    session.close();
    session.close();
    assert!(!session.is_open());
    assert!(matches!(
        pipeline.wait_for_frames(Duration::from_millis(10)),
        Err(Error::SessionClosed)
    ));
    assert!(matches!(Pipeline::new(&session), Err(Error::SessionClosed)));
    Ok(())
}

#[test]
#[serial]
fn test_no_leaks() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    {
        let session = Session::with_driver(driver.clone())?;
        let config = depth_and_color(&session)?;
        let mut pipeline = Pipeline::new(&session)?;
        pipeline.start(Some(&config))?;

        let mut kept = Vec::new();
        for _ in 0..5 {
            let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
            kept.push(frames.depth_frame()?);
            let mut copy = frames.try_clone()?;
            copy.close();
            copy.close();
        }
        let device = pipeline.device()?;
        assert!(!device.name()?.is_empty());

        pipeline.close();
        assert!(driver.live_frames() >= kept.len());
        for frame in &kept {
            assert_eq!(frame.width()?, 640);
        }
    }
    assert_eq!(driver.live_frames(), 0);
    assert_eq!(driver.live_objects(), 0);
    assert_eq!(driver.invalid_releases(), 0);
    Ok(())
}
