// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_realsense::{
    synthetic::SyntheticDriver, Align, Error, Filter, OptionId, Options, Pipeline, Session,
    StageKind, StreamKind,
};
use serial_test::serial;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

#[test]
#[serial]
fn test_filter_chain() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    let mut chain = vec![
        Filter::decimation(&session)?,
        Filter::spatial(&session)?,
        Filter::temporal(&session)?,
        Filter::hole_filling(&session)?,
    ];

    let input = driver.depth_frame(640, 480, |x, y| (x + y) as u16 + 1);
    let mut frame = input.try_clone()?;
    for filter in chain.iter_mut() {
        frame = filter.process(&frame)?;
    }
    assert_eq!((frame.width()?, frame.height()?), (320, 240));
    assert_eq!(frame.stream_kind()?, StreamKind::Depth);
    assert_eq!(frame.depth_samples()?.len(), 320 * 240);

    let mut colorizer = Filter::colorizer(&session)?;
    let colored = colorizer.process(&frame)?;
    assert_eq!((colored.width()?, colored.height()?), (320, 240));
    assert_eq!(colored.raw_bytes()?.len(), 320 * 240 * 3);

    assert_eq!((input.width()?, input.height()?), (640, 480));
    assert_eq!(input.depth_at(10, 20)?, 31);
    assert_eq!(driver.frame_refs(&input), Some(1));
    Ok(())
}

#[test]
#[serial]
fn test_decimation_magnitude() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    let mut decimate = Filter::decimation(&session)?;

    let range = decimate
        .option_range(OptionId::FILTER_MAGNITUDE)?
        .ok_or("magnitude range")?;
    assert_eq!((range.min, range.max, range.default), (2.0, 8.0, 2.0));

    decimate.set_option(OptionId::FILTER_MAGNITUDE, 4.0)?;
    let frame = driver.depth_frame(640, 480, |_, _| 1000);
    let output = decimate.process(&frame)?;
    assert_eq!((output.width()?, output.height()?), (160, 120));

    assert!(matches!(
        decimate.set_option(OptionId::FILTER_MAGNITUDE, 100.0),
        Err(Error::Native(_))
    ));
    assert_eq!(decimate.get_option(OptionId::FILTER_MAGNITUDE)?, 4.0);
    Ok(())
}

#[test]
#[serial]
fn test_hole_filling() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    let mut holes = Filter::hole_filling(&session)?;

    let frame = driver.depth_frame(8, 2, |x, _| if x % 2 == 0 { 700 } else { 0 });
    let output = holes.process(&frame)?;
    assert!(output.depth_samples()?.iter().all(|&depth| depth == 700));
    assert_eq!(frame.depth_at(1, 0)?, 0);
    Ok(())
}

#[test]
#[serial]
fn test_colorizer() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    let mut colorizer = Filter::colorizer(&session)?;
    assert_eq!(colorizer.kind(), StageKind::Colorizer);

    let frame = driver.depth_frame(64, 48, |x, _| x as u16 * 10);
    let colored = colorizer.process(&frame)?;
    assert_eq!((colored.width()?, colored.height()?), (64, 48));
    assert_eq!(colored.format_name()?, "RGB8");
    assert_eq!(colored.bits_per_pixel()?, 24);
    assert_eq!(colored.raw_bytes()?.len(), 64 * 48 * 3);
    assert!(matches!(colored.depth_samples(), Err(Error::InvalidFrame(_))));

    // Colorizing a color frame is rejected by the block.
    assert!(colorizer.process(&colored).is_err());
    Ok(())
}

#[test]
#[serial]
fn test_output_outlives_input() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    let mut temporal = Filter::temporal(&session)?;

    let mut input = driver.depth_frame(32, 32, |_, _| 1234);
    let output = temporal.process(&input)?;
    assert_eq!(driver.frame_refs(&input), Some(1));
    assert_eq!(driver.frame_refs(&output), Some(1));

    input.close();
    assert!(input.is_closed());
    assert!(matches!(input.width(), Err(Error::Closed(_))));
    assert_eq!(output.depth_at(5, 5)?, 1234);
    Ok(())
}

#[test]
#[serial]
fn test_stage_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    let timeout = Duration::from_millis(100);
    let mut spatial = Filter::spatial(&session)?.with_timeout(timeout);
    assert_eq!(spatial.timeout(), timeout);

    let frame = driver.depth_frame(16, 16, |_, _| 900);
    driver.stall_processing(true);
    let start = Instant::now();
    let err = spatial.process(&frame).unwrap_err();
    assert!(err.is_timeout(), "{}", err);
    assert!(start.elapsed() >= timeout);
    assert_eq!(driver.frame_refs(&frame), Some(1));

    driver.stall_processing(false);
    let output = spatial.process(&frame)?;
    assert_eq!(output.width()?, 16);
    Ok(())
}

#[test]
#[serial]
fn test_align_to_color() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(None)?;
    let mut align = Align::new(&session, StreamKind::Color)?;
    assert_eq!(align.align_to(), StreamKind::Color);

    let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
    let depth = frames.depth_frame()?;
    let color = frames.color_frame()?;
    assert_eq!((depth.width()?, depth.height()?), (848, 480));
    assert_eq!((color.width()?, color.height()?), (1280, 720));

    let aligned = align.process(&frames)?;
    assert_eq!(aligned.len()?, 2);
    let aligned_depth = aligned.depth_frame()?;
    assert_eq!((aligned_depth.width()?, aligned_depth.height()?), (1280, 720));
    assert_eq!(aligned_depth.format_name()?, "Z16");
    assert_eq!(aligned.color_frame()?.width()?, 1280);

    // The source set keeps its own frames.
    assert_eq!(frames.depth_frame()?.width()?, 848);
    Ok(())
}

#[test]
#[serial]
fn test_align_to_depth() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    let session = Session::with_driver(driver.clone())?;
    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(None)?;
    let mut align = Align::new(&session, StreamKind::Depth)?.with_timeout(Duration::from_secs(1));

    let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
    let aligned = align.process(&frames)?;
    let color = aligned.color_frame()?;
    assert_eq!((color.width()?, color.height()?), (848, 480));
    assert_eq!(color.format_name()?, "RGB8");
    Ok(())
}

#[test]
#[serial]
fn test_no_leaks() -> Result<(), Box<dyn std::error::Error>> {
    let driver = Arc::new(SyntheticDriver::new());
    {
        let session = Session::with_driver(driver.clone())?;
        let mut pipeline = Pipeline::new(&session)?;
        pipeline.start(None)?;
        let mut decimate = Filter::decimation(&session)?;
        let mut colorizer = Filter::colorizer(&session)?;
        let mut align = Align::new(&session, StreamKind::Color)?;

        let mut outputs = Vec::new();
        for _ in 0..3 {
            let frames = pipeline.wait_for_frames(Duration::from_secs(2))?;
            let aligned = align.process(&frames)?;
            let depth = decimate.process(&aligned.depth_frame()?)?;
            outputs.push(colorizer.process(&depth)?);
        }
        decimate.close();
        align.close();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].width()?, 640);
    }
    assert_eq!(driver.live_frames(), 0);
    assert_eq!(driver.live_objects(), 0);
    assert_eq!(driver.invalid_releases(), 0);
    Ok(())
}
