// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_realsense::{
    synthetic::SyntheticDriver, Align, Config, Device, Filter, Format, Frame, OptionId, Options,
    Pipeline, Session, StreamKind, SyncMode,
};
use serde_json::json;
use std::{
    error::Error,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _};

fn update_fps(prev: &mut Instant, history: &mut [i64], index: &mut usize) -> i64 {
    let now = Instant::now();

    let elapsed = now.duration_since(*prev);
    *prev = now;

    history[*index] = 1e9 as i64 / (elapsed.as_nanos() as i64).max(1);
    *index = (*index + 1) % history.len();

    (history.iter().sum::<i64>() as f64 / history.len() as f64).round() as i64
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = if args.journald {
        Some(tracing_journald::layer()?.with_filter(args.rust_log))
    } else {
        None
    };

    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log))
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn open_session(args: &Args) -> Result<Session, Box<dyn Error>> {
    let session = if args.synthetic {
        Session::with_driver(Arc::new(SyntheticDriver::new()))?
    } else if let Some(path) = &args.device_library {
        Session::with_library(path)?
    } else {
        Session::new()?
    };
    info!("librealsense {}", session.api_version()?);
    Ok(session)
}

fn device_report(device: &Device) -> Result<serde_json::Value, Box<dyn Error>> {
    let telemetry = device.telemetry()?;
    let depth_scale = device.depth_sensor()?.depth_scale()?;
    Ok(json!({
        "name": device.name()?,
        "serial_number": device.serial_number()?,
        "firmware_version": device.firmware_version()?,
        "usb_type": device.usb_type_descriptor().unwrap_or_default(),
        "physical_port": device.physical_port().unwrap_or_default(),
        "depth_scale": depth_scale,
        "sync_mode": SyncMode::from_value(telemetry.sync_mode).to_string(),
        "telemetry": telemetry,
        "capabilities": device.capabilities()?,
    }))
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let session = open_session(&args)?;
    let (width, height) = match args.stream_size[..] {
        [width, height] => (width, height),
        _ => return Err("stream size must be width and height".into()),
    };
    let timeout = Duration::from_millis(args.timeout);

    let mut config = Config::new(&session)?;
    config
        .enable_stream(StreamKind::Depth, width, height, args.fps, Format::Z16)?
        .enable_stream(StreamKind::Color, width, height, args.fps, Format::Rgb8)?;

    let mut pipeline = Pipeline::new(&session)?;
    pipeline.start(Some(&config))?;

    let device = pipeline.device()?;
    info!(
        "streaming {}x{}@{} from {} ({})",
        width,
        height,
        args.fps,
        device.name()?,
        device.serial_number()?
    );
    if args.report {
        println!("{}", serde_json::to_string_pretty(&device_report(&device)?)?);
    }

    let depth_sensor = device.depth_sensor()?;
    if let Some(preset) = args.preset {
        if depth_sensor.supports(OptionId::VISUAL_PRESET)? {
            depth_sensor.set_visual_preset(preset)?;
            info!("visual preset {}", preset);
        } else {
            warn!("{} has no visual presets", depth_sensor.name()?);
        }
    }
    let depth_scale = depth_sensor.depth_scale()?;

    let mut filters = args
        .filters
        .iter()
        .map(|&setting| Ok(Filter::new(&session, setting.into())?.with_timeout(timeout)))
        .collect::<Result<Vec<_>, Box<dyn Error>>>()?;
    let mut colorizer = if args.colorize {
        Some(Filter::colorizer(&session)?.with_timeout(timeout))
    } else {
        None
    };
    let mut align = match args.align {
        Some(to) => Some(Align::new(&session, to)?.with_timeout(timeout)),
        None => None,
    };
    for filter in &filters {
        debug!("filter {} ready", filter.kind());
    }

    let mut prev = Instant::now();
    let mut history = vec![0; 30];
    let mut index = 0;
    let mut count = 0u64;
    while args.frames == 0 || count < args.frames {
        let frames = match pipeline.wait_for_frames(timeout) {
            Ok(frames) => frames,
            Err(err) if err.is_timeout() => {
                warn!("{}", err);
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let fps = update_fps(&mut prev, &mut history, &mut index);
        count += 1;

        let _span = info_span!("frame", count).entered();
        let frames = match align.as_mut() {
            Some(align) => align.process(&frames)?,
            None => frames,
        };

        let mut depth = frames.depth_frame()?;
        for filter in filters.iter_mut() {
            depth = filter.process(&depth)?;
        }
        let distance = center_distance(&depth, depth_scale)?;

        if let Some(colorizer) = colorizer.as_mut() {
            let colorized = colorizer.process(&depth)?;
            debug!(
                "colorized {}x{} {}",
                colorized.width()?,
                colorized.height()?,
                colorized.format_name()?
            );
        }

        info!(
            "frame {} depth {}x{} center {:.3} m fps: {}",
            depth.frame_number()?,
            depth.width()?,
            depth.height()?,
            distance,
            fps
        );

        if args.tracy {
            tracy_client::frame_mark();
        }
    }

    if let Ok(telemetry) = device.telemetry() {
        info!(
            "asic {:.1} C projector {:.1} C sync mode {}",
            telemetry.asic_temperature,
            telemetry.projector_temperature,
            SyncMode::from_value(telemetry.sync_mode)
        );
    }

    pipeline.stop();
    Ok(())
}

/// Distance in meters at the center pixel of a depth frame.
fn center_distance(depth: &Frame, depth_scale: f32) -> Result<f32, Box<dyn Error>> {
    let (width, height) = (depth.width()?, depth.height()?);
    let raw = depth.depth_at(width / 2, height / 2)?;
    Ok(raw as f32 * depth_scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_fps() {
        let mut history = vec![0; 4];
        let mut index = 0;
        let mut prev = Instant::now() - Duration::from_millis(100);
        let fps = update_fps(&mut prev, &mut history, &mut index);
        assert_eq!(index, 1);
        assert!(history[0] > 0 && history[0] <= 10);
        assert!(fps <= 3);
    }
}
