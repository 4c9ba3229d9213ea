// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_realsense::{StageKind, StreamKind, VisualPreset};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

/// Depth post-processing filters, applied in the order given.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum FilterSetting {
    /// Downsample by the filter magnitude (default 2)
    Decimation,
    /// Edge-preserving spatial smoothing
    Spatial,
    /// Smoothing across consecutive frames
    Temporal,
    /// Fill invalid (zero) depth pixels
    HoleFilling,
}

impl From<FilterSetting> for StageKind {
    fn from(setting: FilterSetting) -> Self {
        match setting {
            FilterSetting::Decimation => StageKind::Decimation,
            FilterSetting::Spatial => StageKind::Spatial,
            FilterSetting::Temporal => StageKind::Temporal,
            FilterSetting::HoleFilling => StageKind::HoleFilling,
        }
    }
}

/// Command-line arguments for EdgeFirst RealSense.
///
/// Streams depth and color from the first attached RealSense camera, runs
/// the requested processing stages and logs per-frame statistics. Arguments
/// can be specified via command line or environment variables.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-realsense --report --filters "decimation hole-filling" --frames 300
///
/// # Without hardware
/// export SYNTHETIC=true
/// edgefirst-realsense --align color
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to librealsense2, the system search path is used otherwise
    #[arg(long, env = "DEVICE_LIBRARY")]
    pub device_library: Option<PathBuf>,

    /// Use the built-in synthetic camera instead of librealsense2
    #[arg(long, env = "SYNTHETIC")]
    pub synthetic: bool,

    /// Depth and color resolution in pixels (width height)
    #[arg(
        short,
        long,
        env = "STREAM_SIZE",
        default_value = "640 480",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub stream_size: Vec<u32>,

    /// Depth and color frame rate
    #[arg(long, env = "FPS", default_value = "30")]
    pub fps: u32,

    /// Frame wait timeout in milliseconds
    #[arg(long, env = "TIMEOUT", default_value = "5000")]
    pub timeout: u64,

    /// Depth filters to apply, in order
    #[arg(long, env = "FILTERS", value_delimiter = ' ', value_enum)]
    pub filters: Vec<FilterSetting>,

    /// Align every frame set to this stream
    #[arg(long, env = "ALIGN", value_enum)]
    pub align: Option<StreamKind>,

    /// Colorize the processed depth frame
    #[arg(long, env = "COLORIZE")]
    pub colorize: bool,

    /// Depth sensor visual preset applied before streaming
    #[arg(long, env = "PRESET", value_enum)]
    pub preset: Option<VisualPreset>,

    /// Number of frame sets to process, 0 streams until interrupted
    #[arg(long, env = "FRAMES", default_value = "0")]
    pub frames: u64,

    /// Print the device report as JSON before streaming
    #[arg(long, env = "REPORT")]
    pub report: bool,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable journald logging
    #[arg(long, env = "JOURNALD")]
    pub journald: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}
