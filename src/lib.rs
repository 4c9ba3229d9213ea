// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst RealSense Library
//!
//! This library wraps the Intel RealSense depth camera runtime
//! (`librealsense2`) with safe ownership of every native handle. It covers
//! stream configuration, synchronized frame acquisition, the depth
//! post-processing filters, device and sensor options, and telemetry, and it
//! exports a small C ABI for host applications.
//!
//! ## Features
//!
//! - **Scoped Handles**: sessions, pipelines, frames and processing stages
//!   release their native resources exactly once, on `close` or drop.
//! - **Frame Lifetimes**: frames extracted from a frame set and frames passed
//!   through a filter hold their own references and outlive their source.
//! - **Processing Stages**: decimation, spatial, temporal and hole filling
//!   filters, the colorizer, and stream alignment with bounded waits.
//! - **Synthetic Driver**: a hardware-free runtime in [`synthetic`] with the
//!   same lifecycle rules, used by the tests and benchmarks.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_realsense::{Config, Filter, Format, OptionId, Options, Pipeline, Session, StreamKind};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new()?;
//! let mut config = Config::new(&session)?;
//! config.enable_stream(StreamKind::Depth, 640, 480, 30, Format::Z16)?;
//!
//! let mut decimation = Filter::decimation(&session)?;
//! decimation.set_option(OptionId::FILTER_MAGNITUDE, 2.0)?;
//!
//! let mut pipeline = Pipeline::new(&session)?;
//! pipeline.start(Some(&config))?;
//! let frames = pipeline.wait_for_frames(Duration::from_secs(5))?;
//! let depth = decimation.process(&frames.depth_frame()?)?;
//! println!("{}x{}", depth.width()?, depth.height()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Linux**: `librealsense2.so` from librealsense 2.50 or newer, loaded at
//!   runtime by [`Session::new`].
//!
//! ## Safety
//!
//! The native runtime is reached through `unsafe` FFI calls isolated to the
//! [`native`] module and the exported C functions in [`export`]. All other
//! modules use the safe [`driver::Driver`] interface.

pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod export;
pub mod frame;
pub mod native;
pub mod options;
pub mod pipeline;
pub mod processing;
pub mod session;
pub mod synthetic;

pub use config::{format_name, Config, Format, StreamKind, StreamRequest};
pub use device::{CameraInfo, Device, Sensor, StreamProfile, SyncMode, TelemetryData};
pub use error::{Error, NativeError, NativeErrorKind, Result};
pub use frame::{Frame, FrameSet, TimestampDomain};
pub use options::{OptionId, OptionRange, Options, VisualPreset};
pub use pipeline::{Pipeline, PipelineState};
pub use processing::{Align, Filter, StageKind};
pub use session::{ApiVersion, Session};
