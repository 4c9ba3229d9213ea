// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Simulated device implementing [`Driver`] in pure Rust.
//!
//! The synthetic driver models a depth camera with a stereo depth module, an
//! RGB camera and a motion module. Started pipelines capture frame sets on a
//! background thread at the configured rate, and processing blocks apply
//! simple stand-in transforms with the same output geometry as the real
//! filters.
//!
//! Every object handed out is tracked in a registry, so tests can check that
//! references are balanced: [`SyntheticDriver::live_objects`] returns to zero
//! once everything is dropped, and [`SyntheticDriver::invalid_releases`]
//! counts releases of handles that were not live.

use crate::{
    config::{Format, StreamKind, StreamRequest},
    device::CameraInfo,
    driver::*,
    error::{NativeError, NativeErrorKind},
    frame::{Frame, TimestampDomain},
    options::{OptionId, OptionRange},
    processing::StageKind,
};
use kanal::{Receiver, ReceiveErrorTimeout, Sender};
use rs2_sys::*;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    ffi::c_void,
    ptr::NonNull,
    slice,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, trace, warn};

/// Encoded API version reported by the synthetic driver.
pub const API_VERSION: i32 = 25501;

/// Depth units of the simulated depth sensor, in meters.
pub const DEPTH_SCALE: f32 = 0.001;

const DEVICE_NAME: &str = "Synthetic Depth Camera";

fn device_info(info: CameraInfo) -> Option<&'static str> {
    match info {
        CameraInfo::Name => Some(DEVICE_NAME),
        CameraInfo::SerialNumber => Some("000000000001"),
        CameraInfo::FirmwareVersion => Some("5.16.0.1"),
        CameraInfo::RecommendedFirmwareVersion => Some("5.16.0.1"),
        CameraInfo::PhysicalPort => Some("synthetic"),
        CameraInfo::ProductId => Some("0B5C"),
        CameraInfo::UsbTypeDescriptor => Some("3.2"),
        CameraInfo::ProductLine => Some("D400"),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Mode {
    stream: StreamKind,
    format: i32,
    width: u32,
    height: u32,
    fps: u32,
    default: bool,
}

impl Mode {
    fn is_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    fn matches(&self, request: &StreamRequest) -> bool {
        (request.stream == StreamKind::Any || request.stream == self.stream)
            && (request.width == 0 || request.width == self.width)
            && (request.height == 0 || request.height == self.height)
            && (request.fps == 0 || request.fps == self.fps)
            && (request.format == Format::Any || request.format.as_raw() == self.format)
    }
}

struct SensorSpec {
    name: &'static str,
    depth: bool,
    modes: Vec<Mode>,
    options: OptionTable,
}

fn video_modes(
    stream: StreamKind,
    formats: &[i32],
    sizes: &[(u32, u32)],
    rates: &[u32],
    default: (i32, u32, u32, u32),
) -> Vec<Mode> {
    let mut modes = Vec::new();
    for &format in formats {
        for &(width, height) in sizes {
            for &fps in rates {
                modes.push(Mode {
                    stream,
                    format,
                    width,
                    height,
                    fps,
                    default: (format, width, height, fps) == default,
                });
            }
        }
    }
    // Default modes first, so resolving a loose request picks them.
    modes.sort_by_key(|mode| !mode.default);
    modes
}

fn sensor_specs() -> Vec<SensorSpec> {
    let stereo_sizes = [(848, 480), (640, 480), (1280, 720)];
    let mut stereo = video_modes(
        StreamKind::Depth,
        &[RS2_FORMAT_Z16],
        &stereo_sizes,
        &[30, 15, 60],
        (RS2_FORMAT_Z16, 848, 480, 30),
    );
    stereo.extend(video_modes(
        StreamKind::Infrared,
        &[RS2_FORMAT_Y8],
        &stereo_sizes,
        &[30, 15],
        (RS2_FORMAT_Y8, 848, 480, 30),
    ));

    let motion = [
        (StreamKind::Gyro, 200, true),
        (StreamKind::Gyro, 400, false),
        (StreamKind::Accel, 100, true),
        (StreamKind::Accel, 200, false),
    ]
    .into_iter()
    .map(|(stream, fps, default)| Mode {
        stream,
        format: RS2_FORMAT_MOTION_XYZ32F,
        width: 0,
        height: 0,
        fps,
        default,
    })
    .collect();

    vec![
        SensorSpec {
            name: "Stereo Module",
            depth: true,
            modes: stereo,
            options: OptionTable::default()
                .with(OptionId::EXPOSURE, 1.0, 165000.0, 1.0, 8500.0)
                .with(OptionId::GAIN, 16.0, 248.0, 1.0, 16.0)
                .with(OptionId::ENABLE_AUTO_EXPOSURE, 0.0, 1.0, 1.0, 1.0)
                .with(OptionId::VISUAL_PRESET, 0.0, 6.0, 1.0, 1.0)
                .with(OptionId::LASER_POWER, 0.0, 360.0, 30.0, 150.0)
                .with(OptionId::EMITTER_ENABLED, 0.0, 2.0, 1.0, 1.0)
                .with(OptionId::INTER_CAM_SYNC_MODE, 0.0, 260.0, 1.0, 0.0)
                .read_only(OptionId::DEPTH_UNITS, DEPTH_SCALE)
                .read_only(OptionId::ASIC_TEMPERATURE, 38.0)
                .read_only(OptionId::PROJECTOR_TEMPERATURE, 35.5),
        },
        SensorSpec {
            name: "RGB Camera",
            depth: false,
            modes: video_modes(
                StreamKind::Color,
                &[RS2_FORMAT_RGB8, RS2_FORMAT_YUYV],
                &[(1280, 720), (640, 480)],
                &[30, 15],
                (RS2_FORMAT_RGB8, 1280, 720, 30),
            ),
            options: OptionTable::default()
                .with(OptionId::BACKLIGHT_COMPENSATION, 0.0, 1.0, 1.0, 0.0)
                .with(OptionId::BRIGHTNESS, -64.0, 64.0, 1.0, 0.0)
                .with(OptionId::CONTRAST, 0.0, 100.0, 1.0, 50.0)
                .with(OptionId::EXPOSURE, 1.0, 10000.0, 1.0, 156.0)
                .with(OptionId::GAIN, 0.0, 128.0, 1.0, 64.0)
                .with(OptionId::ENABLE_AUTO_EXPOSURE, 0.0, 1.0, 1.0, 1.0),
        },
        SensorSpec {
            name: "Motion Module",
            depth: false,
            modes: motion,
            options: OptionTable::default()
                .read_only(OptionId::MOTION_MODULE_TEMPERATURE, 31.0),
        },
    ]
}

fn block_options(kind: StageKind) -> OptionTable {
    match kind {
        StageKind::Decimation => {
            OptionTable::default().with(OptionId::FILTER_MAGNITUDE, 2.0, 8.0, 1.0, 2.0)
        }
        StageKind::Spatial => OptionTable::default()
            .with(OptionId::FILTER_MAGNITUDE, 1.0, 5.0, 1.0, 2.0)
            .with(OptionId::FILTER_SMOOTH_ALPHA, 0.25, 1.0, 0.01, 0.5)
            .with(OptionId::FILTER_SMOOTH_DELTA, 1.0, 50.0, 1.0, 20.0)
            .with(OptionId::HOLES_FILL, 0.0, 5.0, 1.0, 0.0),
        StageKind::Temporal => OptionTable::default()
            .with(OptionId::FILTER_SMOOTH_ALPHA, 0.0, 1.0, 0.1, 0.4)
            .with(OptionId::FILTER_SMOOTH_DELTA, 1.0, 100.0, 1.0, 20.0),
        StageKind::HoleFilling => {
            OptionTable::default().with(OptionId::HOLES_FILL, 0.0, 2.0, 1.0, 1.0)
        }
        StageKind::Colorizer => OptionTable::default()
            .with(OptionId::COLOR_SCHEME, 0.0, 9.0, 1.0, 0.0)
            .with(OptionId::HISTOGRAM_EQUALIZATION_ENABLED, 0.0, 1.0, 1.0, 1.0)
            .with(OptionId::MIN_DISTANCE, 0.0, 16.0, 0.1, 0.0)
            .with(OptionId::MAX_DISTANCE, 0.0, 16.0, 0.1, 6.0),
        StageKind::Align(_) => OptionTable::default(),
    }
}

#[derive(Clone, Copy, Debug)]
struct OptionEntry {
    value: f32,
    range: OptionRange,
    read_only: bool,
}

#[derive(Clone, Debug, Default)]
struct OptionTable(BTreeMap<OptionId, OptionEntry>);

impl OptionTable {
    fn with(mut self, id: OptionId, min: f32, max: f32, step: f32, default: f32) -> Self {
        let range = OptionRange {
            min,
            max,
            step,
            default,
        };
        self.0.insert(
            id,
            OptionEntry {
                value: default,
                range,
                read_only: false,
            },
        );
        self
    }

    fn read_only(mut self, id: OptionId, value: f32) -> Self {
        let range = OptionRange {
            min: value,
            max: value,
            step: 0.0,
            default: value,
        };
        self.0.insert(
            id,
            OptionEntry {
                value,
                range,
                read_only: true,
            },
        );
        self
    }

    fn entry(&self, id: OptionId) -> Result<&OptionEntry, NativeError> {
        self.0.get(&id).ok_or_else(|| {
            invalid_value("rs2_get_option", format!("option {} not supported", id))
        })
    }

    fn set(&mut self, id: OptionId, value: f32) -> Result<(), NativeError> {
        let entry = self.0.get_mut(&id).ok_or_else(|| {
            invalid_value("rs2_set_option", format!("option {} not supported", id))
        })?;
        if entry.read_only {
            return Err(NativeError::new(
                NativeErrorKind::WrongApiCallSequence,
                format!("option {} is read only", id),
                "rs2_set_option",
                format!("option:{}, value:{}", id, value),
            ));
        }
        if !value.is_finite() || !entry.range.contains(value) {
            return Err(invalid_value(
                "rs2_set_option",
                format!("out of range value {} for option {}", value, id),
            ));
        }
        entry.value = value;
        Ok(())
    }
}

fn invalid_value(function: &str, message: String) -> NativeError {
    NativeError::new(NativeErrorKind::InvalidValue, message, function, "")
}

fn invalid_handle(function: &str) -> NativeError {
    NativeError::new(
        NativeErrorKind::InvalidValue,
        "null pointer passed for argument",
        function,
        "",
    )
}

/// Image owned by the registry; 16-bit backed so depth views are aligned.
#[derive(Clone, Debug)]
struct Image {
    stream: StreamKind,
    format: i32,
    fps: u32,
    width: u32,
    height: u32,
    stride: u32,
    bits_per_pixel: u32,
    timestamp: f64,
    domain: TimestampDomain,
    number: u64,
    data: Box<[u16]>,
}

impl Image {
    fn new(mode: &Mode, width: u32, height: u32, timestamp: f64, number: u64) -> Self {
        let bits_per_pixel = bits_per_pixel(mode.format);
        let stride = width * bits_per_pixel / 8;
        let len = (stride as usize * height as usize).div_ceil(2);
        Self {
            stream: mode.stream,
            format: mode.format,
            fps: mode.fps,
            width,
            height,
            stride,
            bits_per_pixel,
            timestamp,
            domain: TimestampDomain::HardwareClock,
            number,
            data: vec![0; len].into_boxed_slice(),
        }
    }

    fn mode(&self) -> Mode {
        Mode {
            stream: self.stream,
            format: self.format,
            width: self.width,
            height: self.height,
            fps: self.fps,
            default: false,
        }
    }

    fn bytes(&self) -> &[u8] {
        let len = self.stride as usize * self.height as usize;
        // u16 storage reinterpreted as bytes, truncated to the image length.
        unsafe { slice::from_raw_parts(self.data.as_ptr().cast::<u8>(), len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.stride as usize * self.height as usize;
        unsafe { slice::from_raw_parts_mut(self.data.as_mut_ptr().cast::<u8>(), len) }
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel / 8) as usize
    }

    /// Test pattern for a captured frame.
    fn pattern(mode: &Mode, number: u64, timestamp: f64) -> Self {
        let mut image = Self::new(mode, mode.width, mode.height, timestamp, number);
        let (width, stride) = (image.width as usize, image.stride as usize);
        let phase = number as usize;
        match mode.format {
            RS2_FORMAT_Z16 => {
                let row = stride / 2;
                for (y, line) in image.data.chunks_mut(row).enumerate() {
                    for (x, sample) in line.iter_mut().take(width).enumerate() {
                        *sample = if (x * 7 + y * 13) % 29 == 0 {
                            0
                        } else {
                            (400 + (x + y + phase) % 4000) as u16
                        };
                    }
                }
            }
            RS2_FORMAT_RGB8 => {
                let bytes = image.bytes_mut();
                for (y, line) in bytes.chunks_mut(stride).enumerate() {
                    for (x, pixel) in line.chunks_mut(3).take(width).enumerate() {
                        pixel.copy_from_slice(&[x as u8, y as u8, phase as u8]);
                    }
                }
            }
            _ => {
                let bytes = image.bytes_mut();
                for (index, byte) in bytes.iter_mut().enumerate() {
                    *byte = (index + phase) as u8;
                }
            }
        }
        image
    }

    /// Nearest-neighbour copy at a new size.
    fn resample(&self, width: u32, height: u32) -> Image {
        let mut output = Image::new(&self.mode(), width, height, self.timestamp, self.number);
        output.domain = self.domain;
        if width == 0 || height == 0 || self.width == 0 || self.height == 0 {
            return output;
        }
        let pixel = self.bytes_per_pixel();
        let (src_stride, dst_stride) = (self.stride as usize, output.stride as usize);
        let source = self.bytes();
        let target = output.bytes_mut();
        for y in 0..height as usize {
            let sy = y * self.height as usize / height as usize;
            for x in 0..width as usize {
                let sx = x * self.width as usize / width as usize;
                let from = sy * src_stride + sx * pixel;
                let to = y * dst_stride + x * pixel;
                target[to..to + pixel].copy_from_slice(&source[from..from + pixel]);
            }
        }
        output
    }

    /// Replaces zero depth samples with the nearest valid sample to the left.
    fn fill_holes(&self) -> Image {
        let mut output = self.clone();
        let row = (self.stride / 2) as usize;
        if row == 0 {
            return output;
        }
        for line in output.data.chunks_mut(row) {
            let mut last = 0;
            for sample in line.iter_mut().take(self.width as usize) {
                if *sample == 0 {
                    *sample = last;
                } else {
                    last = *sample;
                }
            }
        }
        output
    }

    /// Maps depth to an RGB8 ramp, invalid samples black.
    fn colorize(&self) -> Image {
        let mode = Mode {
            format: RS2_FORMAT_RGB8,
            ..self.mode()
        };
        let mut output = Image::new(&mode, self.width, self.height, self.timestamp, self.number);
        output.domain = self.domain;
        let (width, row) = (self.width as usize, (self.stride / 2) as usize);
        if row == 0 {
            return output;
        }
        let max = self
            .data
            .chunks(row)
            .flat_map(|line| line.iter().take(width))
            .copied()
            .max()
            .unwrap_or(0)
            .max(1) as u32;
        let dst_stride = output.stride as usize;
        let target = output.bytes_mut();
        for (y, line) in self.data.chunks(row).enumerate().take(self.height as usize) {
            for (x, &depth) in line.iter().take(width).enumerate() {
                let to = y * dst_stride + x * 3;
                let pixel = if depth == 0 {
                    [0, 0, 0]
                } else {
                    let value = (depth as u32 * 255 / max) as u8;
                    [value, 255 - value, 0]
                };
                target[to..to + 3].copy_from_slice(&pixel);
            }
        }
        output
    }
}

fn bits_per_pixel(format: i32) -> u32 {
    match format {
        RS2_FORMAT_Y8 | RS2_FORMAT_RAW8 => 8,
        RS2_FORMAT_RGB8 | RS2_FORMAT_BGR8 => 24,
        RS2_FORMAT_RGBA8 | RS2_FORMAT_BGRA8 => 32,
        _ => 16,
    }
}

#[derive(Debug)]
enum FrameBody {
    Image(Image),
    Set(Vec<usize>),
}

#[derive(Debug)]
struct FrameEntry {
    refs: usize,
    body: FrameBody,
}

struct Capture {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
    frames: Receiver<usize>,
    // Keeps the channel open so sets left after the thread exits can drain.
    _sender: Sender<usize>,
}

struct PipelineEntry {
    active: Option<Vec<Mode>>,
    capture: Option<Capture>,
}

struct QueueEntry {
    tx: Sender<usize>,
    rx: Receiver<usize>,
}

struct BlockEntry {
    kind: StageKind,
    options: OptionTable,
    sink: Option<usize>,
}

enum Object {
    Context,
    Config(Vec<StreamRequest>),
    Pipeline(PipelineEntry),
    Profile(Vec<Mode>),
    Frame(FrameEntry),
    Block(BlockEntry),
    Queue(QueueEntry),
    Device,
    Sensor(usize),
    ProfileList(Vec<usize>),
    StreamProfile(Mode),
}

struct State {
    next_id: usize,
    objects: HashMap<usize, Object>,
    sensors: Vec<SensorSpec>,
    invalid_releases: usize,
}

impl State {
    fn insert(&mut self, object: Object) -> usize {
        self.next_id += 1;
        self.objects.insert(self.next_id, object);
        self.next_id
    }

    fn remove(&mut self, id: usize, function: &str) -> Option<Object> {
        let object = self.objects.remove(&id);
        if object.is_none() {
            self.invalid_releases += 1;
            warn!("{} called with stale handle {}", function, id);
        }
        object
    }

    fn frame(&self, id: usize) -> Result<&FrameEntry, NativeError> {
        match self.objects.get(&id) {
            Some(Object::Frame(entry)) => Ok(entry),
            _ => Err(invalid_handle("rs2_frame")),
        }
    }

    fn image(&self, id: usize) -> Result<&Image, NativeError> {
        match &self.frame(id)?.body {
            FrameBody::Image(image) => Ok(image),
            FrameBody::Set(_) => Err(NativeError::new(
                NativeErrorKind::InvalidValue,
                "frame set has no image",
                "rs2_get_frame_data",
                "",
            )),
        }
    }

    fn new_frame(&mut self, body: FrameBody) -> usize {
        self.insert(Object::Frame(FrameEntry { refs: 1, body }))
    }

    fn add_ref(&mut self, id: usize) -> Result<(), NativeError> {
        match self.objects.get_mut(&id) {
            Some(Object::Frame(entry)) => {
                entry.refs += 1;
                Ok(())
            }
            _ => Err(invalid_handle("rs2_frame_add_ref")),
        }
    }

    fn release(&mut self, id: usize) {
        let children = match self.objects.get_mut(&id) {
            Some(Object::Frame(entry)) => {
                entry.refs -= 1;
                if entry.refs > 0 {
                    return;
                }
                match self.objects.remove(&id) {
                    Some(Object::Frame(FrameEntry {
                        body: FrameBody::Set(children),
                        ..
                    })) => children,
                    _ => Vec::new(),
                }
            }
            _ => {
                self.invalid_releases += 1;
                warn!("rs2_release_frame called with stale frame {}", id);
                return;
            }
        };
        for child in children {
            self.release(child);
        }
    }

    /// Queues `frame` on a single-slot queue, releasing what it displaces.
    fn enqueue(&mut self, queue: usize, frame: usize) {
        let (tx, rx) = match self.objects.get(&queue) {
            Some(Object::Queue(entry)) => (entry.tx.clone(), entry.rx.clone()),
            _ => {
                self.release(frame);
                return;
            }
        };
        loop {
            match tx.try_send(frame) {
                Ok(true) => return,
                Ok(false) => {
                    if let Ok(Some(stale)) = rx.try_recv() {
                        trace!("queue {} dropping frame {}", queue, stale);
                        self.release(stale);
                    }
                }
                Err(_) => {
                    self.release(frame);
                    return;
                }
            }
        }
    }

    fn capture(&mut self, modes: &[Mode], number: u64, dropped: &HashSet<StreamKind>) -> usize {
        let timestamp = timestamp();
        let children = modes
            .iter()
            .filter(|mode| mode.is_video() && !dropped.contains(&mode.stream))
            .map(|mode| self.new_frame(FrameBody::Image(Image::pattern(mode, number, timestamp))))
            .collect();
        self.new_frame(FrameBody::Set(children))
    }

    /// Produces the output of `block` for `input`, `None` for no output.
    fn transform(&mut self, block: usize, input: usize) -> Result<usize, NativeError> {
        let (kind, magnitude) = match self.objects.get(&block) {
            Some(Object::Block(entry)) => {
                let magnitude = entry
                    .options
                    .0
                    .get(&OptionId::FILTER_MAGNITUDE)
                    .map_or(1, |option| option.value.max(1.0) as u32);
                (entry.kind, magnitude)
            }
            _ => return Err(invalid_handle("rs2_process_frame")),
        };

        if let StageKind::Align(to) = kind {
            return self.align(input, to);
        }

        let image = self.image(input)?;
        let output = match kind {
            StageKind::Decimation => {
                image.resample(image.width / magnitude, image.height / magnitude)
            }
            StageKind::HoleFilling if image.format == RS2_FORMAT_Z16 => image.fill_holes(),
            StageKind::Colorizer if image.format == RS2_FORMAT_Z16 => image.colorize(),
            StageKind::Colorizer => {
                return Err(NativeError::new(
                    NativeErrorKind::InvalidValue,
                    "colorizer expects a Z16 frame",
                    "rs2_process_frame",
                    "",
                ))
            }
            _ => image.clone(),
        };
        Ok(self.new_frame(FrameBody::Image(output)))
    }

    fn align(&mut self, input: usize, to: StreamKind) -> Result<usize, NativeError> {
        let children = match &self.frame(input)?.body {
            FrameBody::Set(children) => children.clone(),
            FrameBody::Image(_) => {
                return Err(NativeError::new(
                    NativeErrorKind::InvalidValue,
                    "align expects a frame set",
                    "rs2_process_frame",
                    "",
                ))
            }
        };
        let target = children
            .iter()
            .filter_map(|&child| self.image(child).ok())
            .find(|image| image.stream == to)
            .map(|image| (image.width, image.height));

        let mut aligned = Vec::with_capacity(children.len());
        for child in children {
            let image = self.image(child)?;
            match target {
                Some((width, height))
                    if image.stream != to && (image.width, image.height) != (width, height) =>
                {
                    let resampled = image.resample(width, height);
                    aligned.push(self.new_frame(FrameBody::Image(resampled)));
                }
                _ => {
                    self.add_ref(child)?;
                    aligned.push(child);
                }
            }
        }
        Ok(self.new_frame(FrameBody::Set(aligned)))
    }

    fn sensor(&self, id: usize) -> Result<usize, NativeError> {
        match self.objects.get(&id) {
            Some(Object::Sensor(index)) => Ok(*index),
            _ => Err(invalid_handle("rs2_sensor")),
        }
    }

    fn options(&mut self, target: OptionsTarget) -> Result<&mut OptionTable, NativeError> {
        match target {
            OptionsTarget::Sensor(sensor) => {
                let index = self.sensor(id(sensor))?;
                Ok(&mut self.sensors[index].options)
            }
            OptionsTarget::Block(block) => match self.objects.get_mut(&id(block)) {
                Some(Object::Block(entry)) => Ok(&mut entry.options),
                _ => Err(invalid_handle("rs2_options")),
            },
        }
    }

    fn stream_profile(&self, id: usize) -> Result<Mode, NativeError> {
        match self.objects.get(&id) {
            Some(Object::StreamProfile(mode)) => Ok(*mode),
            _ => Err(invalid_handle("rs2_stream_profile")),
        }
    }

    fn resolve(&self, requests: &[StreamRequest]) -> Result<Vec<Mode>, NativeError> {
        let modes: Vec<&Mode> = self.sensors.iter().flat_map(|s| s.modes.iter()).collect();
        if requests.is_empty() {
            let mut defaults = Vec::new();
            for stream in [StreamKind::Depth, StreamKind::Color] {
                if let Some(mode) = modes.iter().find(|m| m.stream == stream && m.default) {
                    defaults.push(**mode);
                }
            }
            return Ok(defaults);
        }
        requests
            .iter()
            .map(|request| {
                modes
                    .iter()
                    .find(|mode| mode.matches(request))
                    .map(|mode| **mode)
                    .ok_or_else(|| {
                        NativeError::new(
                            NativeErrorKind::UnresolvedRequest,
                            "Couldn't resolve requests",
                            "rs2_pipeline_start_with_config",
                            format!(
                                "{} {}x{} @ {}fps {}",
                                request.stream,
                                request.width,
                                request.height,
                                request.fps,
                                request.format
                            ),
                        )
                    })
            })
            .collect()
    }
}

struct Controls {
    connected: AtomicBool,
    capture_stalled: AtomicBool,
    processing_stalled: AtomicBool,
    depth_hidden: AtomicBool,
    dropped: Mutex<HashSet<StreamKind>>,
}

/// Simulated depth camera.
///
/// ```
/// use edgefirst_realsense::{synthetic::SyntheticDriver, Pipeline, Session};
/// use std::{sync::Arc, time::Duration};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let driver = Arc::new(SyntheticDriver::new());
/// let session = Session::with_driver(driver.clone())?;
/// let mut pipeline = Pipeline::new(&session)?;
/// pipeline.start(None)?;
/// let frames = pipeline.wait_for_frames(Duration::from_secs(1))?;
/// assert_eq!(frames.len()?, 2);
/// # Ok(())
/// # }
/// ```
pub struct SyntheticDriver {
    state: Arc<Mutex<State>>,
    controls: Arc<Controls>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn id<H: Into<Handle>>(handle: H) -> usize {
    handle.into().0
}

fn handle(id: usize) -> NonNull<c_void> {
    // Registry ids start at 1 and are never null.
    NonNull::new(id as *mut c_void).unwrap_or(NonNull::dangling())
}

/// Registry id carried by a raw handle.
struct Handle(usize);

macro_rules! handle_conversions {
    ($($raw:ident),* $(,)?) => {
        $(
            impl From<$raw> for Handle {
                fn from(raw: $raw) -> Self {
                    Handle(raw.as_ptr() as usize)
                }
            }
        )*
    };
}

handle_conversions!(
    RawContext,
    RawConfig,
    RawPipeline,
    RawProfile,
    RawFrame,
    RawBlock,
    RawQueue,
    RawDevice,
    RawSensor,
    RawProfileList,
    RawStreamProfile,
);

/// Milliseconds on the raw monotonic clock.
fn timestamp() -> f64 {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return 0.0;
    }
    tp.tv_sec as f64 * 1e3 + tp.tv_nsec as f64 / 1e6
}

impl Default for SyntheticDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticDriver {
    /// A connected device with default settings.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_id: 0,
                objects: HashMap::new(),
                sensors: sensor_specs(),
                invalid_releases: 0,
            })),
            controls: Arc::new(Controls {
                connected: AtomicBool::new(true),
                capture_stalled: AtomicBool::new(false),
                processing_stalled: AtomicBool::new(false),
                depth_hidden: AtomicBool::new(false),
                dropped: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// A driver with no device attached; pipelines fail to start.
    pub fn disconnected() -> Self {
        let driver = Self::new();
        driver.set_connected(false);
        driver
    }

    pub fn set_connected(&self, connected: bool) {
        self.controls.connected.store(connected, Ordering::Release);
    }

    /// Stops producing frame sets while `true`, so waits time out.
    pub fn stall_capture(&self, stalled: bool) {
        self.controls.capture_stalled.store(stalled, Ordering::Release);
    }

    /// Makes processing blocks swallow their input while `true`.
    pub fn stall_processing(&self, stalled: bool) {
        self.controls
            .processing_stalled
            .store(stalled, Ordering::Release);
    }

    /// Leaves the depth sensor out of sensor queries while `true`.
    pub fn hide_depth_sensor(&self, hidden: bool) {
        self.controls.depth_hidden.store(hidden, Ordering::Release);
    }

    /// Leaves `stream` out of captured frame sets, or restores all streams
    /// with `None`.
    pub fn drop_stream(&self, stream: Option<StreamKind>) {
        let mut dropped = self
            .controls
            .dropped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match stream {
            Some(stream) => {
                dropped.insert(stream);
            }
            None => dropped.clear(),
        }
    }

    /// Frames and frame sets currently alive.
    pub fn live_frames(&self) -> usize {
        lock(&self.state)
            .objects
            .values()
            .filter(|object| matches!(object, Object::Frame(_)))
            .count()
    }

    /// Every object currently alive: contexts, pipelines, frames, blocks...
    pub fn live_objects(&self) -> usize {
        lock(&self.state).objects.len()
    }

    /// Releases or deletes of handles that were not alive.
    pub fn invalid_releases(&self) -> usize {
        lock(&self.state).invalid_releases
    }

    /// Current reference count of `frame`, `None` once released.
    pub fn frame_refs(&self, frame: &Frame) -> Option<usize> {
        let raw = frame.raw().ok()?;
        lock(&self.state).frame(id(raw)).ok().map(|entry| entry.refs)
    }

    /// A standalone Z16 frame filled by `fill(x, y)`.
    pub fn depth_frame(
        self: &Arc<Self>,
        width: u32,
        height: u32,
        fill: impl Fn(u32, u32) -> u16,
    ) -> Frame {
        self.padded_depth_frame(width, height, width * 2, fill)
    }

    /// Z16 frame whose rows are `stride` bytes apart; padding stays zero.
    pub fn padded_depth_frame(
        self: &Arc<Self>,
        width: u32,
        height: u32,
        stride: u32,
        fill: impl Fn(u32, u32) -> u16,
    ) -> Frame {
        let mode = Mode {
            stream: StreamKind::Depth,
            format: RS2_FORMAT_Z16,
            width,
            height,
            fps: 30,
            default: false,
        };
        let mut image = Image::new(&mode, width, height, timestamp(), 0);
        let stride = stride.max(width * 2);
        image.stride = stride;
        image.data = vec![0; (stride as usize * height as usize).div_ceil(2)].into_boxed_slice();
        let row = (stride / 2) as usize;
        if row > 0 {
            for (y, line) in image.data.chunks_mut(row).enumerate() {
                for (x, sample) in line.iter_mut().take(width as usize).enumerate() {
                    *sample = fill(x as u32, y as u32);
                }
            }
        }
        let id = lock(&self.state).new_frame(FrameBody::Image(image));
        let raw = unsafe { RawFrame::from_ptr(handle(id)) };
        Frame::from_raw(self.clone(), raw)
    }

    fn lookup<T>(
        &self,
        id: usize,
        function: &str,
        get: impl FnOnce(&Object) -> Option<T>,
    ) -> Result<T, NativeError> {
        lock(&self.state)
            .objects
            .get(&id)
            .and_then(get)
            .ok_or_else(|| invalid_handle(function))
    }

    fn delete(&self, id: usize, function: &str) {
        lock(&self.state).remove(id, function);
    }

    fn stop_capture(&self, pipeline: usize) {
        let capture = match lock(&self.state).objects.get_mut(&pipeline) {
            Some(Object::Pipeline(entry)) => {
                entry.active = None;
                entry.capture.take()
            }
            _ => None,
        };
        let Some(capture) = capture else {
            return;
        };
        capture.stop.store(true, Ordering::Release);
        if capture.thread.join().is_err() {
            warn!("capture thread panicked");
        }
        let mut state = lock(&self.state);
        while let Ok(Some(frames)) = capture.frames.try_recv() {
            state.release(frames);
        }
        debug!("capture stopped");
    }

    fn spawn_capture(&self, modes: Vec<Mode>) -> Capture {
        let (tx, rx) = kanal::bounded::<usize>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let fps = modes
            .iter()
            .filter(|mode| mode.is_video())
            .map(|mode| mode.fps)
            .max()
            .unwrap_or(30)
            .max(1);
        let period = Duration::from_secs_f64(1.0 / fps as f64);

        let thread = {
            let tx = tx.clone();
            let state = self.state.clone();
            let controls = self.controls.clone();
            let stop = stop.clone();
            let rx = rx.clone();
            thread::spawn(move || {
                let mut number = 0;
                while !stop.load(Ordering::Acquire) {
                    thread::sleep(period);
                    if stop.load(Ordering::Acquire)
                        || controls.capture_stalled.load(Ordering::Acquire)
                    {
                        continue;
                    }
                    number += 1;
                    let dropped = controls
                        .dropped
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    let mut state = lock(&state);
                    let frames = state.capture(&modes, number, &dropped);
                    // Single slot: the newest set replaces one the consumer
                    // has not picked up.
                    loop {
                        match tx.try_send(frames) {
                            Ok(true) => break,
                            Ok(false) => {
                                if let Ok(Some(stale)) = rx.try_recv() {
                                    state.release(stale);
                                }
                            }
                            Err(_) => {
                                state.release(frames);
                                return;
                            }
                        }
                    }
                }
            })
        };

        Capture {
            stop,
            thread,
            frames: rx,
            _sender: tx,
        }
    }
}

impl Driver for SyntheticDriver {
    fn api_version(&self) -> Result<i32, NativeError> {
        Ok(API_VERSION)
    }

    fn create_context(&self) -> Result<RawContext, NativeError> {
        let id = lock(&self.state).insert(Object::Context);
        Ok(unsafe { RawContext::from_ptr(handle(id)) })
    }

    fn delete_context(&self, context: RawContext) {
        self.delete(id(context), "rs2_delete_context");
    }

    fn create_config(&self) -> Result<RawConfig, NativeError> {
        let id = lock(&self.state).insert(Object::Config(Vec::new()));
        Ok(unsafe { RawConfig::from_ptr(handle(id)) })
    }

    fn delete_config(&self, config: RawConfig) {
        self.delete(id(config), "rs2_delete_config");
    }

    fn config_enable_stream(
        &self,
        config: RawConfig,
        request: &StreamRequest,
    ) -> Result<(), NativeError> {
        match lock(&self.state).objects.get_mut(&id(config)) {
            Some(Object::Config(requests)) => {
                requests.retain(|r| r.stream != request.stream || r.index != request.index);
                requests.push(*request);
                Ok(())
            }
            _ => Err(invalid_handle("rs2_config_enable_stream")),
        }
    }

    fn create_pipeline(&self, context: RawContext) -> Result<RawPipeline, NativeError> {
        let mut state = lock(&self.state);
        if !matches!(state.objects.get(&id(context)), Some(Object::Context)) {
            return Err(invalid_handle("rs2_create_pipeline"));
        }
        let id = state.insert(Object::Pipeline(PipelineEntry {
            active: None,
            capture: None,
        }));
        Ok(unsafe { RawPipeline::from_ptr(handle(id)) })
    }

    fn delete_pipeline(&self, pipeline: RawPipeline) {
        self.stop_capture(id(pipeline));
        self.delete(id(pipeline), "rs2_delete_pipeline");
    }

    fn pipeline_start(
        &self,
        pipeline: RawPipeline,
        config: Option<RawConfig>,
    ) -> Result<RawProfile, NativeError> {
        let pipeline = id(pipeline);
        self.stop_capture(pipeline);

        if !self.controls.connected.load(Ordering::Acquire) {
            return Err(NativeError::new(
                NativeErrorKind::NoDevice,
                "No device connected",
                "rs2_pipeline_start",
                "",
            ));
        }

        let mut state = lock(&self.state);
        let requests = match config {
            Some(config) => match state.objects.get(&id(config)) {
                Some(Object::Config(requests)) => requests.clone(),
                _ => return Err(invalid_handle("rs2_pipeline_start_with_config")),
            },
            None => Vec::new(),
        };
        let modes = state.resolve(&requests)?;
        if !matches!(state.objects.get(&pipeline), Some(Object::Pipeline(_))) {
            return Err(invalid_handle("rs2_pipeline_start"));
        }
        drop(state);

        let capture = self.spawn_capture(modes.clone());
        let mut state = lock(&self.state);
        if let Some(Object::Pipeline(entry)) = state.objects.get_mut(&pipeline) {
            entry.active = Some(modes.clone());
            entry.capture = Some(capture);
        }
        debug!("synthetic capture started with {} streams", modes.len());
        let profile = state.insert(Object::Profile(modes));
        Ok(unsafe { RawProfile::from_ptr(handle(profile)) })
    }

    fn pipeline_stop(&self, pipeline: RawPipeline) -> Result<(), NativeError> {
        let started = self.lookup(id(pipeline), "rs2_pipeline_stop", |object| match object {
            Object::Pipeline(entry) => Some(entry.active.is_some()),
            _ => None,
        })?;
        if !started {
            return Err(NativeError::new(
                NativeErrorKind::WrongApiCallSequence,
                "stop() cannot be called before start()",
                "rs2_pipeline_stop",
                "",
            ));
        }
        self.stop_capture(id(pipeline));
        Ok(())
    }

    fn pipeline_wait_for_frames(
        &self,
        pipeline: RawPipeline,
        timeout: Duration,
    ) -> Result<Option<RawFrame>, NativeError> {
        let frames = self.lookup(id(pipeline), "rs2_pipeline_wait_for_frames", |object| {
            match object {
                Object::Pipeline(entry) => Some(entry.capture.as_ref().map(|c| c.frames.clone())),
                _ => None,
            }
        })?;
        let Some(frames) = frames else {
            return Err(NativeError::new(
                NativeErrorKind::WrongApiCallSequence,
                "wait_for_frames cannot be called before start()",
                "rs2_pipeline_wait_for_frames",
                "",
            ));
        };
        match frames.recv_timeout(timeout) {
            Ok(id) => Ok(Some(unsafe { RawFrame::from_ptr(handle(id)) })),
            Err(ReceiveErrorTimeout::Timeout) => Ok(None),
            Err(_) => Err(NativeError::new(
                NativeErrorKind::WrongApiCallSequence,
                "pipeline stopped while waiting",
                "rs2_pipeline_wait_for_frames",
                "",
            )),
        }
    }

    fn pipeline_active_profile(&self, pipeline: RawPipeline) -> Result<RawProfile, NativeError> {
        let mut state = lock(&self.state);
        let modes = match state.objects.get(&id(pipeline)) {
            Some(Object::Pipeline(PipelineEntry {
                active: Some(modes),
                ..
            })) => modes.clone(),
            Some(Object::Pipeline(_)) => {
                return Err(NativeError::new(
                    NativeErrorKind::WrongApiCallSequence,
                    "get_active_profile() can only be called between start() and stop()",
                    "rs2_pipeline_get_active_profile",
                    "",
                ))
            }
            _ => return Err(invalid_handle("rs2_pipeline_get_active_profile")),
        };
        let profile = state.insert(Object::Profile(modes));
        Ok(unsafe { RawProfile::from_ptr(handle(profile)) })
    }

    fn profile_device(&self, profile: RawProfile) -> Result<RawDevice, NativeError> {
        let mut state = lock(&self.state);
        if !matches!(state.objects.get(&id(profile)), Some(Object::Profile(_))) {
            return Err(invalid_handle("rs2_pipeline_profile_get_device"));
        }
        let device = state.insert(Object::Device);
        Ok(unsafe { RawDevice::from_ptr(handle(device)) })
    }

    fn delete_profile(&self, profile: RawProfile) {
        self.delete(id(profile), "rs2_delete_pipeline_profile");
    }

    fn frame_add_ref(&self, frame: RawFrame) -> Result<(), NativeError> {
        lock(&self.state).add_ref(id(frame))
    }

    fn release_frame(&self, frame: RawFrame) {
        lock(&self.state).release(id(frame));
    }

    fn embedded_frames_count(&self, frame: RawFrame) -> Result<usize, NativeError> {
        let state = lock(&self.state);
        match &state.frame(id(frame))?.body {
            FrameBody::Set(children) => Ok(children.len()),
            FrameBody::Image(_) => Ok(0),
        }
    }

    fn extract_frame(&self, frame: RawFrame, index: usize) -> Result<RawFrame, NativeError> {
        let mut state = lock(&self.state);
        let child = match &state.frame(id(frame))?.body {
            FrameBody::Set(children) => children.get(index).copied(),
            FrameBody::Image(_) => None,
        };
        let child = child.ok_or_else(|| {
            invalid_value("rs2_extract_frame", format!("frame index {} out of range", index))
        })?;
        state.add_ref(child)?;
        Ok(unsafe { RawFrame::from_ptr(handle(child)) })
    }

    fn frame_profile(&self, frame: RawFrame) -> Result<ProfileData, NativeError> {
        let state = lock(&self.state);
        let image = state.image(id(frame))?;
        Ok(ProfileData {
            stream: image.stream.as_raw(),
            format: image.format,
            index: 0,
            unique_id: image.stream.as_raw(),
            fps: image.fps as i32,
        })
    }

    fn frame_geometry(&self, frame: RawFrame) -> Result<FrameGeometry, NativeError> {
        let state = lock(&self.state);
        let image = state.image(id(frame))?;
        Ok(FrameGeometry {
            width: image.width,
            height: image.height,
            stride: image.stride,
            bits_per_pixel: image.bits_per_pixel,
        })
    }

    fn frame_data(&self, frame: RawFrame) -> Result<*const u8, NativeError> {
        let state = lock(&self.state);
        // The boxed buffer does not move while the frame is alive.
        Ok(state.image(id(frame))?.data.as_ptr().cast())
    }

    fn frame_timestamp(&self, frame: RawFrame) -> Result<(f64, TimestampDomain), NativeError> {
        let state = lock(&self.state);
        let image = state.image(id(frame))?;
        Ok((image.timestamp, image.domain))
    }

    fn frame_number(&self, frame: RawFrame) -> Result<u64, NativeError> {
        Ok(lock(&self.state).image(id(frame))?.number)
    }

    fn create_block(&self, kind: StageKind) -> Result<RawBlock, NativeError> {
        let id = lock(&self.state).insert(Object::Block(BlockEntry {
            kind,
            options: block_options(kind),
            sink: None,
        }));
        Ok(unsafe { RawBlock::from_ptr(handle(id)) })
    }

    fn delete_block(&self, block: RawBlock) {
        self.delete(id(block), "rs2_delete_processing_block");
    }

    fn create_queue(&self, capacity: usize) -> Result<RawQueue, NativeError> {
        let (tx, rx) = kanal::bounded(capacity.max(1));
        let id = lock(&self.state).insert(Object::Queue(QueueEntry { tx, rx }));
        Ok(unsafe { RawQueue::from_ptr(handle(id)) })
    }

    fn delete_queue(&self, queue: RawQueue) {
        let mut state = lock(&self.state);
        if let Some(Object::Queue(entry)) = state.remove(id(queue), "rs2_delete_frame_queue") {
            while let Ok(Some(frame)) = entry.rx.try_recv() {
                state.release(frame);
            }
        }
    }

    fn start_processing_queue(
        &self,
        block: RawBlock,
        queue: RawQueue,
    ) -> Result<(), NativeError> {
        let mut state = lock(&self.state);
        if !matches!(state.objects.get(&id(queue)), Some(Object::Queue(_))) {
            return Err(invalid_handle("rs2_start_processing_queue"));
        }
        match state.objects.get_mut(&id(block)) {
            Some(Object::Block(entry)) => {
                entry.sink = Some(id(queue));
                Ok(())
            }
            _ => Err(invalid_handle("rs2_start_processing_queue")),
        }
    }

    fn process_frame(&self, block: RawBlock, frame: RawFrame) -> Result<(), NativeError> {
        let (block, input) = (id(block), id(frame));
        let mut state = lock(&self.state);
        let sink = match state.objects.get(&block) {
            Some(Object::Block(entry)) => entry.sink,
            _ => None,
        };
        let result = match sink {
            Some(_) if self.controls.processing_stalled.load(Ordering::Acquire) => Ok(None),
            Some(_) => state.transform(block, input).map(Some),
            None => Err(NativeError::new(
                NativeErrorKind::WrongApiCallSequence,
                "processing block has no output queue",
                "rs2_process_frame",
                "",
            )),
        };
        // The submitted reference is consumed whatever the outcome.
        state.release(input);
        if let (Some(sink), Some(output)) = (sink, result?) {
            state.enqueue(sink, output);
        }
        Ok(())
    }

    fn wait_for_frame(
        &self,
        queue: RawQueue,
        timeout: Duration,
    ) -> Result<Option<RawFrame>, NativeError> {
        let rx = self.lookup(id(queue), "rs2_try_wait_for_frame", |object| match object {
            Object::Queue(entry) => Some(entry.rx.clone()),
            _ => None,
        })?;
        match rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(unsafe { RawFrame::from_ptr(handle(frame)) })),
            Err(ReceiveErrorTimeout::Timeout) => Ok(None),
            Err(_) => Err(invalid_handle("rs2_try_wait_for_frame")),
        }
    }

    fn poll_for_frame(&self, queue: RawQueue) -> Result<Option<RawFrame>, NativeError> {
        let rx = self.lookup(id(queue), "rs2_poll_for_frame", |object| match object {
            Object::Queue(entry) => Some(entry.rx.clone()),
            _ => None,
        })?;
        match rx.try_recv() {
            Ok(frame) => Ok(frame.map(|frame| unsafe { RawFrame::from_ptr(handle(frame)) })),
            Err(_) => Err(invalid_handle("rs2_poll_for_frame")),
        }
    }

    fn supports_option(&self, target: OptionsTarget, id: OptionId) -> Result<bool, NativeError> {
        Ok(lock(&self.state).options(target)?.0.contains_key(&id))
    }

    fn is_option_read_only(
        &self,
        target: OptionsTarget,
        id: OptionId,
    ) -> Result<bool, NativeError> {
        Ok(lock(&self.state).options(target)?.entry(id)?.read_only)
    }

    fn get_option(&self, target: OptionsTarget, id: OptionId) -> Result<f32, NativeError> {
        Ok(lock(&self.state).options(target)?.entry(id)?.value)
    }

    fn set_option(
        &self,
        target: OptionsTarget,
        id: OptionId,
        value: f32,
    ) -> Result<(), NativeError> {
        lock(&self.state).options(target)?.set(id, value)
    }

    fn option_range(
        &self,
        target: OptionsTarget,
        id: OptionId,
    ) -> Result<OptionRange, NativeError> {
        Ok(lock(&self.state).options(target)?.entry(id)?.range)
    }

    fn delete_device(&self, device: RawDevice) {
        self.delete(id(device), "rs2_delete_device");
    }

    fn supports_device_info(
        &self,
        device: RawDevice,
        info: CameraInfo,
    ) -> Result<bool, NativeError> {
        self.lookup(id(device), "rs2_supports_device_info", |object| match object {
            Object::Device => Some(device_info(info).is_some()),
            _ => None,
        })
    }

    fn device_info(&self, device: RawDevice, info: CameraInfo) -> Result<String, NativeError> {
        let value = self.lookup(id(device), "rs2_get_device_info", |object| match object {
            Object::Device => Some(device_info(info)),
            _ => None,
        })?;
        value.map(str::to_owned).ok_or_else(|| {
            invalid_value("rs2_get_device_info", format!("{} not supported", info))
        })
    }

    fn query_sensors(&self, device: RawDevice) -> Result<Vec<RawSensor>, NativeError> {
        let mut state = lock(&self.state);
        if !matches!(state.objects.get(&id(device)), Some(Object::Device)) {
            return Err(invalid_handle("rs2_query_sensors"));
        }
        let hidden = self.controls.depth_hidden.load(Ordering::Acquire);
        let visible: Vec<usize> = (0..state.sensors.len())
            .filter(|&index| !(hidden && state.sensors[index].depth))
            .collect();
        let sensors = visible
            .into_iter()
            .map(|index| {
                let id = state.insert(Object::Sensor(index));
                unsafe { RawSensor::from_ptr(handle(id)) }
            })
            .collect();
        Ok(sensors)
    }

    fn delete_sensor(&self, sensor: RawSensor) {
        self.delete(id(sensor), "rs2_delete_sensor");
    }

    fn supports_sensor_info(
        &self,
        sensor: RawSensor,
        info: CameraInfo,
    ) -> Result<bool, NativeError> {
        lock(&self.state).sensor(id(sensor))?;
        Ok(info == CameraInfo::Name)
    }

    fn sensor_info(&self, sensor: RawSensor, info: CameraInfo) -> Result<String, NativeError> {
        let state = lock(&self.state);
        let index = state.sensor(id(sensor))?;
        match info {
            CameraInfo::Name => Ok(state.sensors[index].name.to_owned()),
            _ => Err(invalid_value("rs2_get_sensor_info", format!("{} not supported", info))),
        }
    }

    fn is_depth_sensor(&self, sensor: RawSensor) -> Result<bool, NativeError> {
        let state = lock(&self.state);
        let index = state.sensor(id(sensor))?;
        Ok(state.sensors[index].depth)
    }

    fn depth_scale(&self, sensor: RawSensor) -> Result<f32, NativeError> {
        if self.is_depth_sensor(sensor)? {
            Ok(DEPTH_SCALE)
        } else {
            Err(NativeError::new(
                NativeErrorKind::NotImplemented,
                "sensor is not a depth sensor",
                "rs2_get_depth_scale",
                "",
            ))
        }
    }

    fn sensor_profiles(&self, sensor: RawSensor) -> Result<RawProfileList, NativeError> {
        let mut state = lock(&self.state);
        let index = state.sensor(id(sensor))?;
        let modes = state.sensors[index].modes.clone();
        let profiles = modes
            .into_iter()
            .map(|mode| state.insert(Object::StreamProfile(mode)))
            .collect();
        let list = state.insert(Object::ProfileList(profiles));
        Ok(unsafe { RawProfileList::from_ptr(handle(list)) })
    }

    fn profiles_count(&self, list: RawProfileList) -> Result<usize, NativeError> {
        self.lookup(id(list), "rs2_get_stream_profiles_count", |object| match object {
            Object::ProfileList(profiles) => Some(profiles.len()),
            _ => None,
        })
    }

    fn stream_profile(
        &self,
        list: RawProfileList,
        index: usize,
    ) -> Result<RawStreamProfile, NativeError> {
        let profile = self.lookup(id(list), "rs2_get_stream_profile", |object| match object {
            Object::ProfileList(profiles) => Some(profiles.get(index).copied()),
            _ => None,
        })?;
        let profile = profile.ok_or_else(|| {
            invalid_value("rs2_get_stream_profile", format!("index {} out of range", index))
        })?;
        Ok(unsafe { RawStreamProfile::from_ptr(handle(profile)) })
    }

    fn delete_profile_list(&self, list: RawProfileList) {
        let mut state = lock(&self.state);
        if let Some(Object::ProfileList(profiles)) =
            state.remove(id(list), "rs2_delete_stream_profiles_list")
        {
            for profile in profiles {
                state.objects.remove(&profile);
            }
        }
    }

    fn stream_profile_data(&self, profile: RawStreamProfile) -> Result<ProfileData, NativeError> {
        let mode = lock(&self.state).stream_profile(id(profile))?;
        Ok(ProfileData {
            stream: mode.stream.as_raw(),
            format: mode.format,
            index: 0,
            unique_id: mode.stream.as_raw(),
            fps: mode.fps as i32,
        })
    }

    fn video_resolution(&self, profile: RawStreamProfile) -> Result<(u32, u32), NativeError> {
        let mode = lock(&self.state).stream_profile(id(profile))?;
        if !mode.is_video() {
            return Err(NativeError::new(
                NativeErrorKind::InvalidValue,
                "object does not support video stream profile interface",
                "rs2_get_video_stream_resolution",
                "",
            ));
        }
        Ok((mode.width, mode.height))
    }

    fn is_default_profile(&self, profile: RawStreamProfile) -> Result<bool, NativeError> {
        Ok(lock(&self.state).stream_profile(id(profile))?.default)
    }
}

impl Drop for SyntheticDriver {
    fn drop(&mut self) {
        let pipelines: Vec<usize> = lock(&self.state)
            .objects
            .iter()
            .filter(|(_, object)| matches!(object, Object::Pipeline(_)))
            .map(|(id, _)| *id)
            .collect();
        for pipeline in pipelines {
            self.stop_capture(pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        stream: StreamKind,
        width: u32,
        height: u32,
        fps: u32,
        format: Format,
    ) -> StreamRequest {
        StreamRequest {
            stream,
            index: 0,
            width,
            height,
            fps,
            format,
        }
    }

    #[test]
    fn test_resolve() {
        let driver = SyntheticDriver::new();
        let state = lock(&driver.state);
        let modes = state
            .resolve(&[request(StreamKind::Depth, 0, 0, 0, Format::Any)])
            .unwrap();
        assert_eq!((modes[0].width, modes[0].height, modes[0].fps), (848, 480, 30));

        let modes = state
            .resolve(&[request(StreamKind::Color, 640, 480, 15, Format::Rgb8)])
            .unwrap();
        assert_eq!(modes[0].format, RS2_FORMAT_RGB8);

        let err = state
            .resolve(&[request(StreamKind::Depth, 1234, 567, 30, Format::Z16)])
            .unwrap_err();
        assert_eq!(err.kind, NativeErrorKind::UnresolvedRequest);

        let err = state
            .resolve(&[request(StreamKind::Depth, 640, 480, 30, Format::Rgb8)])
            .unwrap_err();
        assert_eq!(err.kind, NativeErrorKind::UnresolvedRequest);
    }

    #[test]
    fn test_option_table() {
        let mut table = block_options(StageKind::Decimation);
        assert_eq!(table.entry(OptionId::FILTER_MAGNITUDE).unwrap().value, 2.0);
        assert!(table.set(OptionId::FILTER_MAGNITUDE, 9.0).is_err());
        table.set(OptionId::FILTER_MAGNITUDE, 4.0).unwrap();
        assert_eq!(table.entry(OptionId::FILTER_MAGNITUDE).unwrap().value, 4.0);

        let mut table = OptionTable::default().read_only(OptionId::ASIC_TEMPERATURE, 40.0);
        let err = table.set(OptionId::ASIC_TEMPERATURE, 40.0).unwrap_err();
        assert_eq!(err.kind, NativeErrorKind::WrongApiCallSequence);
    }

    #[test]
    fn test_image_ops() {
        let mode = Mode {
            stream: StreamKind::Depth,
            format: RS2_FORMAT_Z16,
            width: 4,
            height: 2,
            fps: 30,
            default: false,
        };
        let mut image = Image::new(&mode, 4, 2, 0.0, 1);
        image.data.copy_from_slice(&[0, 100, 0, 200, 300, 0, 0, 400]);

        let filled = image.fill_holes();
        assert_eq!(&*filled.data, &[0, 100, 100, 200, 300, 300, 300, 400]);

        let half = image.resample(2, 1);
        assert_eq!((half.width, half.height, half.stride), (2, 1, 4));
        assert_eq!(&half.data[..2], &[0, 0]);

        let color = image.colorize();
        assert_eq!(color.format, RS2_FORMAT_RGB8);
        assert_eq!(color.stride, 12);
        assert_eq!(&color.bytes()[..3], &[0, 0, 0]);
        assert_eq!(&color.bytes()[21..24], &[255, 0, 0]);
    }

    #[test]
    fn test_release_balance() {
        let driver = SyntheticDriver::new();
        let mut state = lock(&driver.state);
        let modes = state.resolve(&[]).unwrap();
        let set = state.capture(&modes, 1, &HashSet::new());
        assert_eq!(state.objects.len(), 3);
        state.release(set);
        assert!(state.objects.is_empty());
        state.release(set);
        assert_eq!(state.invalid_releases, 1);
    }
}
