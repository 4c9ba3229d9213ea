// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Device, sensor and telemetry queries.

use crate::{
    config::{format_name, StreamKind},
    driver::{Driver, OptionsTarget, RawDevice, RawProfileList, RawSensor},
    error::{Error, Result},
    options::{OptionId, Options, VisualPreset},
    session::Session,
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Identification field of a device or sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraInfo {
    Name = 0,
    SerialNumber = 1,
    FirmwareVersion = 2,
    RecommendedFirmwareVersion = 3,
    PhysicalPort = 4,
    DebugOpCode = 5,
    AdvancedMode = 6,
    ProductId = 7,
    CameraLocked = 8,
    UsbTypeDescriptor = 9,
    ProductLine = 10,
    AsicSerialNumber = 11,
    FirmwareUpdateId = 12,
}

impl CameraInfo {
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Name => "Name",
            Self::SerialNumber => "Serial Number",
            Self::FirmwareVersion => "Firmware Version",
            Self::RecommendedFirmwareVersion => "Recommended Firmware Version",
            Self::PhysicalPort => "Physical Port",
            Self::DebugOpCode => "Debug Op Code",
            Self::AdvancedMode => "Advanced Mode",
            Self::ProductId => "Product Id",
            Self::CameraLocked => "Camera Locked",
            Self::UsbTypeDescriptor => "Usb Type Descriptor",
            Self::ProductLine => "Product Line",
            Self::AsicSerialNumber => "Asic Serial Number",
            Self::FirmwareUpdateId => "Firmware Update Id",
        };
        f.write_str(name)
    }
}

/// Inter-camera synchronization role, the values of
/// [`OptionId::INTER_CAM_SYNC_MODE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SyncMode {
    Default,
    Master,
    Slave,
    FullSlave,
    /// Any other value, e.g. genlock modes.
    Other(i32),
}

impl SyncMode {
    pub fn from_value(value: f32) -> Self {
        match value as i32 {
            0 => Self::Default,
            1 => Self::Master,
            2 => Self::Slave,
            3 => Self::FullSlave,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Master => f.write_str("Master"),
            Self::Slave => f.write_str("Slave"),
            Self::FullSlave => f.write_str("Full Slave"),
            Self::Other(value) => write!(f, "Mode {}", value),
        }
    }
}

/// Video stream mode supported by a sensor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamProfile {
    pub stream: StreamKind,
    pub format: &'static str,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub is_default: bool,
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ {}fps {}",
            self.stream, self.width, self.height, self.fps, self.format
        )?;
        if self.is_default {
            f.write_str(" (default)")?;
        }
        Ok(())
    }
}

/// Temperatures and sync state of a running device.
///
/// Readings the device does not support are reported as `0.0`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TelemetryData {
    /// ASIC temperature in degrees Celsius.
    pub asic_temperature: f32,
    /// Projector temperature in degrees Celsius.
    pub projector_temperature: f32,
    /// Raw inter-camera sync mode.
    pub sync_mode: f32,
}

/// An attached device, obtained from a started pipeline.
pub struct Device {
    session: Session,
    raw: Option<RawDevice>,
}

impl Device {
    /// Takes ownership of `raw`.
    pub(crate) fn from_raw(session: Session, raw: RawDevice) -> Self {
        Self {
            session,
            raw: Some(raw),
        }
    }

    fn raw(&self) -> Result<RawDevice> {
        self.session.ensure_open()?;
        self.raw.ok_or(Error::Closed("device"))
    }

    fn driver(&self) -> &dyn Driver {
        self.session.driver().as_ref()
    }

    /// Identification field `info`.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] when the device does not report the field.
    pub fn info(&self, info: CameraInfo) -> Result<String> {
        let raw = self.raw()?;
        if !self.driver().supports_device_info(raw, info)? {
            return Err(Error::NotSupported(format!("device info {}", info)));
        }
        Ok(self.driver().device_info(raw, info)?)
    }

    pub fn name(&self) -> Result<String> {
        self.info(CameraInfo::Name)
    }

    pub fn serial_number(&self) -> Result<String> {
        self.info(CameraInfo::SerialNumber)
    }

    pub fn firmware_version(&self) -> Result<String> {
        self.info(CameraInfo::FirmwareVersion)
    }

    /// USB connection type, e.g. `3.2`.
    pub fn usb_type_descriptor(&self) -> Result<String> {
        self.info(CameraInfo::UsbTypeDescriptor)
    }

    pub fn physical_port(&self) -> Result<String> {
        self.info(CameraInfo::PhysicalPort)
    }

    pub fn sensors(&self) -> Result<Vec<Sensor>> {
        let raw = self.raw()?;
        let sensors = self.driver().query_sensors(raw)?;
        Ok(sensors
            .into_iter()
            .map(|sensor| Sensor::from_raw(self.session.clone(), sensor))
            .collect())
    }

    /// The sensor producing depth.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the device has no depth sensor.
    pub fn depth_sensor(&self) -> Result<Sensor> {
        for sensor in self.sensors()? {
            if sensor.is_depth_sensor()? {
                return Ok(sensor);
            }
        }
        Err(Error::NotFound("depth sensor".to_owned()))
    }

    /// Video stream modes of every sensor.
    ///
    /// Motion and unrecognized streams are skipped, as are entries the driver
    /// fails to describe.
    pub fn capabilities(&self) -> Result<Vec<StreamProfile>> {
        let mut profiles = Vec::new();
        for sensor in self.sensors()? {
            profiles.extend(sensor.stream_profiles()?);
        }
        Ok(profiles)
    }

    /// Reads temperatures and sync mode from the depth sensor.
    ///
    /// Individual readings that fail or are unsupported degrade to `0.0`.
    pub fn telemetry(&self) -> Result<TelemetryData> {
        let sensor = self.depth_sensor()?;
        let read = |id: OptionId| match sensor.get_option(id) {
            Ok(value) => value,
            Err(err) => {
                warn!("cannot read {}: {}", id, err);
                0.0
            }
        };
        Ok(TelemetryData {
            asic_temperature: read(OptionId::ASIC_TEMPERATURE),
            projector_temperature: read(OptionId::PROJECTOR_TEMPERATURE),
            sync_mode: read(OptionId::INTER_CAM_SYNC_MODE),
        })
    }

    /// Raw inter-camera sync mode of the depth sensor.
    pub fn sync_mode(&self) -> Result<f32> {
        self.depth_sensor()?
            .get_option(OptionId::INTER_CAM_SYNC_MODE)
    }

    /// Releases the device handle; later calls are no-ops.
    pub fn close(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.session.driver().delete_device(raw);
            debug!("device closed");
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}

/// Profile list, deleted when dropped.
struct ProfileList<'a> {
    driver: &'a dyn Driver,
    raw: RawProfileList,
}

impl Drop for ProfileList<'_> {
    fn drop(&mut self) {
        self.driver.delete_profile_list(self.raw);
    }
}

/// One sensor of a device.
pub struct Sensor {
    session: Session,
    raw: Option<RawSensor>,
}

impl Sensor {
    pub(crate) fn from_raw(session: Session, raw: RawSensor) -> Self {
        Self {
            session,
            raw: Some(raw),
        }
    }

    fn raw(&self) -> Result<RawSensor> {
        self.session.ensure_open()?;
        self.raw.ok_or(Error::Closed("sensor"))
    }

    fn driver(&self) -> &dyn Driver {
        self.session.driver().as_ref()
    }

    pub fn name(&self) -> Result<String> {
        let raw = self.raw()?;
        if !self.driver().supports_sensor_info(raw, CameraInfo::Name)? {
            return Err(Error::NotSupported(format!("sensor info {}", CameraInfo::Name)));
        }
        Ok(self.driver().sensor_info(raw, CameraInfo::Name)?)
    }

    pub fn is_depth_sensor(&self) -> Result<bool> {
        Ok(self.driver().is_depth_sensor(self.raw()?)?)
    }

    /// Meters per depth unit.
    ///
    /// # Errors
    ///
    /// [`Error::NotSupported`] for sensors that do not produce depth.
    pub fn depth_scale(&self) -> Result<f32> {
        if !self.is_depth_sensor()? {
            return Err(Error::NotSupported("depth scale of non-depth sensor".to_owned()));
        }
        Ok(self.driver().depth_scale(self.raw()?)?)
    }

    /// Active visual preset, `None` when unsupported or unrecognized.
    pub fn visual_preset(&self) -> Result<Option<VisualPreset>> {
        if !self.supports(OptionId::VISUAL_PRESET)? {
            return Ok(None);
        }
        let value = self.get_option(OptionId::VISUAL_PRESET)?;
        Ok(VisualPreset::from_value(value))
    }

    pub fn set_visual_preset(&self, preset: VisualPreset) -> Result<()> {
        self.set_option(OptionId::VISUAL_PRESET, preset.value())
    }

    /// Video stream modes of this sensor.
    pub fn stream_profiles(&self) -> Result<Vec<StreamProfile>> {
        let raw = self.raw()?;
        let driver = self.driver();
        let list = ProfileList {
            driver,
            raw: driver.sensor_profiles(raw)?,
        };

        let mut profiles = Vec::new();
        for index in 0..driver.profiles_count(list.raw)? {
            let Ok(profile) = driver.stream_profile(list.raw, index) else {
                continue;
            };
            let Ok(data) = driver.stream_profile_data(profile) else {
                continue;
            };
            let Ok(stream) = StreamKind::try_from(data.stream) else {
                debug!("skipping unknown stream kind {}", data.stream);
                continue;
            };
            if stream.is_motion() {
                continue;
            }
            let Ok((width, height)) = driver.video_resolution(profile) else {
                continue;
            };
            profiles.push(StreamProfile {
                stream,
                format: format_name(data.format),
                width,
                height,
                fps: data.fps.max(0) as u32,
                is_default: driver.is_default_profile(profile).unwrap_or(false),
            });
        }
        Ok(profiles)
    }

    pub fn close(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.session.driver().delete_sensor(raw);
        }
    }
}

impl Options for Sensor {
    fn options_target(&self) -> Result<OptionsTarget> {
        Ok(OptionsTarget::Sensor(self.raw()?))
    }

    fn options_driver(&self) -> &dyn Driver {
        self.driver()
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode() {
        assert_eq!(SyncMode::from_value(1.0), SyncMode::Master);
        assert_eq!(SyncMode::from_value(260.0), SyncMode::Other(260));
        assert_eq!(SyncMode::FullSlave.to_string(), "Full Slave");
    }

    #[test]
    fn test_profile_display() {
        let profile = StreamProfile {
            stream: StreamKind::Depth,
            format: "Z16",
            width: 848,
            height: 480,
            fps: 30,
            is_default: true,
        };
        assert_eq!(profile.to_string(), "Depth 848x480 @ 30fps Z16 (default)");
    }

    #[test]
    fn test_camera_info_raw() {
        assert_eq!(CameraInfo::UsbTypeDescriptor.as_raw(), 9);
        assert_eq!(CameraInfo::FirmwareUpdateId.as_raw(), 12);
    }
}
