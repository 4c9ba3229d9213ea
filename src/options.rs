// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Tunable numeric options shared by sensors and processing stages.

use crate::{
    driver::{Driver, OptionsTarget},
    error::Result,
};
use std::fmt;
use tracing::debug;

/// Identifier of a tunable option, numerically equal to the driver's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionId(pub i32);

impl OptionId {
    pub const BACKLIGHT_COMPENSATION: OptionId = OptionId(0);
    pub const BRIGHTNESS: OptionId = OptionId(1);
    pub const CONTRAST: OptionId = OptionId(2);
    pub const EXPOSURE: OptionId = OptionId(3);
    pub const GAIN: OptionId = OptionId(4);
    pub const ENABLE_AUTO_EXPOSURE: OptionId = OptionId(10);
    pub const VISUAL_PRESET: OptionId = OptionId(12);
    pub const LASER_POWER: OptionId = OptionId(13);
    pub const EMITTER_ENABLED: OptionId = OptionId(18);
    pub const ASIC_TEMPERATURE: OptionId = OptionId(23);
    pub const PROJECTOR_TEMPERATURE: OptionId = OptionId(25);
    pub const MOTION_MODULE_TEMPERATURE: OptionId = OptionId(27);
    pub const DEPTH_UNITS: OptionId = OptionId(28);
    pub const COLOR_SCHEME: OptionId = OptionId(31);
    pub const HISTOGRAM_EQUALIZATION_ENABLED: OptionId = OptionId(32);
    pub const MIN_DISTANCE: OptionId = OptionId(33);
    pub const MAX_DISTANCE: OptionId = OptionId(34);
    pub const FILTER_MAGNITUDE: OptionId = OptionId(36);
    pub const FILTER_SMOOTH_ALPHA: OptionId = OptionId(37);
    pub const FILTER_SMOOTH_DELTA: OptionId = OptionId(38);
    pub const HOLES_FILL: OptionId = OptionId(39);
    pub const INTER_CAM_SYNC_MODE: OptionId = OptionId(42);

    /// Human readable name, `None` for ids without a constant here.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::BACKLIGHT_COMPENSATION => "Backlight Compensation",
            Self::BRIGHTNESS => "Brightness",
            Self::CONTRAST => "Contrast",
            Self::EXPOSURE => "Exposure",
            Self::GAIN => "Gain",
            Self::ENABLE_AUTO_EXPOSURE => "Enable Auto Exposure",
            Self::VISUAL_PRESET => "Visual Preset",
            Self::LASER_POWER => "Laser Power",
            Self::EMITTER_ENABLED => "Emitter Enabled",
            Self::ASIC_TEMPERATURE => "Asic Temperature",
            Self::PROJECTOR_TEMPERATURE => "Projector Temperature",
            Self::MOTION_MODULE_TEMPERATURE => "Motion Module Temperature",
            Self::DEPTH_UNITS => "Depth Units",
            Self::COLOR_SCHEME => "Color Scheme",
            Self::HISTOGRAM_EQUALIZATION_ENABLED => "Histogram Equalization Enabled",
            Self::MIN_DISTANCE => "Min Distance",
            Self::MAX_DISTANCE => "Max Distance",
            Self::FILTER_MAGNITUDE => "Filter Magnitude",
            Self::FILTER_SMOOTH_ALPHA => "Filter Smooth Alpha",
            Self::FILTER_SMOOTH_DELTA => "Filter Smooth Delta",
            Self::HOLES_FILL => "Holes Fill",
            Self::INTER_CAM_SYNC_MODE => "Inter Cam Sync Mode",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Option {}", self.0),
        }
    }
}

/// Valid values of an option.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptionRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
}

impl OptionRange {
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Get/set access to the options of a sensor or processing stage.
///
/// Unsupported options are not errors: [`Options::get_option`] reports `0.0`
/// and [`Options::set_option`] does nothing. Use [`Options::supports`] to tell
/// the cases apart.
pub trait Options {
    #[doc(hidden)]
    fn options_target(&self) -> Result<OptionsTarget>;

    #[doc(hidden)]
    fn options_driver(&self) -> &dyn Driver;

    fn supports(&self, id: OptionId) -> Result<bool> {
        let target = self.options_target()?;
        Ok(self.options_driver().supports_option(target, id)?)
    }

    /// Current value, `0.0` when the option is not supported.
    fn get_option(&self, id: OptionId) -> Result<f32> {
        let target = self.options_target()?;
        let driver = self.options_driver();
        if !driver.supports_option(target, id)? {
            return Ok(0.0);
        }
        Ok(driver.get_option(target, id)?)
    }

    /// Sets `id`, silently ignored when the option is not supported.
    ///
    /// # Errors
    ///
    /// Out of range values and writes to read-only options are rejected by
    /// the driver.
    fn set_option(&self, id: OptionId, value: f32) -> Result<()> {
        let target = self.options_target()?;
        let driver = self.options_driver();
        if !driver.supports_option(target, id)? {
            debug!("option {} not supported, ignoring set to {}", id, value);
            return Ok(());
        }
        Ok(driver.set_option(target, id, value)?)
    }

    /// Valid range, `None` when the option is not supported.
    fn option_range(&self, id: OptionId) -> Result<Option<OptionRange>> {
        let target = self.options_target()?;
        let driver = self.options_driver();
        if !driver.supports_option(target, id)? {
            return Ok(None);
        }
        Ok(Some(driver.option_range(target, id)?))
    }

    fn is_read_only(&self, id: OptionId) -> Result<bool> {
        let target = self.options_target()?;
        let driver = self.options_driver();
        if !driver.supports_option(target, id)? {
            return Ok(false);
        }
        Ok(driver.is_option_read_only(target, id)?)
    }
}

/// Depth sensor tuning presets, the values of [`OptionId::VISUAL_PRESET`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum VisualPreset {
    Custom = 0,
    Default = 1,
    Hand = 2,
    HighAccuracy = 3,
    HighDensity = 4,
    MediumDensity = 5,
    RemoveIrPattern = 6,
}

impl VisualPreset {
    pub fn from_value(value: f32) -> Option<Self> {
        let preset = match value as i32 {
            0 => Self::Custom,
            1 => Self::Default,
            2 => Self::Hand,
            3 => Self::HighAccuracy,
            4 => Self::HighDensity,
            5 => Self::MediumDensity,
            6 => Self::RemoveIrPattern,
            _ => return None,
        };
        Some(preset)
    }

    pub fn value(self) -> f32 {
        self as i32 as f32
    }
}

impl fmt::Display for VisualPreset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Custom => "Custom",
            Self::Default => "Default",
            Self::Hand => "Hand",
            Self::HighAccuracy => "High Accuracy",
            Self::HighDensity => "High Density",
            Self::MediumDensity => "Medium Density",
            Self::RemoveIrPattern => "Remove IR Pattern",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_names() {
        assert_eq!(OptionId::FILTER_MAGNITUDE.to_string(), "Filter Magnitude");
        assert_eq!(OptionId(99).to_string(), "Option 99");
        assert_eq!(OptionId::ASIC_TEMPERATURE.0, 23);
        assert_eq!(OptionId::INTER_CAM_SYNC_MODE.0, 42);
    }

    #[test]
    fn test_visual_preset() {
        for value in 0..7 {
            let preset = VisualPreset::from_value(value as f32).unwrap();
            assert_eq!(preset.value(), value as f32);
        }
        assert_eq!(VisualPreset::from_value(7.0), None);
        assert_eq!(VisualPreset::HighAccuracy.to_string(), "High Accuracy");
    }

    #[test]
    fn test_range_contains() {
        let range = OptionRange {
            min: 2.0,
            max: 8.0,
            step: 1.0,
            default: 2.0,
        };
        assert!(range.contains(2.0));
        assert!(range.contains(8.0));
        assert!(!range.contains(1.0));
    }
}
