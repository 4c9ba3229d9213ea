// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Root handle owning the driver context.

use crate::{
    driver::{Driver, RawContext},
    error::{Error, Result},
    native::NativeDriver,
};
use std::{
    ffi::OsStr,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info};

/// Runtime version of the native library.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl ApiVersion {
    pub fn from_encoded(version: i32) -> Self {
        let (major, minor, patch) = rs2_sys::decode_api_version(version);
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

struct Shared {
    driver: Arc<dyn Driver>,
    context: Mutex<Option<RawContext>>,
}

impl Shared {
    fn context(&self) -> MutexGuard<'_, Option<RawContext>> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let context = self
            .context
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(context) = context {
            self.driver.delete_context(context);
            debug!("session closed");
        }
    }
}

/// Connection to the sensor driver.
///
/// Cloning is cheap and every clone refers to the same context. Pipelines,
/// configs, stages and devices created from a session keep the driver alive,
/// but fail with [`Error::SessionClosed`] once [`Session::close`] was called
/// where they need the context.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Opens a session on the system librealsense2.
    pub fn new() -> Result<Self> {
        Self::with_library(rs2_sys::LIBRARY_NAME)
    }

    /// Opens a session on the librealsense2 build at `path`.
    pub fn with_library<P: AsRef<OsStr>>(path: P) -> Result<Self> {
        let driver = NativeDriver::load(path)?;
        Self::with_driver(Arc::new(driver))
    }

    /// Opens a session on an explicit driver, such as
    /// [`crate::synthetic::SyntheticDriver`].
    pub fn with_driver(driver: Arc<dyn Driver>) -> Result<Self> {
        let context = driver.create_context()?;
        if let Ok(version) = driver.api_version() {
            info!("realsense api {}", ApiVersion::from_encoded(version));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                driver,
                context: Mutex::new(Some(context)),
            }),
        })
    }

    pub fn api_version(&self) -> Result<ApiVersion> {
        self.ensure_open()?;
        let version = self.shared.driver.api_version()?;
        Ok(ApiVersion::from_encoded(version))
    }

    /// Releases the context for every clone; later calls are no-ops.
    pub fn close(&self) {
        let context = self.shared.context().take();
        if let Some(context) = context {
            self.shared.driver.delete_context(context);
            debug!("session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.context().is_some()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.context().map(|_| ())
    }

    pub(crate) fn context(&self) -> Result<RawContext> {
        let context = *self.shared.context();
        context.ok_or(Error::SessionClosed)
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.shared.driver
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticDriver;

    #[test]
    fn test_close_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Arc::new(SyntheticDriver::new());
        let session = Session::with_driver(driver.clone())?;
        let other = session.clone();
        assert!(session.api_version()?.major >= 2);

        session.close();
        session.close();
        assert!(!other.is_open());
        assert!(matches!(other.api_version(), Err(Error::SessionClosed)));

        drop(session);
        drop(other);
        assert_eq!(driver.live_objects(), 0);
        assert_eq!(driver.invalid_releases(), 0);
        Ok(())
    }

    #[test]
    fn test_api_version_display() {
        assert_eq!(ApiVersion::from_encoded(25501).to_string(), "2.55.1");
    }

    #[test]
    fn test_missing_library() {
        assert!(matches!(
            Session::with_library("librealsense2-missing.so"),
            Err(Error::Library(_))
        ));
    }
}
