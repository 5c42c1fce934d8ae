use super::DeviceSource;
use crate::{Error, Result};
use std::io::ErrorKind;
use std::path::PathBuf;

/// Lists the driver's sysfs class directory; every entry is one device.
#[derive(Debug, Clone)]
pub struct SysfsDeviceSource {
    class_dir: PathBuf,
}

impl SysfsDeviceSource {
    #[must_use]
    pub fn new(class_dir: impl Into<PathBuf>) -> Self {
        Self {
            class_dir: class_dir.into(),
        }
    }
}

impl DeviceSource for SysfsDeviceSource {
    fn discover(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.class_dir) {
            Ok(entries) => entries,
            // Driver not loaded
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Discovery(format!(
                    "cannot list {}: {e}",
                    self.class_dir.display()
                )));
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                Error::Discovery(format!("cannot list {}: {e}", self.class_dir.display()))
            })?;
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
