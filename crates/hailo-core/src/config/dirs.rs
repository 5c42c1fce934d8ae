use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const EMPTY_CHARDEV_DIR: &str = "empty-chardev";
const CLEANUP_SCRIPT: &str = "cleanup-empty-chardev.sh";

/// Host filesystem locations the plugin reads from or prepares for containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    /// Driver sysfs class directory, one entry per device (/sys/class/hailo_chardev)
    #[serde(default = "default_sysfs_class_dir")]
    pub sysfs_class_dir: PathBuf,

    /// Directory holding the character device nodes (/dev)
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,

    /// Plugin-owned scratch directory for isolation helpers (/var/lib/hailo-cdi)
    #[serde(default = "default_helper_dir")]
    pub helper_dir: PathBuf,
}

fn default_sysfs_class_dir() -> PathBuf {
    PathBuf::from("/sys/class/hailo_chardev")
}
fn default_device_dir() -> PathBuf {
    PathBuf::from("/dev")
}
fn default_helper_dir() -> PathBuf {
    PathBuf::from("/var/lib/hailo-cdi")
}

impl Layout {
    #[must_use]
    pub fn with_base(base: &Path) -> Self {
        Self {
            sysfs_class_dir: base.join("sys/class/hailo_chardev"),
            device_dir: base.join("dev"),
            helper_dir: base.join("hailo-cdi"),
        }
    }

    /// Empty directory bind-mounted over the sysfs class dir inside containers
    #[must_use]
    pub fn empty_chardev_dir(&self) -> PathBuf {
        self.helper_dir.join(EMPTY_CHARDEV_DIR)
    }

    /// Poststop hook that empties [`Self::empty_chardev_dir`]
    #[must_use]
    pub fn cleanup_script(&self) -> PathBuf {
        self.helper_dir.join(CLEANUP_SCRIPT)
    }

    #[must_use]
    pub fn sysfs_entry(&self, device_id: &str) -> PathBuf {
        self.sysfs_class_dir.join(device_id)
    }

    #[must_use]
    pub fn device_node(&self, device_id: &str) -> PathBuf {
        self.device_dir.join(device_id)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            sysfs_class_dir: default_sysfs_class_dir(),
            device_dir: default_device_dir(),
            helper_dir: default_helper_dir(),
        }
    }
}
