//! Test fixtures and helpers

use crate::cdi::DescriptorStore;
use crate::config::Layout;
use std::path::Path;
use tempfile::TempDir;

pub const TEST_KIND: &str = "hailo.ai/npu";

pub fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Store rooted in `temp` with the default file name
pub fn make_store(temp: &TempDir) -> DescriptorStore {
    DescriptorStore::new(
        temp.path().join("cdi"),
        "hailo.json",
        TEST_KIND,
        Layout::with_base(temp.path()),
    )
}

/// Create sysfs class entries for `names` under the layout rooted at `base`
pub fn make_sysfs_entries(base: &Path, names: &[&str]) {
    let layout = Layout::with_base(base);
    for name in names {
        std::fs::create_dir_all(layout.sysfs_entry(name)).unwrap();
    }
}
