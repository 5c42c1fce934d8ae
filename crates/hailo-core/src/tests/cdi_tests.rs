//! Tests for the CDI descriptor store
//!
//! - write/read round trips and ordering
//! - duplicate collapsing
//! - per-device isolation mounts and the global overlay
//! - atomic replacement

use super::fixtures::{TEST_KIND, ids, make_store, make_sysfs_entries};
use crate::cdi::{CDI_VERSION, CdiSpec};
use tempfile::TempDir;

fn read_spec(store: &crate::cdi::DescriptorStore) -> CdiSpec {
    let content = std::fs::read_to_string(store.path()).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_round_trip_preserves_order() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);

    store.write(&ids(&["hailo0", "hailo1"])).unwrap();

    assert_eq!(store.read().unwrap(), ids(&["hailo0", "hailo1"]));
}

#[test]
fn test_duplicates_collapse_to_first() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);

    store
        .write(&ids(&["hailo1", "hailo0", "hailo1", "hailo0"]))
        .unwrap();

    assert_eq!(store.read().unwrap(), ids(&["hailo1", "hailo0"]));
}

#[test]
fn test_empty_device_list() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);

    store.write(&[]).unwrap();

    assert!(store.read().unwrap().is_empty());
    assert!(read_spec(&store).devices.is_empty());
}

#[test]
fn test_read_missing_file_fails() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);

    assert!(store.read().is_err());
}

#[test]
fn test_read_malformed_file_fails() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);
    std::fs::create_dir_all(temp.path().join("cdi")).unwrap();
    std::fs::write(store.path(), "{ not json").unwrap();

    assert!(matches!(store.read(), Err(crate::Error::Json(_))));
}

#[test]
fn test_header_and_global_edits() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);
    let layout = store.layout().clone();

    store.write(&ids(&["hailo0"])).unwrap();
    let spec = read_spec(&store);

    assert_eq!(spec.cdi_version, CDI_VERSION);
    assert_eq!(spec.kind, TEST_KIND);
    assert_eq!(spec.annotations.get("multi-device").map(String::as_str), Some("true"));

    let global = spec.container_edits.unwrap();
    assert_eq!(global.mounts.len(), 1);
    assert_eq!(
        global.mounts[0].host_path,
        layout.empty_chardev_dir().display().to_string()
    );
    assert_eq!(
        global.mounts[0].container_path,
        layout.sysfs_class_dir.display().to_string()
    );
    assert_eq!(global.mounts[0].options, vec!["rw", "bind"]);

    assert_eq!(global.hooks.len(), 1);
    assert_eq!(global.hooks[0].hook_name, "poststop");
    assert_eq!(global.hooks[0].path, layout.cleanup_script().display().to_string());
    assert_eq!(global.hooks[0].timeout, Some(5));
}

#[test]
fn test_device_node_and_annotations() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);
    let layout = store.layout().clone();

    store.write(&ids(&["hailo0"])).unwrap();
    let spec = read_spec(&store);
    let device = &spec.devices[0];

    assert_eq!(device.name, "hailo0");
    assert_eq!(device.annotations.get("device.type").map(String::as_str), Some("npu"));

    let node = &device.container_edits.device_nodes[0];
    let expected = layout.device_node("hailo0").display().to_string();
    assert_eq!(node.path, expected);
    assert_eq!(node.host_path.as_deref(), Some(expected.as_str()));
    assert_eq!(node.node_type.as_deref(), Some("c"));
    assert_eq!(node.permissions.as_deref(), Some("rw"));
}

#[test]
fn test_isolation_mount_only_when_sysfs_entry_exists() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);
    make_sysfs_entries(temp.path(), &["hailo0"]);

    store.write(&ids(&["hailo0", "hailo1"])).unwrap();
    let spec = read_spec(&store);

    let with_sysfs = &spec.devices[0].container_edits.mounts;
    assert_eq!(with_sysfs.len(), 1);
    assert_eq!(with_sysfs[0].options, vec!["ro", "bind"]);
    assert_eq!(with_sysfs[0].host_path, with_sysfs[0].container_path);

    // Unresolvable device is still advertised, just without the mount
    assert_eq!(spec.devices[1].name, "hailo1");
    assert!(spec.devices[1].container_edits.mounts.is_empty());
}

#[test]
fn test_write_replaces_previous_snapshot() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);

    store.write(&ids(&["hailo0", "hailo1", "hailo2"])).unwrap();
    store.write(&ids(&["hailo2"])).unwrap();

    assert_eq!(store.read().unwrap(), ids(&["hailo2"]));
}

#[test]
fn test_write_leaves_no_temp_file() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);

    store.write(&ids(&["hailo0"])).unwrap();

    let names: Vec<String> = std::fs::read_dir(temp.path().join("cdi"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["hailo.json"]);
}

#[test]
fn test_optional_fields_are_omitted() {
    let temp = TempDir::new().unwrap();
    let store = make_store(&temp);

    store.write(&ids(&["hailo0"])).unwrap();
    let raw = std::fs::read_to_string(store.path()).unwrap();

    assert!(raw.contains("\"cdiVersion\""));
    assert!(raw.contains("\"containerEdits\""));
    assert!(!raw.contains("\"major\""));
    assert!(!raw.contains("\"env\""));
}
