use super::CDI_VERSION;
use super::spec::{CdiSpec, ContainerEdits, DeviceNode, DeviceSpec, Hook, Mount};
use crate::Result;
use crate::config::{Config, Layout};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const VENDOR: &str = "Hailo Technologies";
const DESCRIPTION: &str = "Hailo AI accelerator devices with sysfs isolation";
const DEVICE_MODEL: &str = "hailo-8";
const CLEANUP_HOOK_TIMEOUT_SECS: u32 = 5;

/// Reads and writes the CDI descriptor file for one device kind.
///
/// The file is always a complete snapshot: [`DescriptorStore::write`] renders
/// into a sibling temp file and renames it over the target, so readers see
/// either the previous or the new descriptor and never a partial one.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    dir: PathBuf,
    file_name: String,
    kind: String,
    layout: Layout,
}

impl DescriptorStore {
    #[must_use]
    pub fn new(
        dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
        kind: impl Into<String>,
        layout: Layout,
    ) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            kind: kind.into(),
            layout,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.cdi_dir,
            &config.cdi_file_name,
            &config.resource_name,
            config.layout.clone(),
        )
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Render the descriptor for `device_ids` without touching the target file.
    ///
    /// Duplicate ids collapse onto their first occurrence. A device whose
    /// sysfs entry is missing is still listed, just without its isolation mount.
    #[must_use]
    pub fn build(&self, device_ids: &[String]) -> CdiSpec {
        let mut seen = HashSet::new();
        let devices = device_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| self.device_spec(id))
            .collect();

        let annotations = BTreeMap::from([
            ("vendor".to_string(), VENDOR.to_string()),
            ("description".to_string(), DESCRIPTION.to_string()),
            ("multi-device".to_string(), "true".to_string()),
        ]);

        let global_edits = ContainerEdits {
            mounts: vec![Mount::bind(
                path_string(&self.layout.empty_chardev_dir()),
                path_string(&self.layout.sysfs_class_dir),
                "rw",
            )],
            hooks: vec![Hook {
                hook_name: "poststop".to_string(),
                path: path_string(&self.layout.cleanup_script()),
                args: Vec::new(),
                env: Vec::new(),
                timeout: Some(CLEANUP_HOOK_TIMEOUT_SECS),
            }],
            ..ContainerEdits::default()
        };

        CdiSpec {
            cdi_version: CDI_VERSION.to_string(),
            kind: self.kind.clone(),
            annotations,
            devices,
            container_edits: Some(global_edits),
        }
    }

    fn device_spec(&self, id: &str) -> DeviceSpec {
        let node = path_string(&self.layout.device_node(id));
        let mut edits = ContainerEdits {
            device_nodes: vec![DeviceNode {
                path: node.clone(),
                host_path: Some(node),
                node_type: Some("c".to_string()),
                major: None,
                minor: None,
                permissions: Some("rw".to_string()),
            }],
            ..ContainerEdits::default()
        };

        let sysfs = self.layout.sysfs_entry(id);
        if sysfs.exists() {
            let sysfs = path_string(&sysfs);
            edits.mounts.push(Mount::bind(sysfs.clone(), sysfs, "ro"));
        } else {
            warn!(
                "No sysfs entry for device {id} at {}, skipping isolation mount",
                sysfs.display()
            );
        }

        let annotations = BTreeMap::from([
            ("device.type".to_string(), "npu".to_string()),
            ("device.model".to_string(), DEVICE_MODEL.to_string()),
            ("pci.slot".to_string(), "auto-detect".to_string()),
        ]);

        DeviceSpec {
            name: id.to_string(),
            annotations,
            container_edits: edits,
        }
    }

    /// Replace the descriptor file with one describing `device_ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be serialized or the temp
    /// file cannot be written and renamed into place.
    pub fn write(&self, device_ids: &[String]) -> Result<()> {
        let spec = self.build(device_ids);
        let content = serde_json::to_string_pretty(&spec)?;

        std::fs::create_dir_all(&self.dir)?;
        let target = self.path();
        let tmp = self.dir.join(format!(".{}.tmp", self.file_name));

        std::fs::write(&tmp, content)?;
        if let Err(e) = std::fs::rename(&tmp, &target) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!(
            "Wrote CDI descriptor {} with {} devices",
            target.display(),
            spec.devices.len()
        );
        Ok(())
    }

    /// Device ids listed in the descriptor file, in file order.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is absent or is not a valid descriptor.
    pub fn read(&self) -> Result<Vec<String>> {
        let path = self.path();
        let content = std::fs::read_to_string(&path)?;
        let spec: CdiSpec = serde_json::from_str(&content)?;

        debug!(
            "Read {} devices from {}",
            spec.devices.len(),
            path.display()
        );
        Ok(spec.devices.into_iter().map(|d| d.name).collect())
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
