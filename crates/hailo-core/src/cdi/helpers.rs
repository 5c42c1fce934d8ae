use crate::Result;
use crate::config::Layout;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tracing::debug;

/// Create the empty sysfs overlay directory and the poststop cleanup script.
///
/// Safe to call repeatedly; the script is rewritten each time so a changed
/// layout takes effect on the next pass.
///
/// # Errors
///
/// Returns an error if the helper directory or script cannot be written.
pub fn ensure_isolation_helpers(layout: &Layout) -> Result<()> {
    let empty_dir = layout.empty_chardev_dir();
    fs::create_dir_all(&empty_dir)?;

    let script_path = layout.cleanup_script();
    let script = format!(
        "#!/bin/sh\n# Empty the sysfs overlay after a container stops\nrm -rf \"{}\"/* 2>/dev/null\nexit 0\n",
        empty_dir.display()
    );
    fs::write(&script_path, script)?;
    fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;

    debug!("Isolation helpers ready in {}", layout.helper_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_dir_and_executable_script() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::with_base(temp.path());

        ensure_isolation_helpers(&layout).unwrap();

        assert!(layout.empty_chardev_dir().is_dir());
        let meta = fs::metadata(layout.cleanup_script()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o755);

        let script = fs::read_to_string(layout.cleanup_script()).unwrap();
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains(&layout.empty_chardev_dir().display().to_string()));
    }

    #[test]
    fn test_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::with_base(temp.path());

        ensure_isolation_helpers(&layout).unwrap();
        ensure_isolation_helpers(&layout).unwrap();

        assert!(layout.cleanup_script().is_file());
    }
}
