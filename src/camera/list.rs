//! Capture device enumeration.

use std::path::Path;

use super::types::CameraInfo;

/// List V4L2 capture nodes (`/dev/videoN`).
///
/// Returns an empty vector when none exist (or on non-Linux systems).
pub fn list_devices() -> Vec<CameraInfo> {
    list_devices_in(Path::new("/dev"), Path::new("/sys/class/video4linux"))
}

fn list_devices_in(dev_dir: &Path, sysfs_dir: &Path) -> Vec<CameraInfo> {
    let Ok(entries) = std::fs::read_dir(dev_dir) else {
        return Vec::new();
    };

    let mut devices: Vec<CameraInfo> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let name = file_name.to_str()?;
            let index: u32 = name.strip_prefix("video")?.parse().ok()?;
            let label = std::fs::read_to_string(sysfs_dir.join(name).join("name"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| format!("Camera {}", index));
            Some(CameraInfo {
                index,
                name: label,
                path: entry.path().display().to_string(),
            })
        })
        .collect();

    devices.sort_by_key(|d| d.index);
    devices
}
