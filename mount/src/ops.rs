use crate::error::MountError;
use nix::mount::{MsFlags, mount, umount};
use std::path::Path;
use std::process::Command;

/// Filesystem types probed, in order, when mounting a rootfs image.
const LOOPBACK_FS_ORDER: [&str; 3] = ["erofs", "squashfs", "iso9660"];

/// Mount a filesystem. `data` is the raw option string; empty means none.
pub fn mount_fs(
    source: &str,
    target: &Path,
    fstype: &str,
    flags: MsFlags,
    data: &str,
) -> Result<(), MountError> {
    tracing::debug!(source, target = %target.display(), fstype, "mounting");

    mount(
        Some(source),
        target,
        (!fstype.is_empty()).then_some(fstype),
        flags,
        (!data.is_empty()).then_some(data),
    )
    .map_err(|e| {
        MountError::MountFailed(format!("{} on {}: {}", source, target.display(), e))
    })
}

/// Bind mount `source` onto `target`. The target must already exist.
pub fn bind_mount(source: &Path, target: &Path) -> Result<(), MountError> {
    tracing::debug!(source = %source.display(), target = %target.display(), "bind mounting");

    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|e| {
        MountError::MountFailed(format!(
            "bind {} on {}: {}",
            source.display(),
            target.display(),
            e
        ))
    })
}

/// Unmount a filesystem at the given path.
pub fn unmount(target: &Path) -> Result<(), MountError> {
    tracing::debug!(target = %target.display(), "unmounting");

    umount(target)
        .map_err(|e| MountError::UnmountFailed(format!("{}: {}", target.display(), e)))
}

/// Loopback-mount a filesystem image read-only at `target`, probing the
/// known image filesystems until one accepts it.
///
/// Goes through the system `mount` command: loop device setup is its job.
pub fn mount_image(image: &Path, target: &Path) -> Result<(), MountError> {
    std::fs::create_dir_all(target)?;

    for fstype in LOOPBACK_FS_ORDER {
        let output = Command::new("mount")
            .args(["-t", fstype, "-o", "loop,ro"])
            .arg(image)
            .arg(target)
            .output()?;

        if output.status.success() {
            tracing::debug!(image = %image.display(), fstype, "mounted image");
            return Ok(());
        }

        tracing::debug!(
            image = %image.display(),
            fstype,
            stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
            "image mount attempt failed"
        );
    }

    Err(MountError::MountFailed(format!(
        "no known filesystem could mount {}",
        image.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmount_not_mounted() {
        let dir = tempfile::tempdir().unwrap();
        let err = unmount(dir.path()).unwrap_err();
        assert!(matches!(err, MountError::UnmountFailed(_)));
    }

    #[test]
    fn test_mount_unknown_fstype() {
        let dir = tempfile::tempdir().unwrap();
        let err = mount_fs("none", dir.path(), "no-such-fs", MsFlags::empty(), "").unwrap_err();
        assert!(matches!(err, MountError::MountFailed(_)));
    }

    #[test]
    fn test_mount_image_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("missing.img");
        let target = dir.path().join("target");
        assert!(mount_image(&image, &target).is_err());
        // The target directory is still prepared for the probe attempts.
        assert!(target.is_dir());
    }
}
