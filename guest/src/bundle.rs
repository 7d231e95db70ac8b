//! External bundle delivery.
//!
//! When the container image is not baked into the guest, the runtime flags
//! carry a bundle locator: either `9p=<addr>` for a bundle served over the
//! network or a local directory prepared by the host. Both forms carry the
//! runtime spec and the image config at fixed relative paths, plus the
//! root filesystem as a directory (network form) or as a filesystem image
//! (local form).

use crate::config::ContainerSpec;
use crate::error::InitError;
use crate::protocol::RuntimeFlags;
use mayfly_mount::{bind_mount, mount_fs, mount_image};
use nix::mount::MsFlags;
use oci_spec::image::ImageConfiguration;
use oci_spec::runtime::Spec;
use std::fs;
use std::path::{Path, PathBuf};

/// Locator prefix for a bundle served over the network.
pub const NET_BUNDLE_PREFIX: &str = "9p=";

const BUNDLE_MOUNT_POINT: &str = "/run/9pbundle";
const BUNDLE_9P_OPTIONS: &str = "trans=tcp,version=9p2000.L,msize=5000000,port=80,cache=loose,ro";
const BUNDLE_SPEC: &str = "config/config.json";
const BUNDLE_IMAGE_CONFIG: &str = "config/imageconfig.json";
const BUNDLE_ROOTFS_DIR: &str = "rootfs";
const BUNDLE_ROOTFS_IMAGE: &str = "rootfs.img";

/// The launch payload read out of a mounted bundle.
#[derive(Debug)]
pub struct MountedBundle {
    pub spec: Spec,
    pub image_config: ImageConfiguration,
}

/// Make the external bundle available: mount it, deliver its root
/// filesystem to the configured rootfs path, and load the two config
/// documents every bundle must carry.
pub fn mount_bundle(
    container: &ContainerSpec,
    flags: &RuntimeFlags,
) -> Result<MountedBundle, InitError> {
    let locator = flags
        .bundle
        .as_deref()
        .ok_or(InitError::MissingBundleLocator)?;
    let rootfs_target = container.image_rootfs_path.as_deref().ok_or_else(|| {
        InitError::InvalidBundleFormat("no image rootfs path configured".to_string())
    })?;

    let (bundle_dir, remote) = if let Some(addr) = locator.strip_prefix(NET_BUNDLE_PREFIX) {
        if !flags.with_net {
            return Err(InitError::NetworkRequired);
        }
        fs::create_dir_all(BUNDLE_MOUNT_POINT)?;
        mount_fs(
            addr,
            Path::new(BUNDLE_MOUNT_POINT),
            "9p",
            MsFlags::empty(),
            BUNDLE_9P_OPTIONS,
        )?;
        (PathBuf::from(BUNDLE_MOUNT_POINT), true)
    } else {
        (PathBuf::from(locator), false)
    };

    let spec_path = bundle_dir.join(BUNDLE_SPEC);
    let image_config_path = bundle_dir.join(BUNDLE_IMAGE_CONFIG);
    if !spec_path.is_file() || !image_config_path.is_file() {
        return Err(InitError::InvalidBundleFormat(format!(
            "{} must contain {} and {}",
            bundle_dir.display(),
            BUNDLE_SPEC,
            BUNDLE_IMAGE_CONFIG
        )));
    }

    fs::create_dir_all(rootfs_target)?;
    if remote {
        bind_mount(&bundle_dir.join(BUNDLE_ROOTFS_DIR), rootfs_target)?;
    } else {
        mount_image(&bundle_dir.join(BUNDLE_ROOTFS_IMAGE), rootfs_target)?;
    }

    let spec = Spec::load(&spec_path)?;
    let image_config = ImageConfiguration::from_file(&image_config_path)?;

    tracing::info!(bundle = %bundle_dir.display(), remote, "external bundle mounted");
    Ok(MountedBundle { spec, image_config })
}
