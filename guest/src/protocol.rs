//! Runtime-flags protocol.
//!
//! The host hands the guest its launch directives through one of three
//! channels: a newline-delimited `info` file published on the pack share
//! after the handshake, a reduced file at a fixed path for hosts that own
//! the launch surface themselves, or the process arguments and environment.
//! Each line is `<key>: <value>`; values escape the newline, and
//! argument-vector values additionally escape spaces.

use crate::escape;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

/// Root under which the host's 9p share tags get mounted.
pub const SHARE_MOUNT_ROOT: &str = "/mnt";

/// Share tag re-exporting host paths for bind mounts into the container.
pub const ROOTFS_SHARE_TAG: &str = "share0";

/// Share tag carrying the pack with the runtime-flags file.
pub const PACK_SHARE_TAG: &str = "share1";

/// Runtime-flags file inside the pack share.
pub const INFO_FILE_NAME: &str = "info";

/// Reduced-protocol overlay; its presence selects the reduced mode.
pub const AUX_CONFIG_PATH: &str = "/oci/auxconfig";

pub fn rootfs_share_dir() -> PathBuf {
    Path::new(SHARE_MOUNT_ROOT).join(ROOTFS_SHARE_TAG)
}

pub fn pack_share_dir() -> PathBuf {
    Path::new(SHARE_MOUNT_ROOT).join(PACK_SHARE_TAG)
}

/// A host path re-exported into the container at a guest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMount {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Launch directives accumulated from a runtime-flags source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeFlags {
    pub mounts: Vec<ResolvedMount>,
    pub env: Vec<String>,
    pub entrypoint: Vec<String>,
    pub args: Vec<String>,
    pub with_net: bool,
    pub mac: Option<String>,
    pub bundle: Option<String>,
}

impl RuntimeFlags {
    /// Fold a reduced-channel overlay into `self`: mounts accumulate,
    /// scalar fields are taken from the overlay.
    pub fn merge_overlay(&mut self, overlay: RuntimeFlags) {
        self.mounts.extend(overlay.mounts);
        self.with_net = overlay.with_net;
        self.mac = overlay.mac;
        self.bundle = overlay.bundle;
    }
}

/// Derive flags from the process arguments and environment: the first
/// argument is the entrypoint, the rest the argument vector. Control
/// variables stay behind.
pub fn from_process() -> RuntimeFlags {
    from_args_env(std::env::args().skip(1), std::env::vars())
}

fn from_args_env(
    mut args: impl Iterator<Item = String>,
    vars: impl Iterator<Item = (String, String)>,
) -> RuntimeFlags {
    let mut flags = RuntimeFlags::default();
    if let Some(first) = args.next() {
        flags.entrypoint = vec![first];
        flags.args = args.collect();
    }
    flags.env = vars
        .filter(|(key, _)| !key.starts_with(crate::context::RESERVED_ENV_PREFIX))
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    flags
}

/// Parse the full directive set.
///
/// A repeated `c` line replaces the argument vector; everything the other
/// keys carry accumulates. Lines without a separator are skipped.
pub fn parse_info(text: &str) -> RuntimeFlags {
    let mut flags = RuntimeFlags::default();

    for line in escape::decode(text, b'\n') {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim_start_matches(' ');

        match key {
            "m" => apply_mount_directive(&mut flags, value),
            "c" => flags.args = escape::decode(value, b' '),
            "e" => flags.entrypoint = vec![value.to_string()],
            "env" => flags.env.push(value.to_string()),
            "n" => {
                flags.with_net = true;
                flags.mac = (!value.is_empty()).then(|| value.to_string());
            }
            "t" => {
                if !value.is_empty() {
                    set_wall_clock(value);
                }
            }
            "b" => flags.bundle = (!value.is_empty()).then(|| value.to_string()),
            other => tracing::warn!(key = other, "unsupported directive"),
        }
    }

    flags
}

/// Parse the reduced directive set: only mounts, networking, and the
/// bundle locator are honored. The host owns the launch surface in this
/// mode, so `c`, `e`, `env`, and `t` are dropped without noise.
pub fn parse_aux(text: &str) -> RuntimeFlags {
    let mut flags = RuntimeFlags::default();

    for line in escape::decode(text, b'\n') {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim_start_matches(' ');

        match key {
            "m" => apply_mount_directive(&mut flags, value),
            "n" => {
                flags.with_net = true;
                flags.mac = (!value.is_empty()).then(|| value.to_string());
            }
            "b" => flags.bundle = (!value.is_empty()).then(|| value.to_string()),
            "c" | "e" | "env" | "t" => {}
            other => tracing::warn!(key = other, "unsupported directive"),
        }
    }

    flags
}

fn apply_mount_directive(flags: &mut RuntimeFlags, value: &str) {
    if value.is_empty() {
        return;
    }

    let mount = ResolvedMount {
        source: clean_join(&rootfs_share_dir(), value),
        destination: clean_join(Path::new("/"), value),
    };
    tracing::debug!(
        source = %mount.source.display(),
        destination = %mount.destination.display(),
        "mount directive"
    );
    flags.mounts.push(mount);
}

/// Lexically join `segment` under `root`; relative steps cannot climb
/// above `root`.
fn clean_join(root: &Path, segment: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for component in Path::new(segment).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                if out.as_path() != root {
                    out.pop();
                }
            }
            _ => {}
        }
    }
    out
}

fn set_wall_clock(timestamp: &str) {
    let setting = format!("@{timestamp}");
    match Command::new("date").args(["+%s", "-s", &setting]).output() {
        Ok(output) if output.status.success() => {}
        Ok(output) => tracing::warn!(
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
            "failed to set wall clock"
        ),
        Err(err) => tracing::warn!(error = %err, "failed to set wall clock"),
    }
}
