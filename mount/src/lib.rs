//! Mount directives and their execution.
//!
//! A boot configuration carries a list of [`MountDirective`]s. Each one
//! describes a single mount plus the filesystem entries to prepare before it
//! and after it. [`mount_all`] executes a batch with the ordering and
//! failure policy the boot sequence relies on.

mod batch;
mod error;
mod ops;

pub use batch::mount_all;
pub use error::MountError;
pub use ops::{bind_mount, mount_fs, mount_image, unmount};

use serde::{Deserialize, Serialize};

/// A directory to create, with its mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirSpec {
    pub path: String,
    #[serde(default = "default_dir_mode")]
    pub mode: u32,
}

fn default_dir_mode() -> u32 {
    0o755
}

/// A file to create with fixed contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: String,
    #[serde(default)]
    pub contents: String,
}

/// One mount operation within a boot batch.
///
/// `flags` is the raw mount-flag bit set passed through to the syscall.
/// `cmd` runs after the mount succeeds, before the post entries are created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountDirective {
    #[serde(default)]
    pub source: String,
    pub destination: String,
    #[serde(default, rename = "type")]
    pub fstype: String,
    #[serde(default)]
    pub flags: u64,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub dirs: Vec<DirSpec>,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub post_dirs: Vec<DirSpec>,
    #[serde(default)]
    pub post_files: Vec<FileSpec>,
    /// Executed on its own thread; the batch still joins it before returning.
    #[serde(default, rename = "async")]
    pub concurrent: bool,
    /// A failure is logged and skipped instead of failing the batch.
    #[serde(default)]
    pub optional: bool,
}
