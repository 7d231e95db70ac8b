//! Boot configuration, baked into the guest image by the build pipeline.

use crate::error::InitError;
use mayfly_mount::MountDirective;
use nix::sys::termios::{self, LocalFlags, SetArg};
use serde::{Deserialize, Serialize};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

pub const BOOT_CONFIG_PATH: &str = "/oci/initconfig.json";

const BASE_PATH: &str = "/bin:/sbin:/usr/bin:/usr/sbin:/usr/local/bin";
const BASE_HOME: &str = "/root";
const BASE_TERM: &str = "vt100";

/// Where the container payload lives and where its launch spec goes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    #[serde(default)]
    pub image_config_path: PathBuf,
    #[serde(default)]
    pub runtime_config_path: PathBuf,
    /// Directory the finalized launch spec is written into.
    #[serde(default)]
    pub bundle_path: PathBuf,
    /// The image is not baked into the guest; fetch it from the locator
    /// the runtime flags carry.
    #[serde(default)]
    pub external_bundle: bool,
    /// Where an external bundle's root filesystem gets mounted.
    #[serde(default)]
    pub image_rootfs_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    #[serde(default)]
    pub debug: bool,
    /// Keep logging on for the early boot phases even when `debug` is off.
    #[serde(default)]
    pub debug_init: bool,
    #[serde(default)]
    pub container: ContainerSpec,
    #[serde(default)]
    pub mounts: Vec<MountDirective>,
    #[serde(default)]
    pub post_mounts: Vec<MountDirective>,
    #[serde(default)]
    pub cmd_pre_run: Vec<Vec<String>>,
    #[serde(default)]
    pub cmd: Vec<Vec<String>>,
    /// Issued unconditionally once the command sequence is over.
    #[serde(default = "default_shutdown")]
    pub shutdown: Vec<String>,
}

pub(crate) fn default_shutdown() -> Vec<String> {
    vec!["poweroff".to_string(), "-f".to_string()]
}

impl BootConfig {
    pub fn load(path: &Path) -> Result<Self, InitError> {
        let data = std::fs::read(path).map_err(InitError::ConfigRead)?;
        serde_json::from_slice(&data).map_err(InitError::ConfigParse)
    }
}

/// Baseline environment for everything the boot sequence spawns. This is
/// the only place the process environment is written.
pub fn set_base_env() {
    // SAFETY: nothing else reads or writes the environment at this point.
    unsafe {
        std::env::set_var("PATH", BASE_PATH);
        std::env::set_var("HOME", BASE_HOME);
        std::env::set_var("TERM", BASE_TERM);
    }
}

/// Stop the console from echoing host-injected input. A non-terminal
/// stdin has no echo to disable.
pub fn disable_tty_echo() -> Result<(), InitError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(());
    }

    let mut attrs = termios::tcgetattr(&stdin).map_err(InitError::Tty)?;
    attrs.local_flags.remove(LocalFlags::ECHO);
    termios::tcsetattr(&stdin, SetArg::TCSANOW, &attrs).map_err(InitError::Tty)
}
