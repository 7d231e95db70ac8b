//! The boot sequence.
//!
//! Order matters throughout: the image config must be readable before the
//! pre-mounts run, the runtime spec may live on a filesystem the
//! pre-mounts provide, runtime flags arrive only after the handshake, and
//! networking must be up before an external bundle can be fetched.

use crate::bundle;
use crate::command;
use crate::config::{self, BootConfig};
use crate::context::BootContext;
use crate::error::InitError;
use crate::handshake;
use crate::launch;
use crate::net;
use crate::protocol::{self, RuntimeFlags};
use mayfly_mount::{mount_all, mount_fs};
use nix::mount::MsFlags;
use oci_spec::image::ImageConfiguration;
use oci_spec::runtime::Spec;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

/// Share tag mount options in the stream variant. The poll variant mounts
/// its tags with [`handshake::POLL_MOUNT_OPTIONS`].
const SHARE_MOUNT_OPTIONS: &str = "trans=virtio,version=9p2000.L,msize=8192";

/// Run the boot sequence and, no matter how it went, power the machine
/// off. The recorded boot failure is returned once the power-off command
/// has completed; a power-off failure takes its place.
pub fn boot(config_path: &Path, ctx: &mut BootContext) -> Result<(), InitError> {
    // Before anything that spawns a process: even the fallback power-off
    // needs a PATH to resolve against.
    config::set_base_env();

    let (shutdown, result) = match BootConfig::load(config_path) {
        Ok(boot_config) => {
            let result = run(&boot_config, ctx);
            (boot_config.shutdown, result)
        }
        Err(err) => (config::default_shutdown(), Err(err)),
    };

    if let Err(err) = &result {
        tracing::error!(error = %err, "boot sequence failed");
    }

    command::power_off(&shutdown)?;
    result
}

fn run(boot_config: &BootConfig, ctx: &mut BootContext) -> Result<(), InitError> {
    config::disable_tty_echo()?;
    ctx.set_verbose(boot_config.debug || boot_config.debug_init);

    let mut image_config = ImageConfiguration::default();
    if !boot_config.container.external_bundle {
        image_config = ImageConfiguration::from_file(&boot_config.container.image_config_path)?;
    }

    mount_all(&boot_config.mounts)?;

    let mut spec = Spec::default();
    if !boot_config.container.external_bundle {
        spec = Spec::load(&boot_config.container.runtime_config_path)?;
    }

    for cmd in &boot_config.cmd_pre_run {
        tracing::info!(command = ?cmd, "running pre-run command");
        command::run_logged(cmd)?;
    }

    ctx.set_verbose(boot_config.debug);

    let flags = gather_runtime_flags(ctx)?;

    if flags.with_net {
        net::bring_up(flags.mac.as_deref())?;
    }

    if boot_config.container.external_bundle {
        let mounted = bundle::mount_bundle(&boot_config.container, &flags)?;
        spec = mounted.spec;
        image_config = mounted.image_config;
    }

    mount_all(&boot_config.post_mounts)?;

    launch::patch_spec(&mut spec, &flags, &image_config)?;
    launch::write_spec(&spec, &boot_config.container.bundle_path)?;
    if flags.with_net {
        launch::bind_network_files(&spec)?;
    }

    let mut recorded = Ok(());
    for cmd in &boot_config.cmd {
        tracing::info!(command = ?cmd, "executing");
        if let Err(err) = command::run_interactive(cmd) {
            recorded = Err(err);
            break;
        }
    }
    recorded
}

/// Collect runtime flags from whichever source this boot uses: none at
/// all, the reduced overlay file on top of the process args/env, or the
/// handshake-published info file.
fn gather_runtime_flags(ctx: &BootContext) -> Result<RuntimeFlags, InitError> {
    if ctx.toggles.runtime_config_disabled {
        tracing::debug!("runtime config disabled; booting with image defaults");
        return Ok(RuntimeFlags::default());
    }

    match fs::read_to_string(protocol::AUX_CONFIG_PATH) {
        Ok(text) => {
            tracing::debug!("using reduced runtime config");
            let mut flags = protocol::from_process();
            flags.merge_overlay(protocol::parse_aux(&text));
            return Ok(flags);
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let pack_dir = protocol::pack_share_dir();
    if ctx.toggles.poll_handshake {
        fs::create_dir_all(&pack_dir)?;
        handshake::poll_mount(protocol::PACK_SHARE_TAG, &pack_dir, protocol::INFO_FILE_NAME)?;
        mount_share_tags(&[protocol::ROOTFS_SHARE_TAG], handshake::POLL_MOUNT_OPTIONS);
    } else {
        mount_share_tags(
            &[protocol::ROOTFS_SHARE_TAG, protocol::PACK_SHARE_TAG],
            SHARE_MOUNT_OPTIONS,
        );
        let mut stdin = io::stdin().lock();
        let mut stdout = io::stdout().lock();
        handshake::stream_marker(&mut stdin, &mut stdout)?;
    }

    let info = fs::read_to_string(pack_dir.join(protocol::INFO_FILE_NAME))?;
    tracing::debug!(info = %info, "runtime flags received");
    Ok(protocol::parse_info(&info))
}

/// Best-effort share tag mounts: a failure abandons the rest of the list.
/// Whether anything usable arrived shows up later, when the directives
/// referencing the shares run.
fn mount_share_tags(tags: &[&str], options: &str) {
    for tag in tags {
        let target = Path::new(protocol::SHARE_MOUNT_ROOT).join(tag);
        if let Err(err) = fs::create_dir_all(&target) {
            tracing::warn!(tag = %tag, error = %err, "cannot prepare share mount point");
            break;
        }
        if let Err(err) = mount_fs(tag, &target, "9p", MsFlags::empty(), options) {
            tracing::warn!(tag = %tag, error = %err, "cannot mount share tag");
            break;
        }
    }
}
