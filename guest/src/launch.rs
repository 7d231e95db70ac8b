//! Launch spec finalization.

use crate::error::InitError;
use crate::protocol::RuntimeFlags;
use mayfly_mount::bind_mount;
use oci_spec::image::ImageConfiguration;
use oci_spec::runtime::{MountBuilder, Spec};
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Fold the runtime flags into the launch spec.
///
/// Mounts and env entries accumulate on top of whatever the spec already
/// carries. The process argument vector is `entrypoint + args`, where each
/// of the two parts independently falls back to the image config
/// (entrypoint to entrypoint, args to cmd) when the flags do not provide
/// it.
pub fn patch_spec(
    spec: &mut Spec,
    flags: &RuntimeFlags,
    image_config: &ImageConfiguration,
) -> Result<(), InitError> {
    if !flags.mounts.is_empty() {
        let mut mounts = spec.mounts().clone().unwrap_or_default();
        for mount in &flags.mounts {
            mounts.push(
                MountBuilder::default()
                    .destination(&mount.destination)
                    .typ("bind")
                    .source(&mount.source)
                    .options(vec!["bind".to_string()])
                    .build()?,
            );
        }
        spec.set_mounts(Some(mounts));
    }

    let mut process = spec.process().clone().unwrap_or_default();

    if !flags.env.is_empty() {
        let mut env = process.env().clone().unwrap_or_default();
        env.extend(flags.env.iter().cloned());
        process.set_env(Some(env));
    }

    let image = image_config.config().as_ref();
    let entrypoint = if flags.entrypoint.is_empty() {
        image
            .and_then(|c| c.entrypoint().clone())
            .unwrap_or_default()
    } else {
        flags.entrypoint.clone()
    };
    let mut args = if flags.args.is_empty() {
        image.and_then(|c| c.cmd().clone()).unwrap_or_default()
    } else {
        flags.args.clone()
    };

    let mut full_args = entrypoint;
    full_args.append(&mut args);
    process.set_args(Some(full_args));
    spec.set_process(Some(process));

    Ok(())
}

/// Write the finalized spec into the bundle. The document carries the
/// workload's env verbatim, so it is owner-only from the moment it exists.
pub fn write_spec(spec: &Spec, bundle_dir: &Path) -> Result<(), InitError> {
    let path = bundle_dir.join("config.json");
    let data = serde_json::to_string(spec)?;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)?;
    file.write_all(data.as_bytes())?;

    tracing::info!(
        path = %path.display(),
        args = ?spec.process().as_ref().and_then(|p| p.args().as_ref()),
        "launch spec written"
    );
    Ok(())
}

/// Give the container the guest's name resolution by bind-mounting
/// `/etc/hosts` and `/etc/resolv.conf` over the rootfs copies. The target
/// files must exist in the image.
pub fn bind_network_files(spec: &Spec) -> Result<(), InitError> {
    let Some(root) = spec.root().as_ref().map(|r| r.path()) else {
        tracing::warn!("launch spec has no root path; skipping hosts/resolv binds");
        return Ok(());
    };

    for file in ["etc/hosts", "etc/resolv.conf"] {
        bind_mount(&Path::new("/").join(file), &root.join(file))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oci_spec::image::{
        Arch, ConfigBuilder, ImageConfigurationBuilder, Os, RootFsBuilder,
    };
    use oci_spec::runtime::{ProcessBuilder, RootBuilder, SpecBuilder};
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn image_config(entrypoint: &[&str], cmd: &[&str]) -> ImageConfiguration {
        let config = ConfigBuilder::default()
            .entrypoint(entrypoint.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .cmd(cmd.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .build()
            .unwrap();
        ImageConfigurationBuilder::default()
            .architecture(Arch::Amd64)
            .os(Os::Linux)
            .rootfs(
                RootFsBuilder::default()
                    .typ("layers".to_string())
                    .diff_ids(Vec::<String>::new())
                    .build()
                    .unwrap(),
            )
            .config(config)
            .build()
            .unwrap()
    }

    fn base_spec() -> Spec {
        SpecBuilder::default()
            .version("1.0.2")
            .root(RootBuilder::default().path("rootfs").build().unwrap())
            .process(
                ProcessBuilder::default()
                    .cwd("/")
                    .env(vec!["BASE=1".to_string()])
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    fn args_of(spec: &Spec) -> Vec<String> {
        spec.process()
            .as_ref()
            .and_then(|p| p.args().clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_patch_spec_args_win_over_image() {
        let mut spec = base_spec();
        let flags = RuntimeFlags {
            entrypoint: vec!["/bin/custom".to_string()],
            args: vec!["--opt".to_string()],
            ..Default::default()
        };

        patch_spec(&mut spec, &flags, &image_config(&["/bin/img"], &["img-arg"])).unwrap();

        assert_eq!(args_of(&spec), vec!["/bin/custom", "--opt"]);
    }

    #[test]
    fn test_patch_spec_field_granular_fallback() {
        // Entrypoint falls back to the image while the provided args stay.
        let mut spec = base_spec();
        let flags = RuntimeFlags {
            args: vec!["given".to_string()],
            ..Default::default()
        };

        patch_spec(&mut spec, &flags, &image_config(&["/bin/img"], &["img-arg"])).unwrap();
        assert_eq!(args_of(&spec), vec!["/bin/img", "given"]);

        // And the other way around.
        let mut spec = base_spec();
        let flags = RuntimeFlags {
            entrypoint: vec!["/bin/given".to_string()],
            ..Default::default()
        };

        patch_spec(&mut spec, &flags, &image_config(&["/bin/img"], &["img-arg"])).unwrap();
        assert_eq!(args_of(&spec), vec!["/bin/given", "img-arg"]);
    }

    #[test]
    fn test_patch_spec_image_defaults() {
        let mut spec = base_spec();

        patch_spec(
            &mut spec,
            &RuntimeFlags::default(),
            &image_config(&["/bin/img"], &["img-arg"]),
        )
        .unwrap();

        assert_eq!(args_of(&spec), vec!["/bin/img", "img-arg"]);
    }

    #[test]
    fn test_patch_spec_appends_mounts_and_env() {
        let mut spec = base_spec();
        let flags = RuntimeFlags {
            mounts: vec![crate::protocol::ResolvedMount {
                source: PathBuf::from("/mnt/share0/data"),
                destination: PathBuf::from("/data"),
            }],
            env: vec!["EXTRA=1".to_string()],
            ..Default::default()
        };

        patch_spec(&mut spec, &flags, &image_config(&[], &[])).unwrap();

        let mounts = spec.mounts().clone().unwrap();
        let added = mounts.last().unwrap();
        assert_eq!(added.destination(), &PathBuf::from("/data"));
        assert_eq!(added.typ().as_deref(), Some("bind"));

        let env = spec
            .process()
            .as_ref()
            .and_then(|p| p.env().clone())
            .unwrap();
        assert_eq!(env, vec!["BASE=1", "EXTRA=1"]);
    }

    #[test]
    fn test_write_spec_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let spec = base_spec();

        write_spec(&spec, dir.path()).unwrap();

        let path = dir.path().join("config.json");
        let metadata = fs::metadata(&path).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);

        let reloaded = Spec::load(&path).unwrap();
        assert_eq!(reloaded.version(), spec.version());

        // Rewriting over longer leftover content must not leave a tail.
        fs::write(&path, vec![b'x'; 16 * 1024]).unwrap();
        write_spec(&spec, dir.path()).unwrap();
        let reloaded = Spec::load(&path).unwrap();
        assert_eq!(reloaded.version(), spec.version());
    }
}
