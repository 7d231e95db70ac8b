//! Batch execution of mount directives.
//!
//! Synchronous directives run in list order. Concurrent ones run on their
//! own threads and are joined before the batch returns, so every directive
//! has finished (or failed) by the time the caller proceeds. An optional
//! directive's failure is logged and skipped; a non-optional synchronous
//! failure aborts the batch, and a non-optional concurrent failure is
//! reported once all threads have been joined. The first failure wins.

use crate::error::MountError;
use crate::ops;
use crate::{DirSpec, FileSpec, MountDirective};
use nix::mount::MsFlags;
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use std::process::Command;

/// Execute a batch of mount directives.
pub fn mount_all(directives: &[MountDirective]) -> Result<(), MountError> {
    mount_all_with(directives, apply_directive)
}

fn mount_all_with<F>(directives: &[MountDirective], op: F) -> Result<(), MountError>
where
    F: Fn(&MountDirective) -> Result<(), MountError> + Sync,
{
    if directives.is_empty() {
        return Ok(());
    }

    let op = &op;
    std::thread::scope(|scope| {
        let mut pending = Vec::new();

        for directive in directives {
            if directive.concurrent {
                pending.push(scope.spawn(move || run_policed(directive, op)));
            } else {
                // An early return still joins the spawned threads: the scope
                // does not exit while any of them is running.
                run_policed(directive, op)?;
            }
        }

        let mut first_err = None;
        for handle in pending {
            let result = handle.join().unwrap_or(Err(MountError::TaskPanicked));
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    })
}

fn run_policed<F>(directive: &MountDirective, op: &F) -> Result<(), MountError>
where
    F: Fn(&MountDirective) -> Result<(), MountError>,
{
    match op(directive) {
        Ok(()) => Ok(()),
        Err(err) if directive.optional => {
            tracing::warn!(
                destination = %directive.destination,
                error = %err,
                "skipping optional mount"
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!(destination = %directive.destination, error = %err, "mount failed");
            Err(err)
        }
    }
}

fn apply_directive(directive: &MountDirective) -> Result<(), MountError> {
    tracing::debug!(
        source = %directive.source,
        destination = %directive.destination,
        fstype = %directive.fstype,
        concurrent = directive.concurrent,
        "applying mount directive"
    );

    create_entries(&directive.dirs, &directive.files)?;

    ops::mount_fs(
        &directive.source,
        Path::new(&directive.destination),
        &directive.fstype,
        MsFlags::from_bits_truncate(directive.flags as nix::libc::c_ulong),
        &directive.data,
    )?;

    if !directive.cmd.is_empty() {
        run_directive_cmd(&directive.cmd)?;
    }

    create_entries(&directive.post_dirs, &directive.post_files)?;
    Ok(())
}

fn create_entries(dirs: &[DirSpec], files: &[FileSpec]) -> Result<(), MountError> {
    for dir in dirs {
        DirBuilder::new()
            .recursive(true)
            .mode(dir.mode)
            .create(&dir.path)?;
    }
    for file in files {
        fs::write(&file.path, &file.contents)?;
    }
    Ok(())
}

fn run_directive_cmd(cmd: &[String]) -> Result<(), MountError> {
    let output = Command::new(&cmd[0]).args(&cmd[1..]).output()?;

    tracing::debug!(
        command = ?cmd,
        stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
        "directive command finished"
    );

    if !output.status.success() {
        return Err(MountError::CommandFailed(format!(
            "{:?} exited with {}: {}",
            cmd,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim_end()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn directive(destination: &str, concurrent: bool, optional: bool) -> MountDirective {
        MountDirective {
            destination: destination.to_string(),
            concurrent,
            optional,
            ..Default::default()
        }
    }

    #[test]
    fn test_sync_directives_run_in_order() {
        let order = Mutex::new(Vec::new());
        let directives = vec![
            directive("/a", false, false),
            directive("/b", false, false),
            directive("/c", false, false),
        ];

        mount_all_with(&directives, |d| {
            order.lock().unwrap().push(d.destination.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_optional_failure_is_skipped() {
        let applied = Mutex::new(Vec::new());
        let directives = vec![directive("/a", false, true), directive("/b", false, false)];

        let result = mount_all_with(&directives, |d| {
            if d.destination == "/a" {
                Err(MountError::MountFailed("no such device".to_string()))
            } else {
                applied.lock().unwrap().push(d.destination.clone());
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(*applied.lock().unwrap(), vec!["/b"]);
    }

    #[test]
    fn test_sync_failure_aborts_batch() {
        let applied = Mutex::new(Vec::new());
        let directives = vec![directive("/a", false, false), directive("/b", false, false)];

        let result = mount_all_with(&directives, |d| {
            if d.destination == "/a" {
                Err(MountError::MountFailed("no such device".to_string()))
            } else {
                applied.lock().unwrap().push(d.destination.clone());
                Ok(())
            }
        });

        assert!(result.is_err());
        assert!(applied.lock().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_failure_reported_after_barrier() {
        let slow_finished = AtomicBool::new(false);
        let directives = vec![directive("/fail", true, false), directive("/slow", true, false)];

        let result = mount_all_with(&directives, |d| {
            if d.destination == "/fail" {
                Err(MountError::MountFailed("no such device".to_string()))
            } else {
                std::thread::sleep(Duration::from_millis(100));
                slow_finished.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        // The failure surfaces only once every concurrent directive has run
        // to completion.
        assert!(result.is_err());
        assert!(slow_finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_optional_failure_is_skipped() {
        let directives = vec![directive("/a", true, true)];

        let result = mount_all_with(&directives, |_| {
            Err(MountError::MountFailed("no such device".to_string()))
        });

        assert!(result.is_ok());
    }

    #[test]
    fn test_sync_abort_joins_inflight_concurrent() {
        let concurrent_finished = AtomicBool::new(false);
        let directives = vec![directive("/slow", true, false), directive("/a", false, false)];

        let result = mount_all_with(&directives, |d| {
            if d.destination == "/slow" {
                std::thread::sleep(Duration::from_millis(50));
                concurrent_finished.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(MountError::MountFailed("no such device".to_string()))
            }
        });

        assert!(result.is_err());
        assert!(concurrent_finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_create_entries() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("etc/net");
        let file = sub.join("hosts");

        create_entries(
            &[DirSpec {
                path: sub.to_string_lossy().into_owned(),
                mode: 0o700,
            }],
            &[FileSpec {
                path: file.to_string_lossy().into_owned(),
                contents: "127.0.0.1 localhost\n".to_string(),
            }],
        )
        .unwrap();

        assert!(sub.is_dir());
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "127.0.0.1 localhost\n"
        );
    }

    #[test]
    fn test_directive_command_failure() {
        run_directive_cmd(&["true".to_string()]).unwrap();

        let err = run_directive_cmd(&[
            "sh".to_string(),
            "-c".to_string(),
            "echo oops >&2; exit 3".to_string(),
        ])
        .unwrap_err();

        match err {
            MountError::CommandFailed(msg) => assert!(msg.contains("oops")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
