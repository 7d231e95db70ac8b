//! Process execution helpers for the boot sequence.

use crate::error::InitError;
use std::process::Command;

/// Run a setup command, folding its output into the log.
pub fn run_logged(cmd: &[String]) -> Result<(), InitError> {
    let argv = non_empty(cmd)?;
    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .map_err(|err| fail(cmd, err.to_string()))?;

    tracing::debug!(
        command = ?cmd,
        stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
        stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
        "command finished"
    );

    if !output.status.success() {
        return Err(fail(
            cmd,
            format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end()
            ),
        ));
    }
    Ok(())
}

/// Run a workload command with the guest console attached.
pub fn run_interactive(cmd: &[String]) -> Result<(), InitError> {
    let argv = non_empty(cmd)?;
    // TODO: forward signals to the child
    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .status()
        .map_err(|err| fail(cmd, err.to_string()))?;

    if !status.success() {
        return Err(fail(cmd, format!("exited with {status}")));
    }
    Ok(())
}

/// Halt the machine. Nothing in this process survives a successful call.
pub fn power_off(cmd: &[String]) -> Result<(), InitError> {
    tracing::info!(command = ?cmd, "powering off");
    run_interactive(cmd)
}

fn non_empty(cmd: &[String]) -> Result<&[String], InitError> {
    if cmd.is_empty() {
        return Err(fail(cmd, "empty command".to_string()));
    }
    Ok(cmd)
}

fn fail(cmd: &[String], reason: String) -> InitError {
    InitError::Command {
        command: cmd.to_vec(),
        reason,
    }
}
