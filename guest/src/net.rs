//! Network interface bootstrap.

use crate::error::InitError;
use std::process::Command;

pub const INTERFACE: &str = "eth0";
const DHCP_CLIENT: &str = "udhcpc";

/// Bring the interface up and acquire a lease. Changing the MAC needs the
/// link down, so the first two steps only run when an override arrives
/// with the runtime flags. Every step is fatal on failure.
pub fn bring_up(mac: Option<&str>) -> Result<(), InitError> {
    if let Some(mac) = mac {
        run(&["ip", "link", "set", "dev", INTERFACE, "down"])?;
        run(&["ip", "link", "set", "dev", INTERFACE, "address", mac])?;
    }
    run(&["ip", "link", "set", "dev", INTERFACE, "up"])?;
    run(&[DHCP_CLIENT, "-i", INTERFACE])?;

    if tracing::enabled!(tracing::Level::DEBUG) {
        if let Ok(output) = Command::new("ip").arg("a").output() {
            tracing::debug!(
                addresses = %String::from_utf8_lossy(&output.stdout),
                "interface state after dhcp"
            );
        }
    }

    Ok(())
}

fn run(cmd: &[&str]) -> Result<(), InitError> {
    tracing::debug!(command = ?cmd, "network step");

    let output = Command::new(cmd[0])
        .args(&cmd[1..])
        .output()
        .map_err(|err| InitError::Network(format!("{cmd:?}: {err}")))?;

    if !output.status.success() {
        return Err(InitError::Network(format!(
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

    #[test]
    fn test_run_reports_failure() {
        run(&["true"]).unwrap();

        let err = run(&["sh", "-c", "echo down >&2; exit 1"]).unwrap_err();
        match err {
            InitError::Network(msg) => assert!(msg.contains("down")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
