//! Guest init: the first process inside the sandbox VM.
//!
//! Reads the boot configuration baked into the image, carries out the
//! mount/handshake/network/bundle sequence, hands the finalized launch
//! spec to the configured workload commands, and powers the machine off.

use mayfly_guest::boot;
use mayfly_guest::config::BOOT_CONFIG_PATH;
use mayfly_guest::context::BootContext;
use mayfly_guest::logging;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let log = logging::init();
    let mut ctx = BootContext::from_env(log);

    match boot::boot(Path::new(BOOT_CONFIG_PATH), &mut ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // The subscriber may be silenced by this point; the console
            // still gets the terminal fault.
            eprintln!("mayfly-init: {err}");
            ExitCode::FAILURE
        }
    }
}
