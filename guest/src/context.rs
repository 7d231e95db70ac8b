//! Startup context: control toggles and the verbosity handle.

use crate::logging::LogHandle;

/// Skips every runtime-flags source; the guest boots with image defaults.
pub const NO_RUNTIME_CONFIG_ENV: &str = "VMINIT_NO_RUNTIME_CONFIG";

/// Selects the mount-probe handshake instead of the console stream.
pub const POLL_HANDSHAKE_ENV: &str = "VMINIT_POLL_HANDSHAKE";

/// Control namespace, withheld from the environment forwarded to the
/// container.
pub const RESERVED_ENV_PREFIX: &str = "VMINIT_";

/// Control toggles, read once at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Toggles {
    pub runtime_config_disabled: bool,
    pub poll_handshake: bool,
}

impl Toggles {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let on = |key| lookup(key).as_deref() == Some("1");
        Self {
            runtime_config_disabled: on(NO_RUNTIME_CONFIG_ENV),
            poll_handshake: on(POLL_HANDSHAKE_ENV),
        }
    }
}

/// State threaded through the boot sequence.
pub struct BootContext {
    pub toggles: Toggles,
    log: LogHandle,
}

impl BootContext {
    pub fn new(toggles: Toggles, log: LogHandle) -> Self {
        Self { toggles, log }
    }

    pub fn from_env(log: LogHandle) -> Self {
        Self::new(Toggles::from_env(), log)
    }

    /// The one place boot phases change log verbosity.
    pub fn set_verbose(&self, verbose: bool) {
        self.log.set_verbose(verbose);
    }
}
