//! Log setup.
//!
//! Verbosity is decided by the boot config, which is only readable after
//! logging must already work, so the level filter is installed behind a
//! reload handle and adjusted as the boot sequence learns more.

use tracing_subscriber::Registry;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

/// Handle for switching verbosity after startup.
#[derive(Clone)]
pub struct LogHandle {
    reload: Option<reload::Handle<LevelFilter, Registry>>,
}

impl LogHandle {
    /// A handle connected to nothing, for library consumers that install
    /// their own subscriber (or none at all).
    pub fn disabled() -> Self {
        Self { reload: None }
    }

    pub fn set_verbose(&self, verbose: bool) {
        let level = if verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::OFF
        };
        if let Some(handle) = &self.reload {
            let _ = handle.reload(level);
        }
    }
}

/// Install the global subscriber. Startup runs at WARN until the boot
/// config picks the real verbosity.
pub fn init() -> LogHandle {
    let (filter, handle) = reload::Layer::new(LevelFilter::WARN);
    match tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        Ok(()) => LogHandle {
            reload: Some(handle),
        },
        Err(_) => LogHandle::disabled(),
    }
}
