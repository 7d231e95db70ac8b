//! Guest-side boot orchestration for single-use sandbox VMs.
//!
//! The `mayfly-init` binary runs as the guest's first process. It applies
//! the boot configuration baked into the image, synchronizes with the
//! host, folds the host's runtime flags into the container launch spec,
//! runs the workload, and powers the VM off. The VM never outlives its
//! one workload.

pub mod boot;
pub mod bundle;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod escape;
pub mod handshake;
pub mod launch;
pub mod logging;
pub mod net;
pub mod protocol;

pub use config::BootConfig;
pub use context::BootContext;
pub use error::InitError;
