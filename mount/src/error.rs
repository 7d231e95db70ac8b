use thiserror::Error;

#[derive(Error, Debug)]
pub enum MountError {
    #[error("mount failed: {0}")]
    MountFailed(String),

    #[error("unmount failed: {0}")]
    UnmountFailed(String),

    #[error("mount command failed: {0}")]
    CommandFailed(String),

    #[error("mount task panicked")]
    TaskPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
