use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitError {
    #[error("cannot read boot config: {0}")]
    ConfigRead(#[source] std::io::Error),

    #[error("cannot parse boot config: {0}")]
    ConfigParse(#[source] serde_json::Error),

    #[error("cannot configure terminal: {0}")]
    Tty(#[source] nix::errno::Errno),

    #[error(transparent)]
    Mount(#[from] mayfly_mount::MountError),

    #[error("handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error("network setup failed: {0}")]
    Network(String),

    #[error("networking must be enabled to reach a remote bundle")]
    NetworkRequired,

    #[error("no bundle locator provided")]
    MissingBundleLocator,

    #[error("invalid bundle format: {0}")]
    InvalidBundleFormat(String),

    #[error("command {command:?} failed: {reason}")]
    Command { command: Vec<String>, reason: String },

    #[error("oci spec error: {0}")]
    OciSpec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<oci_spec::OciSpecError> for InitError {
    fn from(e: oci_spec::OciSpecError) -> Self {
        InitError::OciSpec(e.to_string())
    }
}
