use thiserror::Error;

pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("dispatch error: {0}")]
    Dispatch(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
