use thiserror::Error;

/// All errors produced by auris-core.
#[derive(Debug, Error)]
pub enum AurisError {
    #[error("unknown transcription engine: {0}")]
    UnknownEngine(String),

    #[error("missing credentials for {engine} engine")]
    MissingCredentials { engine: &'static str },

    #[error("recognizer model not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("unsupported capture sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("built without offline recognizer support")]
    OfflineSupportMissing,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AurisError {
    /// Construction-time failures the adapter factory recovers from by
    /// substituting the deterministic stub. Everything else is fatal to the
    /// connection (`UnknownEngine`) or a runtime failure that already has a
    /// drain path.
    pub fn is_stub_recoverable(&self) -> bool {
        matches!(
            self,
            AurisError::MissingCredentials { .. }
                | AurisError::ModelNotFound { .. }
                | AurisError::UnsupportedSampleRate(_)
                | AurisError::OfflineSupportMissing
                | AurisError::BackendUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AurisError>;
