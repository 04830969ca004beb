use thiserror::Error;

/// Failures reported by the media facade.
///
/// None of these are fatal to the host: each one degrades to a reported
/// session state plus a notification, or to a no-op.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// No URL or video identifier was configured.
    #[error("no media source configured")]
    SourceMissing,
    /// An asynchronous play request was refused by the backend.
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),
    /// The embedded player API never became available.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// A command reached a disposed or failed session.
    #[error("'{0}' ignored: session is not accepting commands")]
    InvalidCommand(&'static str),
    #[error("unknown media kind '{0}' (expected audio, video or youtube)")]
    UnknownKind(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MediaError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        MediaError::PlaybackRejected(reason.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        MediaError::BackendUnavailable(reason.into())
    }
}

pub type Result<T, E = MediaError> = std::result::Result<T, E>;
