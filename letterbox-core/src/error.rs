use thiserror::Error;

/// All errors produced by letterbox-core.
#[derive(Debug, Error)]
pub enum LetterboxError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("capture engine is already running")]
    AlreadyRunning,

    #[error("capture engine is not running")]
    NotRunning,

    /// The worker answered with an error reply.
    #[error("task `{method}` failed: {detail}")]
    Remote {
        method: String,
        detail: serde_json::Value,
    },

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// The worker exited while the task was outstanding.
    #[error("worker stopped with exit code {code}")]
    WorkerStopped { code: i32 },

    #[error("dispatcher is closed")]
    DispatcherClosed,

    #[error("inference error: {0}")]
    Inference(String),

    #[error("WAV decode error: {0}")]
    Wav(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LetterboxError>;
