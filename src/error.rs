use thiserror::Error;

/// Failures raised by a model client or one of its conversations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model '{0}' is not configured")]
    UnknownModel(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the session manager and the command layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid session configuration. Fatal at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// The model could not be resolved or opened.
    #[error("error loading model '{model}': {source}")]
    EngineInit {
        model: String,
        #[source]
        source: EngineError,
    },

    #[error("unknown mode: {name}")]
    UnknownMode { name: String, available: Vec<String> },

    #[error("modes are not configured for this session")]
    ModesDisabled,

    #[error("empty input ignored")]
    EmptyInputIgnored,

    #[error("error executing command {command}: {reason}")]
    UserCommand { command: String, reason: String },

    /// Priming the freshly bound engine failed; the session kept its previous mode.
    #[error("replaying conversation into '{mode}' mode failed: {source}")]
    Replay {
        mode: String,
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}
