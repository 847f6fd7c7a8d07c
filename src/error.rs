use std::fmt;

#[derive(Debug)]
pub enum LlamaError {
    /// A frame or payload did not decode into the expected shape.
    MalformedPayload(String),
    /// A tool-call fragment arrived with no call it could belong to.
    MissingCorrelation {
        fragment: String,
    },
    ApiError {
        status: u16,
        message: String,
    },
    NetworkError(reqwest::Error),
    Timeout,
    /// The caller cancelled the stream.
    StreamAborted,
    ConfigError(String),
    IoError(std::io::Error),
}

impl LlamaError {
    /// Errors raised by the transport rather than by decoding or aggregation.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            LlamaError::ApiError { .. } | LlamaError::NetworkError(_) | LlamaError::Timeout
        )
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, LlamaError::StreamAborted)
    }
}

impl fmt::Display for LlamaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlamaError::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
            LlamaError::MissingCorrelation { fragment } => write!(
                f,
                "Tool call fragment has no resolvable target: {}",
                fragment
            ),
            LlamaError::ApiError { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            LlamaError::NetworkError(e) => write!(f, "Network error: {}", e),
            LlamaError::Timeout => write!(f, "Stream timeout"),
            LlamaError::StreamAborted => write!(f, "Stream aborted"),
            LlamaError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            LlamaError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for LlamaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LlamaError::NetworkError(e) => Some(e),
            LlamaError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlamaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlamaError::Timeout
        } else {
            LlamaError::NetworkError(err)
        }
    }
}

impl From<std::io::Error> for LlamaError {
    fn from(err: std::io::Error) -> Self {
        LlamaError::IoError(err)
    }
}

impl From<serde_json::Error> for LlamaError {
    fn from(err: serde_json::Error) -> Self {
        LlamaError::MalformedPayload(err.to_string())
    }
}

impl From<anyhow::Error> for LlamaError {
    fn from(err: anyhow::Error) -> Self {
        LlamaError::ConfigError(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, LlamaError>;
