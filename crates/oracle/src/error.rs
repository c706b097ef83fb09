use thiserror::Error;

/// Everything that can go wrong between an audio clip and a usable answer.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Transient failure that outlived the retry budget (timeouts,
    /// connection errors, 429, 5xx).
    #[error("model unavailable after {attempts} attempt(s): {message}")]
    Unavailable { attempts: u32, message: String },

    /// The API refused the request and retrying will not help.
    #[error("model rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The reply arrived but carried nothing we can use.
    #[error("malformed model reply: {0}")]
    Malformed(String),

    /// A recognised tuning field carried a value of the wrong type.
    #[error("field {field} expected {expected}, found {found:?}")]
    Validation {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("no API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl InferenceError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = InferenceError> = std::result::Result<T, E>;
