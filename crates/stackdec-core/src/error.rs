//! Error types for the second-pass search core.
//!
//! ```text
//! SearchError
//! ├── BufferOverflow       -- candidate buffer too small, retry with a larger one
//! ├── EmptyHypothesis      -- hypothesis handed to the finder holds no word
//! ├── MissingGrammarState  -- DFA expansion of a hypothesis without a state
//! ├── ModelInconsistency   -- no usable acoustic unit / broken tables (boot-time fatal)
//! ├── InvalidInput         -- malformed tables supplied by the caller
//! ├── Config               -- invalid configuration values
//! ├── Io                   -- config file I/O
//! └── Json                 -- config file parsing
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// More candidates than the caller-supplied maximum.
    #[error("candidate buffer overflow (capacity {capacity})")]
    BufferOverflow { capacity: usize },

    #[error("hypothesis contains no word")]
    EmptyHypothesis,

    #[error("hypothesis carries no grammar state")]
    MissingGrammarState,

    /// A required acoustic unit or table entry does not exist.
    #[error("model inconsistency: {0}")]
    ModelInconsistency(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    /// Whether the driver can recover by retrying the same call
    /// (with a larger buffer). Everything else ends the utterance's
    /// second pass, and model inconsistencies abort at boot.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SearchError::BufferOverflow { .. })
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
