//! Domain error types.

/// A parse error with position information for expression parsing.
///
/// `position` is a byte offset into the expression text; expressions are
/// ASCII, so it doubles as a column.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }

    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for stratlab.
#[derive(Debug, thiserror::Error)]
pub enum StratlabError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("validation error: {reason}")]
    Validation { reason: String },

    #[error("condition not found: {name}")]
    NameNotFound { name: String },

    #[error("schema error: {reason}")]
    Schema { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StratlabError {
    pub(crate) fn schema(reason: impl Into<String>) -> Self {
        StratlabError::Schema {
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        StratlabError::Validation {
            reason: reason.into(),
        }
    }
}

impl From<&StratlabError> for std::process::ExitCode {
    fn from(err: &StratlabError) -> Self {
        let code: u8 = match err {
            StratlabError::Io(_) => 1,
            StratlabError::ConfigParse { .. }
            | StratlabError::ConfigMissing { .. }
            | StratlabError::ConfigInvalid { .. } => 2,
            StratlabError::Parse(_)
            | StratlabError::Validation { .. }
            | StratlabError::NameNotFound { .. } => 4,
            StratlabError::Schema { .. } | StratlabError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
