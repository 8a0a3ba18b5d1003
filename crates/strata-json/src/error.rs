use thiserror::Error;

/// A JSON document that could not be read.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("json parse error at {line}:{col}: {message}")]
pub struct ParseError {
    pub message: String,
    /// 1-based source line.
    pub line: usize,
    /// 1-based source column.
    pub col: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, line: usize, col: usize) -> Self {
        Self { message: message.into(), line, col }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        let (line, col) = (err.line(), err.column());
        let full = err.to_string();
        let suffix = format!(" at line {line} column {col}");
        let message = full.strip_suffix(&suffix).unwrap_or(&full).to_owned();
        Self::new(message, line.max(1), col.max(1))
    }
}

/// Misuse of [`JsonWriter`](crate::JsonWriter).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("value written inside an object without a preceding key")]
    ValueWithoutKey,

    #[error("key `{0}` written outside of an object")]
    KeyOutsideObject(String),

    #[error("key `{pending}` has no value before key `{next}`")]
    DanglingKey { pending: String, next: String },

    #[error("value written outside of any object or array")]
    NoContainer,

    #[error("a document may only have one top-level value")]
    MultipleRoots,

    #[error("`{found}` does not close the innermost container")]
    UnbalancedEnd { found: &'static str },

    #[error("{0} container(s) left open")]
    Unfinished(usize),

    #[error("nothing was written")]
    Empty,
}
