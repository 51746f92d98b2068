/// Why an edit was refused.
///
/// Every variant is returned before the model is touched: on `Err` the
/// model and the [`crate::editing::ChangeToken`] are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("run at {start:#08X} (length {length}) overlaps the run at {existing:#08X}")]
    FormatConflict {
        start: usize,
        length: usize,
        existing: usize,
    },

    #[error("invalid anchor name `{name}`: {reason}")]
    InvalidAnchorName { name: String, reason: String },

    #[error("table length dependency loops back: {}", chain.join(" -> "))]
    CircularLengthDependency { chain: Vec<String> },

    #[error("cannot grow to {requested:#X} bytes, the store is capped at {limit:#X}")]
    RelocationExhausted { requested: usize, limit: usize },

    #[error("no terminated string at {address:#08X}")]
    DecodeFailure { address: usize },

    #[error("run at {start:#08X} with format `{format}` cannot change length")]
    UnsupportedResize { start: usize, format: String },

    #[error(transparent)]
    Format(#[from] romweave_format::FormatError),
}

impl ModelError {
    pub(crate) fn invalid_name(name: &str, reason: impl Into<String>) -> Self {
        ModelError::InvalidAnchorName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
