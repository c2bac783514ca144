use crate::paf::ParseErr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PostAlignError>;

#[derive(Error, Debug)]
pub enum PostAlignError {
    #[error("Sequence '{header}' contains invalid symbol {symbol:?} at position {position}")]
    InvalidSymbol {
        header: String,
        symbol: char,
        position: usize,
    },

    #[error("Malformed alignment: {reason}")]
    MalformedAlignment { reason: String },

    #[error("Unresolvable frameshift at reference offset {ref_offset}: {reason}")]
    UnresolvableFrameshift { ref_offset: usize, reason: String },

    #[error("Cannot write {format}: {reason}")]
    SerializationError {
        format: &'static str,
        reason: String,
    },

    #[error("{operation} does not support {seq_type} sequences")]
    UnsupportedSequenceType {
        operation: &'static str,
        seq_type: &'static str,
    },

    #[error("Invalid configuration for '{processor}': {reason}")]
    InvalidConfig { processor: String, reason: String },

    #[error("Step {position} ({processor}) failed: {source}")]
    Pipeline {
        position: usize,
        processor: String,
        source: Box<PostAlignError>,
    },

    #[error("External aligner failed: {0}")]
    Aligner(String),

    #[error("PAF parse error: {0}")]
    Parse(#[from] ParseErr),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PostAlignError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        PostAlignError::MalformedAlignment {
            reason: reason.into(),
        }
    }

    pub fn config(processor: impl Into<String>, reason: impl Into<String>) -> Self {
        PostAlignError::InvalidConfig {
            processor: processor.into(),
            reason: reason.into(),
        }
    }

    /// Innermost error, looking through pipeline step wrappers.
    pub fn root_cause(&self) -> &PostAlignError {
        match self {
            PostAlignError::Pipeline { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<PostAlignError> for std::io::Error {
    fn from(err: PostAlignError) -> Self {
        match err {
            PostAlignError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_message_names_step() {
        let err = PostAlignError::Pipeline {
            position: 2,
            processor: "trim-by-ref".to_string(),
            source: Box::new(PostAlignError::malformed("pair 3 has both sides gapped")),
        };
        let message = err.to_string();
        assert!(message.contains("Step 2 (trim-by-ref)"));
        assert!(message.contains("both sides gapped"));
        assert!(matches!(
            err.root_cause(),
            PostAlignError::MalformedAlignment { .. }
        ));
    }

    #[test]
    fn test_io_error_roundtrip() {
        let err = PostAlignError::config("save-fasta", "unknown option 'foo'");
        let io_err: std::io::Error = err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::Other);
        assert!(io_err.to_string().contains("unknown option 'foo'"));
    }
}
