use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to retrieve {uri}: {reason}")]
    Retrieval { uri: String, reason: String },

    #[error("parse error at line {line}: {message}")]
    ParseAtLine { line: usize, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no finite p-values available for term `{0}`")]
    EmptyPValueSet(String),
}

impl PipelineError {
    pub fn retrieval(uri: &str, reason: impl ToString) -> Self {
        Self::Retrieval {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn parse_at(line: usize, message: impl Into<String>) -> Self {
        Self::ParseAtLine {
            line,
            message: message.into(),
        }
    }

    pub fn in_data_row(self, row: usize) -> Self {
        match self {
            Self::Parse(message) => Self::Parse(format!("data row {row}: {message}")),
            other => other,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
