use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookOutError {
    #[error("invalid feature matrix: {0}")]
    InvalidFeatureMatrix(String),

    #[error("entity alignment error: {0}")]
    EntityAlignment(String),

    #[error("invalid budget: {0} (must be at least 1)")]
    InvalidBudget(usize),

    #[error("graph has no candidate plots")]
    EmptyCandidateSet,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("ingest error: {0}")]
    Ingest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LookOutError {
    /// Whether the error invalidates the whole run rather than a single trial
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LookOutError::EntityAlignment(_) | LookOutError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LookOutError>;
