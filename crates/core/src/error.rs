use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetronomeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("Work unit not found: {0}")]
    WorkUnitNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("{0}")]
    Other(String),
}

impl MetronomeError {
    /// Whether this error means the target object vanished (benign mid-pass).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MetronomeError::ScheduleNotFound(_) | MetronomeError::WorkUnitNotFound(_)
        )
    }

    /// Whether this error is a duplicate-create (idempotent retry succeeds).
    pub fn is_already_exists(&self) -> bool {
        matches!(self, MetronomeError::AlreadyExists(_))
    }
}
