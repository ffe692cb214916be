use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish request has no destinations")]
    EmptyTargets,
    #[error("destination {identifier} selected more than once")]
    DuplicateTarget { identifier: String },
    #[error("publish session already ended")]
    SessionClosed,
}

impl PublishError {
    pub fn duplicate<S: Into<String>>(identifier: S) -> Self {
        Self::DuplicateTarget {
            identifier: identifier.into(),
        }
    }
}
