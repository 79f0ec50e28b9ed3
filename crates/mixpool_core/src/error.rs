use thiserror::Error;
use uuid::Uuid;

use crate::phase::Phase;

#[derive(Debug, Error)]
pub enum MixpoolError {
    #[error("request not allowed in {actual} (needs {expected})")]
    WrongPhase { expected: Phase, actual: Phase },

    #[error("no registration with id {0}")]
    UnknownId(Uuid),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),
}

pub type Result<T> = std::result::Result<T, MixpoolError>;
