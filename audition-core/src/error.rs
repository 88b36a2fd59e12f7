//! Error types for the audition map

use crate::types::EntityId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuditionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Listener {entity_id} has {ear_count} ears, at most {max} are supported")]
    TooManyEars {
        entity_id: EntityId,
        ear_count: usize,
        max: usize,
    },

    #[error("The invalid entity id cannot be registered as a listener")]
    InvalidEntityId,

    #[error("Listener {0} is not registered")]
    UnknownListener(EntityId),

    #[error("Ray cast error: {0}")]
    RayCast(String),
}

pub type Result<T> = std::result::Result<T, AuditionError>;
