pub mod events;
pub mod messages;
pub mod processing_error;

pub use processing_error::{FailureKind, ProcessingError};
