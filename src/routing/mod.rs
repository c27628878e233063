pub mod processor;
pub mod registry;
pub mod router;

pub use processor::{decode_event, EventProcessor};
pub use registry::{EventRegistry, RegistryError};
pub use router::EventRouter;
