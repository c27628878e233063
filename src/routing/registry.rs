use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::info;

use super::processor::EventProcessor;

/// Maps each event type identifier to exactly one processor.
///
/// Built once from the full processor list at startup, then handed to the router and only
/// read afterwards, so lookups need no synchronisation.
#[derive(Default)]
pub struct EventRegistry {
    processors: HashMap<&'static str, Arc<dyn EventProcessor>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_processors<I>(processors: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Arc<dyn EventProcessor>>,
    {
        let mut registry = Self::new();
        for processor in processors {
            registry.register(processor)?;
        }
        Ok(registry)
    }

    /// Registers every event name the processor declares. Nothing is inserted when any of
    /// them already belongs to another processor.
    pub fn register(&mut self, processor: Arc<dyn EventProcessor>) -> Result<(), RegistryError> {
        for &event_name in processor.event_names() {
            if let Some(existing) = self.processors.get(event_name) {
                if !Arc::ptr_eq(existing, &processor) {
                    return Err(RegistryError::DuplicateProcessor {
                        event_name: event_name.to_string(),
                        existing: existing.name(),
                        duplicate: processor.name(),
                    });
                }
            }
        }

        for &event_name in processor.event_names() {
            self.processors.insert(event_name, Arc::clone(&processor));
        }

        info!(
            processor = processor.name(),
            event_names = ?processor.event_names(),
            "Event processor registered"
        );

        Ok(())
    }

    /// Every registered identifier, sorted and without duplicates.
    pub fn routing_keys(&self) -> Vec<&'static str> {
        self.processors
            .keys()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// `None` is the ordinary answer for event types this node does not handle.
    pub fn lookup(&self, event_name: &str) -> Option<&Arc<dyn EventProcessor>> {
        self.processors.get(event_name)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(
        "Event {event_name} is already handled by {existing}, cannot register {duplicate}"
    )]
    DuplicateProcessor {
        event_name: String,
        existing: &'static str,
        duplicate: &'static str,
    },
}
