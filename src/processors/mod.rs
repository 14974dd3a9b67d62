// src/processors/mod.rs

//! Processors compiled into the worker binary.

pub mod entity_counter;

pub use entity_counter::{EntityCounter, EntityCounts};

use crate::errors::Result;
use crate::registry::ProcessorRegistry;

pub const ENTITY_COUNTER: &str = "entity_counter";

/// Register every built-in processor.
pub fn register_builtin<I, S>(registry: &mut ProcessorRegistry, data_types: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    registry.register(ENTITY_COUNTER, EntityCounter::new(data_types))?;
    Ok(())
}
