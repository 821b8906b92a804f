//! # DataLayer Sources
//!
//! Dataset adapters for the datalayer toolkit.
//!
//! ## Available Adapters
//!
//! - [`FileSystemDataset`] - item files (JSON Lines or CBOR) in a directory
//! - [`MemoryDataset`] - an in-memory item log, for tests and scratch data
//!
//! [`open_dataset`] picks the adapter for a [`DatasetDefinition`]: a
//! definition with a source path is file backed, one without is in-memory.
//!
//! ## Example
//!
//! ```rust
//! use datalayer_core::{collect_entities, Dataset, Item, MappingConfig, PropertyMapping};
//! use datalayer_sources::MemoryDataset;
//!
//! let mapping = MappingConfig::new().with_property(PropertyMapping::identity("id"));
//! let dataset = MemoryDataset::new("sample", mapping).unwrap();
//! dataset.write(Item::new().with("id", "a1")).unwrap();
//!
//! let mut changes = dataset.changes("", 0, false).unwrap();
//! let (entities, _token) = collect_entities(&mut *changes).unwrap();
//! assert_eq!(entities[0].id, "a1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod filesystem;
mod mappings;
mod memory;
mod pattern;

pub use filesystem::{FileSystemDataset, FileUnitOpener};
pub use memory::MemoryDataset;
pub use pattern::NamePattern;

use datalayer_core::{
    Dataset, DatasetDefinition, DatasetRegistry, LayerError, LayerResult, TransformRegistry,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Builds the dataset described by `definition`.
///
/// # Errors
///
/// Returns [`datalayer_core::LayerError::Configuration`] for invalid
/// mappings or file patterns.
pub fn open_dataset(
    definition: &DatasetDefinition,
    transforms: &TransformRegistry,
) -> LayerResult<Arc<dyn Dataset>> {
    if definition.source.path.as_os_str().is_empty() {
        Ok(Arc::new(MemoryDataset::from_definition(definition, transforms)?))
    } else {
        Ok(Arc::new(FileSystemDataset::new(definition, transforms)?))
    }
}

/// Builds all `definitions` and installs them in `registry`, replacing its
/// previous content. Nothing is replaced if any definition is invalid or two
/// definitions share a name.
///
/// # Errors
///
/// Returns the first definition error.
pub fn configure_registry(
    registry: &DatasetRegistry,
    definitions: &[DatasetDefinition],
    transforms: &TransformRegistry,
) -> LayerResult<()> {
    let mut seen = HashSet::new();
    if let Some(duplicate) = definitions.iter().find(|d| !seen.insert(d.name.as_str())) {
        return Err(LayerError::configuration(format!(
            "dataset {:?} is defined more than once",
            duplicate.name
        )));
    }
    let datasets = definitions
        .iter()
        .map(|d| open_dataset(d, transforms))
        .collect::<LayerResult<Vec<_>>>()?;
    registry.reconfigure(datasets);
    Ok(())
}
