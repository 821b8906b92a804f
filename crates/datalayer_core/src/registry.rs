//! Named dataset lookup.

use crate::dataset::{Dataset, DatasetDescription};
use crate::error::{LayerError, LayerResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// The set of datasets a host serves, by name.
///
/// Owned by the host and passed by reference. Lookups hand out `Arc`s, so a
/// dataset removed or replaced while a caller is still iterating it stays
/// alive until that caller is done.
#[derive(Default)]
pub struct DatasetRegistry {
    datasets: RwLock<BTreeMap<String, Arc<dyn Dataset>>>,
}

impl DatasetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `dataset`, replacing a dataset with the same name.
    ///
    /// Returns the replaced dataset, if any.
    pub fn register(&self, dataset: Arc<dyn Dataset>) -> Option<Arc<dyn Dataset>> {
        let name = dataset.name().to_string();
        info!(dataset = %name, "registering dataset");
        self.datasets.write().insert(name, dataset)
    }

    /// Looks up a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::DatasetNotFound`] for unknown names.
    pub fn dataset(&self, name: &str) -> LayerResult<Arc<dyn Dataset>> {
        self.datasets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LayerError::dataset_not_found(name))
    }

    /// Dataset names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.datasets.read().keys().cloned().collect()
    }

    /// Descriptions of all datasets, ordered by name.
    #[must_use]
    pub fn descriptions(&self) -> Vec<DatasetDescription> {
        self.datasets
            .read()
            .values()
            .map(|d| d.description())
            .collect()
    }

    /// Removes a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::DatasetNotFound`] for unknown names.
    pub fn remove(&self, name: &str) -> LayerResult<Arc<dyn Dataset>> {
        let removed = self
            .datasets
            .write()
            .remove(name)
            .ok_or_else(|| LayerError::dataset_not_found(name))?;
        info!(dataset = %name, "removed dataset");
        Ok(removed)
    }

    /// Replaces the whole set of datasets at once.
    ///
    /// Readers observe either the old or the new set, never a mix. Of several
    /// datasets sharing a name the last one wins.
    pub fn reconfigure(&self, datasets: impl IntoIterator<Item = Arc<dyn Dataset>>) {
        let mut next = BTreeMap::new();
        for dataset in datasets {
            if let Some(replaced) = next.insert(dataset.name().to_string(), dataset) {
                warn!(dataset = %replaced.name(), "duplicate dataset name, keeping the last one");
            }
        }
        let count = next.len();
        *self.datasets.write() = next;
        info!(datasets = count, "registry reconfigured");
    }

    /// Number of datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.read().is_empty()
    }
}

impl std::fmt::Debug for DatasetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetRegistry")
            .field("datasets", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::error::ErrorKind;
    use crate::item::Item;
    use crate::iterator::EntityIterator;
    use crate::source::ChangeDetection;

    struct Named(&'static str);

    impl Dataset for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> DatasetDescription {
            DatasetDescription {
                name: self.0.to_string(),
                kind: "test".into(),
                change_detection: ChangeDetection::None,
                readable: false,
                writable: false,
            }
        }

        fn changes(&self, _: &str, _: usize, _: bool) -> LayerResult<Box<dyn EntityIterator>> {
            Err(LayerError::source_unavailable("not readable"))
        }

        fn entities(&self, _: &str, _: usize) -> LayerResult<Box<dyn EntityIterator>> {
            Err(LayerError::source_unavailable("not readable"))
        }

        fn begin_full_sync(&self) -> LayerResult<()> {
            Err(LayerError::write_rejected("read-only"))
        }

        fn complete_full_sync(&self) -> LayerResult<()> {
            Err(LayerError::write_rejected("read-only"))
        }

        fn cancel_full_sync(&self) -> LayerResult<()> {
            Err(LayerError::write_rejected("read-only"))
        }

        fn write(&self, _: Item) -> LayerResult<()> {
            Err(LayerError::write_rejected("read-only"))
        }

        fn write_entity(&self, _: &Entity) -> LayerResult<()> {
            Err(LayerError::write_rejected("read-only"))
        }
    }

    #[test]
    fn register_lookup_remove() {
        let registry = DatasetRegistry::new();
        assert!(registry.register(Arc::new(Named("people"))).is_none());
        assert!(registry.register(Arc::new(Named("orders"))).is_none());
        assert!(registry.register(Arc::new(Named("people"))).is_some());

        assert_eq!(registry.names(), ["orders", "people"]);
        assert_eq!(registry.dataset("people").unwrap().name(), "people");

        let err = registry.dataset("missing").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        registry.remove("orders").unwrap();
        assert!(registry.remove("orders").is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reconfigure_swaps_everything() {
        let registry = DatasetRegistry::new();
        registry.register(Arc::new(Named("old")));
        let held = registry.dataset("old").unwrap();

        registry.reconfigure([
            Arc::new(Named("a")) as Arc<dyn Dataset>,
            Arc::new(Named("b")),
        ]);
        assert_eq!(registry.names(), ["a", "b"]);
        assert!(registry.dataset("old").is_err());
        // Handed-out datasets outlive reconfiguration.
        assert_eq!(held.name(), "old");

        let kinds: Vec<_> = registry.descriptions().into_iter().map(|d| d.name).collect();
        assert_eq!(kinds, ["a", "b"]);
    }

    #[test]
    fn reconfigure_keeps_the_last_of_duplicate_names() {
        let registry = DatasetRegistry::new();
        let last: Arc<dyn Dataset> = Arc::new(Named("a"));
        registry.reconfigure([Arc::new(Named("a")) as Arc<dyn Dataset>, last.clone()]);
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.dataset("a").unwrap(), &last));
    }
}
