//! In-memory dataset.
//!
//! The dataset content is an append-only log of items tagged with a
//! *generation*. The log is exposed as a single source unit whose marker is
//! the generation; a completed full sync installs a new log under the next
//! generation, so tokens taken from an older log re-read the new one from
//! its start.
//!
//! Generations are counters, not times: with unit marker change detection a
//! timestamp `since` is rejected. Integer generations and tokens are accepted.
//!
//! Readers iterate a snapshot of the log taken when the iterator was
//! created; writes never disturb running iterators.

use crate::mappings::Mappings;
use datalayer_core::{
    parse_timestamp, ChangeDetection, Dataset, DatasetDefinition, DatasetDescription, Entity,
    EntityIterator, Item, ItemIterator, LayerError, LayerResult, MappingConfig, ReadRequest,
    SourceUnit, TransformRegistry, UnitErrorPolicy, UnitOpener, Value,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const UNIT_NAME: &str = "log";

#[derive(Debug, Clone, Default)]
struct Log {
    generation: i64,
    items: Arc<Vec<Item>>,
}

/// An in-memory dataset.
pub struct MemoryDataset {
    name: String,
    detection: ChangeDetection,
    mappings: Mappings,
    log: RwLock<Log>,
    staging: Mutex<Option<Vec<Item>>>,
}

impl MemoryDataset {
    /// Dataset using `mapping` in both directions.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Configuration`] for an invalid mapping.
    pub fn new(name: impl Into<String>, mapping: MappingConfig) -> LayerResult<Self> {
        let definition = DatasetDefinition::new(name)
            .outgoing(mapping.clone())
            .incoming(mapping);
        Self::from_definition(&definition, &TransformRegistry::default())
    }

    /// Dataset built from a definition; only its mappings and change
    /// detection are used.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Configuration`] for an invalid mapping.
    pub fn from_definition(
        definition: &DatasetDefinition,
        transforms: &TransformRegistry,
    ) -> LayerResult<Self> {
        Ok(Self {
            name: definition.name.clone(),
            detection: definition.source.change_detection.clone(),
            mappings: Mappings::new(definition, transforms)?,
            log: RwLock::new(Log::default()),
            staging: Mutex::new(None),
        })
    }

    /// Seeds the dataset with `items`.
    #[must_use]
    pub fn with_items(self, items: impl IntoIterator<Item = Item>) -> Self {
        {
            let mut log = self.log.write();
            Arc::make_mut(&mut log.items).extend(items);
        }
        self
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> i64 {
        self.log.read().generation
    }

    /// Number of visible items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.read().items.len()
    }

    /// Whether no items are visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, request: ReadRequest) -> LayerResult<Box<dyn EntityIterator>> {
        let mapper = self.mappings.outgoing()?;
        let log = self.log.read().clone();
        let unit = SourceUnit::new(UNIT_NAME, log.generation);
        request.open(vec![unit], Arc::new(SnapshotOpener(log)), mapper)
    }
}

impl Dataset for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> DatasetDescription {
        DatasetDescription {
            name: self.name.clone(),
            kind: "memory".to_string(),
            change_detection: self.detection.clone(),
            readable: self.mappings.readable(),
            writable: true,
        }
    }

    fn metadata(&self) -> BTreeMap<String, Value> {
        let log = self.log.read();
        BTreeMap::from([
            ("generation".to_string(), Value::Integer(log.generation)),
            ("items".to_string(), Value::Integer(log.items.len() as i64)),
        ])
    }

    fn changes(
        &self,
        since: &str,
        limit: usize,
        latest_only: bool,
    ) -> LayerResult<Box<dyn EntityIterator>> {
        let timestamp = parse_timestamp(since.trim()).is_some();
        if timestamp && self.detection == ChangeDetection::UnitMarker {
            return Err(LayerError::invalid_since(
                since,
                "memory dataset markers are generations; pass an integer generation or a token",
            ));
        }
        let request = ReadRequest::changes(
            since,
            limit,
            latest_only,
            self.detection.clone(),
            UnitErrorPolicy::FailFast,
        )?;
        self.read(request)
    }

    fn entities(&self, from: &str, limit: usize) -> LayerResult<Box<dyn EntityIterator>> {
        self.read(ReadRequest::entities(from, limit, UnitErrorPolicy::FailFast)?)
    }

    fn begin_full_sync(&self) -> LayerResult<()> {
        let mut staging = self.staging.lock();
        if staging.is_some() {
            return Err(LayerError::full_sync(format!(
                "dataset {:?} already has a full sync in progress",
                self.name
            )));
        }
        *staging = Some(Vec::new());
        info!(dataset = %self.name, "full sync started");
        Ok(())
    }

    fn complete_full_sync(&self) -> LayerResult<()> {
        // Held until the new log is installed so no incremental write slips
        // into the log being replaced.
        let mut staging = self.staging.lock();
        let staged = staging.take().ok_or_else(|| {
            LayerError::full_sync(format!("dataset {:?} has no full sync in progress", self.name))
        })?;
        let count = staged.len();
        let generation = {
            let mut log = self.log.write();
            log.generation += 1;
            log.items = Arc::new(staged);
            log.generation
        };
        drop(staging);
        info!(dataset = %self.name, items = count, generation, "full sync completed");
        Ok(())
    }

    fn cancel_full_sync(&self) -> LayerResult<()> {
        let staged = self.staging.lock().take().ok_or_else(|| {
            LayerError::full_sync(format!("dataset {:?} has no full sync in progress", self.name))
        })?;
        info!(dataset = %self.name, discarded = staged.len(), "full sync cancelled");
        Ok(())
    }

    fn write(&self, item: Item) -> LayerResult<()> {
        let mut staging = self.staging.lock();
        match staging.as_mut() {
            Some(staged) => staged.push(item),
            None => {
                let mut log = self.log.write();
                Arc::make_mut(&mut log.items).push(item);
                debug!(dataset = %self.name, items = log.items.len(), "appended item");
            }
        }
        Ok(())
    }

    fn write_entity(&self, entity: &Entity) -> LayerResult<()> {
        let item = self.mappings.incoming()?.entity_to_item(entity)?;
        self.write(item)
    }
}

/// Opens the log snapshot taken by one read call.
struct SnapshotOpener(Log);

impl UnitOpener for SnapshotOpener {
    fn open(&self, unit: &SourceUnit) -> LayerResult<Box<dyn ItemIterator>> {
        if unit.name != UNIT_NAME || unit.marker != self.0.generation {
            return Err(LayerError::unit_read(&unit.name, "unknown unit", None));
        }
        Ok(Box::new(SnapshotItemIterator {
            items: Some(self.0.items.clone()),
            next: 0,
        }))
    }
}

struct SnapshotItemIterator {
    items: Option<Arc<Vec<Item>>>,
    next: usize,
}

impl ItemIterator for SnapshotItemIterator {
    fn next_item(&mut self) -> LayerResult<Option<Item>> {
        let Some(items) = &self.items else {
            return Ok(None);
        };
        let item = items.get(self.next).cloned();
        match item {
            Some(_) => self.next += 1,
            None => self.items = None,
        }
        Ok(item)
    }

    fn close(&mut self) -> LayerResult<()> {
        self.items = None;
        Ok(())
    }
}
