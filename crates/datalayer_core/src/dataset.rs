//! The dataset contract implemented by every adapter.

use crate::cursor::Since;
use crate::entity::Entity;
use crate::error::{LayerError, LayerResult};
use crate::item::Item;
use crate::iterator::{EntityIterator, LatestOnlyEntityIterator, LimitedEntityIterator};
use crate::mapper::ItemMapper;
use crate::multi::MultiSourceEntityIterator;
use crate::source::{plan_units, ChangeDetection, SourceUnit, UnitErrorPolicy, UnitOpener};
use datalayer_codec::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Summary of a dataset for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetDescription {
    /// Dataset name.
    pub name: String,
    /// Adapter kind, e.g. `filesystem` or `memory`.
    pub kind: String,
    /// Change detection in effect.
    pub change_detection: ChangeDetection,
    /// Whether the dataset can be read.
    pub readable: bool,
    /// Whether the dataset accepts writes.
    pub writable: bool,
}

/// A named collection of entities backed by an external source.
///
/// Reads are lazy and resumable; writes go either through a full sync
/// (replace everything) or incrementally.
pub trait Dataset: Send + Sync {
    /// Dataset name, unique within a registry.
    fn name(&self) -> &str;

    /// Listing summary.
    fn description(&self) -> DatasetDescription;

    /// Adapter specific metadata (location, format, unit count, ...).
    fn metadata(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    /// Entities changed after `since`.
    ///
    /// `since` is empty, an RFC 3339 timestamp, an integer marker, or a
    /// token from an earlier iterator. `limit > 0` caps the number of
    /// entities; `latest_only` keeps only the last version of each id.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidSince`] for an unparseable or
    /// unsupported `since`, [`LayerError::SourceUnavailable`] when the
    /// source cannot be enumerated.
    fn changes(
        &self,
        since: &str,
        limit: usize,
        latest_only: bool,
    ) -> LayerResult<Box<dyn EntityIterator>>;

    /// All entities, resuming from a token when `from` is not empty.
    ///
    /// # Errors
    ///
    /// Same as [`Dataset::changes`]; markers are rejected.
    fn entities(&self, from: &str, limit: usize) -> LayerResult<Box<dyn EntityIterator>>;

    /// Starts a full sync. Writes until completion are staged.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::FullSync`] when a full sync is already running.
    fn begin_full_sync(&self) -> LayerResult<()>;

    /// Makes the staged writes the dataset's entire content.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::FullSync`] when no full sync is running.
    fn complete_full_sync(&self) -> LayerResult<()>;

    /// Discards the staged writes.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::FullSync`] when no full sync is running.
    fn cancel_full_sync(&self) -> LayerResult<()>;

    /// Writes one item, staged during a full sync, appended otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::WriteRejected`] for read-only datasets.
    fn write(&self, item: Item) -> LayerResult<()>;

    /// Maps `entity` with the incoming mapping and writes it.
    ///
    /// # Errors
    ///
    /// As [`Dataset::write`], plus [`LayerError::Mapping`].
    fn write_entity(&self, entity: &Entity) -> LayerResult<()>;
}

/// A parsed read call, shared by the adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Lower bound.
    pub since: Since,
    /// Change detection applied to `since`.
    pub detection: ChangeDetection,
    /// Unit failure handling.
    pub policy: UnitErrorPolicy,
    /// Maximum entities, 0 for no limit.
    pub limit: usize,
    /// Deduplicate by id, last occurrence wins.
    pub latest_only: bool,
}

impl ReadRequest {
    /// Request for [`Dataset::changes`].
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidSince`] when `since` cannot be parsed.
    pub fn changes(
        since: &str,
        limit: usize,
        latest_only: bool,
        detection: ChangeDetection,
        policy: UnitErrorPolicy,
    ) -> LayerResult<Self> {
        Ok(Self {
            since: Since::parse(since)?,
            detection,
            policy,
            limit,
            latest_only,
        })
    }

    /// Request for [`Dataset::entities`]: no change tracking, tokens only.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidSince`] unless `from` is empty or a token.
    pub fn entities(from: &str, limit: usize, policy: UnitErrorPolicy) -> LayerResult<Self> {
        let since = Since::parse(from)?;
        if matches!(since, Since::Marker(_)) {
            return Err(LayerError::invalid_since(
                from,
                "entity enumeration resumes from tokens only",
            ));
        }
        Ok(Self {
            since,
            detection: ChangeDetection::None,
            policy,
            limit,
            latest_only: false,
        })
    }

    /// Plans `units` and returns the wrapped entity iterator.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidSince`] when the since value is not
    /// supported by the change detection mode.
    pub fn open(
        self,
        units: Vec<SourceUnit>,
        opener: Arc<dyn UnitOpener>,
        mapper: Arc<dyn ItemMapper>,
    ) -> LayerResult<Box<dyn EntityIterator>> {
        let plan = plan_units(units, &self.since, &self.detection)?;
        debug!(
            units = plan.units.len(),
            limit = self.limit,
            latest_only = self.latest_only,
            "planned read"
        );
        let iter = MultiSourceEntityIterator::new(plan, opener, mapper, &self.detection, self.policy);
        Ok(wrap(iter, self.limit, self.latest_only))
    }
}

/// Applies `latest_only` deduplication, then `limit`.
pub fn wrap<I: EntityIterator + 'static>(
    iter: I,
    limit: usize,
    latest_only: bool,
) -> Box<dyn EntityIterator> {
    match (latest_only, limit) {
        (false, 0) => Box::new(iter),
        (false, n) => Box::new(LimitedEntityIterator::new(iter, n)),
        (true, 0) => Box::new(LatestOnlyEntityIterator::new(iter)),
        (true, n) => Box::new(LimitedEntityIterator::new(
            LatestOnlyEntityIterator::new(iter),
            n,
        )),
    }
}
