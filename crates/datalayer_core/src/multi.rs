//! One logical entity stream over many source units.
//!
//! [`ChainedItemIterator`] reads the units of an [`IterationPlan`] one after
//! the other, opening at most one at a time, and tracks the exact position
//! reached. [`MultiSourceEntityIterator`] maps its items to entities.
//!
//! # State machine
//!
//! ```text
//! Unopened -> Reading(i) -> Unopened -> ... -> Exhausted
//!     \            \
//!      +-> Failed   +-> Failed
//! (any) -> Closed
//! ```

use crate::cursor::{marker_from_value, ContinuationToken, Position};
use crate::entity::Entity;
use crate::error::{LayerError, LayerResult};
use crate::item::Item;
use crate::iterator::{EntityIterator, ItemIterator, MappingIterator};
use crate::mapper::ItemMapper;
use crate::source::{ChangeDetection, IterationPlan, PlannedUnit, UnitErrorPolicy, UnitOpener};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    /// No unit open; `next` is the next planned unit.
    Unopened,
    /// Unit `index` is open, `consumed` raw items read from it.
    Reading { index: usize, consumed: u64 },
    Exhausted,
    Failed,
    Closed,
}

/// Reads planned units in order as one item sequence.
pub struct ChainedItemIterator {
    opener: Arc<dyn UnitOpener>,
    units: Vec<PlannedUnit>,
    next: usize,
    state: ChainState,
    current: Option<Box<dyn ItemIterator>>,
    position: ContinuationToken,
    item_filter: Option<(String, i64)>,
    policy: UnitErrorPolicy,
}

impl ChainedItemIterator {
    /// Creates an iterator over `plan`; nothing is opened until the first read.
    pub fn new(
        plan: IterationPlan,
        opener: Arc<dyn UnitOpener>,
        detection: &ChangeDetection,
        policy: UnitErrorPolicy,
    ) -> Self {
        let item_filter = match (detection, plan.item_since) {
            (ChangeDetection::DataProperty(field), Some(since)) => Some((field.clone(), since)),
            _ => None,
        };
        Self {
            opener,
            units: plan.units,
            next: 0,
            state: ChainState::Unopened,
            current: None,
            position: plan.start,
            item_filter,
            policy,
        }
    }

    /// Position after the last raw item consumed.
    #[must_use]
    pub fn position(&self) -> &ContinuationToken {
        &self.position
    }

    /// Whether a unit is currently open.
    #[must_use]
    pub fn has_open_unit(&self) -> bool {
        self.current.is_some()
    }

    fn close_current(&mut self) {
        if let Some(mut current) = self.current.take() {
            if let Err(e) = current.close() {
                warn!(error = %e, "failed to close source unit");
            }
        }
    }

    fn record_consumed(&mut self, index: usize, consumed: u64) {
        let unit = &self.units[index].unit;
        self.position = ContinuationToken {
            position: Position::InUnit {
                marker: unit.marker,
                unit: unit.name.clone(),
                offset: consumed,
            },
            item_since: self.position.item_since,
        };
    }

    /// Handles a unit failure according to the policy.
    fn unit_failed(&mut self, index: usize, error: LayerError) -> LayerResult<()> {
        self.close_current();
        let unit = self.units[index].unit.name.clone();
        let message = match error {
            LayerError::UnitRead { message, .. } => message,
            other => other.to_string(),
        };
        match self.policy {
            UnitErrorPolicy::FailFast => {
                self.state = ChainState::Failed;
                Err(LayerError::unit_read(
                    unit,
                    message,
                    Some(self.position.clone()),
                ))
            }
            UnitErrorPolicy::Skip => {
                warn!(%unit, %message, "skipping unreadable source unit");
                self.state = ChainState::Unopened;
                Ok(())
            }
        }
    }

    /// Opens the next planned unit and skips its already consumed items.
    fn open_next(&mut self) -> LayerResult<()> {
        let Some(planned) = self.units.get(self.next) else {
            debug!("all source units read");
            self.state = ChainState::Exhausted;
            return Ok(());
        };
        let index = self.next;
        let skip = planned.skip;
        self.next += 1;

        debug!(unit = %planned.unit.name, marker = planned.unit.marker, skip, "opening source unit");
        let mut current = match self.opener.open(&planned.unit) {
            Ok(current) => current,
            Err(e) => return self.unit_failed(index, e),
        };

        let mut consumed = 0;
        while consumed < skip {
            match current.next_item() {
                Ok(Some(_)) => consumed += 1,
                Ok(None) => break,
                Err(e) => {
                    self.current = Some(current);
                    return self.unit_failed(index, e);
                }
            }
        }
        self.current = Some(current);
        self.state = ChainState::Reading { index, consumed };
        Ok(())
    }

    fn passes_filter(&self, item: &Item) -> bool {
        let Some((field, since)) = &self.item_filter else {
            return true;
        };
        match item.get(field).and_then(marker_from_value) {
            Some(marker) => marker > *since,
            None => true,
        }
    }
}

impl ItemIterator for ChainedItemIterator {
    fn next_item(&mut self) -> LayerResult<Option<Item>> {
        loop {
            match self.state {
                ChainState::Exhausted | ChainState::Failed | ChainState::Closed => {
                    return Ok(None)
                }
                ChainState::Unopened => self.open_next()?,
                ChainState::Reading { index, consumed } => {
                    let Some(current) = self.current.as_mut() else {
                        self.state = ChainState::Unopened;
                        continue;
                    };
                    match current.next_item() {
                        Ok(Some(item)) => {
                            let consumed = consumed + 1;
                            self.state = ChainState::Reading { index, consumed };
                            self.record_consumed(index, consumed);
                            if self.passes_filter(&item) {
                                return Ok(Some(item));
                            }
                        }
                        Ok(None) => {
                            info!(
                                unit = %self.units[index].unit.name,
                                items = consumed,
                                "source unit exhausted"
                            );
                            self.close_current();
                            self.state = ChainState::Unopened;
                        }
                        Err(e) => self.unit_failed(index, e)?,
                    }
                }
            }
        }
    }

    fn close(&mut self) -> LayerResult<()> {
        if self.state != ChainState::Closed {
            self.close_current();
            self.state = ChainState::Closed;
        }
        Ok(())
    }

    fn token(&self) -> Option<ContinuationToken> {
        Some(self.position.clone())
    }
}

impl Drop for ChainedItemIterator {
    fn drop(&mut self) {
        self.close_current();
    }
}

/// Entity iterator over all units of a source.
///
/// Produced by dataset `changes` / `entities` calls. After every entity the
/// token names the exact position reached; after an error it still names the
/// last good position.
pub struct MultiSourceEntityIterator {
    inner: MappingIterator<ChainedItemIterator>,
    start: ContinuationToken,
}

impl MultiSourceEntityIterator {
    /// Builds the iterator for `plan`.
    pub fn new(
        plan: IterationPlan,
        opener: Arc<dyn UnitOpener>,
        mapper: Arc<dyn ItemMapper>,
        detection: &ChangeDetection,
        policy: UnitErrorPolicy,
    ) -> Self {
        let start = plan.start.clone();
        let chain = ChainedItemIterator::new(plan, opener, detection, policy);
        Self {
            inner: MappingIterator::new(chain, mapper),
            start,
        }
    }

    /// Whether a source unit is currently open.
    #[must_use]
    pub fn has_open_unit(&self) -> bool {
        self.inner.inner().has_open_unit()
    }
}

impl EntityIterator for MultiSourceEntityIterator {
    fn next_entity(&mut self) -> LayerResult<Option<Entity>> {
        self.inner.next_entity()
    }

    fn token(&self) -> Option<ContinuationToken> {
        self.inner.token().or_else(|| Some(self.start.clone()))
    }

    fn skipped(&self) -> u64 {
        self.inner.skipped()
    }

    fn close(&mut self) -> LayerResult<()> {
        self.inner.close()
    }
}
