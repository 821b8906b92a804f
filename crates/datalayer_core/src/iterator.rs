//! Pull iterators over items and entities.
//!
//! Iteration is forward-only and lazy: an iterator holds at most the record in
//! flight. Every iterator owns its resources and releases them exactly once,
//! on exhaustion, on an explicit `close()`, or when dropped.

use crate::cursor::ContinuationToken;
use crate::entity::Entity;
use crate::error::{LayerError, LayerResult};
use crate::item::Item;
use crate::mapper::ItemMapper;
use datalayer_codec::ItemReader;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Forward-only sequence of items.
pub trait ItemIterator: Send {
    /// Returns the next item, or `None` once the sequence is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying source cannot be read. The
    /// iterator should not be used afterwards.
    fn next_item(&mut self) -> LayerResult<Option<Item>>;

    /// Releases underlying resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing fails; resources are considered
    /// released regardless.
    fn close(&mut self) -> LayerResult<()>;

    /// Position after the last item returned, when the iterator tracks one.
    fn token(&self) -> Option<ContinuationToken> {
        None
    }
}

impl<I: ItemIterator + ?Sized> ItemIterator for Box<I> {
    fn next_item(&mut self) -> LayerResult<Option<Item>> {
        (**self).next_item()
    }

    fn close(&mut self) -> LayerResult<()> {
        (**self).close()
    }

    fn token(&self) -> Option<ContinuationToken> {
        (**self).token()
    }
}

/// Forward-only sequence of entities with resumable position.
pub trait EntityIterator: Send {
    /// Returns the next entity, or `None` once the sequence is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error when a source unit cannot be read. The iterator is
    /// terminal afterwards; [`EntityIterator::token`] still reports the last
    /// good position.
    fn next_entity(&mut self) -> LayerResult<Option<Entity>>;

    /// Position after the last entity returned.
    ///
    /// Feeding it back as `since` resumes exactly after that entity.
    fn token(&self) -> Option<ContinuationToken>;

    /// Number of items skipped because they failed to map.
    fn skipped(&self) -> u64 {
        0
    }

    /// Releases underlying resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing fails.
    fn close(&mut self) -> LayerResult<()>;
}

impl<I: EntityIterator + ?Sized> EntityIterator for Box<I> {
    fn next_entity(&mut self) -> LayerResult<Option<Entity>> {
        (**self).next_entity()
    }

    fn token(&self) -> Option<ContinuationToken> {
        (**self).token()
    }

    fn skipped(&self) -> u64 {
        (**self).skipped()
    }

    fn close(&mut self) -> LayerResult<()> {
        (**self).close()
    }
}

impl<I: EntityIterator + ?Sized> EntityIterator for &mut I {
    fn next_entity(&mut self) -> LayerResult<Option<Entity>> {
        (**self).next_entity()
    }

    fn token(&self) -> Option<ContinuationToken> {
        (**self).token()
    }

    fn skipped(&self) -> u64 {
        (**self).skipped()
    }

    fn close(&mut self) -> LayerResult<()> {
        (**self).close()
    }
}

/// Item iterator over a codec reader.
pub struct ReaderItemIterator {
    name: String,
    reader: Option<Box<dyn ItemReader>>,
}

impl ReaderItemIterator {
    /// Wraps `reader`; `name` identifies the stream in errors and logs.
    pub fn new(name: impl Into<String>, reader: Box<dyn ItemReader>) -> Self {
        Self {
            name: name.into(),
            reader: Some(reader),
        }
    }

    fn release(&mut self) -> LayerResult<()> {
        if let Some(mut reader) = self.reader.take() {
            debug!(unit = %self.name, "closing item reader");
            reader.close()?;
        }
        Ok(())
    }
}

impl ItemIterator for ReaderItemIterator {
    fn next_item(&mut self) -> LayerResult<Option<Item>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.read() {
            Ok(Some(record)) => Ok(Some(Item::from(record))),
            Ok(None) => {
                self.release()?;
                Ok(None)
            }
            Err(e) => {
                let _ = self.release();
                Err(LayerError::unit_read(&self.name, e.to_string(), None))
            }
        }
    }

    fn close(&mut self) -> LayerResult<()> {
        self.release()
    }
}

impl Drop for ReaderItemIterator {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Item iterator over an owned list.
#[derive(Debug, Default)]
pub struct VecItemIterator {
    items: std::vec::IntoIter<Item>,
    closed: bool,
}

impl VecItemIterator {
    /// Iterates `items` in order.
    #[must_use]
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: items.into_iter(),
            closed: false,
        }
    }
}

impl ItemIterator for VecItemIterator {
    fn next_item(&mut self) -> LayerResult<Option<Item>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.items.next())
    }

    fn close(&mut self) -> LayerResult<()> {
        self.closed = true;
        self.items = Vec::new().into_iter();
        Ok(())
    }
}

/// Maps the items of one item iterator to entities.
///
/// Items that fail to map are logged, counted and skipped; any other error
/// ends the iteration. Positions come from the inner iterator.
pub struct MappingIterator<I> {
    inner: I,
    mapper: Arc<dyn ItemMapper>,
    skipped: u64,
    last_token: Option<ContinuationToken>,
}

impl<I: ItemIterator> MappingIterator<I> {
    /// Wraps `inner`, mapping with `mapper`.
    pub fn new(inner: I, mapper: Arc<dyn ItemMapper>) -> Self {
        Self {
            inner,
            mapper,
            skipped: 0,
            last_token: None,
        }
    }

    /// Borrows the wrapped item iterator.
    pub fn inner(&self) -> &I {
        &self.inner
    }
}

impl<I: ItemIterator> EntityIterator for MappingIterator<I> {
    fn next_entity(&mut self) -> LayerResult<Option<Entity>> {
        loop {
            let Some(item) = self.inner.next_item()? else {
                self.last_token = self.inner.token().or(self.last_token.take());
                return Ok(None);
            };
            match self.mapper.item_to_entity(&item) {
                Ok(entity) => {
                    self.last_token = self.inner.token();
                    return Ok(Some(entity));
                }
                Err(e) if e.is_recoverable() => {
                    self.skipped += 1;
                    warn!(error = %e, skipped = self.skipped, "skipping item that failed to map");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token(&self) -> Option<ContinuationToken> {
        self.last_token.clone()
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }

    fn close(&mut self) -> LayerResult<()> {
        self.inner.close()
    }
}

/// Stops after `limit` entities.
pub struct LimitedEntityIterator<I> {
    inner: I,
    remaining: usize,
}

impl<I: EntityIterator> LimitedEntityIterator<I> {
    /// Caps `inner` to `limit` entities.
    pub fn new(inner: I, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl<I: EntityIterator> EntityIterator for LimitedEntityIterator<I> {
    fn next_entity(&mut self) -> LayerResult<Option<Entity>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let next = self.inner.next_entity()?;
        if next.is_some() {
            self.remaining -= 1;
        }
        Ok(next)
    }

    fn token(&self) -> Option<ContinuationToken> {
        self.inner.token()
    }

    fn skipped(&self) -> u64 {
        self.inner.skipped()
    }

    fn close(&mut self) -> LayerResult<()> {
        self.inner.close()
    }
}

/// Deduplicates by entity id, keeping the last occurrence.
///
/// The whole inner pass is buffered on the first call. Entities are emitted
/// in the order of their last occurrence. A token is only reported once
/// every buffered entity has been emitted: an earlier position would resume
/// into the middle of a deduplicated pass. If the pass fails, nothing has
/// been emitted, so both the error and `token()` point back at the start.
pub struct LatestOnlyEntityIterator<I> {
    inner: I,
    start: Option<ContinuationToken>,
    buffered: Option<VecDeque<Entity>>,
    failed: bool,
}

impl<I: EntityIterator> LatestOnlyEntityIterator<I> {
    /// Wraps `inner`, which must not have been read yet.
    pub fn new(inner: I) -> Self {
        let start = inner.token();
        Self {
            inner,
            start,
            buffered: None,
            failed: false,
        }
    }

    fn fill(&mut self) -> LayerResult<VecDeque<Entity>> {
        let mut slots: Vec<Option<Entity>> = Vec::new();
        let mut latest: HashMap<String, usize> = HashMap::new();
        while let Some(entity) = self.inner.next_entity()? {
            if let Some(previous) = latest.insert(entity.id.clone(), slots.len()) {
                slots[previous] = None;
            }
            slots.push(Some(entity));
        }
        debug!(
            read = slots.len(),
            kept = latest.len(),
            "buffered latest-only pass"
        );
        Ok(slots.into_iter().flatten().collect())
    }

    fn rewind(&self, error: LayerError) -> LayerError {
        match error {
            LayerError::UnitRead { unit, message, .. } => {
                LayerError::unit_read(unit, message, self.start.clone())
            }
            other => other,
        }
    }
}

impl<I: EntityIterator> EntityIterator for LatestOnlyEntityIterator<I> {
    fn next_entity(&mut self) -> LayerResult<Option<Entity>> {
        if self.buffered.is_none() {
            match self.fill() {
                Ok(filled) => self.buffered = Some(filled),
                Err(e) => {
                    warn!(error = %e, "latest-only pass failed, discarding buffered entities");
                    self.failed = true;
                    self.buffered = Some(VecDeque::new());
                    return Err(self.rewind(e));
                }
            }
        }
        Ok(self.buffered.as_mut().and_then(VecDeque::pop_front))
    }

    fn token(&self) -> Option<ContinuationToken> {
        if self.failed {
            return self.start.clone();
        }
        match &self.buffered {
            Some(rest) if rest.is_empty() => self.inner.token(),
            _ => None,
        }
    }

    fn skipped(&self) -> u64 {
        self.inner.skipped()
    }

    fn close(&mut self) -> LayerResult<()> {
        self.buffered = Some(VecDeque::new());
        self.inner.close()
    }
}

/// Adapts an [`EntityIterator`] to [`std::iter::Iterator`].
///
/// Yields `Err` at most once, then ends.
pub struct EntityIter<I> {
    inner: I,
    done: bool,
}

impl<I: EntityIterator> EntityIter<I> {
    /// Wraps `inner`.
    pub fn new(inner: I) -> Self {
        Self { inner, done: false }
    }

    /// Returns the wrapped iterator, e.g. to read its final token.
    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: EntityIterator> Iterator for EntityIter<I> {
    type Item = LayerResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next_entity() {
            Ok(Some(entity)) => Some(Ok(entity)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Drains `iter`, returning the entities and the final token.
///
/// # Errors
///
/// Returns the first error the iterator reports.
pub fn collect_entities<I: EntityIterator + ?Sized>(
    iter: &mut I,
) -> LayerResult<(Vec<Entity>, Option<ContinuationToken>)> {
    let mut entities = Vec::new();
    while let Some(entity) = iter.next_entity()? {
        entities.push(entity);
    }
    let token = iter.token();
    iter.close()?;
    Ok((entities, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::EntityMapper;
    use crate::mapping::{MappingConfig, PropertyMapping};
    use datalayer_codec::{new_item_reader, CodecConfig, Value};
    use std::io::Cursor;

    fn mapper() -> Arc<dyn ItemMapper> {
        let config = MappingConfig::new()
            .with_property(PropertyMapping::identity("id"))
            .with_property(PropertyMapping::field("v", ""));
        Arc::new(EntityMapper::from_config(&config).unwrap())
    }

    fn item(id: &str, v: i64) -> Item {
        Item::new().with("id", id).with("v", v)
    }

    /// Emits a counting token after each item.
    struct Counting {
        items: VecItemIterator,
        read: u64,
    }

    impl ItemIterator for Counting {
        fn next_item(&mut self) -> LayerResult<Option<Item>> {
            let next = self.items.next_item()?;
            if next.is_some() {
                self.read += 1;
            }
            Ok(next)
        }

        fn close(&mut self) -> LayerResult<()> {
            self.items.close()
        }

        fn token(&self) -> Option<ContinuationToken> {
            Some(ContinuationToken::in_unit(0, "mem", self.read))
        }
    }

    fn counting(items: Vec<Item>) -> MappingIterator<Counting> {
        MappingIterator::new(
            Counting {
                items: VecItemIterator::new(items),
                read: 0,
            },
            mapper(),
        )
    }

    #[test]
    fn reader_iterator_reads_then_closes() {
        let reader = new_item_reader(
            &CodecConfig::default(),
            Box::new(Cursor::new(b"{\"id\":\"a\"}\n{\"id\":\"b\"}\n".to_vec())),
        );
        let mut iter = ReaderItemIterator::new("inline", reader);
        assert_eq!(
            iter.next_item().unwrap().unwrap().get("id"),
            Some(&Value::from("a"))
        );
        assert!(iter.next_item().unwrap().is_some());
        assert!(iter.next_item().unwrap().is_none());
        assert!(iter.next_item().unwrap().is_none());
        iter.close().unwrap();
        iter.close().unwrap();
    }

    #[test]
    fn reader_iterator_reports_corrupt_records() {
        let reader = new_item_reader(
            &CodecConfig::default(),
            Box::new(Cursor::new(b"{\"id\":\"a\"}\nnot json\n".to_vec())),
        );
        let mut iter = ReaderItemIterator::new("broken.jsonl", reader);
        assert!(iter.next_item().unwrap().is_some());
        let err = iter.next_item().unwrap_err();
        assert!(matches!(err, LayerError::UnitRead { ref unit, .. } if unit == "broken.jsonl"));
        assert!(iter.next_item().unwrap().is_none());
    }

    #[test]
    fn mapping_iterator_skips_and_counts_failures() {
        let items = (0..10)
            .map(|i| {
                if i == 4 {
                    Item::new().with("v", 4i64)
                } else {
                    item(&format!("e{i}"), i)
                }
            })
            .collect();
        let mut iter = counting(items);
        let (entities, token) = collect_entities(&mut iter).unwrap();

        assert_eq!(entities.len(), 9);
        assert_eq!(iter.skipped(), 1);
        assert!(entities.iter().all(|e| e.id != "e4"));
        assert_eq!(token, Some(ContinuationToken::in_unit(0, "mem", 10)));
    }

    #[test]
    fn token_follows_last_returned_entity() {
        let mut iter = counting(vec![item("a", 1), item("b", 2)]);
        assert_eq!(iter.token(), None);
        iter.next_entity().unwrap();
        assert_eq!(iter.token(), Some(ContinuationToken::in_unit(0, "mem", 1)));
    }

    #[test]
    fn limit_caps_output() {
        let inner = counting((0..5).map(|i| item(&i.to_string(), i)).collect());
        let mut iter = LimitedEntityIterator::new(inner, 2);
        let (entities, token) = collect_entities(&mut iter).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(token, Some(ContinuationToken::in_unit(0, "mem", 2)));
    }

    #[test]
    fn latest_only_keeps_last_occurrence() {
        let inner = counting(vec![
            item("a", 1),
            item("b", 1),
            item("a", 2),
            item("c", 1),
            item("b", 2),
        ]);
        let mut iter = LatestOnlyEntityIterator::new(inner);

        let first = iter.next_entity().unwrap().unwrap();
        assert_eq!(first.id, "a");
        assert_eq!(first.property("v"), Some(&Value::Integer(2)));
        assert_eq!(iter.token(), None);

        let rest: Vec<_> = EntityIter::new(&mut iter)
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(rest, ["c", "b"]);
        assert_eq!(iter.token(), Some(ContinuationToken::in_unit(0, "mem", 5)));
    }

    #[test]
    fn entity_iter_adapter() {
        let ids: Vec<String> = EntityIter::new(counting(vec![item("x", 0), item("y", 0)]))
            .map(|r| r.map(|e| e.id))
            .collect::<LayerResult<_>>()
            .unwrap();
        assert_eq!(ids, ["x", "y"]);
    }
}
