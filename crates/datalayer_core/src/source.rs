//! Source units and iteration planning.
//!
//! A dataset's backing store is split into [`SourceUnit`]s (files, blobs,
//! in-memory generations). Before iterating, the units are ordered and
//! filtered against the caller's [`Since`] into an [`IterationPlan`].

use crate::cursor::{ContinuationToken, Position, Since};
use crate::error::{LayerError, LayerResult};
use crate::iterator::ItemIterator;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One independently openable piece of a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceUnit {
    /// Name, unique within the source.
    pub name: String,
    /// Change marker (modification time in nanoseconds, generation, ...).
    pub marker: i64,
}

impl SourceUnit {
    /// Creates a unit.
    pub fn new(name: impl Into<String>, marker: i64) -> Self {
        Self {
            name: name.into(),
            marker,
        }
    }

    fn key(&self) -> (i64, &str) {
        (self.marker, self.name.as_str())
    }
}

impl Ord for SourceUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for SourceUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Opens source units for reading.
pub trait UnitOpener: Send + Sync {
    /// Opens `unit`, returning an iterator over its items.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::UnitRead`] (or a wrapped I/O error) when the
    /// unit cannot be opened.
    fn open(&self, unit: &SourceUnit) -> LayerResult<Box<dyn ItemIterator>>;
}

/// How a source decides what changed after a `since` marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// No change tracking; timestamp since values are rejected.
    None,
    /// Whole units are newer or not, by unit marker.
    #[default]
    UnitMarker,
    /// Each item carries its own marker in the named field.
    DataProperty(String),
}

/// What to do when a unit fails to open or read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitErrorPolicy {
    /// End the iteration with the error.
    #[default]
    FailFast,
    /// Log the failure and continue with the next unit.
    Skip,
}

/// A unit scheduled for reading, with the raw items to skip on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUnit {
    /// Unit to read.
    pub unit: SourceUnit,
    /// Raw items already consumed by an earlier pass.
    pub skip: u64,
}

/// Ordered units to read and the position the iteration starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationPlan {
    /// Units in read order.
    pub units: Vec<PlannedUnit>,
    /// Token describing the position before anything is read.
    pub start: ContinuationToken,
    /// Item-level threshold for property-based change detection.
    pub item_since: Option<i64>,
}

/// Orders `units` by `(marker, name)` and filters them against `since`.
///
/// - timestamp/marker since with unit-marker detection keeps units whose
///   marker is strictly after it
/// - with property-based detection all units are kept and the threshold is
///   applied per item
/// - a token keeps units ordered strictly after the token's unit and resumes
///   that unit itself at its recorded offset
///
/// # Errors
///
/// Returns [`LayerError::InvalidSince`] for a marker since on a source
/// without change detection.
pub fn plan_units(
    mut units: Vec<SourceUnit>,
    since: &Since,
    detection: &ChangeDetection,
) -> LayerResult<IterationPlan> {
    units.sort();
    let property_based = matches!(detection, ChangeDetection::DataProperty(_));

    let start = match since {
        Since::Beginning => ContinuationToken::start(),
        Since::Marker(marker) => match detection {
            ChangeDetection::None => {
                return Err(LayerError::invalid_since(
                    marker.to_string(),
                    "source does not track changes; use a token",
                ))
            }
            ChangeDetection::UnitMarker => ContinuationToken {
                position: Position::AfterMarker(*marker),
                item_since: None,
            },
            ChangeDetection::DataProperty(_) => ContinuationToken {
                position: Position::Start,
                item_since: Some(*marker),
            },
        },
        Since::Token(token) => ContinuationToken {
            position: token.position.clone(),
            item_since: token.item_since.filter(|_| property_based),
        },
    };

    let units = units
        .into_iter()
        .filter_map(|unit| skip_for(&start.position, &unit).map(|skip| PlannedUnit { unit, skip }))
        .collect();

    Ok(IterationPlan {
        units,
        item_since: start.item_since,
        start,
    })
}

/// Raw items to skip in `unit` when resuming at `position`, or `None` if the
/// unit lies at or before it.
fn skip_for(position: &Position, unit: &SourceUnit) -> Option<u64> {
    match position {
        Position::Start => Some(0),
        Position::AfterMarker(marker) => (unit.marker > *marker).then_some(0),
        Position::InUnit {
            marker,
            unit: name,
            offset,
        } => match unit.key().cmp(&(*marker, name.as_str())) {
            Ordering::Greater => Some(0),
            Ordering::Equal => Some(*offset),
            Ordering::Less => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> Vec<SourceUnit> {
        vec![
            SourceUnit::new("c", 30),
            SourceUnit::new("a", 10),
            SourceUnit::new("b2", 20),
            SourceUnit::new("b1", 20),
        ]
    }

    fn names(plan: &IterationPlan) -> Vec<(&str, u64)> {
        plan.units
            .iter()
            .map(|p| (p.unit.name.as_str(), p.skip))
            .collect()
    }

    #[test]
    fn units_order_by_marker_then_name() {
        let mut sorted = units();
        sorted.sort();
        let order: Vec<_> = sorted.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(order, ["a", "b1", "b2", "c"]);
    }

    #[test]
    fn beginning_keeps_everything() {
        let plan = plan_units(units(), &Since::Beginning, &ChangeDetection::None).unwrap();
        assert_eq!(names(&plan), [("a", 0), ("b1", 0), ("b2", 0), ("c", 0)]);
        assert_eq!(plan.start, ContinuationToken::start());
    }

    #[test]
    fn marker_filters_units_strictly_after() {
        let plan = plan_units(units(), &Since::Marker(20), &ChangeDetection::UnitMarker).unwrap();
        assert_eq!(names(&plan), [("c", 0)]);
        assert_eq!(plan.start.position, Position::AfterMarker(20));
        assert_eq!(plan.item_since, None);
    }

    #[test]
    fn marker_with_property_detection_filters_items() {
        let detection = ChangeDetection::DataProperty("updated".into());
        let plan = plan_units(units(), &Since::Marker(20), &detection).unwrap();
        assert_eq!(plan.units.len(), 4);
        assert_eq!(plan.item_since, Some(20));
        assert_eq!(plan.start.item_since, Some(20));
    }

    #[test]
    fn marker_without_change_detection_is_rejected() {
        let err = plan_units(units(), &Since::Marker(1), &ChangeDetection::None).unwrap_err();
        assert!(matches!(err, LayerError::InvalidSince { .. }));
    }

    #[test]
    fn token_resumes_inside_its_unit() {
        let token = ContinuationToken::in_unit(20, "b1", 3);
        let plan = plan_units(units(), &Since::Token(token.clone()), &ChangeDetection::None).unwrap();
        assert_eq!(names(&plan), [("b1", 3), ("b2", 0), ("c", 0)]);
        assert_eq!(plan.start, token);
    }

    #[test]
    fn token_for_a_rewritten_unit_rereads_it() {
        // b1 was modified after the token was taken: its key moved past the token.
        let mut changed = units();
        changed[3].marker = 40;
        let token = ContinuationToken::in_unit(20, "b1", 3);
        let plan = plan_units(changed, &Since::Token(token), &ChangeDetection::UnitMarker).unwrap();
        assert_eq!(names(&plan), [("b2", 0), ("c", 0), ("b1", 0)]);
    }

    #[test]
    fn item_since_only_survives_for_property_detection() {
        let token = ContinuationToken {
            position: Position::Start,
            item_since: Some(5),
        };
        let plan = plan_units(units(), &Since::Token(token.clone()), &ChangeDetection::None).unwrap();
        assert_eq!(plan.item_since, None);

        let detection = ChangeDetection::DataProperty("t".into());
        let plan = plan_units(units(), &Since::Token(token), &detection).unwrap();
        assert_eq!(plan.item_since, Some(5));
    }

    #[test]
    fn detection_deserializes_from_config_names() {
        let d: ChangeDetection = serde_json::from_str(r#""unit_marker""#).unwrap();
        assert_eq!(d, ChangeDetection::UnitMarker);
        let d: ChangeDetection = serde_json::from_str(r#"{"data_property":"updated"}"#).unwrap();
        assert_eq!(d, ChangeDetection::DataProperty("updated".into()));
        let p: UnitErrorPolicy = serde_json::from_str(r#""skip""#).unwrap();
        assert_eq!(p, UnitErrorPolicy::Skip);
    }
}
