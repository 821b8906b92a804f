//! Property-based test generators using proptest.

use datalayer_codec::Value;
use datalayer_core::Item;
use proptest::prelude::*;

/// Strategy for scalar values (no nesting, no floats).
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::Text),
    ]
}

/// Strategy for values nested up to three levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for items with a text `id` and up to `max_fields` other fields.
pub fn item_strategy(max_fields: usize) -> impl Strategy<Value = Item> {
    (
        "[a-z0-9]{1,12}",
        prop::collection::btree_map(
            field_name_strategy().prop_filter("id is reserved", |n| n != "id"),
            value_strategy(),
            0..=max_fields,
        ),
    )
        .prop_map(|(id, fields)| {
            let mut item: Item = fields.into_iter().collect();
            item.set("id", id);
            item
        })
}

/// Strategy for a source layout: per unit, the number of items in it.
///
/// Units hold 0 to `max_items` items, so empty units are exercised too.
pub fn unit_sizes_strategy(
    max_units: usize,
    max_items: usize,
) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..=max_items, 1..=max_units)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn items_always_have_a_text_id(item in item_strategy(4)) {
            prop_assert!(item.get("id").and_then(Value::as_text).is_some());
            prop_assert!(item.len() <= 5);
        }
    }
}
