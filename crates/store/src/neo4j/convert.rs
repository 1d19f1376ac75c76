//! JSON ⇄ Bolt parameter conversion
//!
//! Property bags are `serde_json` maps in the core types; Bolt parameters
//! want `BoltType`. Reads come back through neo4rs' serde support
//! (`properties(x)` projected straight into `serde_json::Value`), so only
//! the write direction needs hand conversion.

use kgraph_core::PropertyBag;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltType};
use serde_json::Value;

/// Convert one JSON value into a Bolt parameter value.
///
/// JSON numbers become Bolt integers when they fit, floats otherwise.
pub(crate) fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull::default()),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::from(i)
            } else {
                BoltType::from(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => {
            let mut list = BoltList::default();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::default();
            for (k, v) in map {
                bolt.put(k.as_str().into(), json_to_bolt(v));
            }
            BoltType::Map(bolt)
        }
    }
}

/// Convert a property bag into a Bolt map parameter.
pub(crate) fn bag_to_bolt(bag: &PropertyBag) -> BoltType {
    let mut bolt = BoltMap::default();
    for (k, v) in bag {
        bolt.put(k.as_str().into(), json_to_bolt(v));
    }
    BoltType::Map(bolt)
}

/// A `properties(x)` projection parsed back into a bag, with the bookkeeping
/// keys stripped.
pub(crate) fn props_to_bag(props: Value, strip: &[&str]) -> PropertyBag {
    match props {
        Value::Object(map) => map
            .into_iter()
            .filter(|(k, _)| !strip.contains(&k.as_str()))
            .collect(),
        _ => PropertyBag::new(),
    }
}

/// Clamp a usize limit into a Cypher `LIMIT` parameter, fetching one extra
/// row so the caller can detect truncation.
pub(crate) fn limit_param(limit: usize) -> i64 {
    limit.saturating_add(1).min(i64::MAX as usize) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn props_strip_bookkeeping_keys() {
        let props = json!({
            "kg_version": "100",
            "entity_label": "Person",
            "name": "Alice",
            "age": 30,
        });
        let bag = props_to_bag(props, &["kg_version", "entity_label", "name"]);
        assert_eq!(bag.len(), 1);
        assert_eq!(bag["age"], json!(30));
    }

    #[test]
    fn limit_param_leaves_room_for_the_probe_row() {
        assert_eq!(limit_param(10), 11);
        assert_eq!(limit_param(usize::MAX), i64::MAX);
    }
}
