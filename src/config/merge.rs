//! Layer merging
//!
//! Objects merge key by key; arrays and scalars from the higher layer
//! replace the lower one outright, `null` included.

use serde_json::Value;

/// Merge `overlay` onto `base`; `overlay` wins on conflict.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    let mut merged = base;
    merge_into(&mut merged, overlay);
    merged
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

/// Fold `layers` lowest precedence first.
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
