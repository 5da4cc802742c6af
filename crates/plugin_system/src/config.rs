//! Per-plugin configuration store.
//!
//! Each plugin declares a schema — a JSON object tree of defaults — and
//! reads/writes values by dotted path. Unset paths fall back to the schema
//! default; nothing is persisted, the store lives as long as the runtime.

use serde_json::Value;
use std::sync::RwLock;
use tracing::warn;

#[derive(Debug)]
pub struct PluginConfigStore {
    schema: Value,
    values: RwLock<Value>,
}

impl PluginConfigStore {
    /// Creates a store from the declared default schema. A non-object
    /// schema is treated as empty.
    pub fn new(plugin: &str, schema: Value) -> Self {
        let schema = if schema.is_object() {
            schema
        } else {
            if !schema.is_null() {
                warn!("Plugin {plugin} declared a non-object config schema; ignored");
            }
            Value::Object(Default::default())
        };
        Self {
            schema,
            values: RwLock::new(Value::Object(Default::default())),
        }
    }

    /// Reads the value at a dotted path, falling back to the schema default.
    pub fn get(&self, path: &str) -> Option<Value> {
        if let Ok(values) = self.values.read() {
            if let Some(value) = lookup(&values, path) {
                return Some(value.clone());
            }
        }
        lookup(&self.schema, path).cloned()
    }

    /// Typed convenience getters over [`Self::get`].
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|value| value.as_bool())
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|value| value.as_u64())
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|value| value.as_str().map(String::from))
    }

    /// Writes a value at a dotted path, creating intermediate objects.
    /// A path segment that collides with a non-object value replaces it.
    pub fn set(&self, path: &str, value: Value) {
        let Ok(mut values) = self.values.write() else {
            return;
        };
        let mut current = &mut *values;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if !current.is_object() {
                *current = Value::Object(Default::default());
            }
            let Some(map) = current.as_object_mut() else {
                return;
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                return;
            }
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> PluginConfigStore {
        PluginConfigStore::new(
            "nick_detect",
            json!({
                "alerts": { "enabled": true, "delay_secs": 2 },
                "prefix": "[NICK]",
            }),
        )
    }

    #[test]
    fn unset_paths_fall_back_to_schema() {
        let store = store();
        assert_eq!(store.get_bool("alerts.enabled"), Some(true));
        assert_eq!(store.get_u64("alerts.delay_secs"), Some(2));
        assert_eq!(store.get_string("prefix").as_deref(), Some("[NICK]"));
        assert_eq!(store.get("alerts.missing"), None);
    }

    #[test]
    fn set_overrides_schema_default() {
        let store = store();
        store.set("alerts.enabled", json!(false));
        assert_eq!(store.get_bool("alerts.enabled"), Some(false));
        // Sibling defaults are untouched.
        assert_eq!(store.get_u64("alerts.delay_secs"), Some(2));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let store = store();
        store.set("deep.nested.value", json!(42));
        assert_eq!(store.get_u64("deep.nested.value"), Some(42));
    }

    #[test]
    fn non_object_schema_is_ignored() {
        let store = PluginConfigStore::new("broken", json!("not an object"));
        assert_eq!(store.get("anything"), None);
        store.set("anything", json!(1));
        assert_eq!(store.get_u64("anything"), Some(1));
    }
}
