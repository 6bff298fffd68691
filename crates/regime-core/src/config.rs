use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

/// Nested configuration addressed by dotted-path keys.
///
/// Values are JSON-shaped (`null | bool | i64 | f64 | string | array |
/// object`). Lookups never fail: a missing key yields `None` and callers
/// fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    root: Value,
}

impl Config {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(value: Value) -> Self {
        Self { root: value }
    }

    pub fn from_object(object: Map<String, Value>) -> Self {
        Self {
            root: Value::Object(object),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Walk a dotted path (`"hmm.states"`) into the nested object tree.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Set a value at a dotted path, creating intermediate objects.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        if !self.root.is_object() {
            self.root = Value::Object(Map::new());
        }
        let mut current = &mut self.root;
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments[..segments.len() - 1] {
            let map = current.as_object_mut().expect("object invariant");
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
        }
        let map = current.as_object_mut().expect("object invariant");
        map.insert(segments[segments.len() - 1].to_string(), value.into());
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_path(path)?.as_bool()
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get_path(path)?.as_i64()
    }

    /// Integer values widen to float here so `{"bps": 10}` and
    /// `{"bps": 10.0}` read the same.
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        let value = self.get_path(path)?;
        value.as_f64()
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_path(path)?.as_str()
    }

    pub fn get_array(&self, path: &str) -> Option<&Vec<Value>> {
        self.get_path(path)?.as_array()
    }

    pub fn get_object(&self, path: &str) -> Option<&Map<String, Value>> {
        self.get_path(path)?.as_object()
    }

    /// Sub-config rooted at an object value, used for nested detector and
    /// regime-limit blocks.
    pub fn sub_config(&self, path: &str) -> Option<Config> {
        Some(Config::from_value(Value::Object(
            self.get_object(path)?.clone(),
        )))
    }
}

/// Expected value shape for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Bool,
    Int,
    Float,
    String,
    Array,
    Object,
}

impl SchemaKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaKind::Bool => value.is_boolean(),
            SchemaKind::Int => value.is_i64() || value.is_u64(),
            // Integers widen, same as Config::get_f64.
            SchemaKind::Float => value.is_number(),
            SchemaKind::String => value.is_string(),
            SchemaKind::Array => value.is_array(),
            SchemaKind::Object => value.is_object(),
        }
    }
}

/// One field of a plugin configuration schema.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub key: String,
    pub kind: SchemaKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl SchemaField {
    pub fn required(key: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(key: impl Into<String>, kind: SchemaKind, default: Option<Value>) -> Self {
        Self {
            key: key.into(),
            kind,
            required: false,
            default,
        }
    }
}

/// Declarative schema a plugin can expose for its configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    pub fields: Vec<SchemaField>,
}

impl ConfigSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    /// Fill in defaults for absent optional fields.
    pub fn apply_defaults(&self, config: &Config) -> Config {
        let mut out = config.clone();
        for field in &self.fields {
            if out.get_path(&field.key).is_none() {
                if let Some(default) = &field.default {
                    out.set_path(&field.key, default.clone());
                }
            }
        }
        out
    }

    /// Check required fields are present and all known fields have the
    /// declared shape.
    pub fn validate(&self, config: &Config) -> EngineResult<()> {
        for field in &self.fields {
            match config.get_path(&field.key) {
                None if field.required => {
                    return Err(EngineError::invalid_argument(format!(
                        "Missing required config key '{}'",
                        field.key
                    )));
                }
                None => {}
                Some(value) => {
                    if !field.kind.matches(value) {
                        return Err(EngineError::invalid_argument(format!(
                            "Config key '{}' has wrong type",
                            field.key
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
