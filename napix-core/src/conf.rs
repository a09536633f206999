//! Configuration trees with dotted-path access.
//!
//! A [`Conf`] wraps a JSON object loaded from a YAML or JSON file. Keys are
//! addressed either literally or by their dotted path:
//!
//! ```
//! use napix_core::conf::Conf;
//!
//! let conf = Conf::from_json_str(r#"{ "a": { "b": 1 } }"#).unwrap();
//! assert_eq!(conf.int("a.b"), Some(1));
//! ```
//!
//! Keys beginning with `#` are comments; they are kept in the tree but
//! skipped when iterating.

use std::path::Path;

use serde_json::{Map, Value};

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfError {
    /// An I/O error occurred while reading a config file.
    Io(std::io::Error),
    /// The file content could not be parsed.
    Parse(String),
    /// The parsed document is not a mapping at the top level.
    NotAMapping,
}

impl std::fmt::Display for ConfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfError::Io(err) => write!(f, "Config read error: {err}"),
            ConfError::Parse(msg) => write!(f, "Config parse error: {msg}"),
            ConfError::NotAMapping => write!(f, "Config root must be a mapping"),
        }
    }
}

impl std::error::Error for ConfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfError {
    fn from(err: std::io::Error) -> Self {
        ConfError::Io(err)
    }
}

/// An immutable configuration subtree.
#[derive(Debug, Clone, Default)]
pub struct Conf {
    data: Map<String, Value>,
}

impl Conf {
    /// An empty configuration.
    pub fn new() -> Self {
        Conf::default()
    }

    /// Wrap a JSON value. `Null` yields an empty conf; anything other than
    /// an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, ConfError> {
        match value {
            Value::Object(data) => Ok(Conf { data }),
            Value::Null => Ok(Conf::new()),
            _ => Err(ConfError::NotAMapping),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfError> {
        let value: Value =
            serde_json::from_str(content).map_err(|err| ConfError::Parse(err.to_string()))?;
        Conf::from_value(value)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfError> {
        let value: Value =
            serde_yaml::from_str(content).map_err(|err| ConfError::Parse(err.to_string()))?;
        Conf::from_value(value)
    }

    /// Load a configuration file, dispatching on the extension
    /// (`.yaml`/`.yml` parse as YAML, everything else as JSON).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Conf::from_yaml_str(&content),
            _ => Conf::from_json_str(&content),
        }
    }

    /// Look up a value by literal key first, then by dotted path.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(key) {
            return Some(value);
        }
        let mut current: &Value = self.data.get(key.split('.').next()?)?;
        for segment in key.split('.').skip(1) {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    /// The subtree under `key`, empty when the key is absent or not a
    /// mapping.
    pub fn section(&self, key: &str) -> Conf {
        match self.get(key) {
            Some(Value::Object(data)) => Conf { data: data.clone() },
            _ => Conf::new(),
        }
    }

    /// Iterate the top-level keys, skipping `#`-prefixed comment keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data
            .keys()
            .map(String::as_str)
            .filter(|key| !key.starts_with('#'))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
