//! Per-entity print-setting overrides
//!
//! Objects, volumes and materials each carry a small string-keyed override
//! map layered over the global print configuration, which this crate never
//! mutates. The map has its own [`ObjectId`] (override sets are first-class
//! entities for undo/redo diffing) and a [`Timestamp`] bumped by every
//! mutation, so consumers can detect setting changes without comparing maps.

use std::collections::BTreeMap;

use crate::id::{ObjectId, Timestamp};

/// One override value
///
/// The global configuration knows hundreds of typed options; the model layer
/// only ever stores and forwards them, so a small closed set of shapes is
/// enough.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConfigValue {
    /// Integer option (extruder indices, counts)
    Int(i32),
    /// Floating-point option (widths, speeds)
    Float(f64),
    /// Boolean switch
    Bool(bool),
    /// Free-form string option
    Str(String),
    /// Per-extruder float vector
    Floats(Vec<f64>),
    /// Per-extruder string vector
    Strings(Vec<String>),
}

impl ConfigValue {
    /// Integer payload, if this is an [`ConfigValue::Int`]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if this is a [`ConfigValue::Float`]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Bool payload, if this is a [`ConfigValue::Bool`]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is a [`ConfigValue::Str`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Float-vector payload, if this is a [`ConfigValue::Floats`]
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            ConfigValue::Floats(v) => Some(v),
            _ => None,
        }
    }

    /// String-vector payload, if this is a [`ConfigValue::Strings`]
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            ConfigValue::Strings(v) => Some(v),
            _ => None,
        }
    }
}

/// Identified, timestamped override map
///
/// `Clone` preserves the id (copy semantics); use
/// [`ObjectConfig::clone_without_id`] when the duplicate must be a distinct
/// entity.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectConfig {
    id: ObjectId,
    #[cfg_attr(feature = "serde", serde(skip))]
    timestamp: Timestamp,
    options: BTreeMap<String, ConfigValue>,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        ObjectConfig {
            id: ObjectId::next(),
            timestamp: Timestamp::initial(),
            options: BTreeMap::new(),
        }
    }
}

impl ObjectConfig {
    /// Empty override map with a fresh identity
    pub fn new() -> Self {
        ObjectConfig::default()
    }

    /// Identity of this override set
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Give this override set a distinct identity; used when an owner is
    /// cloned rather than copied
    pub fn set_new_unique_id(&mut self) {
        self.id = ObjectId::next();
    }

    /// Change counter, bumped on every mutation
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Cheap "nothing changed" check used by background-job diffing
    pub fn id_and_timestamp_match(&self, other: &ObjectConfig) -> bool {
        self.id == other.id && self.timestamp.matches(other.timestamp)
    }

    /// True iff no options are stored
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Number of stored options
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Look up one option
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.options.get(key)
    }

    /// True iff `key` is stored
    pub fn contains(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }

    /// Key/value pairs in sorted key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert or replace one option
    ///
    /// Always bumps the timestamp, even when the stored value is unchanged;
    /// callers rely on a set being visible as an edit.
    pub fn set(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.options.insert(key.into(), value);
        self.timestamp.touch();
    }

    /// Remove one option; returns whether it was present
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.options.remove(key).is_some();
        if removed {
            self.timestamp.touch();
        }
        removed
    }

    /// Drop all options
    pub fn clear(&mut self) {
        self.options.clear();
        self.timestamp.touch();
    }

    /// Layer every option of `other` over this map (overwriting collisions)
    pub fn apply(&mut self, other: &ObjectConfig) {
        for (key, value) in &other.options {
            self.options.insert(key.clone(), value.clone());
        }
        self.timestamp.touch();
    }

    /// Copy-assign from `other`: identity, content and timestamp
    ///
    /// The content copy is skipped when the timestamps already match.
    pub fn assign(&mut self, other: &ObjectConfig) {
        self.id = other.id;
        if !self.timestamp.matches(other.timestamp) {
            self.options = other.options.clone();
            self.timestamp = other.timestamp;
        }
    }

    /// Duplicate content under a brand-new id
    pub fn clone_without_id(&self) -> ObjectConfig {
        ObjectConfig {
            id: ObjectId::next(),
            timestamp: self.timestamp,
            options: self.options.clone(),
        }
    }
}

impl PartialEq for ObjectConfig {
    /// Content equality; identity and timestamps are deliberately ignored
    fn eq(&self, other: &Self) -> bool {
        self.options == other.options
    }
}

/// Layered option lookup: the local override wins, otherwise the global
/// configuration provides the value
pub fn config_value<'a>(
    local: &'a ObjectConfig,
    global: &'a ObjectConfig,
    key: &str,
) -> Option<&'a ConfigValue> {
    local.get(key).or_else(|| global.get(key))
}

/// Resolve the extruder printing a volume
///
/// The volume's own "extruder" override wins unless it is absent or zero
/// (zero means "inherit"); then the owning object's override is consulted,
/// and a missing value defaults to extruder 1.
pub fn extruder_id(volume_config: &ObjectConfig, object_config: &ObjectConfig) -> i32 {
    let mut opt = volume_config.get("extruder").and_then(ConfigValue::as_int);
    if opt.is_none() || opt == Some(0) {
        opt = object_config.get("extruder").and_then(ConfigValue::as_int);
    }
    opt.unwrap_or(1)
}
