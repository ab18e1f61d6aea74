//! Property bag backing an asset descriptor and a producer's properties.
//!
//! The descriptor is the snapshot a master producer is rebuilt from, so it
//! must be cheap to clone and hash deterministically.
//! Hashing notes:
//! - `hash_all()` and `hash_filtered()` hash keys in sorted order for determinism.
//! - `AttrValue` hashes floats via `to_bits`; lists are hashed element-wise.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Generic attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Str(String),
    Int(i32),
    UInt(u32),
    Float(f32),
    Double(f64),
    List(Vec<String>),
}

impl std::hash::Hash for AttrValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use AttrValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Bool(v) => v.hash(state),
            Str(v) => v.hash(state),
            Int(v) => v.hash(state),
            UInt(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Double(v) => v.to_bits().hash(state),
            List(items) => items.iter().for_each(|s| s.hash(state)),
        }
    }
}

impl AttrValue {
    /// Render as the string form used when properties arrive from an edit
    /// command (every edit is a `key -> string` map).
    pub fn to_prop_string(&self) -> String {
        match self {
            AttrValue::Bool(v) => (if *v { "1" } else { "0" }).to_string(),
            AttrValue::Str(s) => s.clone(),
            AttrValue::Int(v) => v.to_string(),
            AttrValue::UInt(v) => v.to_string(),
            AttrValue::Float(v) => v.to_string(),
            AttrValue::Double(v) => v.to_string(),
            AttrValue::List(items) => items.join(";"),
        }
    }
}

/// Attribute container: string key -> typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs {
    #[serde(default)]
    map: HashMap<String, AttrValue>,
}

impl Attrs {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        self.map.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), AttrValue::Str(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.map.get(key) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Non-empty string value, `None` for missing or blank entries
    pub fn get_nonempty_str(&self, key: &str) -> Option<&str> {
        self.get_str(key).filter(|s| !s.is_empty())
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.map.get(key) {
            Some(AttrValue::Int(v)) => Some(*v),
            Some(AttrValue::UInt(v)) => i32::try_from(*v).ok(),
            Some(AttrValue::Str(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.map.get(key) {
            Some(AttrValue::UInt(v)) => Some(*v),
            Some(AttrValue::Int(v)) => u32::try_from(*v).ok(),
            Some(AttrValue::Str(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.map.get(key) {
            Some(AttrValue::Double(v)) => Some(*v),
            Some(AttrValue::Float(v)) => Some(*v as f64),
            Some(AttrValue::Int(v)) => Some(*v as f64),
            Some(AttrValue::Str(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key) {
            Some(AttrValue::Bool(v)) => Some(*v),
            Some(AttrValue::Int(v)) => Some(*v != 0),
            Some(AttrValue::Str(s)) => match s.as_str() {
                "1" | "true" => Some(true),
                "0" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        match self.map.get(key) {
            Some(AttrValue::List(items)) => Some(items),
            _ => None,
        }
    }

    /// Get i32 value with custom default
    pub fn get_i32_or(&self, key: &str, default: i32) -> i32 {
        self.get_i32(key).unwrap_or(default)
    }

    /// Get bool value with custom default
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Remove attribute by key
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.map.remove(key)
    }

    /// Iterate over all attributes (key, value)
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.map.iter()
    }

    /// Check if attribute exists
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Hash attributes with optional include/exclude filters.
    /// Keys are processed in sorted order for deterministic output.
    pub fn hash_filtered(&self, include: Option<&[&str]>, exclude: Option<&[&str]>) -> u64 {
        let include_set: Option<HashSet<&str>> = include.map(|v| v.iter().copied().collect());
        let exclude_set: Option<HashSet<&str>> = exclude.map(|v| v.iter().copied().collect());

        let mut keys: Vec<&String> = self.map.keys().collect();
        keys.sort_unstable();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for key in keys {
            if let Some(ref inc) = include_set {
                if !inc.contains(key.as_str()) {
                    continue;
                }
            }
            if let Some(ref exc) = exclude_set {
                if exc.contains(key.as_str()) {
                    continue;
                }
            }
            key.hash(&mut hasher);
            if let Some(val) = self.map.get(key) {
                val.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Hash all attributes.
    pub fn hash_all(&self) -> u64 {
        self.hash_filtered(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters_parse_strings() {
        let mut attrs = Attrs::new();
        attrs.set_str("length", "300");
        attrs.set_str("enabled", "1");
        attrs.set_str("speed", "1.5");

        assert_eq!(attrs.get_i32("length"), Some(300));
        assert_eq!(attrs.get_bool("enabled"), Some(true));
        assert_eq!(attrs.get_f64("speed"), Some(1.5));
        assert_eq!(attrs.get_i32("missing"), None);
    }

    #[test]
    fn test_hash_is_order_independent() {
        let mut a = Attrs::new();
        a.set_str("resource", "/tmp/a.mp4");
        a.set("length", AttrValue::Int(300));

        let mut b = Attrs::new();
        b.set("length", AttrValue::Int(300));
        b.set_str("resource", "/tmp/a.mp4");

        assert_eq!(a.hash_all(), b.hash_all());

        b.set_str("resource", "/tmp/b.mp4");
        assert_ne!(a.hash_all(), b.hash_all());
    }

    #[test]
    fn test_hash_filtered_excludes_runtime_keys() {
        let mut a = Attrs::new();
        a.set_str("resource", "/tmp/a.mp4");
        let mut b = a.clone();
        b.set_str("file_hash", "abcdef");

        let exclude = ["file_hash"];
        assert_eq!(a.hash_filtered(None, Some(&exclude)), b.hash_filtered(None, Some(&exclude)));
        assert_ne!(a.hash_all(), b.hash_all());
    }

    #[test]
    fn test_nonempty_str() {
        let mut attrs = Attrs::new();
        attrs.set_str("proxy", "");
        assert_eq!(attrs.get_nonempty_str("proxy"), None);
        attrs.set_str("proxy", "/tmp/p.mkv");
        assert_eq!(attrs.get_nonempty_str("proxy"), Some("/tmp/p.mkv"));
    }
}
