//! Insertion-ordered string attribute maps.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// A string→string attribute map that preserves insertion order.
///
/// Attribute sets are small operator metadata (a handful of entries), so
/// lookups scan linearly. Inserting an existing key replaces the value in
/// place without changing its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Union with `other`: entries already present keep their value.
    pub fn merged_with(&self, other: &Attributes) -> Attributes {
        let mut merged = self.clone();
        for (k, v) in other.iter() {
            if !merged.contains_key(k) {
                merged.0.push((k.to_string(), v.to_string()));
            }
        }
        merged
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AttrVisitor;

        impl<'de> Visitor<'de> for AttrVisitor {
            type Value = Attributes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of string attributes")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut attrs = Attributes::new();
                while let Some((key, value)) = map.next_entry::<String, String>()? {
                    attrs.insert(key, value);
                }
                Ok(attrs)
            }
        }

        deserializer.deserialize_map(AttrVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut attrs = Attributes::new();
        attrs.insert("zebra", "1");
        attrs.insert("alpha", "2");
        attrs.insert("mango", "3");
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["zebra", "alpha", "mango"]);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut attrs = Attributes::new();
        attrs.insert("a", "1");
        attrs.insert("b", "2");
        attrs.insert("a", "3");
        assert_eq!(attrs.get("a"), Some("3"));
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn merged_with_keeps_existing() {
        let mut a = Attributes::new();
        a.insert("k", "local");
        let mut b = Attributes::new();
        b.insert("k", "remote");
        b.insert("extra", "x");
        let merged = a.merged_with(&b);
        assert_eq!(merged.get("k"), Some("local"));
        assert_eq!(merged.get("extra"), Some("x"));
    }

    #[test]
    fn deserializes_in_document_order() {
        let attrs: Attributes =
            serde_json::from_str(r#"{"vm-name":"web-0","namespace":"prod","zone":"a"}"#).unwrap();
        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["vm-name", "namespace", "zone"]);
    }
}
