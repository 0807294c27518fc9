//! The attribute bag behind every model.

use crate::value::{Attributes, Row, Value};
use indexmap::IndexMap;

/// Records attached to a parent under a relation name.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Related {
    fn to_value(&self) -> Value {
        match self {
            Related::One(Some(record)) => Value::Object(record.to_object()),
            Related::One(None) => Value::Null,
            Related::Many(records) => {
                Value::Array(records.iter().map(|r| Value::Object(r.to_object())).collect())
            }
        }
    }
}

/// Current attributes plus the last-synced baseline used for dirty checks.
///
/// `original` equals `attributes` right after hydration or a successful save.
/// A key is dirty when its current value differs structurally from the
/// baseline (or is missing from it).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: String,
    primary_key: String,
    attributes: Attributes,
    original: Attributes,
    exists: bool,
    relations: IndexMap<String, Related>,
    hidden: &'static [&'static str],
    visible: &'static [&'static str],
}

impl Record {
    /// A fresh, non-persisted record.
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            attributes: Attributes::new(),
            original: Attributes::new(),
            exists: false,
            relations: IndexMap::new(),
            hidden: &[],
            visible: &[],
        }
    }

    /// Restrict [`Record::to_object`] output.
    ///
    /// A non-empty `visible` list wins; otherwise `hidden` keys are dropped.
    pub fn with_visibility(
        mut self,
        hidden: &'static [&'static str],
        visible: &'static [&'static str],
    ) -> Self {
        self.hidden = hidden;
        self.visible = visible;
        self
    }

    /// Turn a fetched row into an existing record with a clean baseline.
    pub fn hydrate(mut self, row: Row) -> Self {
        self.attributes = row;
        self.exists = true;
        self.sync_original();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn original(&self) -> &Attributes {
        &self.original
    }

    /// Value of the primary key attribute.
    pub fn get_key(&self) -> Option<&Value> {
        self.attributes.get(&self.primary_key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Assign every pair in `attributes`.
    pub fn fill<I, K, V>(&mut self, attributes: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in attributes {
            self.set(key, value);
        }
        self
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes.keys().any(|k| self.is_dirty_key(k))
    }

    pub fn is_dirty_key(&self, key: &str) -> bool {
        match (self.attributes.get(key), self.original.get(key)) {
            (Some(current), Some(original)) => current != original,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Attributes that changed since the last sync, in attribute order.
    pub fn get_dirty(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(k, _)| self.is_dirty_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Make the current attributes the new baseline.
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Replace all attributes and resync (used after a refresh).
    pub fn replace_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
        self.sync_original();
    }

    /// Plain key/value export: visible attributes followed by loaded relations.
    pub fn to_object(&self) -> Attributes {
        let mut out: Attributes = self
            .attributes
            .iter()
            .filter(|(k, _)| self.is_visible(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, related) in &self.relations {
            if self.is_visible(name) {
                out.insert(name.clone(), related.to_value());
            }
        }
        out
    }

    fn is_visible(&self, key: &str) -> bool {
        if !self.visible.is_empty() {
            return self.visible.contains(&key);
        }
        !self.hidden.contains(&key)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &IndexMap<String, Related> {
        &self.relations
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }
}
