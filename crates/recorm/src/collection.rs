//! Ordered model collections.

use crate::model::Model;
use crate::value::{Attributes, Value};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::cmp::Ordering;
use std::collections::HashSet;

/// An ordered list of models returned by [`RecordBuilder::get`](crate::RecordBuilder::get).
///
/// Filtering and sorting methods consume the collection and return a new
/// one; lookups borrow. Key-based operations use the model's primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<M> {
    items: Vec<M>,
}

impl<M> Default for Collection<M> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<M: Model> Collection<M> {
    pub fn new(items: Vec<M>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, M> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, M> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[M] {
        &self.items
    }

    pub fn push(&mut self, model: M) {
        self.items.push(model);
    }

    pub fn into_vec(self) -> Vec<M> {
        self.items
    }

    // ==================== Positional access ====================

    pub fn first(&self) -> Option<&M> {
        self.items.first()
    }

    pub fn first_where(&self, predicate: impl Fn(&M) -> bool) -> Option<&M> {
        self.items.iter().find(|m| predicate(m))
    }

    pub fn last(&self) -> Option<&M> {
        self.items.last()
    }

    pub fn last_where(&self, predicate: impl Fn(&M) -> bool) -> Option<&M> {
        self.items.iter().rev().find(|m| predicate(m))
    }

    // ==================== Filtering ====================

    /// Keep the models matching `predicate`.
    pub fn filter(self, predicate: impl Fn(&M) -> bool) -> Self {
        self.items.into_iter().filter(|m| predicate(m)).collect()
    }

    /// Drop the models matching `predicate`.
    pub fn reject(self, predicate: impl Fn(&M) -> bool) -> Self {
        self.items.into_iter().filter(|m| !predicate(m)).collect()
    }

    /// Map every model into an arbitrary value.
    pub fn map_into<T>(&self, f: impl FnMut(&M) -> T) -> Vec<T> {
        self.items.iter().map(f).collect()
    }

    /// Drop models whose primary key was already seen, keeping the first.
    /// Models without a key (not yet saved) are always kept.
    pub fn unique(self) -> Self {
        let mut seen = HashSet::new();
        self.items
            .into_iter()
            .filter(|m| match m.get_key().filter(|k| !k.is_null()) {
                Some(key) => seen.insert(identity(Some(key))),
                None => true,
            })
            .collect()
    }

    /// Drop models whose `attribute` value was already seen, keeping the first.
    /// Models missing the attribute share one key.
    pub fn unique_by(self, attribute: &str) -> Self {
        self.unique_with(|m| m.get(attribute))
    }

    fn unique_with(self, key: impl Fn(&M) -> Option<Value>) -> Self {
        let mut seen = HashSet::new();
        self.items
            .into_iter()
            .filter(|m| seen.insert(identity(key(m).as_ref())))
            .collect()
    }

    /// Models whose primary key is in `keys`.
    pub fn where_in<I, V>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let keys = key_set(keys);
        self.filter(|m| keys.contains(&identity(m.get_key())))
    }

    /// Models whose primary key is not in `keys`.
    pub fn where_not_in<I, V>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let keys = key_set(keys);
        self.reject(|m| keys.contains(&identity(m.get_key())))
    }

    /// Alias of [`Collection::where_in`].
    pub fn only<I, V>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_in(keys)
    }

    /// Alias of [`Collection::where_not_in`].
    pub fn except<I, V>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_not_in(keys)
    }

    /// Split into sub-collections keyed by the stringified `attribute`
    /// value, groups in first-seen order. Missing values group under `""`.
    pub fn group_by(self, attribute: &str) -> IndexMap<String, Collection<M>> {
        let mut groups: IndexMap<String, Collection<M>> = IndexMap::new();
        for model in self.items {
            let key = model.get(attribute).map(|v| v.to_string()).unwrap_or_default();
            groups.entry(key).or_default().push(model);
        }
        groups
    }

    // ==================== Sorting ====================
    //
    // All sorts are stable: models comparing equal keep their relative order.

    pub fn sort_by(self, attribute: &str) -> Self {
        self.sort_with(|a, b| compare_attr(a, b, attribute))
    }

    pub fn sort_by_desc(self, attribute: &str) -> Self {
        self.sort_with(|a, b| compare_attr(b, a, attribute))
    }

    pub fn sort_with(mut self, mut compare: impl FnMut(&M, &M) -> Ordering) -> Self {
        self.items.sort_by(|a, b| compare(a, b));
        self
    }

    pub fn sort_with_desc(mut self, mut compare: impl FnMut(&M, &M) -> Ordering) -> Self {
        self.items.sort_by(|a, b| compare(b, a));
        self
    }

    // ==================== Slicing ====================

    /// Split into collections of at most `size` models. A zero size yields
    /// no chunks.
    pub fn chunk(self, size: usize) -> Vec<Collection<M>> {
        if size == 0 {
            return Vec::new();
        }
        let mut chunks = Vec::with_capacity(self.items.len().div_ceil(size));
        let mut current = Vec::with_capacity(size);
        for model in self.items {
            current.push(model);
            if current.len() == size {
                chunks.push(Collection::new(std::mem::replace(
                    &mut current,
                    Vec::with_capacity(size),
                )));
            }
        }
        if !current.is_empty() {
            chunks.push(Collection::new(current));
        }
        chunks
    }

    pub fn take(self, n: usize) -> Self {
        self.items.into_iter().take(n).collect()
    }

    pub fn skip(self, n: usize) -> Self {
        self.items.into_iter().skip(n).collect()
    }

    // ==================== Aggregates ====================

    /// Sum of `attribute`; missing or non-numeric values count as `0`.
    pub fn sum(&self, attribute: &str) -> f64 {
        self.numbers(attribute).sum()
    }

    /// Mean of `attribute`; `0` for an empty collection.
    pub fn avg(&self, attribute: &str) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        self.sum(attribute) / self.items.len() as f64
    }

    /// Smallest `attribute`; `None` only when the collection is empty.
    pub fn min(&self, attribute: &str) -> Option<f64> {
        self.numbers(attribute).reduce(f64::min)
    }

    /// Largest `attribute`; `None` only when the collection is empty.
    pub fn max(&self, attribute: &str) -> Option<f64> {
        self.numbers(attribute).reduce(f64::max)
    }

    fn numbers<'a>(&'a self, attribute: &'a str) -> impl Iterator<Item = f64> + 'a {
        self.items.iter().map(move |m| {
            m.get(attribute)
                .and_then(|v| v.to_number())
                .unwrap_or(0.0)
        })
    }

    // ==================== Lookup ====================

    /// Model with primary key `key`.
    pub fn find(&self, key: impl Into<Value>) -> Option<&M> {
        let key = key.into();
        self.items.iter().find(|m| m.get_key() == Some(&key))
    }

    pub fn find_where(&self, predicate: impl Fn(&M) -> bool) -> Option<&M> {
        self.first_where(predicate)
    }

    /// Whether a model with primary key `key` is present.
    pub fn contains(&self, key: impl Into<Value>) -> bool {
        self.find(key).is_some()
    }

    pub fn contains_where(&self, predicate: impl Fn(&M) -> bool) -> bool {
        self.items.iter().any(predicate)
    }

    /// Primary keys of every model that has one.
    pub fn model_keys(&self) -> Vec<Value> {
        self.items
            .iter()
            .filter_map(|m| m.get_key().cloned())
            .collect()
    }

    /// `attribute` of every model; missing values are `Null`.
    pub fn pluck(&self, attribute: &str) -> Vec<Value> {
        self.items
            .iter()
            .map(|m| m.get(attribute).unwrap_or_default())
            .collect()
    }

    // ==================== Export ====================

    pub fn to_array(&self) -> Vec<Attributes> {
        self.items.iter().map(Model::to_object).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.items.iter().map(Model::to_json).collect())
    }
}

/// Distinguishes `Int(1)` from `Text("1")` while still hashing.
fn identity(value: Option<&Value>) -> String {
    match value {
        Some(v) => format!("{}:{}", v.type_name(), v),
        None => String::from("missing"),
    }
}

fn key_set<I, V>(keys: I) -> HashSet<String>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    keys.into_iter()
        .map(|k| identity(Some(&k.into())))
        .collect()
}

fn compare_attr<M: Model>(a: &M, b: &M, attribute: &str) -> Ordering {
    let a = a.get(attribute).unwrap_or_default();
    let b = b.get(attribute).unwrap_or_default();
    a.compare(&b)
}

impl<M: Model> Serialize for Collection<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for model in &self.items {
            seq.serialize_element(&model.to_object())?;
        }
        seq.end()
    }
}

impl<M> From<Vec<M>> for Collection<M> {
    fn from(items: Vec<M>) -> Self {
        Self { items }
    }
}

impl<M> FromIterator<M> for Collection<M> {
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<M> IntoIterator for Collection<M> {
    type Item = M;
    type IntoIter = std::vec::IntoIter<M>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, M> IntoIterator for &'a Collection<M> {
    type Item = &'a M;
    type IntoIter = std::slice::Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use crate::model::Record;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        record: Record,
    }

    impl Model for Item {
        const TABLE: &'static str = "items";

        fn from_record(record: Record) -> Self {
            Self { record }
        }

        fn record(&self) -> &Record {
            &self.record
        }

        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }
    }

    fn items() -> Collection<Item> {
        [
            attrs! { "id" => 1, "kind" => "a", "price" => 30 },
            attrs! { "id" => 2, "kind" => "b", "price" => 10 },
            attrs! { "id" => 3, "kind" => "a", "price" => 20 },
            attrs! { "id" => 4, "kind" => "b", "price" => 10 },
            attrs! { "id" => 5, "kind" => "c" },
        ]
        .into_iter()
        .map(Item::hydrate)
        .collect()
    }

    fn ids(items: &Collection<Item>) -> Vec<i64> {
        items
            .iter()
            .filter_map(|m| m.get_key().and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn sorts_are_stable() {
        let sorted = items().sort_by("price");
        assert_eq!(ids(&sorted), vec![5, 2, 4, 3, 1]);

        let sorted = items().sort_by_desc("price");
        assert_eq!(ids(&sorted), vec![1, 3, 2, 4, 5]);

        let sorted = items().sort_with_desc(|a, b| compare_attr(a, b, "kind"));
        assert_eq!(ids(&sorted), vec![5, 2, 4, 1, 3]);
    }

    #[test]
    fn unique_keeps_first_seen() {
        let mut list = items().into_vec();
        list.push(Item::hydrate(attrs! { "id" => 2, "kind" => "dup" }));
        list.push(Item::hydrate(attrs! { "id" => "2", "kind" => "text key" }));
        let unique = Collection::new(list).unique();
        assert_eq!(unique.len(), 6);
        assert_eq!(unique.find(2).unwrap().get("kind"), Some(Value::from("b")));

        let unsaved: Collection<Item> = (0..3)
            .map(|n| Item::make(attrs! { "kind" => "draft", "n" => n }))
            .chain([Item::hydrate(attrs! { "id" => 1 }), Item::hydrate(attrs! { "id" => 1 })])
            .collect();
        assert_eq!(unsaved.unique().len(), 4);

        let by_kind = items().unique_by("kind");
        assert_eq!(ids(&by_kind), vec![1, 2, 5]);
    }

    #[test]
    fn key_filters() {
        assert_eq!(ids(&items().where_in([1, 3, 9])), vec![1, 3]);
        assert_eq!(ids(&items().where_not_in([1, 3])), vec![2, 4, 5]);
        assert_eq!(ids(&items().only(["1"])), Vec::<i64>::new());
        assert_eq!(ids(&items().except(Vec::<i64>::new())), vec![1, 2, 3, 4, 5]);
        assert!(items().contains(4));
        assert!(!items().contains(6));
        assert_eq!(items().model_keys().len(), 5);
    }

    #[test]
    fn group_by_preserves_first_seen_order() {
        let groups = items().group_by("kind");
        assert_eq!(groups.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(ids(&groups["a"]), vec![1, 3]);
        assert_eq!(ids(&groups["b"]), vec![2, 4]);
    }

    #[test]
    fn aggregates_treat_missing_as_zero() {
        let all = items();
        assert_eq!(all.sum("price"), 70.0);
        assert_eq!(all.avg("price"), 14.0);
        assert_eq!(all.min("price"), Some(0.0));
        assert_eq!(all.max("price"), Some(30.0));

        let empty = Collection::<Item>::default();
        assert_eq!(empty.sum("price"), 0.0);
        assert_eq!(empty.avg("price"), 0.0);
        assert_eq!(empty.min("price"), None);
        assert_eq!(empty.max("price"), None);
    }

    #[test]
    fn chunk_and_slices() {
        let sizes: Vec<usize> = items().chunk(2).iter().map(Collection::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(items().chunk(0).is_empty());

        assert_eq!(ids(&items().skip(1).take(2)), vec![2, 3]);
        assert_eq!(
            items().first_where(|m| m.get("kind") == Some(Value::from("b"))).and_then(|m| m.get("id")),
            Some(Value::Int(2))
        );
        assert_eq!(
            items().last_where(|m| m.get("kind") == Some(Value::from("b"))).and_then(|m| m.get("id")),
            Some(Value::Int(4))
        );
    }

    #[test]
    fn pluck_and_export() {
        let all = items();
        assert_eq!(all.pluck("price")[4], Value::Null);
        assert_eq!(all.to_array().len(), 5);

        let json = serde_json::to_value(&all).unwrap();
        assert_eq!(json, all.to_json());
        assert_eq!(json[0]["kind"], serde_json::json!("a"));
    }
}
