//! Id-deduplicated entity collections.

use indexmirror_protocol::{Entity, MergePolicy};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of merging records into a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
    /// Records with a new id, appended at the end.
    pub added: usize,
    /// Records that overwrote a cached id in place.
    pub replaced: usize,
    /// Records ignored because their id was already cached.
    pub skipped: usize,
}

impl MergeCounts {
    /// Adds another set of counts to this one.
    pub fn absorb(&mut self, other: MergeCounts) {
        self.added += other.added;
        self.replaced += other.replaced;
        self.skipped += other.skipped;
    }
}

/// An ordered collection of entities, unique by id.
///
/// Order is arrival order: records from the full load first, then newly
/// merged ids appended at the end. Replacing an id keeps its position.
/// Handed to readers as an immutable `Arc<Collection>` snapshot.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<Arc<Entity>>,
    index: HashMap<String, usize>,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from a full snapshot.
    ///
    /// A repeated id keeps its first position and its last value.
    pub fn from_records(records: Vec<Entity>) -> Self {
        let mut collection = Self {
            items: Vec::with_capacity(records.len()),
            index: HashMap::with_capacity(records.len()),
        };
        collection.merge(records, MergePolicy::Replace);
        collection
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks a record up by id.
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&slot| self.items[slot].as_ref())
    }

    /// Returns true if `id` is cached.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates over the records in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.items.iter().map(AsRef::as_ref)
    }

    /// Iterates over the ids in arrival order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.items.iter().map(|entity| entity.id())
    }

    /// Returns owned copies of every record.
    pub fn to_vec(&self) -> Vec<Entity> {
        self.iter().cloned().collect()
    }

    /// Merges `incoming` in order under `policy`.
    pub(crate) fn merge(&mut self, incoming: Vec<Entity>, policy: MergePolicy) -> MergeCounts {
        let mut counts = MergeCounts::default();
        for entity in incoming {
            match self.index.get(entity.id()) {
                Some(&slot) => match policy {
                    MergePolicy::Replace => {
                        self.items[slot] = Arc::new(entity);
                        counts.replaced += 1;
                    }
                    MergePolicy::SkipExisting => counts.skipped += 1,
                },
                None => {
                    self.index.insert(entity.id().to_owned(), self.items.len());
                    self.items.push(Arc::new(entity));
                    counts.added += 1;
                }
            }
        }
        counts
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = Box<dyn Iterator<Item = &'a Entity> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(id: &str, value: u64) -> Entity {
        Entity::from_value(json!({ "id": id, "value": value })).unwrap()
    }

    fn values(collection: &Collection) -> Vec<(String, u64)> {
        collection
            .iter()
            .map(|e| (e.id().to_owned(), e.get("value").and_then(|v| v.as_u64()).unwrap()))
            .collect()
    }

    #[test]
    fn appends_new_ids_in_order() {
        let mut collection = Collection::new();
        let counts = collection.merge(vec![entity("a", 1), entity("b", 2)], MergePolicy::SkipExisting);
        assert_eq!(counts.added, 2);
        assert_eq!(collection.ids().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut collection = Collection::from_records(vec![entity("a", 1), entity("b", 2)]);
        let counts = collection.merge(vec![entity("a", 10), entity("c", 3)], MergePolicy::Replace);
        assert_eq!(counts, MergeCounts { added: 1, replaced: 1, skipped: 0 });
        assert_eq!(
            values(&collection),
            [("a".into(), 10), ("b".into(), 2), ("c".into(), 3)]
        );
    }

    #[test]
    fn skip_keeps_cached_value() {
        let mut collection = Collection::from_records(vec![entity("a", 1)]);
        let counts = collection.merge(vec![entity("a", 10)], MergePolicy::SkipExisting);
        assert_eq!(counts, MergeCounts { added: 0, replaced: 0, skipped: 1 });
        assert_eq!(collection.get("a").unwrap().get("value"), Some(&json!(1)));
    }

    #[test]
    fn duplicates_within_a_snapshot_collapse() {
        let collection = Collection::from_records(vec![entity("a", 1), entity("b", 2), entity("a", 3)]);
        assert_eq!(collection.len(), 2);
        assert_eq!(values(&collection), [("a".into(), 3), ("b".into(), 2)]);
    }

    #[test]
    fn clones_do_not_share_mutation() {
        let original = Collection::from_records(vec![entity("a", 1)]);
        let mut copy = original.clone();
        copy.merge(vec![entity("b", 2)], MergePolicy::SkipExisting);
        assert_eq!(original.len(), 1);
        assert_eq!(copy.len(), 2);
        assert!(!original.contains("b"));
    }
}
