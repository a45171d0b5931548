//! Local backend: the whole catalog as one JSON document.
//!
//! Every mutation runs against a copy of the document. The copy is written
//! to a temporary file next to the target and renamed over it; only then
//! does it replace the in-memory state. A failed write leaves both the file
//! and the in-memory state as they were. A crash between rename and the
//! in-memory swap is an accepted window.
//!
//! The store is single-threaded: mutating methods take `&mut self`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{BackendKind, CatalogStore, SeedPolicy, now, seed_sample, unknown_collection};
use crate::error::Result;
use crate::filter::TaggedItem;
use crate::models::{
    Collection, CollectionId, CollectionPatch, CollectionSummary, Item, ItemId, ItemPatch,
    LegacyField, NewItem, Tag, TagId, TagPair, clean_text, dedup_pairs, validate_collection_name,
};
use crate::vocabulary::sorted_distinct;

/// An edge between an item and a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub item_id: ItemId,
    pub tag_id: TagId,
}

/// The persisted state of a [`JsonStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl CatalogDocument {
    fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collections.iter().find(|collection| collection.id == id)
    }

    fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.iter().find(|tag| tag.id == id)
    }

    fn next_collection_id(&self) -> CollectionId {
        let max = self.collections.iter().map(|c| c.id.get()).max();
        CollectionId::new(max.unwrap_or(0) + 1)
    }

    fn next_item_id(&self) -> ItemId {
        let max = self.items.iter().map(|item| item.id.get()).max();
        ItemId::new(max.unwrap_or(0) + 1)
    }

    fn next_tag_id(&self) -> TagId {
        let max = self.tags.iter().map(|tag| tag.id.get()).max();
        TagId::new(max.unwrap_or(0) + 1)
    }

    fn upsert_tag(&mut self, key: &str, value: &str) -> Tag {
        if let Some(existing) = self.tags.iter().find(|tag| tag.matches(key, value)) {
            return existing.clone();
        }
        let tag = Tag {
            id: self.next_tag_id(),
            key: key.to_string(),
            value: value.to_string(),
        };
        self.tags.push(tag.clone());
        tag
    }

    fn associate(&mut self, item_id: ItemId, tag_id: TagId) {
        let edge = Association { item_id, tag_id };
        if !self.associations.contains(&edge) {
            self.associations.push(edge);
        }
    }

    fn tag_item(&mut self, item_id: ItemId, pairs: &[TagPair]) {
        for pair in dedup_pairs(pairs) {
            let tag = self.upsert_tag(&pair.key, &pair.value);
            self.associate(item_id, tag.id);
        }
    }

    fn insert_item(&mut self, fields: NewItem, now: time::OffsetDateTime) -> Result<Item> {
        if self.collection(fields.collection_id).is_none() {
            return Err(unknown_collection(fields.collection_id));
        }
        let item = Item::from_new(self.next_item_id(), fields, now);
        self.items.push(item.clone());
        Ok(item)
    }

    fn remove_items(&mut self, doomed: impl Fn(&Item) -> bool) -> usize {
        let removed: Vec<ItemId> = self
            .items
            .iter()
            .filter(|item| doomed(item))
            .map(|item| item.id)
            .collect();
        self.items.retain(|item| !removed.contains(&item.id));
        self.associations
            .retain(|edge| !removed.contains(&edge.item_id));
        removed.len()
    }

    fn explicit_pairs(&self, item_id: ItemId) -> Vec<TagPair> {
        self.associations
            .iter()
            .filter(|edge| edge.item_id == item_id)
            .filter_map(|edge| self.tag(edge.tag_id))
            .map(Tag::pair)
            .collect()
    }
}

/// Catalog kept in memory and flushed to a JSON file after every mutation.
///
/// # Examples
///
/// ```
/// use tunebook::{CatalogStore, ItemFilters, JsonStore, NewItem};
///
/// # fn main() -> tunebook::Result<()> {
/// let mut store = JsonStore::in_memory();
/// let standards = store.create_collection("Standards", None)?;
/// store.create_item(NewItem::new(standards.id, "Misty").musical_key("Eb"), &[])?;
///
/// let filters = ItemFilters::new().with("Key", ["eb"]);
/// assert_eq!(store.filter_items(standards.id, None, &filters)?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JsonStore {
    path: Option<PathBuf>,
    document: CatalogDocument,
}

impl JsonStore {
    /// Creates an empty store that never touches the disk. Never seeds.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: CatalogDocument::default(),
        }
    }

    /// Loads the document at `path`, creating it when missing.
    ///
    /// A newly created document is seeded when `seed` is
    /// [`SeedPolicy::Sample`].
    pub fn open(path: impl Into<PathBuf>, seed: SeedPolicy) -> Result<Self> {
        let path = path.into();

        if path.exists() {
            let bytes = fs::read(&path)?;
            let document: CatalogDocument = serde_json::from_slice(&bytes)?;
            info!(
                path = %path.display(),
                collections = document.collections.len(),
                items = document.items.len(),
                "loaded json catalog"
            );
            return Ok(Self {
                path: Some(path),
                document,
            });
        }

        let mut store = Self {
            path: Some(path),
            document: CatalogDocument::default(),
        };
        store.flush(&store.document)?;
        if seed == SeedPolicy::Sample {
            seed_sample(&mut store)?;
        }
        info!(path = ?store.path, "created json catalog");
        Ok(store)
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the current in-memory document.
    pub fn document(&self) -> &CatalogDocument {
        &self.document
    }

    /// Applies `change` to a copy of the document, flushes it, then keeps it.
    fn mutate<T>(&mut self, change: impl FnOnce(&mut CatalogDocument) -> Result<T>) -> Result<T> {
        let mut working = self.document.clone();
        let output = change(&mut working)?;
        self.flush(&working)?;
        self.document = working;
        Ok(output)
    }

    /// Writes a full snapshot through a temp file and an atomic rename.
    fn flush(&self, document: &CatalogDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, document)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| err.error)?;

        debug!(path = %path.display(), "flushed json catalog");
        Ok(())
    }
}

impl CatalogStore for JsonStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Json
    }

    fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let mut counts: HashMap<CollectionId, usize> = HashMap::new();
        for item in &self.document.items {
            *counts.entry(item.collection_id).or_default() += 1;
        }

        let mut summaries: Vec<CollectionSummary> = self
            .document
            .collections
            .iter()
            .map(|collection| CollectionSummary {
                collection: collection.clone(),
                item_count: counts.get(&collection.id).copied().unwrap_or(0),
            })
            .collect();
        summaries.sort_by_key(|summary| summary.collection.id);
        Ok(summaries)
    }

    fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        Ok(self.document.collection(id).cloned())
    }

    fn create_collection(&mut self, name: &str, description: Option<&str>) -> Result<Collection> {
        let name = validate_collection_name(name)?;
        let description = clean_text(description);

        let collection = self.mutate(|doc| {
            let collection = Collection {
                id: doc.next_collection_id(),
                name,
                description,
            };
            doc.collections.push(collection.clone());
            Ok(collection)
        })?;
        debug!(collection_id = %collection.id, "created collection");
        Ok(collection)
    }

    fn update_collection(
        &mut self,
        id: CollectionId,
        patch: &CollectionPatch,
    ) -> Result<Option<Collection>> {
        if self.document.collection(id).is_none() {
            return Ok(None);
        }
        self.mutate(|doc| {
            let Some(collection) = doc.collections.iter_mut().find(|c| c.id == id) else {
                return Ok(None);
            };
            patch.apply(collection)?;
            Ok(Some(collection.clone()))
        })
    }

    fn delete_collection(&mut self, id: CollectionId) -> Result<bool> {
        if self.document.collection(id).is_none() {
            return Ok(false);
        }
        let removed_items = self.mutate(|doc| {
            doc.collections.retain(|collection| collection.id != id);
            Ok(doc.remove_items(|item| item.collection_id == id))
        })?;
        debug!(collection_id = %id, removed_items, "deleted collection");
        Ok(true)
    }

    fn list_items(&self, collection_id: CollectionId) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .document
            .items
            .iter()
            .filter(|item| item.collection_id == collection_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self.document.item(id).cloned())
    }

    fn tagged_items(&self, collection_id: CollectionId) -> Result<Vec<TaggedItem>> {
        Ok(self
            .list_items(collection_id)?
            .into_iter()
            .map(|item| {
                let tags = self.document.explicit_pairs(item.id);
                TaggedItem { item, tags }
            })
            .collect())
    }

    fn explicit_tags(&self, item_id: ItemId) -> Result<Vec<Tag>> {
        Ok(self
            .document
            .associations
            .iter()
            .filter(|edge| edge.item_id == item_id)
            .filter_map(|edge| self.document.tag(edge.tag_id))
            .cloned()
            .collect())
    }

    fn create_item(&mut self, fields: NewItem, extra_tags: &[TagPair]) -> Result<Item> {
        let fields = fields.validated()?;
        let now = now()?;

        let item = self.mutate(|doc| {
            let item = doc.insert_item(fields, now)?;
            doc.tag_item(item.id, extra_tags);
            Ok(item)
        })?;
        debug!(item_id = %item.id, collection_id = %item.collection_id, "created item");
        Ok(item)
    }

    fn create_items(&mut self, items: Vec<NewItem>) -> Result<Vec<Item>> {
        let items = items
            .into_iter()
            .map(NewItem::validated)
            .collect::<Result<Vec<_>>>()?;
        let now = now()?;

        let created = self.mutate(|doc| {
            items
                .into_iter()
                .map(|fields| doc.insert_item(fields, now))
                .collect::<Result<Vec<_>>>()
        })?;
        debug!(count = created.len(), "created items");
        Ok(created)
    }

    fn update_item(
        &mut self,
        id: ItemId,
        patch: &ItemPatch,
        extra_tags: Option<&[TagPair]>,
    ) -> Result<Option<Item>> {
        if self.document.item(id).is_none() {
            return Ok(None);
        }
        let now = now()?;

        let item = self.mutate(|doc| {
            let Some(item) = doc.items.iter_mut().find(|item| item.id == id) else {
                return Ok(None);
            };
            patch.apply(item, now)?;
            let item = item.clone();

            if let Some(tags) = extra_tags {
                doc.associations.retain(|edge| edge.item_id != id);
                doc.tag_item(id, tags);
            }
            Ok(Some(item))
        })?;
        debug!(item_id = %id, retagged = extra_tags.is_some(), "updated item");
        Ok(item)
    }

    fn delete_item(&mut self, id: ItemId) -> Result<bool> {
        if self.document.item(id).is_none() {
            return Ok(false);
        }
        self.mutate(|doc| Ok(doc.remove_items(|item| item.id == id) > 0))
    }

    fn upsert_tag(&mut self, key: &str, value: &str) -> Result<Tag> {
        if let Some(existing) = self.document.tags.iter().find(|tag| tag.matches(key, value)) {
            return Ok(existing.clone());
        }
        self.mutate(|doc| Ok(doc.upsert_tag(key, value)))
    }

    fn all_tags(&self) -> Result<Vec<Tag>> {
        let mut tags = self.document.tags.clone();
        tags.sort_by_key(|tag| tag.id);
        Ok(tags)
    }

    fn list_legacy_field_values(&self, field: LegacyField) -> Result<Vec<String>> {
        Ok(sorted_distinct(
            self.document.items.iter().filter_map(|item| item.legacy(field)),
        ))
    }
}
