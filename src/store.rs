//! The storage interface shared by both backends.
//!
//! [`CatalogStore`] splits into primitives that each backend implements
//! against its own persistence (SQLite transactions or a JSON document) and
//! provided methods built on top of them. Filtering, tag aggregation,
//! vocabulary listing and both import flows are provided methods, so the two
//! backends cannot drift apart on query semantics.

mod local;
mod seed;
mod sqlite;

use std::fmt;
use std::str::FromStr;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, Result};
use crate::filter::{self, ItemFilters, TaggedItem};
use crate::import::{BulkImportOutcome, ImportCount, parse_title_lines, partition_duplicates};
use crate::models::{
    Collection, CollectionId, CollectionPatch, CollectionSummary, Item, ItemId, ItemPatch,
    LegacyField, NewItem, Tag, TagPair, effective_tags, normalize,
};
use crate::vocabulary::{TagVocabulary, available_tags, sorted_distinct};

pub use local::{Association, CatalogDocument, JsonStore};
pub use seed::seed_sample;
pub use sqlite::SqliteStore;

/// Which storage backend a store is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// Durable SQLite database.
    #[default]
    Sqlite,
    /// Self-contained JSON document on local disk.
    Json,
}

impl BackendKind {
    /// File name of the backend's data file inside the data directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Sqlite => "tunebook.db",
            Self::Json => "tunebook.json",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "durable" => Ok(Self::Sqlite),
            "json" | "local" => Ok(Self::Json),
            other => Err(CatalogError::validation(
                "backend",
                format!("unknown backend '{other}' (expected sqlite or json)"),
            )),
        }
    }
}

/// Whether a store writes sample content when it finds no prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedPolicy {
    #[default]
    Sample,
    Empty,
}

/// Collection, item and tag storage with identical semantics across backends.
///
/// Lookups of unknown ids return `None` or `false`; errors are reserved for
/// invalid input and storage failures. Every mutating method has persisted
/// its result before it returns `Ok`.
pub trait CatalogStore {
    /// Returns which backend this is.
    fn backend(&self) -> BackendKind;

    /// Lists all collections with their item counts, in id order.
    fn list_collections(&self) -> Result<Vec<CollectionSummary>>;

    /// Fetches one collection.
    fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>>;

    /// Creates a collection. The name is trimmed and must not be empty.
    fn create_collection(&mut self, name: &str, description: Option<&str>) -> Result<Collection>;

    /// Applies `patch`; returns `None` when the collection does not exist.
    fn update_collection(
        &mut self,
        id: CollectionId,
        patch: &CollectionPatch,
    ) -> Result<Option<Collection>>;

    /// Deletes a collection with all its items and their associations.
    ///
    /// Returns whether a collection was deleted.
    fn delete_collection(&mut self, id: CollectionId) -> Result<bool>;

    /// Lists a collection's items in id order.
    fn list_items(&self, collection_id: CollectionId) -> Result<Vec<Item>>;

    /// Fetches one item.
    fn get_item(&self, id: ItemId) -> Result<Option<Item>>;

    /// Lists a collection's items in id order, each with its explicit tags.
    fn tagged_items(&self, collection_id: CollectionId) -> Result<Vec<TaggedItem>>;

    /// Returns the tags associated with an item, in association order.
    fn explicit_tags(&self, item_id: ItemId) -> Result<Vec<Tag>>;

    /// Creates an item and associates `extra_tags` with it.
    ///
    /// Blank and repeated pairs in `extra_tags` are dropped; the rest go
    /// through the tag catalog so existing tags are reused.
    fn create_item(&mut self, fields: NewItem, extra_tags: &[TagPair]) -> Result<Item>;

    /// Creates several untagged items in one commit.
    fn create_items(&mut self, items: Vec<NewItem>) -> Result<Vec<Item>>;

    /// Applies `patch` to an item.
    ///
    /// With `Some(tags)` the item's explicit tags are replaced by `tags`;
    /// with `None` they are left alone. Returns `None` when the item does
    /// not exist.
    fn update_item(
        &mut self,
        id: ItemId,
        patch: &ItemPatch,
        extra_tags: Option<&[TagPair]>,
    ) -> Result<Option<Item>>;

    /// Deletes an item and its associations. Returns whether it existed.
    fn delete_item(&mut self, id: ItemId) -> Result<bool>;

    /// Returns the tag matching `key`/`value` after normalization, creating
    /// it with the given spelling when there is none.
    fn upsert_tag(&mut self, key: &str, value: &str) -> Result<Tag>;

    /// Lists every tag in the global vocabulary, in id order.
    fn all_tags(&self) -> Result<Vec<Tag>>;

    /// Lists the distinct values of a legacy field across all items, sorted.
    fn list_legacy_field_values(&self, field: LegacyField) -> Result<Vec<String>>;

    /// Returns an item's effective tag set, or `None` for an unknown item.
    fn item_tags(&self, id: ItemId) -> Result<Option<Vec<TagPair>>> {
        let Some(item) = self.get_item(id)? else {
            return Ok(None);
        };
        let explicit: Vec<TagPair> = self.explicit_tags(id)?.iter().map(Tag::pair).collect();
        Ok(Some(effective_tags(&item, &explicit)))
    }

    /// Searches and filters a collection's items; see [`crate::filter`].
    fn filter_items(
        &self,
        collection_id: CollectionId,
        search: Option<&str>,
        filters: &ItemFilters,
    ) -> Result<Vec<Item>> {
        let items = self.tagged_items(collection_id)?;
        let scoped = items.len();
        let matched = filter::filter_items(items, search, filters);
        debug!(
            collection_id = %collection_id,
            scoped,
            matched = matched.len(),
            "filtered items"
        );
        Ok(matched)
    }

    /// Returns the tag values used by a collection's items, per key.
    fn get_available_tags(&self, collection_id: CollectionId) -> Result<TagVocabulary> {
        Ok(available_tags(&self.tagged_items(collection_id)?))
    }

    /// Lists the distinct keys of the global tag vocabulary, sorted.
    fn list_tag_keys(&self) -> Result<Vec<String>> {
        let tags = self.all_tags()?;
        Ok(sorted_distinct(tags.iter().map(|tag| tag.key.as_str())))
    }

    /// Lists the distinct values stored under `key`, sorted.
    fn list_tag_values(&self, key: &str) -> Result<Vec<String>> {
        let wanted = normalize(key);
        let tags = self.all_tags()?;
        Ok(sorted_distinct(
            tags.iter()
                .filter(|tag| normalize(&tag.key) == wanted)
                .map(|tag| tag.value.as_str()),
        ))
    }

    /// Copies items, with their effective tag sets, into `target`.
    ///
    /// Every effective pair goes through the tag catalog. Only explicit tags
    /// are associated with the copy; its legacy fields carry the rest.
    /// Unknown source ids are skipped. Each copy is committed on its own, so
    /// a failure part way leaves the earlier copies in place.
    fn import_items_by_id(
        &mut self,
        target: CollectionId,
        source_ids: &[ItemId],
    ) -> Result<ImportCount> {
        require_collection(self, target)?;

        let mut count = 0;
        for &source_id in source_ids {
            let Some(source) = self.get_item(source_id)? else {
                warn!(item_id = %source_id, "import source not found, skipping");
                continue;
            };
            let explicit: Vec<TagPair> = self
                .explicit_tags(source_id)?
                .iter()
                .map(Tag::pair)
                .collect();
            for pair in effective_tags(&source, &explicit) {
                self.upsert_tag(&pair.key, &pair.value)?;
            }
            // The copied legacy fields project the reserved keys themselves.
            let copy = self.create_item(source.to_new(target), &explicit)?;
            debug!(source = %source_id, copy = %copy.id, "imported item");
            count += 1;
        }

        info!(
            target = %target,
            requested = source_ids.len(),
            imported = count,
            "import by id finished"
        );
        Ok(ImportCount { count })
    }

    /// Creates items from pasted titles, reporting titles that already exist.
    ///
    /// See [`crate::import`] for line handling. Duplicates are excluded and
    /// the remaining titles are created in one commit.
    fn bulk_import_by_title(
        &mut self,
        target: CollectionId,
        raw_lines: &[String],
    ) -> Result<BulkImportOutcome> {
        require_collection(self, target)?;

        let parsed = parse_title_lines(raw_lines);
        let existing = self.list_items(target)?;
        let (imported, duplicates) = partition_duplicates(
            existing.iter().map(|item| item.title.as_str()),
            parsed.lines,
        );

        if !imported.is_empty() {
            let fields = imported
                .iter()
                .map(|title| NewItem::new(target, title.as_str()))
                .collect();
            self.create_items(fields)?;
        }

        info!(
            target = %target,
            imported = imported.len(),
            duplicates = duplicates.len(),
            truncated = parsed.truncated,
            "bulk import by title finished"
        );
        Ok(BulkImportOutcome {
            imported,
            duplicates,
            truncated: parsed.truncated,
        })
    }
}

/// Fails with a validation error when `id` names no collection.
fn require_collection<S: CatalogStore + ?Sized>(store: &S, id: CollectionId) -> Result<()> {
    match store.get_collection(id)? {
        Some(_) => Ok(()),
        None => Err(unknown_collection(id)),
    }
}

pub(crate) fn unknown_collection(id: CollectionId) -> CatalogError {
    CatalogError::validation("collection_id", format!("collection {id} does not exist"))
}

/// Current time truncated to whole seconds, the precision both backends keep.
pub(crate) fn now() -> Result<OffsetDateTime> {
    let seconds = OffsetDateTime::now_utc().unix_timestamp();
    Ok(OffsetDateTime::from_unix_timestamp(seconds)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!("local".parse::<BackendKind>().unwrap(), BackendKind::Json);
        assert!("postgres".parse::<BackendKind>().is_err());
    }

    #[test]
    fn backend_kind_names_its_data_file() {
        assert_eq!(BackendKind::Sqlite.file_name(), "tunebook.db");
        assert_eq!(BackendKind::Json.to_string(), "json");
    }

    #[test]
    fn now_has_whole_second_precision() {
        assert_eq!(now().unwrap().nanosecond(), 0);
    }
}
