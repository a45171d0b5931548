//! Durable backend on SQLite.
//!
//! Every mutating method runs inside one transaction; dropping the
//! transaction on an error path rolls it back. Deletes rely on
//! `ON DELETE CASCADE` to clear items and associations.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, params};
use time::OffsetDateTime;
use tracing::{debug, info};

use super::{BackendKind, CatalogStore, SeedPolicy, now, seed_sample, unknown_collection};
use crate::db::Database;
use crate::error::Result;
use crate::filter::TaggedItem;
use crate::models::{
    Collection, CollectionId, CollectionPatch, CollectionSummary, Item, ItemId, ItemPatch,
    LegacyField, NewItem, Tag, TagId, TagPair, clean_text, dedup_pairs, normalize,
    validate_collection_name,
};
use crate::vocabulary::sorted_distinct;

const ITEM_COLUMNS: &str = "id, collection_id, title, musical_key, composer, style, notes, \
     media_ref, lead_sheet_ref, knowledge_level, created_at, updated_at";

/// Catalog stored in a SQLite database.
///
/// # Examples
///
/// ```
/// use tunebook::{CatalogStore, NewItem, SqliteStore, TagPair};
///
/// # fn main() -> tunebook::Result<()> {
/// let mut store = SqliteStore::in_memory()?;
/// let standards = store.create_collection("Standards", None)?;
///
/// let misty = NewItem::new(standards.id, "Misty").musical_key("Eb");
/// store.create_item(misty, &[TagPair::new("Style", "Ballad")])?;
///
/// assert_eq!(store.list_items(standards.id)?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Opens an empty in-memory store. Never seeds.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::in_memory()?))
    }

    /// Opens (or creates) the database file at `path`.
    ///
    /// A freshly created database is seeded when `seed` is
    /// [`SeedPolicy::Sample`].
    pub fn open(path: impl AsRef<Path>, seed: SeedPolicy) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::open(path)?;
        let created = db.was_created();
        let mut store = Self::new(db);

        if created && seed == SeedPolicy::Sample {
            seed_sample(&mut store)?;
        }
        info!(path = %path.display(), created, "opened sqlite catalog");
        Ok(store)
    }

    /// Wraps an already opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl CatalogStore for SqliteStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.name, c.description,
                    (SELECT COUNT(*) FROM items i WHERE i.collection_id = c.id)
             FROM collections c
             ORDER BY c.id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(CollectionSummary {
                collection: collection_from_row(row)?,
                item_count: row.get::<_, i64>(3)? as usize,
            })
        })?;

        let mut summaries = Vec::new();
        for row_result in rows {
            summaries.push(row_result?);
        }
        Ok(summaries)
    }

    fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        get_collection_in(self.db.connection(), id)
    }

    fn create_collection(&mut self, name: &str, description: Option<&str>) -> Result<Collection> {
        let name = validate_collection_name(name)?;
        let description = clean_text(description);
        let conn = self.db.connection();

        conn.execute(
            "INSERT INTO collections (name, description) VALUES (?1, ?2)",
            params![name, description],
        )?;
        let id = CollectionId::new(conn.last_insert_rowid());
        debug!(collection_id = %id, "created collection");

        Ok(Collection {
            id,
            name,
            description,
        })
    }

    fn update_collection(
        &mut self,
        id: CollectionId,
        patch: &CollectionPatch,
    ) -> Result<Option<Collection>> {
        let tx = self.db.connection_mut().transaction()?;

        let Some(mut collection) = get_collection_in(&tx, id)? else {
            return Ok(None);
        };
        patch.apply(&mut collection)?;
        tx.execute(
            "UPDATE collections SET name = ?1, description = ?2 WHERE id = ?3",
            params![collection.name, collection.description, id.get()],
        )?;

        tx.commit()?;
        Ok(Some(collection))
    }

    fn delete_collection(&mut self, id: CollectionId) -> Result<bool> {
        let deleted = self
            .db
            .connection()
            .execute("DELETE FROM collections WHERE id = ?1", [id.get()])?;
        debug!(collection_id = %id, deleted, "deleted collection");
        Ok(deleted > 0)
    }

    fn list_items(&self, collection_id: CollectionId) -> Result<Vec<Item>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE collection_id = ?1 ORDER BY id"
        ))?;

        let rows = stmt.query_map([collection_id.get()], ItemRow::from_row)?;

        let mut items = Vec::new();
        for row_result in rows {
            items.push(row_result?.into_item()?);
        }
        Ok(items)
    }

    fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        get_item_in(self.db.connection(), id)
    }

    fn tagged_items(&self, collection_id: CollectionId) -> Result<Vec<TaggedItem>> {
        let items = self.list_items(collection_id)?;

        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT it.item_id, t.tag_key, t.tag_value
             FROM item_tags it
             JOIN items i ON i.id = it.item_id
             JOIN tags t ON t.id = it.tag_id
             WHERE i.collection_id = ?1
             ORDER BY it.rowid",
        )?;
        let rows = stmt.query_map([collection_id.get()], |row| {
            let item_id: i64 = row.get(0)?;
            let key: String = row.get(1)?;
            let value: String = row.get(2)?;
            Ok((ItemId::new(item_id), TagPair::new(key, value)))
        })?;

        let mut tags_by_item: HashMap<ItemId, Vec<TagPair>> = HashMap::new();
        for row_result in rows {
            let (item_id, pair) = row_result?;
            tags_by_item.entry(item_id).or_default().push(pair);
        }

        Ok(items
            .into_iter()
            .map(|item| {
                let tags = tags_by_item.remove(&item.id).unwrap_or_default();
                TaggedItem { item, tags }
            })
            .collect())
    }

    fn explicit_tags(&self, item_id: ItemId) -> Result<Vec<Tag>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.tag_key, t.tag_value
             FROM item_tags it
             JOIN tags t ON t.id = it.tag_id
             WHERE it.item_id = ?1
             ORDER BY it.rowid",
        )?;

        let rows = stmt.query_map([item_id.get()], tag_from_row)?;

        let mut tags = Vec::new();
        for row_result in rows {
            tags.push(row_result?);
        }
        Ok(tags)
    }

    fn create_item(&mut self, fields: NewItem, extra_tags: &[TagPair]) -> Result<Item> {
        let fields = fields.validated()?;
        let now = now()?;
        let tx = self.db.connection_mut().transaction()?;

        if get_collection_in(&tx, fields.collection_id)?.is_none() {
            return Err(unknown_collection(fields.collection_id));
        }
        let item = insert_item(&tx, fields, now)?;
        for pair in dedup_pairs(extra_tags) {
            let tag = upsert_tag_in(&tx, &pair.key, &pair.value)?;
            associate(&tx, item.id, tag.id)?;
        }

        tx.commit()?;
        debug!(item_id = %item.id, collection_id = %item.collection_id, "created item");
        Ok(item)
    }

    fn create_items(&mut self, items: Vec<NewItem>) -> Result<Vec<Item>> {
        let items = items
            .into_iter()
            .map(NewItem::validated)
            .collect::<Result<Vec<_>>>()?;
        let now = now()?;
        let tx = self.db.connection_mut().transaction()?;

        let mut created = Vec::with_capacity(items.len());
        for fields in items {
            if get_collection_in(&tx, fields.collection_id)?.is_none() {
                return Err(unknown_collection(fields.collection_id));
            }
            created.push(insert_item(&tx, fields, now)?);
        }

        tx.commit()?;
        debug!(count = created.len(), "created items");
        Ok(created)
    }

    fn update_item(
        &mut self,
        id: ItemId,
        patch: &ItemPatch,
        extra_tags: Option<&[TagPair]>,
    ) -> Result<Option<Item>> {
        let now = now()?;
        let tx = self.db.connection_mut().transaction()?;

        let Some(mut item) = get_item_in(&tx, id)? else {
            return Ok(None);
        };
        patch.apply(&mut item, now)?;
        tx.execute(
            "UPDATE items
             SET title = ?1, musical_key = ?2, composer = ?3, style = ?4, notes = ?5,
                 media_ref = ?6, lead_sheet_ref = ?7, knowledge_level = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                item.title,
                item.musical_key,
                item.composer,
                item.style,
                item.notes,
                item.media_ref,
                item.lead_sheet_ref,
                item.knowledge_level.map(|level| level.as_str()),
                item.updated_at.unix_timestamp(),
                id.get(),
            ],
        )?;

        if let Some(tags) = extra_tags {
            tx.execute("DELETE FROM item_tags WHERE item_id = ?1", [id.get()])?;
            for pair in dedup_pairs(tags) {
                let tag = upsert_tag_in(&tx, &pair.key, &pair.value)?;
                associate(&tx, id, tag.id)?;
            }
        }

        tx.commit()?;
        debug!(item_id = %id, retagged = extra_tags.is_some(), "updated item");
        Ok(Some(item))
    }

    fn delete_item(&mut self, id: ItemId) -> Result<bool> {
        let deleted = self
            .db
            .connection()
            .execute("DELETE FROM items WHERE id = ?1", [id.get()])?;
        Ok(deleted > 0)
    }

    fn upsert_tag(&mut self, key: &str, value: &str) -> Result<Tag> {
        upsert_tag_in(self.db.connection(), key, value)
    }

    fn all_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare("SELECT id, tag_key, tag_value FROM tags ORDER BY id")?;
        let rows = stmt.query_map([], tag_from_row)?;

        let mut tags = Vec::new();
        for row_result in rows {
            tags.push(row_result?);
        }
        Ok(tags)
    }

    fn list_legacy_field_values(&self, field: LegacyField) -> Result<Vec<String>> {
        let conn = self.db.connection();
        let column = field.column();
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {column} FROM items WHERE {column} IS NOT NULL"
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut values = Vec::new();
        for row_result in rows {
            values.push(row_result?);
        }
        Ok(sorted_distinct(values.iter().map(String::as_str)))
    }
}

/// Finds the tag for a normalized pair, inserting it when missing.
///
/// `INSERT OR IGNORE` against the UNIQUE normalized columns keeps concurrent
/// writers from creating a second row.
fn upsert_tag_in(conn: &Connection, key: &str, value: &str) -> Result<Tag> {
    let key_normalized = normalize(key);
    let value_normalized = normalize(value);

    conn.execute(
        "INSERT OR IGNORE INTO tags (tag_key, tag_value, key_normalized, value_normalized)
         VALUES (?1, ?2, ?3, ?4)",
        params![key, value, key_normalized, value_normalized],
    )?;

    let tag = conn.query_row(
        "SELECT id, tag_key, tag_value FROM tags
         WHERE key_normalized = ?1 AND value_normalized = ?2",
        params![key_normalized, value_normalized],
        tag_from_row,
    )?;
    Ok(tag)
}

fn associate(conn: &Connection, item_id: ItemId, tag_id: TagId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO item_tags (item_id, tag_id) VALUES (?1, ?2)",
        [item_id.get(), tag_id.get()],
    )?;
    Ok(())
}

fn insert_item(conn: &Connection, fields: NewItem, now: OffsetDateTime) -> Result<Item> {
    conn.execute(
        "INSERT INTO items (collection_id, title, musical_key, composer, style, notes,
                            media_ref, lead_sheet_ref, knowledge_level, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            fields.collection_id.get(),
            fields.title,
            fields.musical_key,
            fields.composer,
            fields.style,
            fields.notes,
            fields.media_ref,
            fields.lead_sheet_ref,
            fields.knowledge_level.map(|level| level.as_str()),
            now.unix_timestamp(),
        ],
    )?;
    let id = ItemId::new(conn.last_insert_rowid());
    Ok(Item::from_new(id, fields, now))
}

fn get_collection_in(conn: &Connection, id: CollectionId) -> Result<Option<Collection>> {
    let collection = conn
        .query_row(
            "SELECT id, name, description FROM collections WHERE id = ?1",
            [id.get()],
            collection_from_row,
        )
        .optional()?;
    Ok(collection)
}

fn get_item_in(conn: &Connection, id: ItemId) -> Result<Option<Item>> {
    let row = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
            [id.get()],
            ItemRow::from_row,
        )
        .optional()?;
    row.map(ItemRow::into_item).transpose()
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: CollectionId::new(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: TagId::new(row.get(0)?),
        key: row.get(1)?,
        value: row.get(2)?,
    })
}

/// Raw item columns, before timestamps and the level are decoded.
struct ItemRow {
    id: i64,
    collection_id: i64,
    title: String,
    musical_key: Option<String>,
    composer: Option<String>,
    style: Option<String>,
    notes: Option<String>,
    media_ref: Option<String>,
    lead_sheet_ref: Option<String>,
    knowledge_level: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            collection_id: row.get(1)?,
            title: row.get(2)?,
            musical_key: row.get(3)?,
            composer: row.get(4)?,
            style: row.get(5)?,
            notes: row.get(6)?,
            media_ref: row.get(7)?,
            lead_sheet_ref: row.get(8)?,
            knowledge_level: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_item(self) -> Result<Item> {
        Ok(Item {
            id: ItemId::new(self.id),
            collection_id: CollectionId::new(self.collection_id),
            title: self.title,
            musical_key: self.musical_key,
            composer: self.composer,
            style: self.style,
            notes: self.notes,
            media_ref: self.media_ref,
            lead_sheet_ref: self.lead_sheet_ref,
            // The CHECK constraint only admits valid level names.
            knowledge_level: self.knowledge_level.and_then(|level| level.parse().ok()),
            created_at: OffsetDateTime::from_unix_timestamp(self.created_at)?,
            updated_at: OffsetDateTime::from_unix_timestamp(self.updated_at)?,
        })
    }
}
