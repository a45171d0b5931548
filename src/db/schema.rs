/// Catalog schema: collections, items, the global tag vocabulary and the
/// item/tag edge table.
///
/// Uses CREATE TABLE/INDEX IF NOT EXISTS for idempotent execution.
/// Tags carry their normalized key and value so the UNIQUE constraint, not
/// application code, guarantees one row per normalized pair.
pub const INITIAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT
);

-- Legacy fields (musical_key, composer, style) are kept as plain columns
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY,
    collection_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    musical_key TEXT,
    composer TEXT,
    style TEXT,
    notes TEXT,
    media_ref TEXT,
    lead_sheet_ref TEXT,
    knowledge_level TEXT
        CHECK (knowledge_level IN ('does-not-know', 'kind-of-knows', 'knows')),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    tag_key TEXT NOT NULL,
    tag_value TEXT NOT NULL,
    key_normalized TEXT NOT NULL,
    value_normalized TEXT NOT NULL,
    UNIQUE (key_normalized, value_normalized)
);

-- Junction table: links items to tags (many-to-many), rowid keeps insertion order
CREATE TABLE IF NOT EXISTS item_tags (
    item_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (item_id, tag_id),
    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_items_collection ON items(collection_id);
CREATE INDEX IF NOT EXISTS idx_item_tags_item ON item_tags(item_id);
CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag_id);
"#;
