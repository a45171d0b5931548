use super::*;
use tempfile::tempdir;

fn names(db: &Database, kind: &str) -> Vec<String> {
    db.connection()
        .prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
        .unwrap()
        .query_map([kind], |row| row.get(0))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect()
}

#[test]
fn in_memory_opens_successfully() {
    let result = Database::in_memory();
    assert!(result.is_ok());
}

#[test]
fn schema_tables_exist() {
    let db = Database::in_memory().unwrap();
    let tables = names(&db, "table");

    for table in ["collections", "items", "tags", "item_tags", "schema_migrations"] {
        assert!(tables.contains(&table.to_string()), "missing table {table}");
    }
}

#[test]
fn schema_indexes_exist() {
    let db = Database::in_memory().unwrap();
    let indexes = names(&db, "index");

    assert!(indexes.contains(&"idx_items_collection".to_string()));
    assert!(indexes.contains(&"idx_item_tags_item".to_string()));
    assert!(indexes.contains(&"idx_item_tags_tag".to_string()));
}

#[test]
fn foreign_keys_enabled() {
    let db = Database::in_memory().unwrap();

    let fk_enabled: i32 = db
        .connection()
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();

    assert_eq!(fk_enabled, 1);
}

#[test]
fn normalized_tag_pairs_are_unique() {
    let db = Database::in_memory().unwrap();
    let conn = db.connection();

    conn.execute(
        "INSERT INTO tags (tag_key, tag_value, key_normalized, value_normalized)
         VALUES ('Style', 'Ballad', 'style', 'ballad')",
        [],
    )
    .unwrap();
    let duplicate = conn.execute(
        "INSERT INTO tags (tag_key, tag_value, key_normalized, value_normalized)
         VALUES ('STYLE', 'ballad ', 'style', 'ballad')",
        [],
    );

    assert!(duplicate.is_err());
}

#[test]
fn knowledge_level_is_constrained() {
    let db = Database::in_memory().unwrap();
    let conn = db.connection();
    conn.execute("INSERT INTO collections (id, name) VALUES (1, 'Standards')", [])
        .unwrap();

    let invalid = conn.execute(
        "INSERT INTO items (collection_id, title, knowledge_level, created_at, updated_at)
         VALUES (1, 'Misty', 'expert', 0, 0)",
        [],
    );

    assert!(invalid.is_err());
}

#[test]
fn deleting_collection_cascades_to_items_and_edges() {
    let db = Database::in_memory().unwrap();
    let conn = db.connection();
    conn.execute_batch(
        "INSERT INTO collections (id, name) VALUES (1, 'Standards');
         INSERT INTO items (id, collection_id, title, created_at, updated_at)
             VALUES (1, 1, 'Misty', 0, 0);
         INSERT INTO tags (id, tag_key, tag_value, key_normalized, value_normalized)
             VALUES (1, 'Era', 'Swing', 'era', 'swing');
         INSERT INTO item_tags (item_id, tag_id) VALUES (1, 1);
         DELETE FROM collections WHERE id = 1;",
    )
    .unwrap();

    let count = |table: &str| -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    };
    assert_eq!(count("items"), 0);
    assert_eq!(count("item_tags"), 0);
    assert_eq!(count("tags"), 1, "tags are shared and survive item deletion");
}

#[test]
fn open_creates_database_file() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let db = Database::open(&db_path).unwrap();
    assert!(db_path.exists());
    assert!(db.was_created());
}

#[test]
fn reopen_is_idempotent() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    {
        let db = Database::open(&db_path).unwrap();
        db.connection()
            .execute("INSERT INTO collections (name) VALUES ('Standards')", [])
            .unwrap();
    }

    let db = Database::open(&db_path).unwrap();
    assert!(!db.was_created(), "schema already existed");

    let count: i32 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);

    let migrations: i32 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
        .unwrap();
    assert_eq!(migrations, 1);
}
