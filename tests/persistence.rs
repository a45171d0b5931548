use anyhow::Result;
use tempfile::tempdir;
use tunebook::{
    BackendKind, CatalogConfig, CatalogStore, ItemFilters, JsonStore, NewItem, SeedPolicy,
    SqliteStore, TagPair, open_store,
};

fn config(dir: &std::path::Path, backend: BackendKind, seed: SeedPolicy) -> CatalogConfig {
    CatalogConfig {
        backend,
        data_dir: dir.to_path_buf(),
        seed,
    }
}

#[test]
fn seeding_happens_only_on_first_open() -> Result<()> {
    for backend in [BackendKind::Sqlite, BackendKind::Json] {
        let dir = tempdir()?;
        let config = config(dir.path(), backend, SeedPolicy::Sample);

        {
            let mut store = open_store(&config)?;
            let seeded = store.list_collections()?;
            assert_eq!(seeded.len(), 2, "{backend}");
            assert_eq!(seeded[0].collection.name, "Jazz Standards", "{backend}");
            store.delete_collection(seeded[1].collection.id)?;
        }

        let store = open_store(&config)?;
        let collections = store.list_collections()?;
        assert_eq!(collections.len(), 1, "{backend}: deleted sample stays deleted");
    }
    Ok(())
}

#[test]
fn empty_policy_starts_blank() -> Result<()> {
    for backend in [BackendKind::Sqlite, BackendKind::Json] {
        let dir = tempdir()?;
        let store = open_store(&config(dir.path(), backend, SeedPolicy::Empty))?;
        assert!(store.list_collections()?.is_empty(), "{backend}");
        assert!(store.all_tags()?.is_empty(), "{backend}");
    }
    Ok(())
}

#[test]
fn seeded_catalog_is_identical_across_backends() -> Result<()> {
    let dir = tempdir()?;
    let sqlite = open_store(&config(dir.path(), BackendKind::Sqlite, SeedPolicy::Sample))?;
    let json_store = open_store(&config(dir.path(), BackendKind::Json, SeedPolicy::Sample))?;

    assert_eq!(sqlite.list_collections()?, json_store.list_collections()?);
    assert_eq!(sqlite.all_tags()?, json_store.all_tags()?);
    for summary in sqlite.list_collections()? {
        let id = summary.collection.id;
        assert_eq!(
            sqlite.get_available_tags(id)?,
            json_store.get_available_tags(id)?
        );
    }
    Ok(())
}

#[test]
fn sqlite_reopen_returns_written_state() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tunebook.db");

    let (collection, item) = {
        let mut store = SqliteStore::open(&path, SeedPolicy::Empty)?;
        let collection = store.create_collection("Gigs", None)?;
        let item = store.create_item(
            NewItem::new(collection.id, "Solar").composer("Miles Davis"),
            &[TagPair::new("Form", "12 bar")],
        )?;
        (collection, item)
    };

    let store = SqliteStore::open(&path, SeedPolicy::Sample)?;
    assert_eq!(store.get_collection(collection.id)?, Some(collection.clone()));
    assert_eq!(store.get_item(item.id)?, Some(item.clone()));
    let filters = ItemFilters::new().with("form", ["12 BAR"]);
    assert_eq!(store.filter_items(collection.id, None, &filters)?, vec![item]);
    Ok(())
}

#[test]
fn json_reopen_returns_written_state() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tunebook.json");

    let (collection, item) = {
        let mut store = JsonStore::open(&path, SeedPolicy::Empty)?;
        let collection = store.create_collection("Gigs", None)?;
        let item = store.create_item(
            NewItem::new(collection.id, "Solar").composer("Miles Davis"),
            &[TagPair::new("Form", "12 bar")],
        )?;
        (collection, item)
    };

    let store = JsonStore::open(&path, SeedPolicy::Sample)?;
    assert_eq!(store.get_collection(collection.id)?, Some(collection.clone()));
    assert_eq!(store.get_item(item.id)?, Some(item.clone()));
    assert_eq!(store.document().associations.len(), 1);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw["items"][0]["collectionId"], 1);
    assert_eq!(raw["associations"][0]["itemId"], 1);
    assert_eq!(raw["associations"][0]["tagId"], 1);
    Ok(())
}
