pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod import;
pub mod models;
pub mod store;
pub mod utils;
pub mod vocabulary;

pub use config::{CatalogConfig, open_store};
pub use db::Database;
pub use error::{CatalogError, Result};
pub use filter::{ItemFilters, KNOWLEDGE_LEVEL_FILTER, TaggedItem};
pub use import::{
    BulkImportOutcome, ImportCount, MAX_IMPORT_LINES, parse_title_lines, title_case,
};
pub use models::{
    Collection, CollectionId, CollectionPatch, CollectionSummary, Item, ItemId, ItemPatch,
    KnowledgeLevel, LegacyField, NewItem, Tag, TagId, TagPair, effective_tags, normalize,
};
pub use store::{BackendKind, CatalogStore, JsonStore, SeedPolicy, SqliteStore};
pub use vocabulary::{TagVocabulary, available_tags, sorted_distinct};
