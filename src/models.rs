mod collection;
mod ids;
mod item;
mod knowledge_level;
mod tag;

pub use collection::{Collection, CollectionPatch, CollectionSummary, validate_collection_name};
pub use ids::{CollectionId, ItemId, TagId};
pub use item::{Item, ItemPatch, LegacyField, NewItem, effective_tags};
pub use knowledge_level::KnowledgeLevel;
pub use tag::{Tag, TagPair, dedup_pairs, normalize};

/// Trims optional text, mapping blank input to `None`.
pub(crate) fn clean_text(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}
