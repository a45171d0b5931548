//! Free-text search and tag filtering over the items of one collection.
//!
//! Both storage backends hand their scoped items to [`filter_items`], so the
//! matching rules live in exactly one place:
//!
//! - search is a case-insensitive substring test over title, the legacy
//!   fields and notes (OR across fields);
//! - `knowledgeLevel` keeps items whose level is one of the requested ones;
//! - every other filter key must be satisfied by at least one tag of the
//!   item's effective tag set (OR within a key, AND across keys), compared by
//!   normalized equality.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{Item, KnowledgeLevel, TagPair, effective_tags, normalize};

/// Filter key that selects on knowledge level instead of tags.
pub const KNOWLEDGE_LEVEL_FILTER: &str = "knowledgeLevel";

/// Requested filter values, keyed by tag key.
///
/// # Examples
///
/// ```
/// use tunebook::ItemFilters;
///
/// let filters = ItemFilters::new()
///     .with("Style", ["Ballad", "Bossa Nova"])
///     .with("knowledgeLevel", ["knows"]);
///
/// assert!(!filters.is_empty());
/// assert!(ItemFilters::new().with("Key", Vec::<String>::new()).is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemFilters(BTreeMap<String, Vec<String>>);

impl ItemFilters {
    /// Creates an empty filter set that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `values` as alternatives for `key`.
    pub fn with<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Adds a single alternative for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Returns true when no key has a non-blank value, i.e. nothing is filtered.
    pub fn is_empty(&self) -> bool {
        self.0
            .values()
            .all(|values| values.iter().all(|value| value.trim().is_empty()))
    }

    /// Iterates over the keys and their requested values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(key, values)| (key.as_str(), values.as_slice()))
    }
}

/// An item with its explicitly associated tags, in association order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedItem {
    pub item: Item,
    pub tags: Vec<TagPair>,
}

impl TaggedItem {
    /// Returns legacy-field tags plus explicit tags; see [`effective_tags`].
    pub fn effective_tags(&self) -> Vec<TagPair> {
        effective_tags(&self.item, &self.tags)
    }
}

/// Filters one collection's items, preserving their order.
///
/// `items` must already be scoped to a single collection. A blank `search`
/// and empty `filters` return every item.
pub fn filter_items(items: Vec<TaggedItem>, search: Option<&str>, filters: &ItemFilters) -> Vec<Item> {
    let needle = search
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase);
    let criteria = Criteria::from_filters(filters);

    items
        .into_iter()
        .filter(|tagged| {
            needle
                .as_deref()
                .is_none_or(|needle| matches_search(&tagged.item, needle))
        })
        .filter(|tagged| criteria.matches_level(&tagged.item))
        .filter(|tagged| criteria.matches_tags(tagged))
        .map(|tagged| tagged.item)
        .collect()
}

fn matches_search(item: &Item, needle: &str) -> bool {
    let fields = [
        Some(item.title.as_str()),
        item.musical_key.as_deref(),
        item.composer.as_deref(),
        item.style.as_deref(),
        item.notes.as_deref(),
    ];
    fields
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Filters split into the knowledge-level set and normalized tag sets.
struct Criteria {
    levels: Option<HashSet<KnowledgeLevel>>,
    tags: HashMap<String, HashSet<String>>,
}

impl Criteria {
    fn from_filters(filters: &ItemFilters) -> Self {
        let mut levels: Option<HashSet<KnowledgeLevel>> = None;
        let mut tags: HashMap<String, HashSet<String>> = HashMap::new();

        for (key, values) in filters.iter() {
            let values: Vec<&str> = values
                .iter()
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .collect();
            if values.is_empty() {
                continue;
            }

            if key == KNOWLEDGE_LEVEL_FILTER {
                // Unknown level names stay in the request but can never match.
                let requested = levels.get_or_insert_with(HashSet::new);
                requested.extend(
                    values
                        .iter()
                        .filter_map(|value| value.parse::<KnowledgeLevel>().ok()),
                );
            } else {
                tags.entry(normalize(key))
                    .or_default()
                    .extend(values.iter().map(|value| normalize(value)));
            }
        }

        Self { levels, tags }
    }

    fn matches_level(&self, item: &Item) -> bool {
        match &self.levels {
            Some(levels) => levels.contains(&item.effective_knowledge_level()),
            None => true,
        }
    }

    fn matches_tags(&self, tagged: &TaggedItem) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let item_tags: Vec<(String, String)> = tagged
            .effective_tags()
            .iter()
            .map(TagPair::identity)
            .collect();

        self.tags.iter().all(|(key, wanted)| {
            item_tags
                .iter()
                .any(|(tag_key, tag_value)| tag_key == key && wanted.contains(tag_value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionId, ItemId, NewItem};
    use time::OffsetDateTime;

    fn tagged(id: i64, fields: NewItem, tags: &[(&str, &str)]) -> TaggedItem {
        TaggedItem {
            item: Item::from_new(ItemId::new(id), fields, OffsetDateTime::UNIX_EPOCH),
            tags: tags.iter().map(|(k, v)| TagPair::new(*k, *v)).collect(),
        }
    }

    fn sample() -> Vec<TaggedItem> {
        let c = CollectionId::new(1);
        vec![
            tagged(
                1,
                NewItem::new(c, "Misty").musical_key("Eb").style("Ballad"),
                &[("Era", "Swing")],
            ),
            tagged(2, NewItem::new(c, "Autumn Leaves").musical_key("Bb"), &[]),
            tagged(
                3,
                NewItem::new(c, "Blue Bossa")
                    .composer("Kenny Dorham")
                    .notes("Latin feel, watch the ii-V in Db")
                    .knowledge_level(KnowledgeLevel::Knows),
                &[("Style", "Bossa Nova"), ("Key", "Cm")],
            ),
        ]
    }

    fn titles(items: &[Item]) -> Vec<&str> {
        items.iter().map(|item| item.title.as_str()).collect()
    }

    #[test]
    fn no_search_and_no_filters_returns_everything_in_order() {
        let result = filter_items(sample(), None, &ItemFilters::new());
        assert_eq!(titles(&result), vec!["Misty", "Autumn Leaves", "Blue Bossa"]);

        let result = filter_items(sample(), Some("   "), &ItemFilters::new());
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn search_checks_title_legacy_fields_and_notes() {
        let by_title = filter_items(sample(), Some("LEAVES"), &ItemFilters::new());
        assert_eq!(titles(&by_title), vec!["Autumn Leaves"]);

        let by_composer = filter_items(sample(), Some("dorham"), &ItemFilters::new());
        assert_eq!(titles(&by_composer), vec!["Blue Bossa"]);

        let by_notes = filter_items(sample(), Some("ii-v"), &ItemFilters::new());
        assert_eq!(titles(&by_notes), vec!["Blue Bossa"]);

        let by_key = filter_items(sample(), Some("b"), &ItemFilters::new());
        assert_eq!(titles(&by_key), vec!["Misty", "Autumn Leaves", "Blue Bossa"]);
    }

    #[test]
    fn search_does_not_look_at_explicit_tags() {
        let result = filter_items(sample(), Some("swing"), &ItemFilters::new());
        assert!(result.is_empty());
    }

    #[test]
    fn values_within_a_key_are_alternatives() {
        let filters = ItemFilters::new().with("Key", ["Eb", "Bb"]);
        let result = filter_items(sample(), None, &filters);
        assert_eq!(titles(&result), vec!["Misty", "Autumn Leaves"]);
    }

    #[test]
    fn all_keys_must_match() {
        let filters = ItemFilters::new().with("Style", ["Ballad"]).with("Key", ["Bb"]);
        assert!(filter_items(sample(), None, &filters).is_empty());

        let filters = ItemFilters::new().with("Style", ["Ballad"]).with("Key", ["Eb"]);
        assert_eq!(titles(&filter_items(sample(), None, &filters)), vec!["Misty"]);
    }

    #[test]
    fn tag_matching_is_normalized_equality_not_substring() {
        let filters = ItemFilters::new().with(" style ", ["BOSSA NOVA"]);
        assert_eq!(titles(&filter_items(sample(), None, &filters)), vec!["Blue Bossa"]);

        let filters = ItemFilters::new().with("Style", ["Bossa"]);
        assert!(filter_items(sample(), None, &filters).is_empty());
    }

    #[test]
    fn explicit_and_legacy_tags_both_count() {
        let filters = ItemFilters::new().with("Key", ["Cm"]);
        assert_eq!(titles(&filter_items(sample(), None, &filters)), vec!["Blue Bossa"]);

        let filters = ItemFilters::new().with("Era", ["swing"]);
        assert_eq!(titles(&filter_items(sample(), None, &filters)), vec!["Misty"]);
    }

    #[test]
    fn unset_knowledge_level_counts_as_does_not_know() {
        let filters = ItemFilters::new().with(KNOWLEDGE_LEVEL_FILTER, ["does-not-know"]);
        let result = filter_items(sample(), None, &filters);
        assert_eq!(titles(&result), vec!["Misty", "Autumn Leaves"]);

        let filters = ItemFilters::new().with(KNOWLEDGE_LEVEL_FILTER, ["knows", "kind-of-knows"]);
        assert_eq!(titles(&filter_items(sample(), None, &filters)), vec!["Blue Bossa"]);
    }

    #[test]
    fn unknown_knowledge_level_matches_nothing() {
        let filters = ItemFilters::new().with(KNOWLEDGE_LEVEL_FILTER, ["expert"]);
        assert!(filter_items(sample(), None, &filters).is_empty());
    }

    #[test]
    fn empty_value_lists_are_ignored() {
        let filters = ItemFilters::new()
            .with("Key", Vec::<String>::new())
            .with(KNOWLEDGE_LEVEL_FILTER, [" "]);
        assert_eq!(filter_items(sample(), None, &filters).len(), 3);
    }

    #[test]
    fn search_and_filters_combine() {
        let filters = ItemFilters::new().with("Key", ["Eb", "Bb", "Cm"]);
        let result = filter_items(sample(), Some("autumn"), &filters);
        assert_eq!(titles(&result), vec!["Autumn Leaves"]);
    }
}
