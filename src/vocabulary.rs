//! Tag vocabulary aggregation.
//!
//! Spellings that normalize to the same text are listed once, using the
//! lexicographically smallest raw spelling, and results are sorted by
//! normalized text. The outcome does not depend on the order rows were read
//! in, which keeps both backends in agreement.

use std::collections::BTreeMap;

use crate::filter::TaggedItem;
use crate::models::{TagPair, normalize};

/// Available tag values per key for one collection's items.
pub type TagVocabulary = BTreeMap<String, Vec<String>>;

/// Collects the effective tags of `items` into a sorted key → values map.
///
/// # Examples
///
/// ```
/// use tunebook::{available_tags, CollectionId, Item, ItemId, NewItem, TagPair, TaggedItem};
/// use time::OffsetDateTime;
///
/// let fields = NewItem::new(CollectionId::new(1), "Misty").musical_key("Eb");
/// let item = Item::from_new(ItemId::new(1), fields, OffsetDateTime::UNIX_EPOCH);
/// let tagged = TaggedItem { item, tags: vec![TagPair::new("key", "C")] };
///
/// let vocabulary = available_tags(&[tagged]);
/// assert_eq!(vocabulary["Key"], vec!["C", "Eb"]);
/// ```
pub fn available_tags(items: &[TaggedItem]) -> TagVocabulary {
    let pairs: Vec<TagPair> = items.iter().flat_map(TaggedItem::effective_tags).collect();
    group_pairs(&pairs)
}

/// Groups pairs by normalized key, deduplicating and sorting the values.
pub fn group_pairs(pairs: &[TagPair]) -> TagVocabulary {
    let mut by_key: BTreeMap<String, (String, Vec<&str>)> = BTreeMap::new();
    for pair in pairs.iter().filter(|pair| !pair.is_blank()) {
        let key = pair.key.trim();
        let entry = by_key
            .entry(normalize(key))
            .or_insert_with(|| (key.to_string(), Vec::new()));
        if key < entry.0.as_str() {
            entry.0 = key.to_string();
        }
        entry.1.push(pair.value.as_str());
    }

    by_key
        .into_values()
        .map(|(key, values)| (key, sorted_distinct(values)))
        .collect()
}

/// Deduplicates by normalized text and sorts, dropping blank entries.
///
/// # Examples
///
/// ```
/// use tunebook::sorted_distinct;
///
/// let values = sorted_distinct(["swing", "Ballad", " Swing", "", "ballad"]);
/// assert_eq!(values, vec!["Ballad", "Swing"]);
/// ```
pub fn sorted_distinct<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut entries: Vec<(String, &str)> = values
        .into_iter()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| (normalize(value), value))
        .collect();
    entries.sort();
    entries.dedup_by(|later, earlier| later.0 == earlier.0);
    entries.into_iter().map(|(_, raw)| raw.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionId, Item, ItemId, NewItem};
    use time::OffsetDateTime;

    fn tagged(id: i64, fields: NewItem, tags: &[(&str, &str)]) -> TaggedItem {
        TaggedItem {
            item: Item::from_new(ItemId::new(id), fields, OffsetDateTime::UNIX_EPOCH),
            tags: tags.iter().map(|(k, v)| TagPair::new(*k, *v)).collect(),
        }
    }

    #[test]
    fn combines_legacy_and_explicit_tags() {
        let c = CollectionId::new(1);
        let items = vec![
            tagged(1, NewItem::new(c, "Misty").musical_key("Eb").style("Ballad"), &[]),
            tagged(
                2,
                NewItem::new(c, "Blue Bossa").composer("Kenny Dorham"),
                &[("Style", "Bossa Nova"), ("Era", "Hard Bop")],
            ),
        ];

        let vocabulary = available_tags(&items);

        assert_eq!(
            vocabulary.keys().collect::<Vec<_>>(),
            vec!["Composer", "Era", "Key", "Style"]
        );
        assert_eq!(vocabulary["Style"], vec!["Ballad", "Bossa Nova"]);
        assert_eq!(vocabulary["Composer"], vec!["Kenny Dorham"]);
    }

    #[test]
    fn collapses_spelling_variants() {
        let pairs = vec![
            TagPair::new("era", "swing"),
            TagPair::new("Era", "Swing"),
            TagPair::new("ERA ", " Bebop"),
        ];

        let vocabulary = group_pairs(&pairs);

        assert_eq!(vocabulary.len(), 1);
        assert_eq!(vocabulary["ERA"], vec!["Bebop", "Swing"]);
    }

    #[test]
    fn result_does_not_depend_on_input_order() {
        let mut pairs = vec![
            TagPair::new("Mood", "dark"),
            TagPair::new("Mood", "Bright"),
            TagPair::new("Mood", "Dark"),
        ];
        let forward = group_pairs(&pairs);
        pairs.reverse();
        assert_eq!(group_pairs(&pairs), forward);
        assert_eq!(forward["Mood"], vec!["Bright", "Dark"]);
    }

    #[test]
    fn empty_input_gives_empty_vocabulary() {
        assert!(available_tags(&[]).is_empty());
        assert!(sorted_distinct(Vec::<&str>::new()).is_empty());
    }
}
