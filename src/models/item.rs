use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use super::{CollectionId, ItemId, KnowledgeLevel, TagPair, clean_text, dedup_pairs};
use crate::error::{CatalogError, Result};

/// An entry in a collection, such as a tune in a repertoire list.
///
/// `musical_key`, `composer` and `style` are legacy fields. They read as
/// tags under the reserved keys `Key`, `Composer` and `Style`; see
/// [`effective_tags`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub collection_id: CollectionId,
    pub title: String,
    #[serde(default)]
    pub musical_key: Option<String>,
    #[serde(default)]
    pub composer: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Opaque reference produced by the media-link parser.
    #[serde(default)]
    pub media_ref: Option<String>,
    /// Opaque reference to an uploaded lead sheet.
    #[serde(default)]
    pub lead_sheet_ref: Option<String>,
    #[serde(default)]
    pub knowledge_level: Option<KnowledgeLevel>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Item {
    /// Builds a stored item from validated fields.
    pub fn from_new(id: ItemId, fields: NewItem, now: OffsetDateTime) -> Self {
        Self {
            id,
            collection_id: fields.collection_id,
            title: fields.title,
            musical_key: fields.musical_key,
            composer: fields.composer,
            style: fields.style,
            notes: fields.notes,
            media_ref: fields.media_ref,
            lead_sheet_ref: fields.lead_sheet_ref,
            knowledge_level: fields.knowledge_level,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the item's level, reading an unset level as `DoesNotKnow`.
    pub fn effective_knowledge_level(&self) -> KnowledgeLevel {
        self.knowledge_level.unwrap_or_default()
    }

    /// Returns the value of a legacy field, if set.
    pub fn legacy(&self, field: LegacyField) -> Option<&str> {
        match field {
            LegacyField::Key => self.musical_key.as_deref(),
            LegacyField::Composer => self.composer.as_deref(),
            LegacyField::Style => self.style.as_deref(),
        }
    }

    /// Returns the fields needed to create a copy of this item in `target`.
    pub fn to_new(&self, target: CollectionId) -> NewItem {
        NewItem {
            collection_id: target,
            title: self.title.clone(),
            musical_key: self.musical_key.clone(),
            composer: self.composer.clone(),
            style: self.style.clone(),
            notes: self.notes.clone(),
            media_ref: self.media_ref.clone(),
            lead_sheet_ref: self.lead_sheet_ref.clone(),
            knowledge_level: self.knowledge_level,
        }
    }
}

/// The three legacy fields and the reserved tag keys they project onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyField {
    Key,
    Composer,
    Style,
}

impl LegacyField {
    /// All legacy fields, in the order their tags appear.
    pub const ALL: [LegacyField; 3] = [Self::Key, Self::Composer, Self::Style];

    /// Returns the reserved tag key this field is promoted to.
    pub fn tag_key(self) -> &'static str {
        match self {
            Self::Key => "Key",
            Self::Composer => "Composer",
            Self::Style => "Style",
        }
    }

    /// Returns the SQLite column holding this field.
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Key => "musical_key",
            Self::Composer => "composer",
            Self::Style => "style",
        }
    }
}

impl fmt::Display for LegacyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key => write!(f, "key"),
            Self::Composer => write!(f, "composer"),
            Self::Style => write!(f, "style"),
        }
    }
}

impl FromStr for LegacyField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "key" => Ok(Self::Key),
            "composer" => Ok(Self::Composer),
            "style" => Ok(Self::Style),
            other => Err(format!(
                "unknown legacy field '{other}' (expected key, composer or style)"
            )),
        }
    }
}

/// Builds an item's effective tag set.
///
/// Non-empty legacy fields come first as `Key`/`Composer`/`Style` tags,
/// followed by the explicit tags. Pairs that normalize to the same identity
/// appear once.
///
/// # Examples
///
/// ```
/// use tunebook::{effective_tags, CollectionId, Item, ItemId, NewItem, TagPair};
/// use time::OffsetDateTime;
///
/// let fields = NewItem::new(CollectionId::new(1), "Misty").musical_key("Eb");
/// let item = Item::from_new(ItemId::new(1), fields, OffsetDateTime::UNIX_EPOCH);
///
/// let tags = effective_tags(&item, &[TagPair::new("key", "EB"), TagPair::new("Era", "Swing")]);
/// assert_eq!(tags, vec![TagPair::new("Key", "Eb"), TagPair::new("Era", "Swing")]);
/// ```
pub fn effective_tags(item: &Item, explicit: &[TagPair]) -> Vec<TagPair> {
    let legacy: Vec<TagPair> = LegacyField::ALL
        .into_iter()
        .filter_map(|field| {
            item.legacy(field)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| TagPair::new(field.tag_key(), value))
        })
        .collect();

    dedup_pairs(legacy.iter().chain(explicit))
}

/// Fields for creating an item.
///
/// # Examples
///
/// ```
/// use tunebook::{CollectionId, KnowledgeLevel, NewItem};
///
/// let fields = NewItem::new(CollectionId::new(1), "Blue Bossa")
///     .musical_key("Cm")
///     .composer("Kenny Dorham")
///     .knowledge_level(KnowledgeLevel::Knows);
///
/// assert_eq!(fields.title, "Blue Bossa");
/// assert_eq!(fields.style, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub collection_id: CollectionId,
    pub title: String,
    pub musical_key: Option<String>,
    pub composer: Option<String>,
    pub style: Option<String>,
    pub notes: Option<String>,
    pub media_ref: Option<String>,
    pub lead_sheet_ref: Option<String>,
    pub knowledge_level: Option<KnowledgeLevel>,
}

impl NewItem {
    /// Starts a new item with only the required fields set.
    pub fn new(collection_id: CollectionId, title: impl Into<String>) -> Self {
        Self {
            collection_id,
            title: title.into(),
            musical_key: None,
            composer: None,
            style: None,
            notes: None,
            media_ref: None,
            lead_sheet_ref: None,
            knowledge_level: None,
        }
    }

    /// Sets the musical key.
    pub fn musical_key(mut self, key: impl Into<String>) -> Self {
        self.musical_key = Some(key.into());
        self
    }

    /// Sets the composer.
    pub fn composer(mut self, composer: impl Into<String>) -> Self {
        self.composer = Some(composer.into());
        self
    }

    /// Sets the style.
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Sets the notes.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Sets the media reference.
    pub fn media_ref(mut self, reference: impl Into<String>) -> Self {
        self.media_ref = Some(reference.into());
        self
    }

    /// Sets the lead sheet reference.
    pub fn lead_sheet_ref(mut self, reference: impl Into<String>) -> Self {
        self.lead_sheet_ref = Some(reference.into());
        self
    }

    /// Sets the knowledge level.
    pub fn knowledge_level(mut self, level: KnowledgeLevel) -> Self {
        self.knowledge_level = Some(level);
        self
    }

    /// Trims every text field, turns blanks into `None`, and requires a title.
    pub fn validated(self) -> Result<Self> {
        Ok(Self {
            collection_id: self.collection_id,
            title: validate_title(&self.title)?,
            musical_key: clean_text(self.musical_key.as_deref()),
            composer: clean_text(self.composer.as_deref()),
            style: clean_text(self.style.as_deref()),
            notes: clean_text(self.notes.as_deref()),
            media_ref: clean_text(self.media_ref.as_deref()),
            lead_sheet_ref: clean_text(self.lead_sheet_ref.as_deref()),
            knowledge_level: self.knowledge_level,
        })
    }
}

/// Partial update for an item. `None` leaves a field unchanged and
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub musical_key: Option<Option<String>>,
    pub composer: Option<Option<String>>,
    pub style: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub media_ref: Option<Option<String>>,
    pub lead_sheet_ref: Option<Option<String>>,
    pub knowledge_level: Option<Option<KnowledgeLevel>>,
}

impl ItemPatch {
    /// Applies the patch and bumps `updated_at`.
    ///
    /// The item is left untouched when the new title is invalid.
    pub fn apply(&self, item: &mut Item, now: OffsetDateTime) -> Result<()> {
        let title = match &self.title {
            Some(title) => Some(validate_title(title)?),
            None => None,
        };

        if let Some(title) = title {
            item.title = title;
        }
        let text_fields = [
            (&self.musical_key, &mut item.musical_key),
            (&self.composer, &mut item.composer),
            (&self.style, &mut item.style),
            (&self.notes, &mut item.notes),
            (&self.media_ref, &mut item.media_ref),
            (&self.lead_sheet_ref, &mut item.lead_sheet_ref),
        ];
        for (change, field) in text_fields {
            if let Some(value) = change {
                *field = clean_text(value.as_deref());
            }
        }
        if let Some(level) = self.knowledge_level {
            item.knowledge_level = level;
        }
        item.updated_at = now;
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CatalogError::validation("title", "title cannot be empty"));
    }
    Ok(title.to_string())
}
