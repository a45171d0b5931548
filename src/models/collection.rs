use serde::{Deserialize, Serialize};

use super::{CollectionId, clean_text};
use crate::error::{CatalogError, Result};

/// A named group of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A collection together with how many items it currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    #[serde(flatten)]
    pub collection: Collection,
    pub item_count: usize,
}

/// Partial update for a collection. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

impl CollectionPatch {
    /// Applies the patch to `collection` after validating the new name.
    pub fn apply(&self, collection: &mut Collection) -> Result<()> {
        if let Some(name) = &self.name {
            collection.name = validate_collection_name(name)?;
        }
        if let Some(description) = &self.description {
            collection.description = clean_text(description.as_deref());
        }
        Ok(())
    }
}

/// Trims a collection name and rejects empty names.
pub fn validate_collection_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::validation(
            "name",
            "collection name cannot be empty",
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standards() -> Collection {
        Collection {
            id: CollectionId::new(1),
            name: "Standards".to_string(),
            description: Some("Gig book".to_string()),
        }
    }

    #[test]
    fn patch_renames_and_clears_description() {
        let mut collection = standards();
        let patch = CollectionPatch {
            name: Some("  Ballads ".to_string()),
            description: Some(None),
        };

        patch.apply(&mut collection).unwrap();

        assert_eq!(collection.name, "Ballads");
        assert_eq!(collection.description, None);
    }

    #[test]
    fn patch_rejects_blank_name_without_touching_collection() {
        let mut collection = standards();
        let patch = CollectionPatch {
            name: Some("   ".to_string()),
            ..Default::default()
        };

        let err = patch.apply(&mut collection).unwrap_err();

        assert!(matches!(err, CatalogError::Validation { field: "name", .. }));
        assert_eq!(collection, standards());
    }

    #[test]
    fn summary_flattens_collection_fields() {
        let summary = CollectionSummary {
            collection: standards(),
            item_count: 3,
        };

        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["name"], "Standards");
        assert_eq!(json["itemCount"], 3);
    }
}
