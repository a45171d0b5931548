use tracing::info;

use super::CatalogStore;
use crate::error::Result;
use crate::models::{KnowledgeLevel, NewItem, TagPair};

/// Writes the sample collections a fresh catalog starts with.
///
/// Goes through the public store operations only, so both backends end up
/// with the same ids and content.
pub fn seed_sample<S: CatalogStore + ?Sized>(store: &mut S) -> Result<()> {
    let standards = store.create_collection(
        "Jazz Standards",
        Some("Tunes to know for a jam session"),
    )?;
    let practice = store.create_collection("Practice List", None)?;

    let items = [
        (
            NewItem::new(standards.id, "Misty")
                .musical_key("Eb")
                .composer("Erroll Garner")
                .style("Ballad")
                .knowledge_level(KnowledgeLevel::Knows),
            vec![TagPair::new("Era", "Swing"), TagPair::new("Form", "AABA")],
        ),
        (
            NewItem::new(standards.id, "Autumn Leaves")
                .musical_key("Bb")
                .composer("Joseph Kosma")
                .style("Swing")
                .knowledge_level(KnowledgeLevel::KindOfKnows),
            vec![TagPair::new("Form", "AABC")],
        ),
        (
            NewItem::new(standards.id, "Blue Bossa")
                .musical_key("Cm")
                .composer("Kenny Dorham")
                .style("Bossa Nova")
                .notes("Watch the ii-V into Db in the second half"),
            vec![TagPair::new("Era", "Hard Bop")],
        ),
        (
            NewItem::new(practice.id, "Giant Steps")
                .musical_key("B")
                .composer("John Coltrane")
                .style("Up Tempo"),
            vec![TagPair::new("Era", "Hard Bop")],
        ),
    ];

    for (fields, tags) in items {
        store.create_item(fields, &tags)?;
    }

    info!(backend = %store.backend(), "seeded sample catalog");
    Ok(())
}
