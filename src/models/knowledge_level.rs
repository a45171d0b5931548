use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How well the user knows an item.
///
/// An item without a recorded level is treated as `DoesNotKnow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnowledgeLevel {
    #[default]
    DoesNotKnow,
    KindOfKnows,
    Knows,
}

impl KnowledgeLevel {
    /// All levels, from least to most familiar.
    pub const ALL: [KnowledgeLevel; 3] = [Self::DoesNotKnow, Self::KindOfKnows, Self::Knows];

    /// Returns the wire name used in filters and persisted state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DoesNotKnow => "does-not-know",
            Self::KindOfKnows => "kind-of-knows",
            Self::Knows => "knows",
        }
    }
}

impl fmt::Display for KnowledgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnowledgeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!("unknown knowledge level '{wanted}' (expected does-not-know, kind-of-knows or knows)")
            })
    }
}
