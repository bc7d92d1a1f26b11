//! Personality-trait keyword table for the similarity boost.
//!
//! Each trait axis owns a small set of keyword ids. A user tag such as
//! `"INFP"` selects axes by prefix (`I`, `E`) or by containment (`N`, `S`);
//! the boost applies when a selected axis shares a keyword with the place.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use mohe_core::{KeywordCatalogRepository, KeywordId, Result};

/// One of the four trait axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraitAxis {
    Introversion,
    Extroversion,
    Intuition,
    Sensing,
}

impl TraitAxis {
    /// Rule order. Earlier axes are checked first.
    pub const ORDER: [TraitAxis; 4] = [
        TraitAxis::Introversion,
        TraitAxis::Extroversion,
        TraitAxis::Intuition,
        TraitAxis::Sensing,
    ];

    /// Whether `tag` selects this axis.
    pub fn applies_to(&self, tag: &str) -> bool {
        match self {
            Self::Introversion => tag.starts_with('I'),
            Self::Extroversion => tag.starts_with('E'),
            Self::Intuition => tag.contains('N'),
            Self::Sensing => tag.contains('S'),
        }
    }
}

/// Keyword names per axis, resolved to ids through the keyword catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitKeywordNames {
    pub introversion: Vec<String>,
    pub extroversion: Vec<String>,
    pub intuition: Vec<String>,
    pub sensing: Vec<String>,
}

impl Default for TraitKeywordNames {
    fn default() -> Self {
        fn names(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            introversion: names(&["quiet", "study_friendly", "cozy", "solo_friendly"]),
            extroversion: names(&["lively", "group_friendly", "party", "social"]),
            intuition: names(&["unique", "artistic", "creative", "experimental"]),
            sensing: names(&["traditional", "reliable", "classic", "local_favorite"]),
        }
    }
}

/// Keyword id sets per trait axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraitBoostTable {
    introversion: BTreeSet<KeywordId>,
    extroversion: BTreeSet<KeywordId>,
    intuition: BTreeSet<KeywordId>,
    sensing: BTreeSet<KeywordId>,
}

impl TraitBoostTable {
    pub fn new(
        introversion: impl IntoIterator<Item = KeywordId>,
        extroversion: impl IntoIterator<Item = KeywordId>,
        intuition: impl IntoIterator<Item = KeywordId>,
        sensing: impl IntoIterator<Item = KeywordId>,
    ) -> Self {
        Self {
            introversion: introversion.into_iter().collect(),
            extroversion: extroversion.into_iter().collect(),
            intuition: intuition.into_iter().collect(),
            sensing: sensing.into_iter().collect(),
        }
    }

    /// Historical catalog ids. Only valid while the catalog keeps its row ids.
    pub fn legacy() -> Self {
        Self::new([16, 38, 24, 98], [26, 43, 96, 99], [23, 85, 91, 93], [87, 90, 51, 68])
    }

    /// Resolve `names` through the catalog. Unknown names are skipped with a warning.
    pub async fn from_catalog(
        catalog: &dyn KeywordCatalogRepository,
        names: &TraitKeywordNames,
    ) -> Result<Self> {
        let entries = catalog.list_all().await?;
        let resolve = |axis: &str, wanted: &[String]| -> BTreeSet<KeywordId> {
            wanted
                .iter()
                .filter_map(|name| {
                    let found = entries.iter().find(|e| &e.keyword == name).map(|e| e.id);
                    if found.is_none() {
                        warn!(
                            subsystem = "similarity",
                            component = "trait_boost",
                            axis,
                            keyword = %name,
                            "Trait keyword missing from catalog, skipped"
                        );
                    }
                    found
                })
                .collect()
        };

        let table = Self {
            introversion: resolve("introversion", &names.introversion),
            extroversion: resolve("extroversion", &names.extroversion),
            intuition: resolve("intuition", &names.intuition),
            sensing: resolve("sensing", &names.sensing),
        };
        debug!(
            subsystem = "similarity",
            component = "trait_boost",
            op = "from_catalog",
            resolved = table.len(),
            "Trait boost table resolved"
        );
        Ok(table)
    }

    pub fn keywords(&self, axis: TraitAxis) -> &BTreeSet<KeywordId> {
        match axis {
            TraitAxis::Introversion => &self.introversion,
            TraitAxis::Extroversion => &self.extroversion,
            TraitAxis::Intuition => &self.intuition,
            TraitAxis::Sensing => &self.sensing,
        }
    }

    /// Total number of keyword ids across axes.
    pub fn len(&self) -> usize {
        TraitAxis::ORDER
            .iter()
            .map(|axis| self.keywords(*axis).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First axis selected by `tag` that shares a keyword with `place_keywords`.
    pub fn matching_axis(
        &self,
        tag: &str,
        place_keywords: &BTreeSet<KeywordId>,
    ) -> Option<TraitAxis> {
        TraitAxis::ORDER.into_iter().find(|axis| {
            axis.applies_to(tag) && !self.keywords(*axis).is_disjoint(place_keywords)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mohe_core::KeywordCatalogEntry;

    fn ids(list: &[KeywordId]) -> BTreeSet<KeywordId> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_axis_selection_by_tag() {
        assert!(TraitAxis::Introversion.applies_to("INTJ"));
        assert!(!TraitAxis::Introversion.applies_to("ENTJ"));
        assert!(TraitAxis::Extroversion.applies_to("ESFP"));
        assert!(TraitAxis::Intuition.applies_to("ENTP"));
        assert!(TraitAxis::Sensing.applies_to("ISTJ"));
        assert!(!TraitAxis::Sensing.applies_to("INFP"));
    }

    #[test]
    fn test_legacy_table_matches() {
        let table = TraitBoostTable::legacy();
        assert_eq!(
            table.matching_axis("INFP", &ids(&[16])),
            Some(TraitAxis::Introversion)
        );
        assert_eq!(table.matching_axis("ENFP", &ids(&[16])), None);
        assert_eq!(
            table.matching_axis("ESTJ", &ids(&[43])),
            Some(TraitAxis::Extroversion)
        );
    }

    #[test]
    fn test_falls_through_to_later_axis() {
        // Introvert without a quiet keyword still gets the intuition match.
        let table = TraitBoostTable::legacy();
        assert_eq!(
            table.matching_axis("INFP", &ids(&[85])),
            Some(TraitAxis::Intuition)
        );
        assert_eq!(
            table.matching_axis("ISTJ", &ids(&[68])),
            Some(TraitAxis::Sensing)
        );
    }

    #[test]
    fn test_no_keywords_no_match() {
        let table = TraitBoostTable::legacy();
        assert_eq!(table.matching_axis("INTJ", &BTreeSet::new()), None);
        assert_eq!(table.len(), 16);
        assert!(TraitBoostTable::default().is_empty());
    }

    #[tokio::test]
    async fn test_from_catalog_resolves_names() {
        let catalog = mohe_db::InMemoryKeywordCatalog::new(vec![
            KeywordCatalogEntry {
                id: 7,
                keyword: "quiet".into(),
                category: "atmosphere".into(),
                vector_position: 6,
            },
            KeywordCatalogEntry {
                id: 9,
                keyword: "lively".into(),
                category: "atmosphere".into(),
                vector_position: 8,
            },
        ]);
        let table = TraitBoostTable::from_catalog(&catalog, &TraitKeywordNames::default())
            .await
            .unwrap();
        assert_eq!(table.keywords(TraitAxis::Introversion), &ids(&[7]));
        assert_eq!(table.keywords(TraitAxis::Extroversion), &ids(&[9]));
        assert!(table.keywords(TraitAxis::Sensing).is_empty());
    }
}
