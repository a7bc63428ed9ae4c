//! Filename entity parsing.
//!
//! A BIDS filename is `key-value` entity pairs joined by `_`, then a suffix,
//! then an extension: `sub-01_task-rest_bold.nii.gz`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z]+)-([a-zA-Z0-9]+)$").unwrap());
static SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+$").unwrap());

/// Entities, suffix and extension parsed from a filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKeySet {
    /// Entity pairs in filename order
    pub entities: Vec<(String, String)>,
    pub suffix: Option<String>,
    /// Extension including the leading dot, possibly compound (`.nii.gz`)
    pub extension: String,
}

impl EntityKeySet {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entities
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Rebuild the filename from the given entity pairs and this set's suffix.
    pub fn file_name_with<'a, I>(&self, entities: I, extension: &str) -> String
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        let mut parts: Vec<String> = entities
            .into_iter()
            .map(|(k, v)| format!("{}-{}", k, v))
            .collect();
        if let Some(suffix) = &self.suffix {
            parts.push(suffix.clone());
        }
        format!("{}{}", parts.join("_"), extension)
    }
}

/// Parses dataset filenames into entity key sets.
pub trait FilenameMatcher: Send + Sync + std::fmt::Debug {
    /// `None` when the name does not follow the entity grammar.
    fn parse(&self, file_name: &str) -> Option<EntityKeySet>;
}

/// Regex-based matcher for the `key-value_..._suffix.ext` grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityFilenameMatcher;

impl FilenameMatcher for EntityFilenameMatcher {
    fn parse(&self, file_name: &str) -> Option<EntityKeySet> {
        let (stem, extension) = match file_name.find('.') {
            Some(idx) => file_name.split_at(idx),
            None => (file_name, ""),
        };
        if stem.is_empty() {
            return None;
        }

        let tokens: Vec<&str> = stem.split('_').collect();
        let (last, leading) = tokens.split_last()?;
        let mut entities = Vec::with_capacity(tokens.len());
        for token in leading {
            let caps = ENTITY.captures(token)?;
            entities.push((caps[1].to_string(), caps[2].to_string()));
        }

        let suffix = if let Some(caps) = ENTITY.captures(last) {
            entities.push((caps[1].to_string(), caps[2].to_string()));
            None
        } else if SUFFIX.is_match(last) {
            Some(last.to_string())
        } else {
            return None;
        };

        Some(EntityKeySet {
            entities,
            suffix,
            extension: extension.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entities_suffix_and_compound_extension() {
        let keys = EntityFilenameMatcher
            .parse("sub-01_ses-02_task-rest_run-1_bold.nii.gz")
            .unwrap();
        assert_eq!(keys.get("sub"), Some("01"));
        assert_eq!(keys.get("ses"), Some("02"));
        assert_eq!(keys.get("task"), Some("rest"));
        assert_eq!(keys.get("acq"), None);
        assert_eq!(keys.suffix(), Some("bold"));
        assert_eq!(keys.extension, ".nii.gz");
        assert_eq!(keys.entities.len(), 4);
    }

    #[test]
    fn parses_suffix_only_names() {
        let keys = EntityFilenameMatcher.parse("participants.tsv").unwrap();
        assert!(keys.entities.is_empty());
        assert_eq!(keys.suffix(), Some("participants"));

        let keys = EntityFilenameMatcher.parse("task-rest_bold.json").unwrap();
        assert_eq!(keys.entities, vec![("task".to_string(), "rest".to_string())]);
    }

    #[test]
    fn rejects_non_entity_names() {
        assert!(EntityFilenameMatcher.parse("dataset_description.json").is_none());
        assert!(EntityFilenameMatcher.parse("sub-01_task rest_bold.nii").is_none());
        assert!(EntityFilenameMatcher.parse(".bidsignore").is_none());
    }

    #[test]
    fn rebuilds_file_names() {
        let keys = EntityFilenameMatcher
            .parse("sub-01_task-rest_bold.nii.gz")
            .unwrap();
        assert_eq!(
            keys.file_name_with(&keys.entities, ".json"),
            "sub-01_task-rest_bold.json"
        );
        assert_eq!(keys.file_name_with(&keys.entities[1..], ".json"), "task-rest_bold.json");
        assert_eq!(keys.file_name_with(std::iter::empty(), ".json"), "bold.json");
    }
}
