//! Sidecar metadata inheritance.
//!
//! A data file's metadata is the overlay of every JSON sidecar that applies to
//! it, from the dataset root down to the file's own directory. At each level a
//! sidecar applies when its entities are a subset of the data file's entities
//! and it carries every entity that names a directory at or above that level.
//! Later (more specific) sidecars override earlier ones key by key.

use crate::content::JsonContentMap;
use crate::entities::FilenameMatcher;
use crate::types::{file_name_of, parent_of};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Merged metadata for one data file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveMetadata {
    values: Map<String, Value>,
    sources: Vec<String>,
}

impl EffectiveMetadata {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Sidecars that contributed, least specific first
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Candidate sidecar paths for `target`, least specific first.
///
/// `target` is the sidecar path the data file itself would have, e.g.
/// `/sub-01/func/sub-01_task-rest_bold.json`. Names the matcher cannot parse
/// only inherit from themselves.
pub fn potential_locations(target: &str, matcher: &dyn FilenameMatcher) -> Vec<String> {
    let Some(keys) = matcher.parse(file_name_of(target)) else {
        return vec![target.to_string()];
    };

    let dirs: Vec<&str> = parent_of(target)
        .split('/')
        .filter(|c| !c.is_empty())
        .collect();

    // Depth (1-based) of the first directory named after each entity
    let depths: Vec<Option<usize>> = keys
        .entities
        .iter()
        .map(|(k, v)| {
            let token = format!("{}-{}", k, v);
            dirs.iter().position(|d| *d == token).map(|i| i + 1)
        })
        .collect();

    // Slot of each directory-free entity within a selection
    let mut optional_count = 0;
    let slots: Vec<Option<usize>> = depths
        .iter()
        .map(|depth| {
            depth.is_none().then(|| {
                optional_count += 1;
                optional_count - 1
            })
        })
        .collect();
    let selections = optional_selections(optional_count);

    let mut seen = BTreeSet::new();
    let mut candidates: Vec<String> = Vec::new();
    for level in 0..=dirs.len() {
        let prefix: String = dirs[..level].iter().map(|d| format!("/{}", d)).collect();
        for selection in &selections {
            let chosen = keys
                .entities
                .iter()
                .zip(depths.iter().zip(&slots))
                .filter(|(_, (depth, slot))| match (depth, slot) {
                    (Some(depth), _) => *depth <= level,
                    (None, Some(slot)) => selection[*slot],
                    (None, None) => false,
                })
                .map(|(entity, _)| entity);
            let name = keys.file_name_with(chosen, &keys.extension);
            let candidate = format!("{}/{}", prefix, name);
            if candidate != target && seen.insert(candidate.clone()) {
                candidates.push(candidate);
            }
        }
    }

    // The file's own sidecar is always the most specific
    candidates.push(target.to_string());
    candidates
}

/// Directory-free entities up to this count are combined in every subset;
/// beyond it they are dropped progressively from the end of the name.
const MAX_COMBINED_ENTITIES: usize = 6;

/// Which directory-free entities each candidate keeps, least specific first.
fn optional_selections(count: usize) -> Vec<Vec<bool>> {
    if count > MAX_COMBINED_ENTITIES {
        return (0..=count)
            .map(|kept| (0..count).map(|slot| slot < kept).collect())
            .collect();
    }

    let mut masks: Vec<u64> = (0..(1u64 << count)).collect();
    masks.sort_by_key(|mask| (mask.count_ones(), *mask));
    masks
        .into_iter()
        .map(|mask| (0..count).map(|slot| mask & (1 << slot) != 0).collect())
        .collect()
}

/// Sidecar path a data file would have with the given suffix and extension.
///
/// `suffix` of `None` keeps the data file's own suffix.
pub fn sidecar_target(
    data_path: &str,
    suffix: Option<&str>,
    extension: &str,
    matcher: &dyn FilenameMatcher,
) -> String {
    let dir = parent_of(data_path);
    let name = file_name_of(data_path);
    let file_name = match matcher.parse(name) {
        Some(mut keys) => {
            if let Some(suffix) = suffix {
                keys.suffix = Some(suffix.to_string());
            }
            keys.file_name_with(&keys.entities, extension)
        }
        None => {
            let stem = name.split('.').next().unwrap_or(name);
            format!("{}{}", stem, extension)
        }
    };
    format!("{}/{}", dir, file_name)
}

/// Overlay every existing candidate's JSON object in order.
pub fn merge_sidecars(candidates: &[String], json: &JsonContentMap) -> EffectiveMetadata {
    let mut merged = EffectiveMetadata::default();
    for candidate in candidates {
        if let Some(Value::Object(map)) = json.get(candidate) {
            for (key, value) in map {
                merged.values.insert(key.clone(), value.clone());
            }
            merged.sources.push(candidate.clone());
        }
    }
    merged
}

/// Memoizing resolver for one validation run.
#[derive(Debug)]
pub struct SidecarResolver {
    matcher: Arc<dyn FilenameMatcher>,
    cache: Mutex<HashMap<String, Arc<EffectiveMetadata>>>,
}

impl SidecarResolver {
    pub fn new(matcher: Arc<dyn FilenameMatcher>) -> Self {
        Self {
            matcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn matcher(&self) -> &dyn FilenameMatcher {
        self.matcher.as_ref()
    }

    /// Effective JSON metadata for a data file.
    pub fn resolve(&self, data_path: &str, json: &JsonContentMap) -> Arc<EffectiveMetadata> {
        self.resolve_with(data_path, None, json)
    }

    /// Effective JSON metadata for a related file (e.g. the events sidecar of a
    /// bold run) selected by `suffix`.
    pub fn resolve_with(
        &self,
        data_path: &str,
        suffix: Option<&str>,
        json: &JsonContentMap,
    ) -> Arc<EffectiveMetadata> {
        let target = sidecar_target(data_path, suffix, ".json", self.matcher());
        self.resolve_target(&target, json)
    }

    /// Effective metadata for an explicit sidecar path.
    pub fn resolve_target(&self, target: &str, json: &JsonContentMap) -> Arc<EffectiveMetadata> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(target) {
                return hit.clone();
            }
        }

        let candidates = potential_locations(target, self.matcher());
        let merged = Arc::new(merge_sidecars(&candidates, json));
        trace!(target = %target, sources = merged.sources.len(), "Resolved sidecar metadata");

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(target.to_string(), merged.clone());
        }
        merged
    }
}
