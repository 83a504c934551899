//! Typed per-entity state and its mapping onto the host attribute store.
//!
//! Two structs cover everything the pipeline persists on an entity:
//!
//! - [`GenerationRecord`]: current artifacts, the source hash they were built
//!   from, the category → variant choices and the last generation errors.
//! - [`EntitySettings`]: the enable flag, the selection and the primary key.
//!
//! This module is the only code that knows the attribute keys.
//!
//! ## Legacy shapes
//!
//! Older records stored `mockup_artifacts` either as a flat list of ids or
//! as a nested map keyed by variant then orientation. Loading never fails on
//! those: every numeric leaf (numbers or numeric strings) is collected into
//! [`GenerationRecord::legacy_ids`] so cleanup can still delete it.

use crate::host::{MetadataStore, StoreError};
use crate::types::{AssetId, CategoryId, EntityId, VariantId};
use crate::variants::Selection;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod keys {
    pub const ENABLED: &str = "mockup_enabled";
    pub const CATEGORIES: &str = "mockup_categories";
    pub const SELECTED_VARIANTS: &str = "mockup_selected_variants";
    pub const PRIMARY: &str = "mockup_primary";
    pub const ARTIFACTS: &str = "mockup_artifacts";
    pub const CATEGORY_VARIANTS: &str = "mockup_category_variants";
    pub const SOURCE_HASH: &str = "mockup_source_hash";
    pub const ERRORS: &str = "mockup_errors";
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("attribute '{key}' is malformed: expected {expected}")]
    Malformed { key: &'static str, expected: &'static str },
}

/// Generated artifacts of one entity and the source they were built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRecord {
    /// Category id (category mode) or variant id (flat mode) → artifact.
    pub artifacts: BTreeMap<String, AssetId>,
    pub category_variants: BTreeMap<CategoryId, VariantId>,
    pub source_hash: Option<String>,
    pub errors: Vec<String>,
    /// Ids recovered from legacy artifact shapes.
    pub legacy_ids: Vec<AssetId>,
}

impl GenerationRecord {
    pub fn load(store: &(impl MetadataStore + ?Sized), entity: EntityId) -> Result<Self, RecordError> {
        let mut record = Self::default();

        if let Some(value) = store.get_attribute(entity, keys::ARTIFACTS)? {
            record.read_artifacts(&value);
        }
        if let Some(value) = store.get_attribute(entity, keys::CATEGORY_VARIANTS)? {
            record.category_variants = string_map(&value).ok_or(RecordError::Malformed {
                key: keys::CATEGORY_VARIANTS,
                expected: "a map of strings",
            })?;
        }
        record.source_hash = match store.get_attribute(entity, keys::SOURCE_HASH)? {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => {
                return Err(RecordError::Malformed {
                    key: keys::SOURCE_HASH,
                    expected: "a string",
                });
            }
        };
        if let Some(value) = store.get_attribute(entity, keys::ERRORS)? {
            record.errors = string_list(&value).ok_or(RecordError::Malformed {
                key: keys::ERRORS,
                expected: "a list of strings",
            })?;
        }
        Ok(record)
    }

    /// Write the whole record in one update. Empty fields are deleted.
    pub fn save(&self, store: &(impl MetadataStore + ?Sized), entity: EntityId) -> Result<(), StoreError> {
        let artifacts = (!self.artifacts.is_empty()).then(|| {
            Value::Object(
                self.artifacts
                    .iter()
                    .map(|(k, id)| (k.clone(), Value::from(*id)))
                    .collect(),
            )
        });
        let category_variants = (!self.category_variants.is_empty()).then(|| {
            Value::Object(
                self.category_variants
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            )
        });
        let errors = (!self.errors.is_empty()).then(|| Value::from(self.errors.clone()));

        store.update_attributes(
            entity,
            vec![
                (keys::ARTIFACTS, artifacts),
                (keys::CATEGORY_VARIANTS, category_variants),
                (keys::SOURCE_HASH, self.source_hash.clone().map(Value::from)),
                (keys::ERRORS, errors),
            ],
        )
    }

    /// Replace only the error list, leaving artifacts and hash as stored.
    pub fn save_errors(
        store: &(impl MetadataStore + ?Sized),
        entity: EntityId,
        errors: &[String],
    ) -> Result<(), StoreError> {
        let value = (!errors.is_empty()).then(|| Value::from(errors.to_vec()));
        store.update_attributes(entity, vec![(keys::ERRORS, value)])
    }

    /// Every artifact id the record references, typed and legacy, deduped
    /// in first-seen order.
    pub fn all_artifact_ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = Vec::new();
        for id in self.artifacts.values().chain(self.legacy_ids.iter()) {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    pub fn has_artifacts(&self) -> bool {
        !self.artifacts.is_empty() || !self.legacy_ids.is_empty()
    }

    /// Artifact shown first for `primary` (a category id, or a variant id in
    /// flat mode).
    pub fn primary_artifact(&self, primary: Option<&str>) -> Option<AssetId> {
        self.artifacts.get(primary?).copied()
    }

    /// Every artifact except the primary one, in key order.
    pub fn gallery_artifacts(&self, primary: Option<&str>) -> Vec<AssetId> {
        let primary_id = self.primary_artifact(primary);
        self.artifacts
            .values()
            .copied()
            .filter(|id| Some(*id) != primary_id)
            .collect()
    }

    fn read_artifacts(&mut self, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, entry) in map {
                    match as_asset_id(entry) {
                        Some(id) => {
                            self.artifacts.insert(key.clone(), id);
                        }
                        None => collect_numeric_leaves(entry, &mut self.legacy_ids),
                    }
                }
            }
            other => collect_numeric_leaves(other, &mut self.legacy_ids),
        }
    }
}

/// Enable flag and selection of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySettings {
    pub enabled: bool,
    pub selection: Option<Selection>,
    pub primary: Option<String>,
}

impl EntitySettings {
    /// Load settings. An entity carrying both selection attributes is read
    /// in category mode and a deprecation warning is logged.
    pub fn load(store: &(impl MetadataStore + ?Sized), entity: EntityId) -> Result<Self, RecordError> {
        let enabled = store
            .get_attribute(entity, keys::ENABLED)?
            .as_ref()
            .is_some_and(truthy);

        let categories = read_list(store, entity, keys::CATEGORIES)?;
        let variants = read_list(store, entity, keys::SELECTED_VARIANTS)?;
        let selection = match (categories.is_empty(), variants.is_empty()) {
            (false, false) => {
                tracing::warn!(
                    entity,
                    "entity has both category and flat variant selections; using categories"
                );
                Some(Selection::Categories(categories))
            }
            (false, true) => Some(Selection::Categories(categories)),
            (true, false) => {
                tracing::debug!(entity, "using deprecated flat variant selection");
                Some(Selection::Variants(variants))
            }
            (true, true) => None,
        };

        let primary = match store.get_attribute(entity, keys::PRIMARY)? {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };

        Ok(Self {
            enabled,
            selection,
            primary,
        })
    }

    pub fn save_enabled(
        store: &(impl MetadataStore + ?Sized),
        entity: EntityId,
        enabled: bool,
    ) -> Result<(), StoreError> {
        store.set_attribute(entity, keys::ENABLED, Value::Bool(enabled))
    }

    /// Store a selection, replacing whichever mode was stored before.
    pub fn save_selection(
        store: &(impl MetadataStore + ?Sized),
        entity: EntityId,
        selection: &Selection,
        primary: Option<&str>,
    ) -> Result<(), StoreError> {
        let (set_key, clear_key, ids) = match selection {
            Selection::Categories(ids) => (keys::CATEGORIES, keys::SELECTED_VARIANTS, ids),
            Selection::Variants(ids) => (keys::SELECTED_VARIANTS, keys::CATEGORIES, ids),
        };
        store.update_attributes(
            entity,
            vec![
                (set_key, Some(Value::from(ids.clone()))),
                (clear_key, None),
                (keys::PRIMARY, primary.map(Value::from)),
            ],
        )
    }

    pub fn clear_selection(store: &(impl MetadataStore + ?Sized), entity: EntityId) -> Result<(), StoreError> {
        store.update_attributes(
            entity,
            vec![
                (keys::CATEGORIES, None),
                (keys::SELECTED_VARIANTS, None),
                (keys::PRIMARY, None),
            ],
        )
    }
}

fn read_list(
    store: &(impl MetadataStore + ?Sized),
    entity: EntityId,
    key: &'static str,
) -> Result<Vec<String>, RecordError> {
    match store.get_attribute(entity, key)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => string_list(&value).ok_or(RecordError::Malformed {
            key,
            expected: "a list of strings",
        }),
    }
}

/// Legacy flags were stored as `"1"`/`"0"` or `"yes"`.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_u64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "yes" | "true" | "on"),
        _ => false,
    }
}

fn as_asset_id(value: &Value) -> Option<AssetId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Collect every numeric leaf of `value`, at any depth.
pub fn collect_numeric_leaves(value: &Value, out: &mut Vec<AssetId>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_numeric_leaves(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_numeric_leaves(v, out)),
        leaf => {
            if let Some(id) = as_asset_id(leaf) {
                out.push(id);
            }
        }
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items.iter().map(|v| v.as_str().map(str::to_string)).collect(),
        _ => None,
    }
}

fn string_map(value: &Value) -> Option<BTreeMap<String, String>> {
    let map: &Map<String, Value> = value.as_object()?;
    map.iter()
        .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MemoryHost;
    use serde_json::json;

    fn record_with(store: &MemoryHost, artifacts: Value) -> GenerationRecord {
        store.set_attribute(1, keys::ARTIFACTS, artifacts).unwrap();
        GenerationRecord::load(store, 1).unwrap()
    }

    // =========================================================================
    // Artifact shapes
    // =========================================================================

    #[test]
    fn typed_map_loads_into_artifacts() {
        let host = MemoryHost::new();
        let record = record_with(&host, json!({"frames": 12, "mugs": "13"}));
        assert_eq!(record.artifacts.get("frames"), Some(&12));
        assert_eq!(record.artifacts.get("mugs"), Some(&13));
        assert!(record.legacy_ids.is_empty());
    }

    #[test]
    fn flat_list_loads_as_legacy_ids() {
        let host = MemoryHost::new();
        let record = record_with(&host, json!([4, "5", 6]));
        assert!(record.artifacts.is_empty());
        assert_eq!(record.legacy_ids, vec![4, 5, 6]);
    }

    #[test]
    fn nested_map_loads_every_numeric_leaf() {
        let host = MemoryHost::new();
        let record = record_with(
            &host,
            json!({
                "frame": {"landscape": 21, "portrait": "22"},
                "poster": {"square": 23, "note": "n/a"}
            }),
        );
        let mut ids = record.legacy_ids.clone();
        ids.sort();
        assert_eq!(ids, vec![21, 22, 23]);
    }

    #[test]
    fn all_artifact_ids_dedupes() {
        let record = GenerationRecord {
            artifacts: BTreeMap::from([("a".into(), 1), ("b".into(), 2)]),
            legacy_ids: vec![2, 3],
            ..Default::default()
        };
        assert_eq!(record.all_artifact_ids(), vec![1, 2, 3]);
    }

    // =========================================================================
    // Save / load
    // =========================================================================

    #[test]
    fn save_then_load_is_identity_for_typed_fields() {
        let host = MemoryHost::new();
        let record = GenerationRecord {
            artifacts: BTreeMap::from([("frames".into(), 7)]),
            category_variants: BTreeMap::from([("frames".into(), "frame-landscape".into())]),
            source_hash: Some("abc".into()),
            errors: vec!["mug: missing template".into()],
            legacy_ids: vec![],
        };
        record.save(&host, 9).unwrap();
        assert_eq!(GenerationRecord::load(&host, 9).unwrap(), record);
    }

    #[test]
    fn save_empty_record_deletes_keys() {
        let host = MemoryHost::new();
        host.set_attribute(3, keys::SOURCE_HASH, json!("old")).unwrap();
        host.set_attribute(3, keys::ARTIFACTS, json!([1, 2])).unwrap();
        GenerationRecord::default().save(&host, 3).unwrap();

        assert_eq!(host.get_attribute(3, keys::SOURCE_HASH).unwrap(), None);
        assert_eq!(host.get_attribute(3, keys::ARTIFACTS).unwrap(), None);
    }

    #[test]
    fn malformed_hash_is_error() {
        let host = MemoryHost::new();
        host.set_attribute(1, keys::SOURCE_HASH, json!(42)).unwrap();
        assert!(matches!(
            GenerationRecord::load(&host, 1),
            Err(RecordError::Malformed { key: keys::SOURCE_HASH, .. })
        ));
    }

    #[test]
    fn primary_and_gallery_split() {
        let record = GenerationRecord {
            artifacts: BTreeMap::from([("frames".into(), 1), ("mugs".into(), 2), ("posters".into(), 3)]),
            ..Default::default()
        };
        assert_eq!(record.primary_artifact(Some("mugs")), Some(2));
        assert_eq!(record.gallery_artifacts(Some("mugs")), vec![1, 3]);
        assert_eq!(record.primary_artifact(None), None);
        assert_eq!(record.gallery_artifacts(None), vec![1, 2, 3]);
    }

    // =========================================================================
    // EntitySettings
    // =========================================================================

    #[test]
    fn legacy_enabled_flag_accepted() {
        let host = MemoryHost::new();
        host.set_attribute(1, keys::ENABLED, json!("1")).unwrap();
        host.set_attribute(2, keys::ENABLED, json!("0")).unwrap();
        assert!(EntitySettings::load(&host, 1).unwrap().enabled);
        assert!(!EntitySettings::load(&host, 2).unwrap().enabled);
        assert!(!EntitySettings::load(&host, 3).unwrap().enabled);
    }

    #[test]
    fn categories_win_over_flat_variants() {
        let host = MemoryHost::new();
        host.set_attribute(1, keys::CATEGORIES, json!(["frames"])).unwrap();
        host.set_attribute(1, keys::SELECTED_VARIANTS, json!(["mug"])).unwrap();
        let settings = EntitySettings::load(&host, 1).unwrap();
        assert_eq!(settings.selection, Some(Selection::Categories(vec!["frames".into()])));
    }

    #[test]
    fn save_selection_replaces_other_mode() {
        let host = MemoryHost::new();
        EntitySettings::save_selection(&host, 1, &Selection::Variants(vec!["mug".into()]), Some("mug")).unwrap();
        EntitySettings::save_selection(&host, 1, &Selection::Categories(vec!["frames".into()]), None).unwrap();

        let settings = EntitySettings::load(&host, 1).unwrap();
        assert_eq!(settings.selection, Some(Selection::Categories(vec!["frames".into()])));
        assert_eq!(settings.primary, None);
        assert_eq!(host.get_attribute(1, keys::SELECTED_VARIANTS).unwrap(), None);
    }

    #[test]
    fn clear_selection_removes_everything() {
        let host = MemoryHost::new();
        EntitySettings::save_selection(&host, 1, &Selection::Categories(vec!["frames".into()]), Some("frames"))
            .unwrap();
        EntitySettings::clear_selection(&host, 1).unwrap();
        assert_eq!(EntitySettings::load(&host, 1).unwrap().selection, None);
    }
}
