//! Filesystem implementation of the host traits.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── config.toml            # optional, see config
//! ├── catalog.toml           # variant catalog
//! ├── entities/<id>.json     # attribute map per entity
//! ├── assets/index.json      # asset index: id → path, mime, owner
//! ├── assets/sources/        # imported photos
//! ├── assets/mockups/        # generated artifacts
//! └── batch.json             # persisted batch job
//! ```
//!
//! Every JSON write goes to a sibling temp file first and is renamed into
//! place, so a crash never leaves a half-written record. The asset index is
//! guarded by a mutex, entity files by a second one.

use crate::batch::{BatchJob, JobStore};
use crate::host::{AssetStore, MetadataStore, StoreError, VariantCatalog};
use crate::types::{AssetId, EntityId, SourceImage};
use crate::variants::{Catalog, Category, Variant};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Entity attribute holding the source asset id.
pub const SOURCE_KEY: &str = "image_id";

const CATALOG_FILE: &str = "catalog.toml";
const ENTITIES_DIR: &str = "entities";
const ASSETS_DIR: &str = "assets";
const INDEX_FILE: &str = "assets/index.json";
const JOB_FILE: &str = "batch.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Source,
    Artifact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Relative to the data root.
    pub path: String,
    pub mime: String,
    pub owner: EntityId,
    pub kind: AssetKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssetIndex {
    next_id: AssetId,
    assets: BTreeMap<AssetId, AssetEntry>,
}

impl Default for AssetIndex {
    fn default() -> Self {
        Self {
            next_id: 1,
            assets: BTreeMap::new(),
        }
    }
}

pub struct FsHost {
    root: PathBuf,
    catalog: Catalog,
    index: Mutex<AssetIndex>,
    entities: Mutex<()>,
}

impl FsHost {
    /// Open (and initialize) a data root.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root.join(ENTITIES_DIR))?;
        fs::create_dir_all(root.join(ASSETS_DIR).join("sources"))?;
        fs::create_dir_all(root.join(ASSETS_DIR).join("mockups"))?;

        let catalog = Catalog::load(&root.join(CATALOG_FILE))?;
        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            serde_json::from_str(&fs::read_to_string(&index_path)?)?
        } else {
            AssetIndex::default()
        };
        debug!(
            root = %root.display(),
            categories = catalog.categories.len(),
            "opened data root"
        );

        Ok(Self {
            root: root.to_path_buf(),
            catalog,
            index: Mutex::new(index),
            entities: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Every entity with an attribute file, ascending.
    pub fn entity_ids(&self) -> Result<Vec<EntityId>, StoreError> {
        let mut ids = Vec::new();
        for entry in WalkDir::new(self.root.join(ENTITIES_DIR)).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::Io(io::Error::other(e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Copy a photo into the data root and make it the entity's source.
    pub fn import_source(&self, entity: EntityId, path: &Path) -> Result<AssetId, StoreError> {
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("source")
            .to_string();
        let mime = mime_for(path);

        let id = {
            let mut index = self.lock_index();
            let rel = unique_path(&self.root, &format!("{ASSETS_DIR}/sources"), &file_name);
            write_atomic(&self.root.join(&rel), &bytes)?;
            self.register_asset(
                &mut index,
                AssetEntry {
                    path: rel,
                    mime: mime.to_string(),
                    owner: entity,
                    kind: AssetKind::Source,
                },
            )?
        };
        self.set_attribute(entity, SOURCE_KEY, Value::from(id))?;
        debug!(entity, asset = id, "imported source image");
        Ok(id)
    }

    /// Detach the entity's source image (the file itself is kept).
    pub fn remove_source(&self, entity: EntityId) -> Result<(), StoreError> {
        self.delete_attribute(entity, SOURCE_KEY)
    }

    pub fn asset(&self, id: AssetId) -> Option<AssetEntry> {
        self.lock_index().assets.get(&id).cloned()
    }

    pub fn asset_path(&self, id: AssetId) -> Option<PathBuf> {
        self.asset(id).map(|entry| self.root.join(entry.path))
    }

    fn lock_index(&self) -> MutexGuard<'_, AssetIndex> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write the index while holding its lock; concurrent writers share
    /// one temp file name.
    fn save_index(&self, index: &AssetIndex) -> Result<(), StoreError> {
        write_atomic(&self.root.join(INDEX_FILE), &serde_json::to_vec_pretty(index)?)?;
        Ok(())
    }

    /// Add an already written file to the index and persist it. When the
    /// index write fails the entry and the file are rolled back.
    fn register_asset(&self, index: &mut AssetIndex, entry: AssetEntry) -> Result<AssetId, StoreError> {
        let path = self.root.join(&entry.path);
        let id = index.next_id;
        index.next_id += 1;
        index.assets.insert(id, entry);
        if let Err(e) = self.save_index(index) {
            index.assets.remove(&id);
            index.next_id = id;
            if let Err(rm) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %rm, "could not remove unindexed file");
            }
            return Err(e);
        }
        Ok(id)
    }

    fn entity_path(&self, entity: EntityId) -> PathBuf {
        self.root.join(ENTITIES_DIR).join(format!("{entity}.json"))
    }

    fn read_entity(&self, entity: EntityId) -> Result<Map<String, Value>, StoreError> {
        let path = self.entity_path(entity);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entity(&self, entity: EntityId, attributes: &Map<String, Value>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(attributes)?;
        write_atomic(&self.entity_path(entity), &json)?;
        Ok(())
    }

    /// File stem of the entity's source, used in artifact names.
    fn source_stem(&self, entity: EntityId) -> Option<String> {
        let id = self.get_attribute(entity, SOURCE_KEY).ok()??.as_u64()?;
        let entry = self.asset(id)?;
        Path::new(&entry.path)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
    }
}

/// First free `dir/name`, suffixing `-1`, `-2`, … before the extension.
fn unique_path(root: &Path, dir: &str, name: &str) -> String {
    let candidate = format!("{dir}/{name}");
    if !root.join(&candidate).exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (name, String::new()),
    };
    (1..)
        .map(|n| format!("{dir}/{stem}-{n}{ext}"))
        .find(|c| !root.join(c).exists())
        .unwrap_or(candidate)
}

/// Write through a sibling temp file and rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("tif" | "tiff") => "image/tiff",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Template references must stay inside the data root.
fn is_contained(reference: &str) -> bool {
    Path::new(reference)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl MetadataStore for FsHost {
    fn get_attribute(&self, entity: EntityId, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.entities.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_entity(entity)?.remove(key))
    }

    fn set_attribute(&self, entity: EntityId, key: &str, value: Value) -> Result<(), StoreError> {
        self.update_attributes_dyn(entity, vec![(key.to_string(), Some(value))])
    }

    fn delete_attribute(&self, entity: EntityId, key: &str) -> Result<(), StoreError> {
        self.update_attributes_dyn(entity, vec![(key.to_string(), None)])
    }

    /// One read-modify-write of the entity file.
    fn update_attributes(
        &self,
        entity: EntityId,
        updates: Vec<(&'static str, Option<Value>)>,
    ) -> Result<(), StoreError> {
        self.update_attributes_dyn(
            entity,
            updates.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        )
    }
}

impl FsHost {
    fn update_attributes_dyn(
        &self,
        entity: EntityId,
        updates: Vec<(String, Option<Value>)>,
    ) -> Result<(), StoreError> {
        let _guard = self.entities.lock().unwrap_or_else(|e| e.into_inner());
        let mut attributes = self.read_entity(entity)?;
        for (key, value) in updates {
            match value {
                Some(value) => {
                    attributes.insert(key, value);
                }
                None => {
                    attributes.remove(&key);
                }
            }
        }
        self.write_entity(entity, &attributes)
    }
}

impl AssetStore for FsHost {
    fn source_image(&self, entity: EntityId) -> Result<Option<SourceImage>, StoreError> {
        let Some(id) = self.get_attribute(entity, SOURCE_KEY)?.and_then(|v| v.as_u64()) else {
            return Ok(None);
        };
        let Some(path) = self.asset_path(id) else {
            warn!(entity, asset = id, "source asset missing from index");
            return Ok(None);
        };
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(SourceImage::from_bytes(id, bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(entity, path = %path.display(), "source file is gone");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load_template(&self, reference: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if !is_contained(reference) {
            warn!(reference, "template reference escapes the data root");
            return Ok(None);
        }
        match fs::read(self.root.join(reference)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn persist_artifact(
        &self,
        bytes: &[u8],
        mime: &str,
        owner: EntityId,
        name_hint: &str,
    ) -> Result<AssetId, StoreError> {
        let stem = self.source_stem(owner).unwrap_or_else(|| owner.to_string());
        let name = format!("mockup-{name_hint}-{stem}.jpg");
        let mut index = self.lock_index();
        let rel = unique_path(&self.root, &format!("{ASSETS_DIR}/mockups"), &name);
        write_atomic(&self.root.join(&rel), bytes)?;
        self.register_asset(
            &mut index,
            AssetEntry {
                path: rel,
                mime: mime.to_string(),
                owner,
                kind: AssetKind::Artifact,
            },
        )
    }

    fn delete_artifact(&self, id: AssetId) -> Result<(), StoreError> {
        let mut index = self.lock_index();
        let path = match index.assets.get(&id) {
            None => return Err(StoreError::UnknownAsset(id)),
            Some(entry) if entry.kind == AssetKind::Source => {
                return Err(StoreError::Rejected(format!("asset {id} is a source image")));
            }
            Some(entry) => self.root.join(&entry.path),
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        index.assets.remove(&id);
        self.save_index(&index)
    }
}

impl VariantCatalog for FsHost {
    fn variant(&self, id: &str) -> Option<Variant> {
        self.catalog.variant(id)
    }

    fn category(&self, id: &str) -> Option<Category> {
        self.catalog.category(id)
    }
}

impl JobStore for FsHost {
    fn load_job(&self) -> Result<Option<BatchJob>, StoreError> {
        match fs::read_to_string(self.root.join(JOB_FILE)) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_job(&self, job: &BatchJob) -> Result<(), StoreError> {
        write_atomic(&self.root.join(JOB_FILE), &serde_json::to_vec_pretty(job)?)?;
        Ok(())
    }

    fn clear_job(&self) -> Result<(), StoreError> {
        match fs::remove_file(self.root.join(JOB_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
