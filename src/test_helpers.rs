//! Shared test utilities.
//!
//! - Encoded image fixtures ([`solid_png`], [`gradient_jpeg`]).
//! - Catalog fixtures ([`variant`], [`sample_catalog`]).
//! - [`MemoryHost`]: an in-memory implementation of every host trait with
//!   switches for injecting store failures.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let host = MemoryHost::new().with_catalog(sample_catalog());
//! host.add_template("templates/mug.png", mock_image_bytes(200, 160));
//! host.set_source(1, mock_source(10, 1200, 800));
//! ```

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use serde_json::Value;

use crate::batch::{BatchJob, JobStore};
use crate::digest::hash_bytes;
use crate::host::{AssetStore, MetadataStore, StoreError, VariantCatalog};
use crate::imaging::backend::tests::mock_image_bytes;
use crate::orientation::Orientation;
use crate::types::{AssetId, EntityId, SourceImage};
use crate::variants::{Catalog, Category, Variant};

// =========================================================================
// Image fixtures
// =========================================================================

/// Encoded RGBA PNG of one colour.
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Encoded JPEG with a horizontal/vertical gradient.
pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .unwrap();
    bytes
}

/// Source image whose bytes the mock backend decodes to `width`x`height`.
pub fn mock_source(asset_id: AssetId, width: u32, height: u32) -> SourceImage {
    let bytes = mock_image_bytes(width, height);
    SourceImage {
        asset_id,
        width,
        height,
        content_hash: hash_bytes(&bytes),
        bytes,
    }
}

// =========================================================================
// Catalog fixtures
// =========================================================================

/// A 200x160 variant whose template lives at `templates/<id>.png`.
pub fn variant(id: &str, orientations: &[Orientation]) -> Variant {
    Variant {
        id: id.to_string(),
        name: String::new(),
        template: format!("templates/{id}.png"),
        width: 200,
        height: 160,
        max_size: 100,
        alignment: Default::default(),
        offset: Default::default(),
        blend_mode: Default::default(),
        orientations: orientations.to_vec(),
    }
}

/// Three categories:
///
/// - `frames`: `frame-landscape`, `frame-portrait`, `frame-square`
/// - `posters`: `poster-portrait` only
/// - `mugs`: `mug`, any orientation
pub fn sample_catalog() -> Catalog {
    Catalog {
        categories: vec![
            Category {
                id: "frames".into(),
                name: "Frames".into(),
                variants: vec![
                    variant("frame-landscape", &[Orientation::Landscape]),
                    variant("frame-portrait", &[Orientation::Portrait]),
                    variant("frame-square", &[Orientation::Square]),
                ],
            },
            Category {
                id: "posters".into(),
                name: "Posters".into(),
                variants: vec![variant("poster-portrait", &[Orientation::Portrait])],
            },
            Category {
                id: "mugs".into(),
                name: "Mugs".into(),
                variants: vec![variant("mug", &[])],
            },
        ],
    }
}

// =========================================================================
// MemoryHost
// =========================================================================

/// A persisted artifact held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub owner: EntityId,
    pub name_hint: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// In-memory host. Everything is behind a mutex so it can be shared across
/// the scheduler's worker threads.
pub struct MemoryHost {
    attributes: Mutex<HashMap<(EntityId, String), Value>>,
    sources: Mutex<HashMap<EntityId, SourceImage>>,
    templates: Mutex<HashMap<String, Vec<u8>>>,
    artifacts: Mutex<HashMap<AssetId, StoredArtifact>>,
    next_id: AtomicU64,
    catalog: Mutex<Catalog>,
    job: Mutex<Option<BatchJob>>,
    /// `update_attributes` fails while set.
    pub fail_updates: AtomicBool,
    /// `delete_artifact` fails while set.
    pub fail_deletes: AtomicBool,
    /// `persist_artifact` fails while set.
    pub fail_persist: AtomicBool,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self {
            attributes: Mutex::default(),
            sources: Mutex::default(),
            templates: Mutex::default(),
            artifacts: Mutex::default(),
            next_id: AtomicU64::new(1000),
            catalog: Mutex::default(),
            job: Mutex::default(),
            fail_updates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_persist: AtomicBool::new(false),
        }
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(self, catalog: Catalog) -> Self {
        *self.catalog.lock().unwrap() = catalog;
        self
    }

    /// Swap the catalog in place (simulates a catalog edit).
    pub fn replace_catalog(&self, catalog: Catalog) {
        *self.catalog.lock().unwrap() = catalog;
    }

    pub fn add_template(&self, reference: &str, bytes: Vec<u8>) {
        self.templates
            .lock()
            .unwrap()
            .insert(reference.to_string(), bytes);
    }

    /// Register templates for every variant of the current catalog.
    pub fn add_all_templates(&self) {
        let refs: Vec<String> = self
            .catalog
            .lock()
            .unwrap()
            .variants()
            .map(|v| v.template.clone())
            .collect();
        for reference in refs {
            self.add_template(&reference, mock_image_bytes(200, 160));
        }
    }

    pub fn set_source(&self, entity: EntityId, source: SourceImage) {
        self.sources.lock().unwrap().insert(entity, source);
    }

    pub fn remove_source(&self, entity: EntityId) {
        self.sources.lock().unwrap().remove(&entity);
    }

    /// Seed an artifact directly, bypassing `persist_artifact`.
    pub fn seed_artifact(&self, owner: EntityId) -> AssetId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.artifacts.lock().unwrap().insert(
            id,
            StoredArtifact {
                owner,
                name_hint: "seeded".into(),
                mime: "image/jpeg".into(),
                bytes: Vec::new(),
            },
        );
        id
    }

    pub fn artifact(&self, id: AssetId) -> Option<StoredArtifact> {
        self.artifacts.lock().unwrap().get(&id).cloned()
    }

    /// Ids of every stored artifact, ascending.
    pub fn artifact_ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.artifacts.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Rejected(format!("{what} disabled by test")))
        } else {
            Ok(())
        }
    }
}

impl MetadataStore for MemoryHost {
    fn get_attribute(&self, entity: EntityId, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .attributes
            .lock()
            .unwrap()
            .get(&(entity, key.to_string()))
            .cloned())
    }

    fn set_attribute(&self, entity: EntityId, key: &str, value: Value) -> Result<(), StoreError> {
        self.attributes
            .lock()
            .unwrap()
            .insert((entity, key.to_string()), value);
        Ok(())
    }

    fn delete_attribute(&self, entity: EntityId, key: &str) -> Result<(), StoreError> {
        self.attributes
            .lock()
            .unwrap()
            .remove(&(entity, key.to_string()));
        Ok(())
    }

    fn update_attributes(
        &self,
        entity: EntityId,
        updates: Vec<(&'static str, Option<Value>)>,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_updates, "attribute updates")?;
        let mut attributes = self.attributes.lock().unwrap();
        for (key, value) in updates {
            match value {
                Some(value) => {
                    attributes.insert((entity, key.to_string()), value);
                }
                None => {
                    attributes.remove(&(entity, key.to_string()));
                }
            }
        }
        Ok(())
    }
}

impl AssetStore for MemoryHost {
    fn source_image(&self, entity: EntityId) -> Result<Option<SourceImage>, StoreError> {
        Ok(self.sources.lock().unwrap().get(&entity).cloned())
    }

    fn load_template(&self, reference: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.templates.lock().unwrap().get(reference).cloned())
    }

    fn persist_artifact(
        &self,
        bytes: &[u8],
        mime: &str,
        owner: EntityId,
        name_hint: &str,
    ) -> Result<AssetId, StoreError> {
        Self::check(&self.fail_persist, "artifact persistence")?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.artifacts.lock().unwrap().insert(
            id,
            StoredArtifact {
                owner,
                name_hint: name_hint.to_string(),
                mime: mime.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        Ok(id)
    }

    fn delete_artifact(&self, id: AssetId) -> Result<(), StoreError> {
        Self::check(&self.fail_deletes, "artifact deletion")?;
        self.artifacts
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::UnknownAsset(id))
    }
}

impl VariantCatalog for MemoryHost {
    fn variant(&self, id: &str) -> Option<Variant> {
        self.catalog.lock().unwrap().variant(id)
    }

    fn category(&self, id: &str) -> Option<Category> {
        self.catalog.lock().unwrap().category(id)
    }
}

impl JobStore for MemoryHost {
    fn load_job(&self) -> Result<Option<BatchJob>, StoreError> {
        Ok(self.job.lock().unwrap().clone())
    }

    fn save_job(&self, job: &BatchJob) -> Result<(), StoreError> {
        *self.job.lock().unwrap() = Some(job.clone());
        Ok(())
    }

    fn clear_job(&self) -> Result<(), StoreError> {
        *self.job.lock().unwrap() = None;
        Ok(())
    }
}
