//! Mockup generation orchestrator.
//!
//! [`Orchestrator::generate`] turns one entity's source photo into one
//! mockup per resolved target and records the result:
//!
//! ```text
//! source ──► classify ──► resolve targets ──► render each (timeout) ──► persist
//!                              │                                          │
//!                      none: errors only                new record, then drop old artifacts
//! ```
//!
//! ## Persistence order
//!
//! New artifacts are written first, then the record in a single update, and
//! only then are the previous artifacts deleted. A failed record write
//! removes the artifacts just created, so the stored record never points at
//! files that are gone. When every target fails the record is torn down to
//! the error list and the old artifacts are deleted: a record never claims a
//! freshness it did not achieve.
//!
//! ## Concurrency
//!
//! Every operation that writes a record holds a per-entity lock, so a direct
//! request and the batch scheduler never interleave on the same entity.

use crate::batch::BatchWorker;
use crate::host::{Host, StoreError};
use crate::imaging::{BackendError, ImageBackend, MockupOutput, Quality, RasterImage, create_mockup};
use crate::orientation::{Orientation, classify};
use crate::record::{EntitySettings, GenerationRecord, RecordError};
use crate::types::{AssetId, CategoryId, EntityId, VariantId};
use crate::variants::{Selection, Target, Variant, resolve};
use std::collections::{BTreeMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const ARTIFACT_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum MockupError {
    #[error("entity {0} has no source image")]
    NoSourceImage(EntityId),
    #[error("invalid image metadata: {width}x{height}")]
    InvalidImageMetadata { width: u32, height: u32 },
    #[error("no variant matches {0} orientation")]
    NoMatchingVariants(Orientation),
    #[error("failed to persist generation record: {0}")]
    RegistryPersistence(#[source] StoreError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of one target. Never aborts the other targets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariantError {
    #[error("template '{0}' not found")]
    MissingTemplateAsset(String),
    #[error("could not decode image: {0}")]
    ImageDecode(String),
    #[error("could not encode image: {0}")]
    ImageEncode(String),
    #[error("invalid image dimensions {width}x{height}")]
    InvalidImageMetadata { width: u32, height: u32 },
    #[error("render timed out after {0:?}")]
    TimedOut(Duration),
    #[error("could not persist artifact: {0}")]
    Persist(String),
}

impl From<BackendError> for VariantError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Decode(msg) => VariantError::ImageDecode(msg),
            BackendError::Encode(msg) => VariantError::ImageEncode(msg),
            BackendError::InvalidDimensions { width, height } => {
                VariantError::InvalidImageMetadata { width, height }
            }
            other => VariantError::ImageDecode(other.to_string()),
        }
    }
}

/// Values the orchestrator reads from configuration, passed in explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Treat every entity as enabled.
    pub enabled_globally: bool,
    /// Category used when an entity selects nothing.
    pub default_category: Option<CategoryId>,
    pub quality: Quality,
    /// `None` renders without a deadline.
    pub variant_timeout: Option<Duration>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            enabled_globally: false,
            default_category: None,
            quality: Quality::default(),
            variant_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantFailure {
    pub key: String,
    pub variant: VariantId,
    pub error: VariantError,
}

/// Outcome of one [`Orchestrator::generate`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    pub entity: EntityId,
    pub orientation: Orientation,
    /// Artifact-map key → new artifact.
    pub artifacts: BTreeMap<String, AssetId>,
    pub failures: Vec<VariantFailure>,
    /// Requested categories without an eligible variant.
    pub unmatched: Vec<CategoryId>,
    /// Previous artifacts deleted after the record was written.
    pub replaced: usize,
}

impl GenerateReport {
    /// True iff at least one artifact was produced.
    pub fn succeeded(&self) -> bool {
        !self.artifacts.is_empty()
    }
}

/// What [`Orchestrator::on_source_changed`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Disabled,
    Unchanged,
    Regenerated(GenerateReport),
    /// Source is gone; this many artifacts were deleted.
    CleanedUp(usize),
}

// =============================================================================
// Per-entity locks
// =============================================================================

#[derive(Default)]
struct EntityLocks {
    busy: Mutex<HashSet<EntityId>>,
    released: Condvar,
}

struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    entity: EntityId,
}

impl EntityLocks {
    fn acquire(&self, entity: EntityId) -> EntityGuard<'_> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        while busy.contains(&entity) {
            busy = self.released.wait(busy).unwrap_or_else(|e| e.into_inner());
        }
        busy.insert(entity);
        EntityGuard { locks: self, entity }
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self.locks.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(&self.entity);
        self.locks.released.notify_all();
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator<H: Host> {
    host: Arc<H>,
    backend: Arc<dyn ImageBackend>,
    settings: GenerationSettings,
    locks: EntityLocks,
}

impl<H: Host> Orchestrator<H> {
    pub fn new(host: Arc<H>, backend: Arc<dyn ImageBackend>, settings: GenerationSettings) -> Self {
        Self {
            host,
            backend,
            settings,
            locks: EntityLocks::default(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Regenerate every mockup of `entity` unconditionally.
    #[tracing::instrument(skip(self))]
    pub fn generate(&self, entity: EntityId) -> Result<GenerateReport, MockupError> {
        let _guard = self.locks.acquire(entity);
        self.generate_locked(entity)
    }

    fn generate_locked(&self, entity: EntityId) -> Result<GenerateReport, MockupError> {
        let host = &*self.host;
        let source = host
            .source_image(entity)?
            .ok_or(MockupError::NoSourceImage(entity))?;
        let orientation = classify(source.width, source.height).map_err(|_| {
            MockupError::InvalidImageMetadata {
                width: source.width,
                height: source.height,
            }
        })?;

        let selection = self.selection_for(entity)?;
        let resolution = resolve(host, &selection, orientation);
        if resolution.targets.is_empty() {
            let error = MockupError::NoMatchingVariants(orientation);
            warn!(entity, %orientation, "no matching variants, keeping existing artifacts");
            GenerationRecord::save_errors(host, entity, &[error.to_string()])
                .map_err(MockupError::RegistryPersistence)?;
            return Err(error);
        }

        let previous = GenerationRecord::load(host, entity)?;
        debug!(
            entity,
            %orientation,
            targets = resolution.targets.len(),
            backend = self.backend.name(),
            "rendering mockups"
        );

        let decoded = self.backend.decode(&source.bytes).map(Arc::new).map_err(VariantError::from);
        let mut next = GenerationRecord {
            source_hash: Some(source.content_hash.clone()),
            ..Default::default()
        };
        let mut failures = Vec::new();
        for category in &resolution.unmatched {
            next.errors.push(format!(
                "{category}: {}",
                MockupError::NoMatchingVariants(orientation)
            ));
        }

        for target in &resolution.targets {
            let result = match &decoded {
                Ok(image) => self.produce(entity, &target.variant, image),
                Err(e) => Err(e.clone()),
            };
            match result {
                Ok(id) => {
                    debug!(entity, variant = %target.variant.id, artifact = id, "mockup created");
                    next.artifacts.insert(target.key.clone(), id);
                    if let Some(category) = &target.category {
                        next.category_variants.insert(category.clone(), target.variant.id.clone());
                    }
                }
                Err(error) => {
                    warn!(entity, variant = %target.variant.id, %error, "variant failed");
                    next.errors.push(format!("{}: {error}", target.variant.id));
                    failures.push(failure(target, error));
                }
            }
        }

        if next.artifacts.is_empty() {
            next.source_hash = None;
        }
        let created: Vec<AssetId> = next.artifacts.values().copied().collect();
        if let Err(e) = next.save(host, entity) {
            warn!(entity, error = %e, "record write failed, removing new artifacts");
            self.delete_all(entity, &created);
            return Err(MockupError::RegistryPersistence(e));
        }

        let stale: Vec<AssetId> = previous
            .all_artifact_ids()
            .into_iter()
            .filter(|id| !created.contains(id))
            .collect();
        let replaced = self.delete_all(entity, &stale);

        info!(
            entity,
            created = created.len(),
            failed = failures.len(),
            replaced,
            "generation finished"
        );
        Ok(GenerateReport {
            entity,
            orientation,
            artifacts: next.artifacts,
            failures,
            unmatched: resolution.unmatched,
            replaced,
        })
    }

    /// Entity selection, falling back to the configured default category.
    fn selection_for(&self, entity: EntityId) -> Result<Selection, MockupError> {
        let settings = EntitySettings::load(&*self.host, entity)?;
        Ok(match settings.selection {
            Some(selection) if !selection.is_empty() => selection,
            _ => Selection::Categories(self.settings.default_category.iter().cloned().collect()),
        })
    }

    /// Render and persist one target.
    fn produce(&self, entity: EntityId, variant: &Variant, source: &Arc<RasterImage>) -> Result<AssetId, VariantError> {
        let output = self.render(variant, source)?;
        self.host
            .persist_artifact(&output.bytes, ARTIFACT_MIME, entity, &variant.id)
            .map_err(|e| VariantError::Persist(e.to_string()))
    }

    fn render(&self, variant: &Variant, source: &Arc<RasterImage>) -> Result<MockupOutput, VariantError> {
        let template = match self.host.load_template(&variant.template) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err(VariantError::MissingTemplateAsset(variant.template.clone())),
            Err(e) => {
                warn!(variant = %variant.id, error = %e, "template lookup failed");
                return Err(VariantError::MissingTemplateAsset(variant.template.clone()));
            }
        };
        let params = variant.mockup_params(self.settings.quality);

        let Some(limit) = self.settings.variant_timeout else {
            return Ok(create_mockup(&*self.backend, &params, source, &template)?);
        };

        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let image = Arc::clone(source);
        let spawned = thread::Builder::new()
            .name(format!("render-{}", variant.id))
            .spawn(move || {
                let _ = tx.send(create_mockup(&*backend, &params, &image, &template));
            });
        if let Err(e) = spawned {
            return Err(VariantError::ImageEncode(format!("could not start renderer: {e}")));
        }

        match rx.recv_timeout(limit) {
            Ok(result) => Ok(result?),
            Err(RecvTimeoutError::Timeout) => Err(VariantError::TimedOut(limit)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(VariantError::ImageEncode("renderer stopped without a result".into()))
            }
        }
    }

    /// Delete artifacts, logging failures. Returns how many were deleted.
    fn delete_all(&self, entity: EntityId, ids: &[AssetId]) -> usize {
        ids.iter()
            .filter(|&&id| match self.host.delete_artifact(id) {
                Ok(()) => true,
                Err(e) => {
                    warn!(entity, artifact = id, error = %e, "could not delete artifact");
                    false
                }
            })
            .count()
    }

    /// True iff no hash is stored or it differs from `new_hash`.
    pub fn should_regenerate(&self, entity: EntityId, new_hash: &str) -> Result<bool, MockupError> {
        let record = GenerationRecord::load(&*self.host, entity)?;
        Ok(record.source_hash.as_deref() != Some(new_hash))
    }

    /// Delete every artifact the record references, in any stored shape,
    /// and clear the record. Returns how many artifacts were deleted.
    pub fn cleanup(&self, entity: EntityId) -> Result<usize, MockupError> {
        let _guard = self.locks.acquire(entity);
        self.cleanup_locked(entity)
    }

    fn cleanup_locked(&self, entity: EntityId) -> Result<usize, MockupError> {
        let record = GenerationRecord::load(&*self.host, entity)?;
        GenerationRecord::default()
            .save(&*self.host, entity)
            .map_err(MockupError::RegistryPersistence)?;
        let deleted = self.delete_all(entity, &record.all_artifact_ids());
        debug!(entity, deleted, "cleaned up");
        Ok(deleted)
    }

    /// Enabled by configuration or by the entity's own flag.
    pub fn is_enabled(&self, entity: EntityId) -> Result<bool, MockupError> {
        if self.settings.enabled_globally {
            return Ok(true);
        }
        Ok(EntitySettings::load(&*self.host, entity)?.enabled)
    }

    pub fn set_enabled(&self, entity: EntityId, enabled: bool) -> Result<(), MockupError> {
        if enabled {
            EntitySettings::save_enabled(&*self.host, entity, true)?;
            Ok(())
        } else {
            self.disable(entity).map(|_| ())
        }
    }

    /// Clean up, drop the selection and clear the flag.
    pub fn disable(&self, entity: EntityId) -> Result<usize, MockupError> {
        let _guard = self.locks.acquire(entity);
        let deleted = self.cleanup_locked(entity)?;
        EntitySettings::clear_selection(&*self.host, entity)?;
        EntitySettings::save_enabled(&*self.host, entity, false)?;
        info!(entity, deleted, "generation disabled");
        Ok(deleted)
    }

    /// Store what the entity wants generated. An empty selection clears it.
    pub fn select(&self, entity: EntityId, selection: &Selection, primary: Option<&str>) -> Result<(), MockupError> {
        if selection.is_empty() {
            EntitySettings::clear_selection(&*self.host, entity)?;
        } else {
            EntitySettings::save_selection(&*self.host, entity, selection, primary)?;
        }
        Ok(())
    }

    /// React to a source image being replaced or removed.
    pub fn on_source_changed(&self, entity: EntityId) -> Result<SyncOutcome, MockupError> {
        let _guard = self.locks.acquire(entity);
        if !self.is_enabled(entity)? {
            return Ok(SyncOutcome::Disabled);
        }
        let Some(source) = self.host.source_image(entity)? else {
            return self.cleanup_locked(entity).map(SyncOutcome::CleanedUp);
        };
        if !self.should_regenerate(entity, &source.content_hash)? {
            debug!(entity, "source unchanged");
            return Ok(SyncOutcome::Unchanged);
        }
        self.generate_locked(entity).map(SyncOutcome::Regenerated)
    }

    /// Drop artifacts whose variant or category left the catalog. Returns
    /// the artifact ids removed from the record.
    pub fn prune_orphans(&self, entity: EntityId) -> Result<Vec<AssetId>, MockupError> {
        let _guard = self.locks.acquire(entity);
        let mut record = GenerationRecord::load(&*self.host, entity)?;

        let orphaned: Vec<String> = record
            .artifacts
            .keys()
            .filter(|key| !self.key_still_valid(&record, key))
            .cloned()
            .collect();
        if orphaned.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for key in &orphaned {
            if let Some(id) = record.artifacts.remove(key) {
                removed.push(id);
            }
            record.category_variants.remove(key);
        }
        // The rewritten record only holds typed entries, so legacy-shaped
        // ids lose their last reference here.
        for id in std::mem::take(&mut record.legacy_ids) {
            if !removed.contains(&id) && !record.artifacts.values().any(|&kept| kept == id) {
                removed.push(id);
            }
        }
        if record.artifacts.is_empty() {
            record.source_hash = None;
        }
        record
            .save(&*self.host, entity)
            .map_err(MockupError::RegistryPersistence)?;
        self.delete_all(entity, &removed);
        info!(entity, pruned = removed.len(), "pruned orphaned artifacts");
        Ok(removed)
    }

    fn key_still_valid(&self, record: &GenerationRecord, key: &str) -> bool {
        match record.category_variants.get(key) {
            Some(variant_id) => self
                .host
                .category(key)
                .is_some_and(|c| c.variants.iter().any(|v| &v.id == variant_id)),
            None => self.host.variant(key).is_some(),
        }
    }
}

fn failure(target: &Target, error: VariantError) -> VariantFailure {
    VariantFailure {
        key: target.key.clone(),
        variant: target.variant.id.clone(),
        error,
    }
}

impl<H: Host> BatchWorker for Orchestrator<H> {
    fn is_eligible(&self, entity: EntityId) -> bool {
        self.is_enabled(entity).unwrap_or_else(|e| {
            warn!(entity, error = %e, "could not read enable flag");
            false
        })
    }

    fn generate(&self, entity: EntityId) -> bool {
        match Orchestrator::generate(self, entity) {
            Ok(report) => report.succeeded(),
            Err(e) => {
                warn!(entity, error = %e, "generation failed");
                false
            }
        }
    }
}
