//! Interfaces to the hosting system.
//!
//! The pipeline never owns entity storage, asset storage or the variant
//! catalog; it reaches them through these traits. [`FsHost`](crate::fs_host::FsHost)
//! implements all of them on a plain directory, and the test suite uses an
//! in-memory implementation.

use crate::types::{AssetId, EntityId, SourceImage};
use crate::variants::{CatalogError, Category, Variant};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("unknown asset {0}")]
    UnknownAsset(AssetId),
    #[error("store rejected the write: {0}")]
    Rejected(String),
}

/// Generic per-entity key/value store.
pub trait MetadataStore: Send + Sync {
    fn get_attribute(&self, entity: EntityId, key: &str) -> Result<Option<Value>, StoreError>;

    fn set_attribute(&self, entity: EntityId, key: &str, value: Value) -> Result<(), StoreError>;

    fn delete_attribute(&self, entity: EntityId, key: &str) -> Result<(), StoreError>;

    /// Apply several writes as one update: `Some` sets, `None` deletes.
    ///
    /// The default applies them one by one; stores that can commit the whole
    /// set at once should override it.
    fn update_attributes(
        &self,
        entity: EntityId,
        updates: Vec<(&'static str, Option<Value>)>,
    ) -> Result<(), StoreError> {
        for (key, value) in updates {
            match value {
                Some(value) => self.set_attribute(entity, key, value)?,
                None => self.delete_attribute(entity, key)?,
            }
        }
        Ok(())
    }
}

/// Source images, templates and generated artifacts.
pub trait AssetStore: Send + Sync {
    fn source_image(&self, entity: EntityId) -> Result<Option<SourceImage>, StoreError>;

    /// Encoded template bytes for a variant's template reference.
    fn load_template(&self, reference: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Persist a fully encoded artifact and return its new id.
    fn persist_artifact(
        &self,
        bytes: &[u8],
        mime: &str,
        owner: EntityId,
        name_hint: &str,
    ) -> Result<AssetId, StoreError>;

    fn delete_artifact(&self, id: AssetId) -> Result<(), StoreError>;
}

/// Read access to variant definitions.
pub trait VariantCatalog: Send + Sync {
    fn variant(&self, id: &str) -> Option<Variant>;

    fn category(&self, id: &str) -> Option<Category>;
}

/// Everything the orchestrator needs from the host.
pub trait Host: MetadataStore + AssetStore + VariantCatalog {}

impl<T: MetadataStore + AssetStore + VariantCatalog> Host for T {}
