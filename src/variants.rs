//! Variant catalog and resolution.
//!
//! A variant is a template plus placement rules. Variants are grouped into
//! categories; an entity asks for one mockup per category (canonical mode)
//! or, in the deprecated flat mode, for an explicit list of variants.
//!
//! ## Catalog file
//!
//! ```toml
//! [[category]]
//! id = "frames"
//! name = "Wall frames"
//!
//! [[category.variant]]
//! id = "frame-landscape"
//! name = "Oak frame, landscape"
//! template = "templates/oak-landscape.png"
//! width = 1600
//! height = 1200
//! max_size = 900
//! alignment = "center"          # top-left … bottom-right
//! offset = { x = 0, y = -20 }
//! blend_mode = "multiply"       # anything else is normal
//! orientations = ["landscape"]  # empty = any orientation
//! ```
//!
//! Resolution is "first eligible wins" in definition order: there is no
//! best-match scoring.

use crate::host::VariantCatalog;
use crate::imaging::{Alignment, BlendMode, MockupParams, Offset, Quality};
use crate::orientation::Orientation;
use crate::types::{CategoryId, VariantId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Catalog validation error: {0}")]
    Validation(String),
}

/// A template definition producing one style of mockup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variant {
    pub id: VariantId,
    #[serde(default)]
    pub name: String,
    /// Host-specific template reference (a path relative to the data root
    /// for the filesystem host).
    pub template: String,
    /// Canvas size; the template is resized to exactly this.
    pub width: u32,
    pub height: u32,
    /// Long edge of the resized photo.
    pub max_size: u32,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub offset: Offset,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default)]
    pub orientations: Vec<Orientation>,
}

impl Variant {
    /// Empty orientation set matches everything.
    pub fn accepts(&self, orientation: Orientation) -> bool {
        self.orientations.is_empty() || self.orientations.contains(&orientation)
    }

    pub fn mockup_params(&self, quality: Quality) -> MockupParams {
        MockupParams {
            canvas_width: self.width,
            canvas_height: self.height,
            max_size: self.max_size,
            alignment: self.alignment,
            offset: self.offset,
            blend: self.blend_mode,
            quality,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Category {
    pub id: CategoryId,
    #[serde(default)]
    pub name: String,
    /// Definition order is resolution order.
    #[serde(default, rename = "variant")]
    pub variants: Vec<Variant>,
}

/// Ordered list of categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Catalog {
    #[serde(rename = "category")]
    pub categories: Vec<Category>,
}

impl Catalog {
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file. A missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Ids must be unique (variant ids across the whole catalog) and every
    /// variant needs non-zero geometry.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut category_ids = HashSet::new();
        let mut variant_ids = HashSet::new();
        for category in &self.categories {
            if !category_ids.insert(category.id.as_str()) {
                return Err(CatalogError::Validation(format!(
                    "duplicate category id '{}'",
                    category.id
                )));
            }
            for variant in &category.variants {
                if !variant_ids.insert(variant.id.as_str()) {
                    return Err(CatalogError::Validation(format!(
                        "duplicate variant id '{}'",
                        variant.id
                    )));
                }
                if variant.width == 0 || variant.height == 0 || variant.max_size == 0 {
                    return Err(CatalogError::Validation(format!(
                        "variant '{}': width, height and max_size must be non-zero",
                        variant.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.categories.iter().flat_map(|c| c.variants.iter())
    }
}

impl VariantCatalog for Catalog {
    fn variant(&self, id: &str) -> Option<Variant> {
        self.variants().find(|v| v.id == id).cloned()
    }

    fn category(&self, id: &str) -> Option<Category> {
        self.categories.iter().find(|c| c.id == id).cloned()
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// What an entity asked for. The two modes are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One mockup per category (canonical).
    Categories(Vec<CategoryId>),
    /// Explicit variant list (deprecated flat mode).
    Variants(Vec<VariantId>),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::Categories(ids) | Selection::Variants(ids) => ids.is_empty(),
        }
    }
}

/// One mockup to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Artifact-map key: category id in category mode, variant id in flat mode.
    pub key: String,
    pub category: Option<CategoryId>,
    pub variant: Variant,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub targets: Vec<Target>,
    /// Requested categories with no variant for the orientation.
    pub unmatched: Vec<CategoryId>,
}

/// First variant of `category` accepting `orientation`, in definition order.
pub fn select_variant_for_category(
    catalog: &(impl VariantCatalog + ?Sized),
    category: &str,
    orientation: Orientation,
) -> Option<Variant> {
    catalog
        .category(category)?
        .variants
        .into_iter()
        .find(|v| v.accepts(orientation))
}

/// Filter an explicit variant list by orientation, keeping input order.
/// Unknown ids are skipped.
pub fn select_variants_for_flat_list(
    catalog: &(impl VariantCatalog + ?Sized),
    ids: &[VariantId],
    orientation: Orientation,
) -> Vec<Variant> {
    ids.iter()
        .filter_map(|id| catalog.variant(id))
        .filter(|v| v.accepts(orientation))
        .collect()
}

/// Resolve a selection into render targets. Duplicate ids are collapsed,
/// keeping the first occurrence.
pub fn resolve(
    catalog: &(impl VariantCatalog + ?Sized),
    selection: &Selection,
    orientation: Orientation,
) -> Resolution {
    let mut resolution = Resolution::default();
    let mut seen: HashSet<String> = HashSet::new();
    match selection {
        Selection::Categories(ids) => {
            for id in ids {
                if !seen.insert(id.clone()) {
                    continue;
                }
                match select_variant_for_category(catalog, id, orientation) {
                    Some(variant) => resolution.targets.push(Target {
                        key: id.clone(),
                        category: Some(id.clone()),
                        variant,
                    }),
                    None => resolution.unmatched.push(id.clone()),
                }
            }
        }
        Selection::Variants(ids) => {
            for variant in select_variants_for_flat_list(catalog, ids, orientation) {
                if seen.insert(variant.id.clone()) {
                    resolution.targets.push(Target {
                        key: variant.id.clone(),
                        category: None,
                        variant,
                    });
                }
            }
        }
    }
    resolution
}
