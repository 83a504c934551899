//! # Mockup Forge
//!
//! Template-based product mockups. A source photo is resized, aligned and
//! blended onto a variant's template image; the resulting JPEGs are tracked
//! per entity so they are regenerated only when the source changes.
//!
//! # Architecture
//!
//! ```text
//! BatchScheduler / single trigger
//!         │
//!         ▼
//! Orchestrator ──► variants::resolve ──► imaging::create_mockup ──► host
//!   (generate)       (pick variants)      (decode, place, blend,     (persist artifact,
//!                                          encode)                   write record)
//! ```
//!
//! The pipeline never owns storage. Everything it reads or writes goes
//! through the traits in [`host`]; [`fs_host::FsHost`] implements them on a
//! directory for the CLI and tests use an in-memory host.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Placement math, pixel compositing and the two codec backends |
//! | [`orientation`] | Landscape / portrait / square classification with a ±5% band |
//! | [`variants`] | Variant catalog and category / flat-list resolution |
//! | [`record`] | Typed per-entity state over the generic attribute store |
//! | [`generate`] | The generation orchestrator: generate, cleanup, change detection |
//! | [`batch`] | Chunked batch regeneration with persisted progress |
//! | [`host`] | Traits for the hosting system's stores and catalog |
//! | [`fs_host`] | Filesystem implementation of the host traits |
//! | [`digest`] | SHA-256 content hashing for change detection |
//! | [`types`] | Shared identifiers and the source image |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Mockup Per Category
//!
//! Entities select categories; the first variant in a category that accepts
//! the photo's orientation is rendered. The older explicit variant list is
//! still read but is deprecated, and when an entity carries both the
//! categories win.
//!
//! ## Freshness Is Earned
//!
//! The stored source hash always describes every artifact the record points
//! at. A run that produces nothing clears the hash, and the record is written
//! before any old artifact is deleted.
//!
//! ## Pure-Rust Imaging
//!
//! Both backends are built on the `image` crate. The full backend composites
//! in the template's colour model with straight alpha; the basic backend
//! handles JPEG and PNG as opaque RGB. The choice is made once at startup.

pub mod batch;
pub mod config;
pub mod digest;
pub mod fs_host;
pub mod generate;
pub mod host;
pub mod imaging;
pub mod orientation;
pub mod output;
pub mod record;
pub mod types;
pub mod variants;

#[cfg(test)]
pub(crate) mod test_helpers;
