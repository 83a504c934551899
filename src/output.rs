//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects. Diagnostics go through
//! `tracing` to stderr, so stdout stays clean for the results.
//!
//! # Output Format
//!
//! ## Generate
//!
//! ```text
//! Entity 7 (landscape)
//!     frames → #1003 (frame-landscape)
//!     mugs → #1004 (mug)
//!     posters: no variant matches landscape orientation
//! Generated 2 mockups, 1 error
//! ```
//!
//! ## Status
//!
//! ```text
//! Entity 7
//!     Enabled: yes
//!     Selection: categories frames, mugs
//!     Primary: frames
//!     Source hash: 9f86d081884c…
//!     * frames → #1003 (frame-landscape)
//!       mugs → #1004 (mug)
//! ```
//!
//! ## Variants
//!
//! ```text
//! 001 Wall frames (frames)
//!     frame-landscape 1600x1200, max 900, center, normal [landscape]
//! ```

use crate::batch::BatchJob;
use crate::generate::{GenerateReport, SyncOutcome};
use crate::orientation::Orientation;
use crate::record::{EntitySettings, GenerationRecord};
use crate::types::{AssetId, EntityId};
use crate::variants::{Catalog, Selection, Variant};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn artifact_line(key: &str, id: AssetId, variant: Option<&str>) -> String {
    match variant {
        Some(v) if v != key => format!("{key} \u{2192} #{id} ({v})"),
        _ => format!("{key} \u{2192} #{id}"),
    }
}

/// First 12 hex digits of a content hash.
fn short_hash(hash: &str) -> String {
    match hash.get(..12) {
        Some(prefix) if hash.len() > 12 => format!("{prefix}\u{2026}"),
        _ => hash.to_string(),
    }
}

// ============================================================================
// generate / sync
// ============================================================================

pub fn format_generate_report(report: &GenerateReport) -> Vec<String> {
    let mut lines = vec![format!("Entity {} ({})", report.entity, report.orientation)];

    for (key, id) in &report.artifacts {
        lines.push(format!("{}{}", indent(1), artifact_line(key, *id, None)));
    }
    for category in &report.unmatched {
        lines.push(format!(
            "{}{category}: no variant matches {} orientation",
            indent(1),
            report.orientation
        ));
    }
    for failure in &report.failures {
        lines.push(format!("{}{}: {}", indent(1), failure.variant, failure.error));
    }

    let errors = report.unmatched.len() + report.failures.len();
    let mut summary = format!("Generated {}", plural(report.artifacts.len(), "mockup"));
    if errors > 0 {
        summary.push_str(&format!(", {}", plural(errors, "error")));
    }
    if report.replaced > 0 {
        summary.push_str(&format!(", replaced {}", report.replaced));
    }
    lines.push(summary);
    lines
}

pub fn print_generate_report(report: &GenerateReport) {
    for line in format_generate_report(report) {
        println!("{}", line);
    }
}

pub fn format_sync_outcome(entity: EntityId, outcome: &SyncOutcome) -> Vec<String> {
    match outcome {
        SyncOutcome::Disabled => vec![format!("Entity {entity}: generation disabled, nothing to do")],
        SyncOutcome::Unchanged => vec![format!("Entity {entity}: source unchanged")],
        SyncOutcome::CleanedUp(n) => vec![format!(
            "Entity {entity}: source removed, deleted {}",
            plural(*n, "artifact")
        )],
        SyncOutcome::Regenerated(report) => format_generate_report(report),
    }
}

pub fn print_sync_outcome(entity: EntityId, outcome: &SyncOutcome) {
    for line in format_sync_outcome(entity, outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// status
// ============================================================================

/// Entity settings and record, primary artifact marked with `*`.
pub fn format_record(entity: EntityId, settings: &EntitySettings, record: &GenerationRecord) -> Vec<String> {
    let mut lines = vec![format!("Entity {entity}")];
    let yes_no = if settings.enabled { "yes" } else { "no" };
    lines.push(format!("{}Enabled: {yes_no}", indent(1)));

    let selection = match &settings.selection {
        Some(Selection::Categories(ids)) => format!("categories {}", ids.join(", ")),
        Some(Selection::Variants(ids)) => format!("variants {} (deprecated)", ids.join(", ")),
        None => "none".to_string(),
    };
    lines.push(format!("{}Selection: {selection}", indent(1)));
    if let Some(primary) = &settings.primary {
        lines.push(format!("{}Primary: {primary}", indent(1)));
    }
    if let Some(hash) = &record.source_hash {
        lines.push(format!("{}Source hash: {}", indent(1), short_hash(hash)));
    }

    let primary = record.primary_artifact(settings.primary.as_deref());
    for (key, id) in &record.artifacts {
        let marker = if Some(*id) == primary { "* " } else { "  " };
        let variant = record.category_variants.get(key).map(String::as_str);
        lines.push(format!("{}{marker}{}", indent(1), artifact_line(key, *id, variant)));
    }
    if !record.legacy_ids.is_empty() {
        let ids: Vec<String> = record.legacy_ids.iter().map(|id| format!("#{id}")).collect();
        lines.push(format!("{}Legacy artifacts: {}", indent(1), ids.join(", ")));
    }
    for error in &record.errors {
        lines.push(format!("{}Error: {error}", indent(1)));
    }
    lines
}

pub fn print_record(entity: EntityId, settings: &EntitySettings, record: &GenerationRecord) {
    for line in format_record(entity, settings, record) {
        println!("{}", line);
    }
}

// ============================================================================
// batch
// ============================================================================

pub fn format_progress(job: &BatchJob) -> Vec<String> {
    if job.total == 0 {
        return vec!["No batch job".to_string()];
    }
    let state = if job.is_running() { "running" } else { "finished" };
    vec![format!(
        "Batch {state}: {}/{} processed ({} ok, {} failed), {} queued",
        job.processed,
        job.total,
        job.successful,
        job.failed,
        job.remaining.len()
    )]
}

pub fn print_progress(job: &BatchJob) {
    for line in format_progress(job) {
        println!("{}", line);
    }
}

// ============================================================================
// variants / classify
// ============================================================================

fn variant_line(variant: &Variant) -> String {
    let orientations = if variant.orientations.is_empty() {
        "any".to_string()
    } else {
        variant
            .orientations
            .iter()
            .map(|o| o.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let label = match variant.display_name() {
        name if name == variant.id => name.to_string(),
        name => format!("{name} ({})", variant.id),
    };
    format!(
        "{} {}x{}, max {}, {}, {} [{}]",
        label,
        variant.width,
        variant.height,
        variant.max_size,
        variant.alignment,
        variant.blend_mode,
        orientations
    )
}

pub fn format_variants(catalog: &Catalog) -> Vec<String> {
    if catalog.categories.is_empty() {
        return vec!["No categories defined".to_string()];
    }
    let mut lines = Vec::new();
    for (i, category) in catalog.categories.iter().enumerate() {
        let title = if category.name.is_empty() { &category.id } else { &category.name };
        lines.push(format!("{} {} ({})", format_index(i + 1), title, category.id));
        for variant in &category.variants {
            lines.push(format!("{}{}", indent(1), variant_line(variant)));
        }
    }
    lines
}

pub fn print_variants(catalog: &Catalog) {
    for line in format_variants(catalog) {
        println!("{}", line);
    }
}

pub fn format_classification(name: &str, width: u32, height: u32, orientation: Orientation) -> Vec<String> {
    vec![format!("{name}: {width}x{height} {orientation}")]
}

pub fn print_classification(name: &str, width: u32, height: u32, orientation: Orientation) {
    for line in format_classification(name, width, height, orientation) {
        println!("{}", line);
    }
}
