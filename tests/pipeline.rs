//! End-to-end: filesystem host, full backend, orchestrator and batch
//! scheduler on a temporary data root.

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use mockup_forge::batch::{BatchScheduler, BatchSettings, QueuedTrigger, run_until_idle};
use mockup_forge::fs_host::FsHost;
use mockup_forge::generate::{GenerationSettings, Orchestrator, SyncOutcome};
use mockup_forge::host::{AssetStore, MetadataStore};
use mockup_forge::imaging::RustBackend;
use mockup_forge::record::{GenerationRecord, keys};
use mockup_forge::variants::Selection;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CATALOG: &str = r#"
[[category]]
id = "frames"
name = "Frames"

[[category.variant]]
id = "frame-landscape"
template = "templates/frame-landscape.png"
width = 160
height = 120
max_size = 80
orientations = ["landscape"]

[[category.variant]]
id = "frame-portrait"
template = "templates/frame-portrait.png"
width = 120
height = 160
max_size = 80
alignment = "top-center"
orientations = ["portrait"]

[[category]]
id = "mugs"

[[category.variant]]
id = "mug"
template = "templates/mug.png"
width = 100
height = 100
max_size = 60
blend_mode = "multiply"
"#;

fn write_png(path: &Path, width: u32, height: u32, rgba: [u8; 4]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbaImage::from_pixel(width, height, Rgba(rgba))
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

fn write_photo(path: &Path, width: u32, height: u32, shade: u8) {
    RgbImage::from_fn(width, height, |x, _| Rgb([shade, (x % 256) as u8, 90]))
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

fn setup() -> (TempDir, Arc<FsHost>, Arc<Orchestrator<FsHost>>) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::write(root.join("catalog.toml"), CATALOG).unwrap();
    write_png(&root.join("templates/frame-landscape.png"), 320, 240, [250, 250, 250, 255]);
    write_png(&root.join("templates/frame-portrait.png"), 240, 320, [250, 250, 250, 255]);
    write_png(&root.join("templates/mug.png"), 50, 50, [200, 200, 255, 255]);

    let host = Arc::new(FsHost::open(root).unwrap());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&host),
        Arc::new(RustBackend::new()),
        GenerationSettings::default(),
    ));
    (tmp, host, orchestrator)
}

fn import(tmp: &TempDir, host: &FsHost, entity: u64, width: u32, height: u32, shade: u8) {
    let photo = tmp.path().join(format!("photo-{entity}.jpg"));
    write_photo(&photo, width, height, shade);
    host.import_source(entity, &photo).unwrap();
}

fn categories(ids: &[&str]) -> Selection {
    Selection::Categories(ids.iter().map(|s| s.to_string()).collect())
}

#[test]
fn generate_writes_canvas_sized_jpegs() {
    let (tmp, host, orch) = setup();
    import(&tmp, &host, 1, 300, 200, 40);
    orch.select(1, &categories(&["frames", "mugs"]), Some("frames")).unwrap();

    let report = orch.generate(1).unwrap();
    assert!(report.succeeded(), "failures: {:?}", report.failures);

    let record = GenerationRecord::load(&*host, 1).unwrap();
    assert_eq!(record.category_variants["frames"], "frame-landscape");

    let frame = host.asset_path(record.artifacts["frames"]).unwrap();
    let decoded = image::open(&frame).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (160, 120));
    assert!(frame.file_name().unwrap().to_str().unwrap().starts_with("mockup-frame-landscape-"));

    let mug = image::open(host.asset_path(record.artifacts["mugs"]).unwrap()).unwrap();
    assert_eq!((mug.width(), mug.height()), (100, 100));
}

#[test]
fn regeneration_follows_source_changes() {
    let (tmp, host, orch) = setup();
    import(&tmp, &host, 1, 300, 200, 40);
    orch.set_enabled(1, true).unwrap();
    orch.select(1, &categories(&["frames"]), None).unwrap();

    assert!(matches!(orch.on_source_changed(1).unwrap(), SyncOutcome::Regenerated(_)));
    let first = GenerationRecord::load(&*host, 1).unwrap();
    let first_path = host.asset_path(first.artifacts["frames"]).unwrap();
    assert_eq!(orch.on_source_changed(1).unwrap(), SyncOutcome::Unchanged);

    // Portrait replacement: different hash, different variant.
    import(&tmp, &host, 1, 200, 300, 40);
    assert!(matches!(orch.on_source_changed(1).unwrap(), SyncOutcome::Regenerated(_)));
    let second = GenerationRecord::load(&*host, 1).unwrap();
    assert_eq!(second.category_variants["frames"], "frame-portrait");
    assert_ne!(second.source_hash, first.source_hash);
    assert!(!first_path.exists());

    host.remove_source(1).unwrap();
    assert_eq!(orch.on_source_changed(1).unwrap(), SyncOutcome::CleanedUp(1));
    assert!(!GenerationRecord::load(&*host, 1).unwrap().has_artifacts());
}

#[test]
fn missing_template_is_recorded_per_variant() {
    let (tmp, host, orch) = setup();
    fs::remove_file(tmp.path().join("templates/mug.png")).unwrap();
    import(&tmp, &host, 1, 300, 200, 40);
    orch.select(1, &categories(&["frames", "mugs"]), None).unwrap();

    let report = orch.generate(1).unwrap();
    assert!(report.succeeded());
    let errors = host.get_attribute(1, keys::ERRORS).unwrap().unwrap();
    assert_eq!(errors.as_array().unwrap().len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("mug: "));
}

#[test]
fn batch_regenerates_enabled_entities_and_counts_the_rest_as_failed() {
    let (tmp, host, orch) = setup();
    for entity in 1..=5 {
        import(&tmp, &host, entity, 300, 200, entity as u8 * 30);
        orch.select(entity, &categories(&["mugs"]), None).unwrap();
        if entity != 4 {
            orch.set_enabled(entity, true).unwrap();
        }
    }

    let trigger = Arc::new(QueuedTrigger::new());
    let scheduler = BatchScheduler::new(
        orch.clone(),
        host.clone(),
        trigger.clone(),
        BatchSettings {
            batch_size: 2,
            processing_delay: Duration::from_millis(1),
        },
    );
    scheduler.schedule(host.entity_ids().unwrap()).unwrap();

    let mut seen = Vec::new();
    let cycles = run_until_idle(&scheduler, &trigger, |_| {}, |job| seen.push(job.processed)).unwrap();
    assert_eq!(cycles, 3);
    assert_eq!(seen, vec![2, 4, 5]);

    let job = scheduler.progress().unwrap();
    assert_eq!((job.total, job.successful, job.failed), (5, 4, 1));
    assert!(!scheduler.is_processing().unwrap());
    assert!(tmp.path().join("batch.json").exists());
    assert!(host.source_image(4).unwrap().is_some());
    assert!(!GenerationRecord::load(&*host, 4).unwrap().has_artifacts());
}

#[test]
fn cleanup_removes_legacy_artifact_files() {
    let (tmp, host, orch) = setup();
    import(&tmp, &host, 1, 300, 200, 40);
    let a = host.persist_artifact(b"old", "image/jpeg", 1, "legacy").unwrap();
    let b = host.persist_artifact(b"old", "image/jpeg", 1, "legacy").unwrap();
    host.set_attribute(1, keys::ARTIFACTS, serde_json::json!({"frame": {"landscape": a, "portrait": b.to_string()}}))
        .unwrap();
    let paths = [host.asset_path(a).unwrap(), host.asset_path(b).unwrap()];

    assert_eq!(orch.cleanup(1).unwrap(), 2);
    assert!(paths.iter().all(|p| !p.exists()));
    assert_eq!(host.get_attribute(1, keys::ARTIFACTS).unwrap(), None);
}
