use clap::{Parser, Subcommand};
use mockup_forge::batch::{BatchScheduler, DelayedTrigger, JobStore, QueuedTrigger, run_until_idle};
use mockup_forge::config::{self, MockupConfig};
use mockup_forge::fs_host::FsHost;
use mockup_forge::generate::Orchestrator;
use mockup_forge::host::AssetStore;
use mockup_forge::imaging::select_backend;
use mockup_forge::orientation::classify;
use mockup_forge::record::{EntitySettings, GenerationRecord};
use mockup_forge::types::{EntityId, SourceImage};
use mockup_forge::variants::Selection;
use mockup_forge::{digest, output};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mockup-forge")]
#[command(about = "Composite product photos onto mockup templates")]
#[command(long_about = "\
Composite product photos onto mockup templates

Each entity (a product, a listing) has one source photo. Mockups are
rendered per category: the first variant in the category that accepts the
photo's orientation wins. Generated JPEGs are tracked per entity together
with the source hash, so they are only rebuilt when the photo changes.

Data root layout:

  data/
  ├── config.toml          # Optional, see 'mockup-forge gen-config'
  ├── catalog.toml         # Categories and their variants
  ├── templates/           # Template images referenced by the catalog
  ├── entities/<id>.json   # Per-entity attributes
  ├── assets/              # Imported sources and generated mockups
  └── batch.json           # Batch progress")]
#[command(version)]
struct Cli {
    /// Data root directory
    #[arg(long, default_value = "data", global = true)]
    root: PathBuf,

    /// Config file (defaults to <root>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a photo as an entity's source image
    Import { entity: EntityId, file: PathBuf },
    /// Enable generation for an entity and store its selection
    Enable {
        entity: EntityId,
        /// Category to generate (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Explicit variant (deprecated, repeatable; ignored with --category)
        #[arg(long = "variant")]
        variants: Vec<String>,
        /// Category (or variant) shown first
        #[arg(long)]
        primary: Option<String>,
    },
    /// Disable generation and delete the entity's mockups
    Disable { entity: EntityId },
    /// Regenerate an entity's mockups now
    Generate { entity: EntityId },
    /// Show an entity's settings and generated mockups
    Status { entity: EntityId },
    /// Report whether an entity's mockups are stale
    Check {
        entity: EntityId,
        /// Compare against this file instead of the stored source
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Handle a changed or removed source image
    Sync { entity: EntityId },
    /// Delete every mockup of an entity
    Cleanup { entity: EntityId },
    /// Drop mockups whose variant left the catalog (all entities when omitted)
    Prune { entity: Option<EntityId> },
    /// Regenerate many entities in chunks (all enabled entities when omitted)
    Batch {
        ids: Vec<EntityId>,
        /// Discard the persisted batch job instead of running
        #[arg(long)]
        clear: bool,
    },
    /// Show batch progress
    Progress,
    /// Print a photo's orientation
    Classify { file: PathBuf },
    /// List the variant catalog
    Variants,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        Command::Classify { file } => {
            let source = SourceImage::from_bytes(0, std::fs::read(file)?);
            let orientation = classify(source.width, source.height)?;
            output::print_classification(&file.display().to_string(), source.width, source.height, orientation);
            return Ok(());
        }
        _ => {}
    }

    let config = config::load_config(&cli.root, cli.config.as_deref())?;
    let host = Arc::new(FsHost::open(&cli.root)?);
    let backend = select_backend(config.generation.backend)?;
    info!(backend = backend.name(), root = %host.root().display(), "ready");
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&host),
        backend,
        config.generation_settings(),
    ));

    match cli.command {
        Command::Import { entity, file } => {
            let id = host.import_source(entity, &file)?;
            println!("Entity {entity}: imported {} as #{id}", file.display());
        }
        Command::Enable {
            entity,
            categories,
            variants,
            primary,
        } => {
            orchestrator.set_enabled(entity, true)?;
            let selection = if !categories.is_empty() {
                Some(Selection::Categories(categories))
            } else if !variants.is_empty() {
                warn!(entity, "explicit variant lists are deprecated; prefer --category");
                Some(Selection::Variants(variants))
            } else {
                None
            };
            if let Some(selection) = selection {
                orchestrator.select(entity, &selection, primary.as_deref())?;
            }
            print_status(&host, entity)?;
        }
        Command::Disable { entity } => {
            let deleted = orchestrator.disable(entity)?;
            println!("Entity {entity}: disabled, deleted {deleted} mockups");
        }
        Command::Generate { entity } => {
            let report = orchestrator.generate(entity)?;
            output::print_generate_report(&report);
        }
        Command::Status { entity } => print_status(&host, entity)?,
        Command::Check { entity, file } => {
            let hash = match file {
                Some(path) => digest::hash_file(&path)?,
                None => match host.source_image(entity)? {
                    Some(source) => source.content_hash,
                    None => {
                        println!("Entity {entity}: no source image");
                        return Ok(());
                    }
                },
            };
            let state = if orchestrator.should_regenerate(entity, &hash)? {
                "stale, regenerate"
            } else {
                "up to date"
            };
            println!("Entity {entity}: {state}");
        }
        Command::Sync { entity } => {
            let outcome = orchestrator.on_source_changed(entity)?;
            output::print_sync_outcome(entity, &outcome);
        }
        Command::Cleanup { entity } => {
            let deleted = orchestrator.cleanup(entity)?;
            println!("Entity {entity}: deleted {deleted} mockups");
        }
        Command::Prune { entity } => {
            let entities = match entity {
                Some(id) => vec![id],
                None => host.entity_ids()?,
            };
            for entity in entities {
                let pruned = orchestrator.prune_orphans(entity)?;
                if !pruned.is_empty() {
                    println!("Entity {entity}: pruned {} mockups", pruned.len());
                }
            }
        }
        Command::Batch { ids, clear } => {
            let trigger = Arc::new(QueuedTrigger::new());
            let scheduler = BatchScheduler::new(
                orchestrator.clone(),
                host.clone(),
                trigger.clone(),
                config.batch_settings(),
            );
            if clear {
                scheduler.clear()?;
                println!("Batch job cleared");
                return Ok(());
            }

            init_thread_pool(&config);
            if scheduler.is_processing()? {
                info!("resuming interrupted batch job");
                trigger.schedule_once(Duration::ZERO);
            } else {
                let ids = if ids.is_empty() {
                    enabled_entities(&host, &orchestrator)?
                } else {
                    ids
                };
                scheduler.schedule(ids)?;
            }
            let cycles = run_until_idle(&scheduler, &trigger, std::thread::sleep, output::print_progress)?;
            if cycles == 0 {
                output::print_progress(&scheduler.progress()?);
            }
        }
        Command::Progress => {
            let job = host.load_job()?.unwrap_or_default();
            output::print_progress(&job);
        }
        Command::Variants => output::print_variants(host.catalog()),
        Command::GenConfig | Command::Classify { .. } => {}
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on batch config.
///
/// `max_workers` is capped at the number of CPU cores.
fn init_thread_pool(config: &MockupConfig) {
    let threads = config::effective_threads(&config.batch);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn enabled_entities(
    host: &FsHost,
    orchestrator: &Orchestrator<FsHost>,
) -> Result<Vec<EntityId>, Box<dyn std::error::Error>> {
    let mut ids = Vec::new();
    for entity in host.entity_ids()? {
        if orchestrator.is_enabled(entity)? {
            ids.push(entity);
        }
    }
    Ok(ids)
}

fn print_status(host: &FsHost, entity: EntityId) -> Result<(), Box<dyn std::error::Error>> {
    let settings = EntitySettings::load(host, entity)?;
    let record = GenerationRecord::load(host, entity)?;
    output::print_record(entity, &settings, &record);
    Ok(())
}
