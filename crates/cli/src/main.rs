// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mbcache_core::config::yaml_to_json;
use mbcache_core::{LoaderConfig, LoaderRegistry, Manifest, MacrobatchLoader};
use mbcache_formats::read_max_item;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// mbcache – manifest-driven macrobatch cache for training data
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a manifest and report its size, identity and version
    Manifest {
        /// CSV manifest, one example per line
        #[arg(short, long)]
        manifest: PathBuf,

        /// Prefix joined onto every manifest field
        #[arg(long, default_value = "")]
        root: String,

        /// Shuffle rows with the fixed manifest seed
        #[arg(long)]
        shuffle: bool,

        /// Keep this percentage of rows (1-100)
        #[arg(long, default_value_t = 100)]
        subset_percent: u32,

        /// Seed for the subset selection
        #[arg(long, default_value_t = 0)]
        subset_seed: u64,

        /// Print the resolved rows after the summary
        #[arg(long)]
        print: bool,
    },
    /// Build every macrobatch for the configured manifest
    Pack {
        /// Path to a loader YAML config file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the largest data item of each matching batch file
    MaxItem {
        /// Glob patterns, e.g. 'cache/loader_*/*.mbf'
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Drive the sequential loader for a number of steps
    Run {
        /// Path to a loader YAML config file
        #[arg(short, long)]
        config: PathBuf,

        /// Macrobatches to fetch
        #[arg(long, default_value_t = 10)]
        steps: usize,

        /// Emit the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a loader config without touching the cache
    Validate {
        /// Path to a loader YAML config file
        #[arg(short, long)]
        config: PathBuf,

        /// Convert YAML to JSON and print it
        #[arg(long)]
        to_json: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Ignore errors if .env doesn't exist

    let args = Args::parse();

    // RUST_LOG wins over --verbose when set
    let log_level = if args.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mbcache={log_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("mbcache v{} starting", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Manifest {
            manifest,
            root,
            shuffle,
            subset_percent,
            subset_seed,
            print,
        } => show_manifest(&manifest, &root, shuffle, subset_percent, subset_seed, print),
        Commands::Pack { config } => pack(&config),
        Commands::MaxItem { patterns } => max_item(&patterns),
        Commands::Run {
            config,
            steps,
            json,
        } => run_loader(&config, steps, json),
        Commands::Validate { config, to_json } => validate_config(&config, to_json),
    }
}

fn load_config(path: &Path) -> Result<LoaderConfig> {
    info!("Loading loader config from: {:?}", path);
    LoaderConfig::from_yaml_file(path)
        .with_context(|| format!("Failed to load config {}", path.display()))
}

fn show_manifest(
    path: &Path,
    root: &str,
    shuffle: bool,
    subset_percent: u32,
    subset_seed: u64,
    print: bool,
) -> Result<()> {
    if subset_percent == 0 || subset_percent > 100 {
        bail!("--subset-percent must be in 1..=100, got {subset_percent}");
    }

    let mut manifest = Manifest::open(path, root)
        .with_context(|| format!("Failed to load manifest {}", path.display()))?;
    let total = manifest.len();
    if shuffle {
        manifest.shuffle(mbcache_core::MANIFEST_SHUFFLE_SEED);
    }
    manifest.subset(f64::from(subset_percent) / 100.0, subset_seed)?;

    println!("Manifest: {}", manifest.source());
    println!("  Rows: {} (of {})", manifest.len(), total);
    println!("  Fields per row: {}", manifest.nelements());
    println!("  Cache id: {}", manifest.cache_id());
    println!("  Version: {}", manifest.version());
    if print {
        print!("{}", manifest.to_csv());
    }
    Ok(())
}

fn pack(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let loader = MacrobatchLoader::start(&config).context("Failed to start loader")?;
    // start() already builds what is missing; warm() catches anything removed since
    let built = loader.built_at_start() + loader.warm().context("Failed to build macrobatches")?;

    println!(
        "Packed {} items into {} macrobatches at {} ({} written, {} already cached)",
        loader.item_count(),
        loader.macrobatch_count(),
        loader.cache().dir().display(),
        built,
        loader.macrobatch_count() - built
    );
    Ok(())
}

fn max_item(patterns: &[String]) -> Result<()> {
    let mut matched = 0usize;
    for pattern in patterns {
        let entries =
            glob::glob(pattern).with_context(|| format!("Invalid glob pattern {pattern:?}"))?;
        for entry in entries {
            let path = entry.with_context(|| format!("Failed to read match for {pattern:?}"))?;
            let size = read_max_item(&path)
                .with_context(|| format!("Failed to read batch file {}", path.display()))?;
            println!("{}\t{}", path.display(), size);
            matched += 1;
        }
    }
    if matched == 0 {
        bail!("no batch files matched {:?}", patterns);
    }
    Ok(())
}

fn run_loader(config_path: &Path, steps: usize, json: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let mut registry = LoaderRegistry::new();
    let handle = registry.start(MacrobatchLoader::start(&config).context("Failed to start loader")?);
    info!("Started {}", handle);

    let mut items = 0usize;
    let mut data_bytes = 0u64;
    let mut max_datum = 0u32;
    for _ in 0..steps {
        let batch = registry.next(handle)?;
        items += batch.len();
        data_bytes += batch.reader.total_data_size();
        max_datum = max_datum.max(batch.reader.max_datum_size());
    }
    let epochs = registry.get(handle)?.epoch();
    registry.stop(handle)?;

    if steps == 0 {
        warn!("--steps 0: loader started and stopped without fetching");
    }

    if json {
        let summary = serde_json::json!({
            "steps": steps,
            "items": items,
            "data_bytes": data_bytes,
            "max_datum_size": max_datum,
            "epochs_completed": epochs,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Run complete:");
        println!("  Steps: {}", steps);
        println!("  Items: {}", items);
        println!("  Data bytes: {}", data_bytes);
        println!("  Max datum size: {}", max_datum);
        println!("  Epochs completed: {}", epochs);
    }
    Ok(())
}

fn validate_config(config_path: &Path, to_json: bool) -> Result<()> {
    let yaml_content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
    let config = LoaderConfig::from_yaml(&yaml_content).context("Config is invalid")?;

    if to_json {
        println!("{}", yaml_to_json(&yaml_content)?);
        return Ok(());
    }

    println!("✅ Config is valid");
    println!("  Manifest: {}", config.manifest.display());
    println!("  Cache dir: {}", config.cache_dir.display());
    println!("  Macrobatch size: {}", config.macrobatch_size);
    println!("  Subset: {}%", config.subset_percent);
    println!("  Type tag: {}", config.type_tag);
    Ok(())
}
