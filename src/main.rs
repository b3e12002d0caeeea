use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use photodupes::analysis::{AnalysisOutcome, DEFAULT_RANK_LIMIT, DuplicateAnalysis, rank};
use photodupes::config::Settings;
use photodupes::remote::SnapshotLibrary;
use photodupes::scoring::build_pool;
use photodupes::sync::{self, Library};
use photodupes::{DiskCache, MediaType};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "photodupes",
    version,
    about = "Find likely duplicates in a photo library"
)]
struct Cli {
    /// Directory holding cached library listings and scores
    #[arg(long, value_name = "DIR", env = "PHOTODUPES_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Neither read nor write the disk cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Worker threads for library sync and scoring (default: number of CPUs)
    #[arg(long, value_name = "N", env = "PHOTODUPES_WORKERS", global = true)]
    workers: Option<usize>,

    /// JSON library export to analyse
    #[arg(long, value_name = "FILE", env = "PHOTODUPES_LIBRARY", global = true)]
    library: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score the library and list the most duplicated items
    Duplicates {
        /// Which media to compare: all, photo or video
        #[arg(value_name = "TYPE", default_value = "all")]
        media_type: MediaType,
        /// Refresh listings and score instead of reading them from the cache
        #[arg(long)]
        skip_cache: bool,
        /// Number of items to list
        #[arg(long, default_value_t = DEFAULT_RANK_LIMIT)]
        limit: usize,
    },

    /// List albums with their member counts
    Albums {
        #[arg(long)]
        skip_cache: bool,
        /// Only show albums whose titles clash, ignoring case
        #[arg(long)]
        duplicates: bool,
    },

    /// Fetch media items, albums and categories into the cache
    Sync {
        /// Refetch everything instead of reading the cache
        #[arg(long)]
        skip_cache: bool,
    },

    /// Inspect or empty the disk cache
    Cache {
        #[command(subcommand)]
        command: CacheCmd,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCmd {
    /// Show the total size of the cache
    Size,

    /// Remove every cache entry
    Clear {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Remove a single cache entry
    Delete {
        /// Cache key, e.g. `score_response_photo.json`
        key: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings {
        cache_root: cli.cache_dir.unwrap_or_else(Settings::default_cache_root),
        cache_enabled: !cli.no_cache,
        workers: cli.workers.unwrap_or_else(Settings::default_workers),
        library: cli.library,
    };
    log::debug!("{:?}", settings);

    let cache = settings
        .open_cache()
        .with_context(|| format!("Failed to open cache at {}", settings.cache_root.display()))?;

    match cli.command {
        Commands::Duplicates {
            media_type,
            skip_cache,
            limit,
        } => duplicates(&settings, &cache, media_type, skip_cache, limit)?,

        Commands::Albums {
            skip_cache,
            duplicates,
        } => albums(&settings, &cache, skip_cache, duplicates)?,

        Commands::Sync { skip_cache } => {
            if !cache.is_enabled() {
                bail!("Nothing to sync into: the cache is disabled");
            }
            let library = sync_library(&settings, &cache, skip_cache)?;
            println!(
                "✅ Synced {} media item(s), {} album(s) into {}",
                library.items().len(),
                library.albums().len(),
                cache.root().display()
            );
        }

        Commands::Cache { command } => match command {
            CacheCmd::Size => {
                let bytes = cache.size();
                println!(
                    "📦 {} kb in {}",
                    bytes / 1024,
                    cache.root().display()
                );
            }

            CacheCmd::Clear { yes } => {
                let confirmed = yes
                    || Confirm::new()
                        .with_prompt(format!(
                            "Remove everything under {}?",
                            cache.root().display()
                        ))
                        .default(false)
                        .interact()?;
                if !confirmed {
                    println!("Cache left untouched.");
                    return Ok(());
                }
                let (files, directories) = cache.clear().context("Failed to clear cache")?;
                println!(
                    "🧹 Removed {} file(s) and {} directory(ies)",
                    files, directories
                );
            }

            CacheCmd::Delete { key } => {
                if cache.delete(&key)? {
                    println!("🗑️  Deleted {}", key);
                } else {
                    println!("No cache entry named {}", key);
                }
            }
        },
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn open_library(settings: &Settings) -> Result<SnapshotLibrary> {
    let Some(path) = settings.library.as_deref() else {
        bail!("No library given; pass --library FILE or set PHOTODUPES_LIBRARY");
    };
    SnapshotLibrary::open(path)
        .with_context(|| format!("Failed to load library export {}", path.display()))
}

fn duplicates(
    settings: &Settings,
    cache: &DiskCache,
    media_type: MediaType,
    skip_cache: bool,
    limit: usize,
) -> Result<()> {
    let remote = open_library(settings)?;
    let pool = Arc::new(build_pool(settings.workers)?);

    let cancellation_token = Arc::new(AtomicBool::new(false));
    let handler_token = cancellation_token.clone();
    // The progress bar reports the abort; printing here would tear it.
    ctrlc::set_handler(move || handler_token.store(true, Ordering::Relaxed))
        .context("Failed to install Ctrl-C handler")?;

    println!("▶ Looking for {} duplicates", media_type);
    let analysis = DuplicateAnalysis::new(cache, &remote, pool, cancellation_token)
        .with_progress(true);
    let outcome = benchmark("duplicate analysis", || analysis.run(media_type, skip_cache))?;

    let run = match outcome {
        AnalysisOutcome::Completed(run) => run,
        AnalysisOutcome::Cancelled => {
            println!("Cancelled; nothing was cached.");
            return Ok(());
        }
    };

    if run.from_cache {
        println!("▶ Score read from cache");
    } else {
        println!(
            "▶ Scored {} items over {} property combinations in {:.2?}",
            run.records, run.subsets, run.elapsed
        );
    }
    if run.response.is_empty() {
        println!("No duplicates found.");
        return Ok(());
    }
    println!(
        "Found {} item(s) in {} duplicate cluster(s):",
        run.response.scores().len(),
        run.response.total_clusters()
    );

    for (i, row) in rank(&run.response, &run.library, limit)?.iter().enumerate() {
        println!(
            "{:>4}. {} [{}] matches {} on: {}",
            i + 1,
            row.filename,
            row.id,
            row.count,
            row.property_matches
        );
        println!("      🔎 {}", row.hint);
        if let Some(url) = &row.product_url {
            println!("      {}", url);
        }
    }
    Ok(())
}

fn sync_library(settings: &Settings, cache: &DiskCache, skip_cache: bool) -> Result<Library> {
    let remote = open_library(settings)?;
    let pool = build_pool(settings.workers)?;
    let library = benchmark("library sync", || {
        sync::synchronize(cache, &remote, &pool, skip_cache)
    })?;
    Ok(library)
}

fn albums(settings: &Settings, cache: &DiskCache, skip_cache: bool, duplicates: bool) -> Result<()> {
    let library = sync_library(settings, cache, skip_cache)?;

    if duplicates {
        let clashing = sync::album_title_duplicates(library.albums());
        println!(
            "🗂️  {} album(s) found, {} duplicate album(s) detected",
            library.albums().len(),
            clashing.len()
        );
        for album in clashing {
            println!("   {} ({} listed) [{}]", album.title, album.media_items_count, album.id);
        }
        return Ok(());
    }

    println!("🗂️  {} album(s):", library.albums().len());
    for (album, members) in library.albums().iter().zip(library.album_members()) {
        println!(
            "   {} ({} listed, {} synced) [{}]",
            album.title,
            album.media_items_count,
            members.member_ids.len(),
            album.id
        );
    }
    Ok(())
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
