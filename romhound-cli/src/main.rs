//! romhound CLI
//!
//! Scrapes metadata for a directory of ROMs into an EmulationStation
//! gamelist.xml, using a local hash database for identification.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use romhound_core::{FormatRegistry, MagicPolicy};
use romhound_lib::pipeline::{OutputMode, PipelineOptions, PipelineStatus};
use romhound_lib::{
    run_pipeline, scan_roms, write_missing_report, CancelToken, DataSource, HashDb, HashKind,
    Hasher, MediaSelection, Settings,
};

#[derive(Parser)]
#[command(name = "romhound")]
#[command(about = "Scrape game metadata for a ROM directory", long_about = None)]
struct Cli {
    /// Directory containing ROM files
    rom_dir: PathBuf,

    /// Output gamelist path (default: <rom_dir>/gamelist.xml)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of scraping workers (default: CPU count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Media download concurrency (0 = same as workers)
    #[arg(long)]
    img_workers: Option<usize>,

    /// Extra full retries after a transient failure
    #[arg(long)]
    retries: Option<u32>,

    /// Write a CSV of unidentified ROMs here
    #[arg(long)]
    missing: Option<PathBuf>,

    /// Hash database CSV (hash,id,system,name rows)
    #[arg(long)]
    hash_db: Option<PathBuf>,

    /// Additional extensions to treat as plain ROMs
    #[arg(long, value_delimiter = ',')]
    extra_ext: Vec<String>,

    /// Add to the existing gamelist, skipping ROMs already present
    #[arg(long, conflicts_with = "refresh")]
    append: bool,

    /// Re-scrape everything, keeping favorites and play counts
    #[arg(long)]
    refresh: bool,

    /// Hash algorithm: sha1, md5 or crc32
    #[arg(long, default_value = "sha1")]
    hash_kind: HashKind,

    /// Reject header-optional formats whose magic bytes don't match
    #[arg(long)]
    strict_magic: bool,

    /// Directory for downloaded media (default: <rom_dir>/images)
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Download box art and thumbnails for identified games
    #[arg(long)]
    download_images: bool,

    /// Maximum number of ROMs to process
    #[arg(short, long)]
    limit: Option<usize>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "{} Bad settings file: {}",
                "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
                e,
            );
            Settings::default()
        }
    };

    let workers = cli.workers.unwrap_or(settings.workers).max(1);
    let retries = cli.retries.unwrap_or(settings.retries);
    let img_workers = cli.img_workers.unwrap_or(settings.img_workers);

    let policy = if cli.strict_magic {
        MagicPolicy::Strict
    } else {
        MagicPolicy::Lenient
    };
    let mut registry = FormatRegistry::with_builtin_formats(policy);
    for ext in settings.extra_exts.iter().chain(cli.extra_ext.iter()) {
        registry.add_extra(ext);
    }
    let registry = Arc::new(registry);

    let mut roms = match scan_roms(&cli.rom_dir, &registry) {
        Ok(roms) => roms,
        Err(e) => {
            eprintln!(
                "{} Error scanning {}: {}",
                "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                cli.rom_dir.display(),
                e,
            );
            process::exit(2);
        }
    };
    if let Some(limit) = cli.limit {
        roms.truncate(limit);
    }
    if roms.is_empty() {
        println!(
            "{}",
            "No ROM files found".if_supports_color(Stdout, |t| t.dimmed()),
        );
        return;
    }
    println!(
        "{} {} ROM file(s) in {}",
        "Found".if_supports_color(Stdout, |t| t.bold()),
        roms.len(),
        cli.rom_dir.display().if_supports_color(Stdout, |t| t.cyan()),
    );

    let hasher = Arc::new(Hasher::new(cli.hash_kind, registry, workers));

    let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();
    if let Some(ref db_path) = cli.hash_db {
        match HashDb::load(db_path, Arc::clone(&hasher)) {
            Ok(db) => sources.push(Arc::new(db)),
            Err(e) => {
                eprintln!(
                    "{} Could not load hash database {}: {}",
                    "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                    db_path.display(),
                    e,
                );
                process::exit(2);
            }
        }
    }
    if sources.is_empty() {
        eprintln!(
            "{} No metadata sources configured; pass --hash-db",
            "\u{2718}".if_supports_color(Stdout, |t| t.red()),
        );
        process::exit(2);
    }

    let output_mode = if cli.append {
        OutputMode::Append
    } else if cli.refresh {
        OutputMode::Refresh
    } else {
        OutputMode::Overwrite
    };
    let gamelist_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.rom_dir.join("gamelist.xml"));
    let media = cli.download_images.then(|| MediaSelection {
        dir: cli
            .media_dir
            .clone()
            .unwrap_or_else(|| cli.rom_dir.join("images")),
        image: Some(romhound_lib::ImgType::Boxart),
        thumb: Some(romhound_lib::ImgType::Boxart),
        video: None,
        force: false,
    });

    let options = PipelineOptions {
        workers,
        retries,
        output_mode,
        gamelist_path: gamelist_path.clone(),
        rom_dir: cli.rom_dir.clone(),
        media,
        media_workers: img_workers,
    };

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");

    let output = rt.block_on(async {
        let cancel = CancelToken::default();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nInterrupted, finishing in-flight work...");
                    cancel.cancel();
                }
            });
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("  {spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("/-\\|"),
        );
        pb.set_message(format!("Scraping {} ROM(s)...", roms.len()));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let output = run_pipeline(roms, sources, Some(hasher), options, cancel).await;
        pb.finish_and_clear();
        output
    });

    if let Err(e) = output.gamelist.write(&gamelist_path) {
        eprintln!(
            "{} Could not write {}: {}",
            "\u{2718}".if_supports_color(Stdout, |t| t.red()),
            gamelist_path.display(),
            e,
        );
        process::exit(2);
    }

    if let Some(ref missing_path) = cli.missing {
        if let Err(e) = write_missing_report(missing_path, &output.missing) {
            eprintln!(
                "{} Could not write {}: {}",
                "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
                missing_path.display(),
                e,
            );
        }
    }

    println!(
        "{} {} scraped, {} skipped, {} missing -> {}",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        output.scraped,
        output.skipped,
        output.missing.len(),
        gamelist_path.display().if_supports_color(Stdout, |t| t.cyan()),
    );

    if output.status == PipelineStatus::Cancelled {
        eprintln!(
            "{} Run was interrupted; output is partial",
            "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
        );
        process::exit(130);
    }
}
