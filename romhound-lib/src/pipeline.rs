//! Scraping pipeline: a bounded work queue feeding a pool of workers, with
//! a single aggregator task owning the output gamelist.
//!
//! Workers sweep the configured sources in priority order for each ROM.
//! `NotFound` falls through to the next source; a transient error is
//! remembered but later sources still get their shot. Only when a whole
//! sweep produced no game and at least one transient error does the sweep
//! retry, up to the configured budget.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::error::SourceError;
use crate::gamelist::{GameEntry, GameList};
use crate::hasher::Hasher;
use crate::limit::Limiter;
use crate::media::{MediaDownloader, MediaPaths, MediaSelection};
use crate::report::MissingEntry;
use crate::rom::RomDescriptor;
use crate::source::{DataSource, Game};

/// How results merge into an existing gamelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Start from an empty list
    #[default]
    Overwrite,
    /// Keep the existing list; skip ROMs already present
    Append,
    /// Re-scrape everything, carrying over frontend-owned user fields
    Refresh,
}

/// Lifecycle of one ROM through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomState {
    Pending,
    /// Sweep number, starting at 0
    Attempting(u32),
    Succeeded,
    /// Transient errors exhausted the retry budget
    Failed,
    /// Every source affirmatively said "not mine"; never retried
    NotFoundTerminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub workers: usize,
    /// Extra sweeps allowed after a transient failure
    pub retries: u32,
    pub output_mode: OutputMode,
    pub gamelist_path: PathBuf,
    pub rom_dir: PathBuf,
    /// When set, workers download media for identified games
    pub media: Option<MediaSelection>,
    /// Media download concurrency; 0 means "same as workers"
    pub media_workers: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            retries: 2,
            output_mode: OutputMode::Overwrite,
            gamelist_path: PathBuf::from("gamelist.xml"),
            rom_dir: PathBuf::from("."),
            media: None,
            media_workers: 0,
        }
    }
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub status: PipelineStatus,
    pub gamelist: GameList,
    pub missing: Vec<MissingEntry>,
    /// ROMs identified this run
    pub scraped: usize,
    /// ROMs skipped because the gamelist already had them (append mode)
    pub skipped: usize,
}

enum WorkerResult {
    Scraped(GameEntry),
    Missing(MissingEntry),
}

enum SweepOutcome {
    Found(Game),
    NotFound,
    Transient(String),
    Cancelled,
}

/// Run the full pipeline over `roms`. The returned gamelist is not written
/// to disk; the caller decides what to do with partial output after a
/// cancellation.
pub async fn run_pipeline(
    roms: Vec<RomDescriptor>,
    sources: Vec<Arc<dyn DataSource>>,
    hasher: Option<Arc<Hasher>>,
    options: PipelineOptions,
    cancel: CancelToken,
) -> PipelineOutput {
    let workers = options.workers.max(1);
    let sources: Arc<[Arc<dyn DataSource>]> = sources.into();

    let mut gamelist = match options.output_mode {
        OutputMode::Overwrite => GameList::default(),
        OutputMode::Append | OutputMode::Refresh => GameList::load(&options.gamelist_path)
            .unwrap_or_else(|e| {
                log::warn!("could not load {}: {e}", options.gamelist_path.display());
                GameList::default()
            }),
    };
    if options.output_mode == OutputMode::Refresh {
        gamelist.filter_to_existing(&options.rom_dir);
    }

    // Append mode: filter out ROMs the list already covers before they hit
    // the queue.
    let mut skipped = 0usize;
    let roms: Vec<RomDescriptor> = if options.output_mode == OutputMode::Append {
        let present: HashSet<String> = gamelist.entries.iter().map(|e| e.path.clone()).collect();
        roms.into_iter()
            .filter(|rom| {
                let keep = !present.contains(&entry_path(rom, &options.rom_dir));
                if !keep {
                    skipped += 1;
                    log::debug!("already in gamelist, skipping {}", rom.file_name());
                }
                keep
            })
            .collect()
    } else {
        roms
    };

    let downloader = options.media.as_ref().map(|_| {
        let capacity = if options.media_workers == 0 {
            workers
        } else {
            options.media_workers
        };
        Arc::new(MediaDownloader::new(Limiter::new(capacity)))
    });

    let (rom_tx, rom_rx) = async_channel::bounded::<RomDescriptor>(2 * workers);
    let (result_tx, mut result_rx) = mpsc::channel::<WorkerResult>(workers);

    let producer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for rom in roms {
                tokio::select! {
                    biased;
                    _ = cancel.wait() => break,
                    res = rom_tx.send(rom) => {
                        if res.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    };

    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rom_rx = rom_rx.clone();
        let result_tx = result_tx.clone();
        let sources = Arc::clone(&sources);
        let hasher = hasher.clone();
        let downloader = downloader.clone();
        let media = options.media.clone();
        let cancel = cancel.clone();
        let retries = options.retries;
        let rom_dir = options.rom_dir.clone();
        worker_handles.push(tokio::spawn(async move {
            while let Ok(rom) = rom_rx.recv().await {
                let result = tokio::select! {
                    biased;
                    _ = cancel.wait() => break,
                    result = process_rom(
                        &rom,
                        &rom_dir,
                        &sources,
                        retries,
                        hasher.as_ref(),
                        downloader.as_deref(),
                        media.as_ref(),
                    ) => result,
                };
                let Some(result) = result else {
                    break;
                };
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);
    drop(rom_rx);

    // Sole mutator of the output collection.
    let mode = options.output_mode;
    let aggregator = tokio::spawn(async move {
        let mut scraped = 0usize;
        let mut agg_skipped = 0usize;
        let mut missing = Vec::new();
        while let Some(result) = result_rx.recv().await {
            match result {
                WorkerResult::Scraped(entry) => {
                    if mode == OutputMode::Append && gamelist.contains_path(&entry.path) {
                        agg_skipped += 1;
                    } else {
                        gamelist.upsert(entry);
                        scraped += 1;
                    }
                }
                WorkerResult::Missing(entry) => {
                    log::warn!(
                        "could not identify {}: {}",
                        entry.file.display(),
                        entry.error
                    );
                    missing.push(entry);
                }
            }
        }
        (gamelist, missing, scraped, agg_skipped)
    });

    let _ = producer.await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    let (gamelist, missing, scraped, agg_skipped) = match aggregator.await {
        Ok(out) => out,
        Err(e) => {
            // A panicking aggregator loses the run; surface it.
            log::error!("aggregator task failed: {e}");
            (GameList::default(), Vec::new(), 0, 0)
        }
    };

    let status = if cancel.is_cancelled() {
        PipelineStatus::Cancelled
    } else {
        PipelineStatus::Completed
    };
    PipelineOutput {
        status,
        gamelist,
        missing,
        scraped,
        skipped: skipped + agg_skipped,
    }
}

/// Gamelist identity for a ROM: its path relative to the scanned ROM
/// directory. Keeping the subdirectory components means two ROMs with the
/// same file name in different folders stay distinct entries.
fn entry_path(rom: &RomDescriptor, rom_dir: &Path) -> String {
    let rel = rom.path.strip_prefix(rom_dir).unwrap_or(&rom.path);
    format!("./{}", rel.display())
}

/// One sweep over all sources in priority order.
async fn sweep(rom: &RomDescriptor, sources: &[Arc<dyn DataSource>]) -> SweepOutcome {
    let mut transient: Option<String> = None;
    for source in sources {
        match source.get_game(rom).await {
            Ok(game) => return SweepOutcome::Found(game),
            Err(SourceError::NotFound) => {
                log::debug!("{}: not in {}", rom.file_name(), source.name());
            }
            Err(SourceError::Transient(msg)) => {
                log::debug!("{}: transient from {}: {msg}", rom.file_name(), source.name());
                transient = Some(msg);
            }
            Err(SourceError::Cancelled) => return SweepOutcome::Cancelled,
        }
    }
    match transient {
        Some(msg) => SweepOutcome::Transient(msg),
        None => SweepOutcome::NotFound,
    }
}

/// Identify one ROM, retrying whole sweeps on transient failure. Returns
/// `None` when cancelled mid-flight; the ROM is simply discarded.
async fn process_rom(
    rom: &RomDescriptor,
    rom_dir: &Path,
    sources: &[Arc<dyn DataSource>],
    retries: u32,
    hasher: Option<&Arc<Hasher>>,
    downloader: Option<&MediaDownloader>,
    media: Option<&MediaSelection>,
) -> Option<WorkerResult> {
    let mut state;
    let mut last_error = String::new();
    let mut game = None;

    let mut attempt = 0u32;
    loop {
        state = RomState::Attempting(attempt);
        log::info!("{}: {:?}", rom.file_name(), state);
        match sweep(rom, sources).await {
            SweepOutcome::Found(g) => {
                game = Some(g);
                state = RomState::Succeeded;
            }
            SweepOutcome::NotFound => {
                last_error = "not found in any source".to_string();
                state = RomState::NotFoundTerminal;
            }
            SweepOutcome::Transient(msg) => {
                if attempt < retries {
                    log::info!("{}: retrying after: {msg}", rom.file_name());
                    attempt += 1;
                    continue;
                }
                last_error = msg;
                state = RomState::Failed;
            }
            SweepOutcome::Cancelled => return None,
        }
        break;
    }

    match state {
        RomState::Succeeded => {
            let mut game = game?;
            // Provenance: the no-intro display name can come from any
            // source, not just the metadata winner.
            if let Some(pretty) = sources.iter().find_map(|s| s.pretty_name(rom)) {
                game.title = pretty;
            }
            let media_paths = match (downloader, media) {
                (Some(dl), Some(selection)) => {
                    match dl
                        .download_game_media(&game, &rom.base_name, selection)
                        .await
                    {
                        Ok(paths) => paths,
                        Err(e) => {
                            log::warn!("{}: media download failed: {e}", rom.file_name());
                            MediaPaths::default()
                        }
                    }
                }
                _ => MediaPaths::default(),
            };
            log::info!("{}: identified as \"{}\"", rom.file_name(), game.title);
            Some(WorkerResult::Scraped(entry_from_game(
                rom,
                rom_dir,
                game,
                media_paths,
            )))
        }
        RomState::Failed | RomState::NotFoundTerminal => {
            let hash = match hasher {
                Some(h) => {
                    let h = Arc::clone(h);
                    let path = rom.path.clone();
                    tokio::task::spawn_blocking(move || h.hash(&path))
                        .await
                        .ok()
                        .and_then(Result::ok)
                        .unwrap_or_default()
                }
                None => String::new(),
            };
            Some(WorkerResult::Missing(MissingEntry {
                file: rom.path.clone(),
                error: last_error,
                hash,
                extra: rom.bins.clone(),
            }))
        }
        RomState::Pending | RomState::Attempting(_) => None,
    }
}

fn entry_from_game(
    rom: &RomDescriptor,
    rom_dir: &Path,
    game: Game,
    media: MediaPaths,
) -> GameEntry {
    let path_str = |p: Option<PathBuf>| {
        p.map(|p| p.display().to_string()).unwrap_or_default()
    };
    GameEntry {
        path: entry_path(rom, rom_dir),
        name: game.title,
        desc: game.overview,
        image: path_str(media.image),
        thumbnail: path_str(media.thumb),
        marquee: String::new(),
        video: path_str(media.video),
        rating: game.rating,
        release_date: game.release_date,
        developer: game.developer,
        publisher: game.publisher,
        genre: game.genre,
        players: game.players,
        favorite: false,
        last_played: String::new(),
        play_count: None,
        source: game.source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use romhound_core::{FormatRegistry, MagicPolicy};

    use crate::hashdb::HashDb;
    use crate::hasher::HashKind;

    /// Replays a scripted sequence of responses; the last one repeats.
    struct ScriptedSource {
        name: &'static str,
        responses: Mutex<VecDeque<Result<Game, SourceError>>>,
        calls: AtomicUsize,
        pretty: Option<String>,
    }

    impl ScriptedSource {
        fn new(
            name: &'static str,
            responses: Vec<Result<Game, SourceError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                pretty: None,
            })
        }

        fn with_pretty(
            name: &'static str,
            responses: Vec<Result<Game, SourceError>>,
            pretty: &str,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                pretty: Some(pretty.to_string()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn pretty_name(&self, _rom: &RomDescriptor) -> Option<String> {
            self.pretty.clone()
        }

        async fn get_game(&self, _rom: &RomDescriptor) -> Result<Game, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap_or(Err(SourceError::NotFound))
            }
        }
    }

    fn found(title: &str, source: &str) -> Result<Game, SourceError> {
        let mut game = Game::new("1", source);
        game.title = title.to_string();
        Ok(game)
    }

    fn rom_fixture(dir: &std::path::Path, name: &str) -> RomDescriptor {
        let path = dir.join(name);
        fs::write(&path, b"data").unwrap();
        RomDescriptor::from_path(&path).unwrap()
    }

    fn options(dir: &std::path::Path) -> PipelineOptions {
        PipelineOptions {
            workers: 2,
            retries: 2,
            gamelist_path: dir.join("gamelist.xml"),
            rom_dir: dir.to_path_buf(),
            ..PipelineOptions::default()
        }
    }

    #[tokio::test]
    async fn transient_falls_through_within_a_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let rom = rom_fixture(dir.path(), "game.nes");

        let s1 = ScriptedSource::new("s1", vec![Err(SourceError::NotFound)]);
        let s2 = ScriptedSource::new(
            "s2",
            vec![Err(SourceError::Transient("503".to_string()))],
        );
        let s3 = ScriptedSource::new("s3", vec![found("Winner", "s3")]);
        let sources: Vec<Arc<dyn DataSource>> =
            vec![s1.clone(), s2.clone(), s3.clone()];

        let out = run_pipeline(
            vec![rom],
            sources,
            None,
            options(dir.path()),
            CancelToken::default(),
        )
        .await;

        assert_eq!(out.status, PipelineStatus::Completed);
        assert_eq!(out.scraped, 1);
        assert_eq!(out.gamelist.entries[0].name, "Winner");
        assert_eq!(out.gamelist.entries[0].source, "s3");
        // a later source succeeded, so the sweep never retried
        assert_eq!(s1.calls(), 1);
        assert_eq!(s2.calls(), 1);
        assert_eq!(s3.calls(), 1);
    }

    #[tokio::test]
    async fn all_not_found_is_terminal_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let rom = rom_fixture(dir.path(), "game.nes");

        let s1 = ScriptedSource::new("s1", vec![Err(SourceError::NotFound)]);
        let s2 = ScriptedSource::new("s2", vec![Err(SourceError::NotFound)]);
        let sources: Vec<Arc<dyn DataSource>> = vec![s1.clone(), s2.clone()];

        let out = run_pipeline(
            vec![rom],
            sources,
            None,
            options(dir.path()),
            CancelToken::default(),
        )
        .await;

        assert_eq!(out.scraped, 0);
        assert_eq!(out.missing.len(), 1);
        assert_eq!(s1.calls(), 1);
        assert_eq!(s2.calls(), 1);
    }

    #[tokio::test]
    async fn transient_retries_until_budget_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let rom = rom_fixture(dir.path(), "game.nes");

        let flaky = ScriptedSource::new(
            "flaky",
            vec![Err(SourceError::Transient("timeout".to_string()))],
        );
        let sources: Vec<Arc<dyn DataSource>> = vec![flaky.clone()];

        let out = run_pipeline(
            vec![rom],
            sources,
            None,
            options(dir.path()),
            CancelToken::default(),
        )
        .await;

        assert_eq!(out.missing.len(), 1);
        assert_eq!(out.missing[0].error, "timeout");
        // initial sweep plus two retries
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn transient_then_success_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let rom = rom_fixture(dir.path(), "game.nes");

        let flaky = ScriptedSource::new(
            "flaky",
            vec![
                Err(SourceError::Transient("hiccup".to_string())),
                found("Recovered", "flaky"),
            ],
        );
        let sources: Vec<Arc<dyn DataSource>> = vec![flaky.clone()];

        let out = run_pipeline(
            vec![rom],
            sources,
            None,
            options(dir.path()),
            CancelToken::default(),
        )
        .await;

        assert_eq!(out.scraped, 1);
        assert_eq!(out.gamelist.entries[0].name, "Recovered");
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn pretty_name_wins_over_metadata_title() {
        let dir = tempfile::tempdir().unwrap();
        let rom = rom_fixture(dir.path(), "game.nes");

        let namer = ScriptedSource::with_pretty(
            "namer",
            vec![Err(SourceError::NotFound)],
            "Proper Name (USA)",
        );
        let meta = ScriptedSource::new("meta", vec![found("scraped title", "meta")]);
        let sources: Vec<Arc<dyn DataSource>> = vec![namer, meta];

        let out = run_pipeline(
            vec![rom],
            sources,
            None,
            options(dir.path()),
            CancelToken::default(),
        )
        .await;

        let entry = &out.gamelist.entries[0];
        assert_eq!(entry.name, "Proper Name (USA)");
        assert_eq!(entry.source, "meta");
    }

    #[tokio::test]
    async fn append_skips_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let rom_old = rom_fixture(dir.path(), "old.nes");
        let rom_new = rom_fixture(dir.path(), "new.nes");

        let mut existing = GameList::default();
        existing.entries.push(GameEntry {
            path: "./old.nes".to_string(),
            name: "Old Game".to_string(),
            ..GameEntry::default()
        });
        let gamelist_path = dir.path().join("gamelist.xml");
        existing.write(&gamelist_path).unwrap();

        let source = ScriptedSource::new("s", vec![found("New Game", "s")]);
        let sources: Vec<Arc<dyn DataSource>> = vec![source.clone()];

        let mut opts = options(dir.path());
        opts.output_mode = OutputMode::Append;
        let out = run_pipeline(
            vec![rom_old, rom_new],
            sources,
            None,
            opts,
            CancelToken::default(),
        )
        .await;

        assert_eq!(out.skipped, 1);
        assert_eq!(out.scraped, 1);
        assert_eq!(out.gamelist.entries.len(), 2);
        assert!(out.gamelist.contains_path("./old.nes"));
        assert!(out.gamelist.contains_path("./new.nes"));
        // the skipped ROM never reached the source
        assert_eq!(source.calls(), 1);
        assert_eq!(
            out.gamelist
                .entries
                .iter()
                .find(|e| e.path == "./old.nes")
                .map(|e| e.name.as_str()),
            Some("Old Game")
        );
    }

    #[tokio::test]
    async fn refresh_preserves_user_fields() {
        let dir = tempfile::tempdir().unwrap();
        let rom = rom_fixture(dir.path(), "game.nes");

        let mut existing = GameList::default();
        existing.entries.push(GameEntry {
            path: "./game.nes".to_string(),
            name: "Stale Name".to_string(),
            favorite: true,
            play_count: Some(9),
            last_played: "20250601T000000".to_string(),
            ..GameEntry::default()
        });
        let gamelist_path = dir.path().join("gamelist.xml");
        existing.write(&gamelist_path).unwrap();

        let source = ScriptedSource::new("s", vec![found("Fresh Name", "s")]);
        let sources: Vec<Arc<dyn DataSource>> = vec![source];

        let mut opts = options(dir.path());
        opts.output_mode = OutputMode::Refresh;
        let out = run_pipeline(vec![rom], sources, None, opts, CancelToken::default()).await;

        assert_eq!(out.gamelist.entries.len(), 1);
        let entry = &out.gamelist.entries[0];
        assert_eq!(entry.name, "Fresh Name");
        assert!(entry.favorite);
        assert_eq!(entry.play_count, Some(9));
        assert_eq!(entry.last_played, "20250601T000000");
    }

    #[tokio::test]
    async fn cancellation_reports_cancelled_status() {
        let dir = tempfile::tempdir().unwrap();
        let roms: Vec<RomDescriptor> = (0..20)
            .map(|i| rom_fixture(dir.path(), &format!("game{i}.nes")))
            .collect();

        // A source that never answers keeps workers in flight until cancel.
        struct Stuck;
        #[async_trait]
        impl DataSource for Stuck {
            fn name(&self) -> &str {
                "stuck"
            }
            fn pretty_name(&self, _rom: &RomDescriptor) -> Option<String> {
                None
            }
            async fn get_game(&self, _rom: &RomDescriptor) -> Result<Game, SourceError> {
                std::future::pending().await
            }
        }

        let cancel = CancelToken::default();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let sources: Vec<Arc<dyn DataSource>> = vec![Arc::new(Stuck)];
        let out = run_pipeline(roms, sources, None, options(dir.path()), cancel).await;
        canceller.await.unwrap();

        assert_eq!(out.status, PipelineStatus::Cancelled);
        assert_eq!(out.scraped, 0);
        // nothing half-processed leaked into the list
        assert!(out.gamelist.entries.is_empty());
    }

    #[tokio::test]
    async fn end_to_end_with_hash_database() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = dir.path().join("mario.bin");
        fs::write(&rom_path, vec![0u8; 100]).unwrap();

        let registry = Arc::new(FormatRegistry::with_builtin_formats(MagicPolicy::Lenient));
        let hasher = Arc::new(Hasher::new(HashKind::Sha1, registry, 2));
        let digest = hasher.hash(&rom_path).unwrap();

        let db_path = dir.path().join("hash.csv");
        fs::write(&db_path, format!("{digest},7,3,Super Mario\n")).unwrap();
        let db = Arc::new(HashDb::load(&db_path, Arc::clone(&hasher)).unwrap());

        let rom = RomDescriptor::from_path(&rom_path).unwrap();
        let sources: Vec<Arc<dyn DataSource>> = vec![db];

        let out = run_pipeline(
            vec![rom],
            sources,
            Some(hasher),
            options(dir.path()),
            CancelToken::default(),
        )
        .await;

        assert_eq!(out.status, PipelineStatus::Completed);
        assert_eq!(out.scraped, 1);
        assert!(out.missing.is_empty());
        let entry = &out.gamelist.entries[0];
        assert_eq!(entry.path, "./mario.bin");
        assert_eq!(entry.name, "Super Mario");
        assert_eq!(entry.source, "hashdb");
    }

    #[tokio::test]
    async fn same_file_name_in_different_folders_stays_distinct() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        let rom_a = rom_fixture(&dir.path().join("a"), "game.nes");
        let rom_b = rom_fixture(&dir.path().join("b"), "game.nes");

        let source = ScriptedSource::new(
            "s",
            vec![found("First", "s"), found("Second", "s")],
        );
        let sources: Vec<Arc<dyn DataSource>> = vec![source];

        let mut opts = options(dir.path());
        opts.workers = 1;
        let out = run_pipeline(
            vec![rom_a, rom_b],
            sources,
            None,
            opts,
            CancelToken::default(),
        )
        .await;

        assert_eq!(out.scraped, 2);
        assert_eq!(out.gamelist.entries.len(), 2);
        assert!(out.gamelist.contains_path("./a/game.nes"));
        assert!(out.gamelist.contains_path("./b/game.nes"));
    }

    #[tokio::test]
    async fn refresh_keeps_entries_in_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("snes")).unwrap();
        let rom = rom_fixture(&dir.path().join("snes"), "game.sfc");

        let mut existing = GameList::default();
        existing.entries.push(GameEntry {
            path: "./snes/game.sfc".to_string(),
            name: "Stale Name".to_string(),
            favorite: true,
            ..GameEntry::default()
        });
        let gamelist_path = dir.path().join("gamelist.xml");
        existing.write(&gamelist_path).unwrap();

        let source = ScriptedSource::new("s", vec![found("Fresh Name", "s")]);
        let sources: Vec<Arc<dyn DataSource>> = vec![source];

        let mut opts = options(dir.path());
        opts.output_mode = OutputMode::Refresh;
        let out = run_pipeline(vec![rom], sources, None, opts, CancelToken::default()).await;

        // the ROM still exists on disk, so refresh must not drop it
        assert_eq!(out.gamelist.entries.len(), 1);
        let entry = &out.gamelist.entries[0];
        assert_eq!(entry.path, "./snes/game.sfc");
        assert_eq!(entry.name, "Fresh Name");
        assert!(entry.favorite);
    }

    #[tokio::test]
    async fn game_fields_propagate_to_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let rom = rom_fixture(dir.path(), "game.nes");

        let mut game = Game::new("42", "s");
        game.title = "Full Metadata".to_string();
        game.overview = "A platformer.".to_string();
        game.developer = "DevCo".to_string();
        game.publisher = "PubCo".to_string();
        game.genre = "Platform".to_string();
        game.release_date = "19901121T000000".to_string();
        game.players = Some(2);
        game.rating = Some(0.85);

        let source = ScriptedSource::new("s", vec![Ok(game)]);
        let sources: Vec<Arc<dyn DataSource>> = vec![source];

        let out = run_pipeline(
            vec![rom],
            sources,
            None,
            options(dir.path()),
            CancelToken::default(),
        )
        .await;

        let entry = &out.gamelist.entries[0];
        assert_eq!(entry.name, "Full Metadata");
        assert_eq!(entry.desc, "A platformer.");
        assert_eq!(entry.developer, "DevCo");
        assert_eq!(entry.publisher, "PubCo");
        assert_eq!(entry.genre, "Platform");
        assert_eq!(entry.release_date, "19901121T000000");
        assert_eq!(entry.players, Some(2));
        assert_eq!(entry.rating, Some(0.85));
    }

    #[tokio::test]
    async fn missing_entry_carries_the_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = dir.path().join("unknown.bin");
        fs::write(&rom_path, b"abc").unwrap();
        let rom = RomDescriptor::from_path(&rom_path).unwrap();

        let registry = Arc::new(FormatRegistry::with_builtin_formats(MagicPolicy::Lenient));
        let hasher = Arc::new(Hasher::new(HashKind::Sha1, registry, 2));

        let source = ScriptedSource::new("s", vec![Err(SourceError::NotFound)]);
        let sources: Vec<Arc<dyn DataSource>> = vec![source];

        let out = run_pipeline(
            vec![rom],
            sources,
            Some(hasher),
            options(dir.path()),
            CancelToken::default(),
        )
        .await;

        assert_eq!(out.missing.len(), 1);
        assert_eq!(
            out.missing[0].hash,
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }
}
