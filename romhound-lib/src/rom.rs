//! ROM discovery.
//!
//! Walks a ROM directory, keeps files the format registry knows about, and
//! groups multi-file disc formats: a `.cue` or `.gdi` playlist claims the
//! data files it references, so those don't show up as standalone entries.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use romhound_core::{path_ext, FormatRegistry};

/// A candidate ROM discovered on disk. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomDescriptor {
    /// Absolute (or walk-rooted) path to the file
    pub path: PathBuf,
    /// Parent directory
    pub dir: PathBuf,
    /// File name without extension
    pub base_name: String,
    /// Normalized extension
    pub ext: String,
    /// Data files referenced by a cue/gdi playlist
    pub bins: Vec<PathBuf>,
    /// True when this descriptor spans multiple files
    pub multi_file: bool,
}

impl RomDescriptor {
    /// Build a descriptor for a file. For `.cue`/`.gdi` playlists the
    /// referenced data files are resolved relative to the parent directory.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let base_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let ext = path_ext(path);

        let bins = match ext.as_str() {
            "cue" => parse_cue(path)?
                .into_iter()
                .map(|name| dir.join(name))
                .collect(),
            "gdi" => parse_gdi(path)?
                .into_iter()
                .map(|name| dir.join(name))
                .collect(),
            _ => Vec::new(),
        };
        let multi_file = !bins.is_empty();

        Ok(Self {
            path: path.to_path_buf(),
            dir,
            base_name,
            ext,
            bins,
            multi_file,
        })
    }

    /// File name including extension.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.base_name)
            .to_string()
    }

    /// All files making up this ROM (the playlist plus any claimed bins).
    pub fn all_files(&self) -> Vec<&Path> {
        let mut files = vec![self.path.as_path()];
        files.extend(self.bins.iter().map(PathBuf::as_path));
        files
    }
}

/// Extract quoted file names from `FILE "name" BINARY` lines.
fn parse_cue(path: &Path) -> io::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    let mut files = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if !line.to_ascii_uppercase().starts_with("FILE") {
            continue;
        }
        let mut parts = line.splitn(3, '"');
        let _ = parts.next();
        if let Some(name) = parts.next() {
            if !name.is_empty() {
                files.push(name.to_string());
            }
        }
    }
    Ok(files)
}

/// Extract track file names from a GDI: after the track-count line, the
/// fifth column of each track row names the data file.
fn parse_gdi(path: &Path) -> io::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    let mut files = Vec::new();
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 5 {
            let name = fields[4].trim_matches('"');
            if !name.is_empty() {
                files.push(name.to_string());
            }
        }
    }
    Ok(files)
}

/// Walk `dir` recursively and return descriptors for every ROM candidate,
/// in sorted path order. Hidden files and directories are skipped; data
/// files claimed by a cue/gdi playlist are suppressed as standalone entries.
pub fn scan_roms(dir: &Path, registry: &FormatRegistry) -> io::Result<Vec<RomDescriptor>> {
    let mut files = Vec::new();
    walk(dir, &mut files)?;

    // First pass: playlists claim their data files.
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut playlists = Vec::new();
    for file in &files {
        let ext = path_ext(file);
        if ext == "cue" || ext == "gdi" {
            match RomDescriptor::from_path(file) {
                Ok(desc) => {
                    claimed.extend(desc.bins.iter().cloned());
                    playlists.push(desc);
                }
                Err(e) => log::warn!("skipping {}: {e}", file.display()),
            }
        }
    }

    let mut playlists = playlists.into_iter();
    let mut next_playlist = playlists.next();

    let mut roms = Vec::new();
    for file in &files {
        let ext = path_ext(file);
        if ext == "cue" || ext == "gdi" {
            // Playlists were pre-built in walk order; re-use them here.
            if let Some(desc) = next_playlist.take() {
                roms.push(desc);
                next_playlist = playlists.next();
            }
            continue;
        }
        if !registry.is_known(&ext) || claimed.contains(file) {
            continue;
        }
        match RomDescriptor::from_path(file) {
            Ok(desc) => roms.push(desc),
            Err(e) => log::warn!("skipping {}: {e}", file.display()),
        }
    }
    Ok(roms)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            if let Err(e) = walk(&path, out) {
                log::warn!("cannot read {}: {e}", path.display());
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}
