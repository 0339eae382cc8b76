//! Container formats that wrap an inner ROM.
//!
//! The contract for all three: walk the entries in container-native
//! enumeration order and hand the *first* one with a registered decoder to
//! that decoder. Never sorted, never best-guess — callers rely on the
//! tie-break being stable across runs.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::process::Command;

use flate2::read::GzDecoder;

use crate::error::DecodeError;
use crate::registry::{normalize_ext, FormatRegistry, RomStream};

pub(crate) fn decode_zip(path: &Path, reg: &FormatRegistry) -> Result<RomStream, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::not_readable(path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("skipping zip entry {index} in {}: {e}", path.display());
                continue;
            }
        };
        let ext = entry_ext(entry.name());
        if !reg.has_decoder(&ext) {
            continue;
        }
        let declared = entry.size();
        let mut data = Vec::with_capacity(declared as usize);
        if let Err(e) = entry.read_to_end(&mut data) {
            log::debug!("skipping zip entry {}: {e}", entry.name());
            continue;
        }
        match reg.run_decoder(&ext, Box::new(Cursor::new(data)), declared) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!("skipping zip entry {index} in {}: {e}", path.display());
                continue;
            }
        }
    }
    Err(DecodeError::NoValidRomFound)
}

pub(crate) fn decode_gzip(path: &Path, reg: &FormatRegistry) -> Result<RomStream, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::not_readable(path, e))?;
    let mut gz = GzDecoder::new(file);

    // Decompress first; the member-name header field is only guaranteed to
    // be populated once decoding has begun.
    let mut data = Vec::new();
    gz.read_to_end(&mut data)?;

    let name = gz
        .header()
        .and_then(|h| h.filename())
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .unwrap_or_default();
    let ext = entry_ext(&name);
    if !reg.has_decoder(&ext) {
        return Err(DecodeError::NoValidRomFound);
    }
    let size = data.len() as u64;
    reg.run_decoder(&ext, Box::new(Cursor::new(data)), size)
}

pub(crate) fn decode_7z(path: &Path, reg: &FormatRegistry) -> Result<RomStream, DecodeError> {
    let listing = Command::new("7z")
        .args(["l", "-ba", "-slt"])
        .arg(path)
        .output()
        .map_err(|e| {
            DecodeError::invalid_format(format!("7z binary unavailable: {e}"))
        })?;
    if !listing.status.success() {
        return Err(DecodeError::invalid_format(format!(
            "7z failed to list {}",
            path.display()
        )));
    }

    let stdout = String::from_utf8_lossy(&listing.stdout);
    for line in stdout.lines() {
        let Some(name) = line.strip_prefix("Path = ") else {
            continue;
        };
        let ext = entry_ext(name);
        if !reg.has_decoder(&ext) {
            continue;
        }
        let extracted = Command::new("7z")
            .args(["e", "-so"])
            .arg(path)
            .arg(name)
            .output()
            .map_err(DecodeError::Io)?;
        if !extracted.status.success() {
            log::debug!("skipping 7z entry {name} in {}", path.display());
            continue;
        }
        let data = extracted.stdout;
        let size = data.len() as u64;
        match reg.run_decoder(&ext, Box::new(Cursor::new(data)), size) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!("skipping 7z entry {name}: {e}");
                continue;
            }
        }
    }
    Err(DecodeError::NoValidRomFound)
}

/// Normalized extension of a container entry name.
fn entry_ext(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(normalize_ext)
        .unwrap_or_default()
}
