//! Missing-ROM report.
//!
//! Whatever the pipeline could not identify lands here as a CSV, so a
//! partial run still tells the user exactly which files need attention.

use std::path::{Path, PathBuf};

use crate::error::HashDbError;

/// One unidentified ROM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingEntry {
    pub file: PathBuf,
    /// Why identification failed, or empty for a plain not-found
    pub error: String,
    /// Content hash, when it could be computed
    pub hash: String,
    /// Additional files belonging to this ROM (cue/gdi tracks)
    pub extra: Vec<PathBuf>,
}

/// Write `entries` to `path` with the `Game,Error,Hash,Extra` header.
/// Multi-file ROMs list their data files semicolon-separated in `Extra`.
pub fn write_missing_report(path: &Path, entries: &[MissingEntry]) -> Result<(), HashDbError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Game", "Error", "Hash", "Extra"])?;
    for entry in entries {
        let extra = entry
            .extra
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(";");
        writer.write_record([
            entry.file.display().to_string(),
            entry.error.clone(),
            entry.hash.clone(),
            extra,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn report_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        let entries = vec![
            MissingEntry {
                file: PathBuf::from("unknown.nes"),
                error: "not found in source".to_string(),
                hash: "deadbeef".to_string(),
                extra: Vec::new(),
            },
            MissingEntry {
                file: PathBuf::from("game.cue"),
                error: String::new(),
                hash: String::new(),
                extra: vec![PathBuf::from("t1.bin"), PathBuf::from("t2.bin")],
            },
        ];

        write_missing_report(&path, &entries).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "Game,Error,Hash,Extra");
        assert_eq!(lines[1], "unknown.nes,not found in source,deadbeef,");
        assert_eq!(lines[2], "game.cue,,,t1.bin;t2.bin");
    }

    #[test]
    fn empty_report_is_just_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        write_missing_report(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Game,Error,Hash,Extra\n");
    }
}
