//! Local hash-database source.
//!
//! A CSV file maps content hashes to game identity: each row is
//! `hash,id,system,name` with no header. Lookups go through the shared
//! [`Hasher`], so the digest is computed at most once per file across the
//! whole run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HashDbError, SourceError};
use crate::hasher::Hasher;
use crate::rom::RomDescriptor;
use crate::source::{DataSource, Game};

#[derive(Debug, Clone, PartialEq, Eq)]
struct HashRecord {
    id: String,
    system: String,
    name: String,
}

/// Metadata source backed by an on-disk hash database.
pub struct HashDb {
    records: HashMap<String, HashRecord>,
    hasher: Arc<Hasher>,
}

impl HashDb {
    /// Load the database from `path`. Hash keys are stored lowercase.
    pub fn load(path: &Path, hasher: Arc<Hasher>) -> Result<Self, HashDbError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut records = HashMap::new();
        for row in reader.records() {
            let row = row?;
            if row.len() < 4 {
                return Err(HashDbError::MissingColumn("name"));
            }
            records.insert(
                row[0].to_ascii_lowercase(),
                HashRecord {
                    id: row[1].to_string(),
                    system: row[2].to_string(),
                    name: row[3].to_string(),
                },
            );
        }
        log::info!("loaded {} hash database entries", records.len());
        Ok(Self { records, hasher })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn lookup_digest(&self, digest: &str) -> Result<&HashRecord, SourceError> {
        self.records.get(digest).ok_or(SourceError::NotFound)
    }
}

#[async_trait]
impl DataSource for HashDb {
    fn name(&self) -> &str {
        "hashdb"
    }

    /// Answers only from the hasher's cache. `pretty_name` runs on the
    /// async workers, so it must never hash a file itself; by the time it is
    /// consulted, `get_game` has already hashed the ROM.
    fn pretty_name(&self, rom: &RomDescriptor) -> Option<String> {
        let digest = self.hasher.cached_digest(&rom.path)?;
        let record = self.lookup_digest(&digest).ok()?;
        if record.name.is_empty() {
            None
        } else {
            Some(record.name.clone())
        }
    }

    async fn get_game(&self, rom: &RomDescriptor) -> Result<Game, SourceError> {
        // Hashing reads whole files; keep it off the async worker thread.
        let hasher = Arc::clone(&self.hasher);
        let path = rom.path.clone();
        let digest = tokio::task::spawn_blocking(move || hasher.hash(&path))
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))??;
        let record = self.lookup_digest(&digest)?;
        let mut game = Game::new(record.id.clone(), self.name());
        game.title = record.name.clone();
        game.genre = record.system.clone();
        Ok(game)
    }
}
