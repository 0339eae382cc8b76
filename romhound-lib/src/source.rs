//! Game metadata model and the source trait every provider implements.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::rom::RomDescriptor;

/// Image categories a source may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImgType {
    Boxart,
    Screenshot,
    Fanart,
    Banner,
    Logo,
    Marquee,
}

/// Video categories a source may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VidType {
    Standard,
}

/// A downloadable media asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLink {
    pub url: String,
    /// File extension to save under, no leading dot
    pub ext: String,
}

impl MediaLink {
    pub fn new(url: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ext: ext.into(),
        }
    }
}

/// Metadata for one identified game, as returned by a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Game {
    pub id: String,
    /// Name of the source that produced this record
    pub source: String,
    pub title: String,
    pub overview: String,
    pub developer: String,
    pub publisher: String,
    pub genre: String,
    /// ISO-ish date string, source-dependent precision
    pub release_date: String,
    pub players: Option<u32>,
    /// 0.0 to 1.0
    pub rating: Option<f32>,
    pub images: HashMap<ImgType, MediaLink>,
    pub thumbs: HashMap<ImgType, MediaLink>,
    pub videos: HashMap<VidType, MediaLink>,
    pub clone_of: Option<String>,
}

impl Game {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            ..Self::default()
        }
    }
}

/// A provider of game metadata. Sources are swept in priority order by the
/// pipeline; `NotFound` falls through to the next source, `Transient`
/// triggers a retry of the whole sweep.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Stable identifier, recorded as provenance on returned games.
    fn name(&self) -> &str;

    /// Display name for the ROM itself, independent of whether this source
    /// wins the metadata. Cheap and local; `None` when unknown.
    fn pretty_name(&self, rom: &RomDescriptor) -> Option<String>;

    /// Look up metadata for a ROM.
    async fn get_game(&self, rom: &RomDescriptor) -> Result<Game, SourceError>;
}
