//! ROM identification and metadata scraping.
//!
//! Everything but format decoding lives here: discovery, the shared content
//! hasher, identity sources, media download, the worker-pool pipeline, and
//! the gamelist/report outputs. Format decoding itself is `romhound-core`.

pub mod cancel;
pub mod error;
pub mod gamelist;
pub mod hashdb;
pub mod hasher;
pub mod limit;
pub mod media;
pub mod pipeline;
pub mod report;
pub mod rom;
pub mod settings;
pub mod source;

pub use cancel::CancelToken;
pub use error::{GamelistError, HashDbError, HashError, MediaError, SourceError};
pub use gamelist::{GameEntry, GameList};
pub use hashdb::HashDb;
pub use hasher::{HashKind, Hasher};
pub use limit::Limiter;
pub use media::{MediaDownloader, MediaPaths, MediaSelection};
pub use pipeline::{
    run_pipeline, OutputMode, PipelineOptions, PipelineOutput, PipelineStatus, RomState,
};
pub use report::{write_missing_report, MissingEntry};
pub use rom::{scan_roms, RomDescriptor};
pub use settings::{settings_path, Settings};
pub use source::{DataSource, Game, ImgType, MediaLink, VidType};
