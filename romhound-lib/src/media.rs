//! Media (image/video) downloading.
//!
//! One shared `reqwest::Client`, with concurrency gated by a [`Limiter`]
//! sized independently of the worker count. Downloads land in a temp file
//! first and get renamed into place, so an interrupted fetch never leaves a
//! truncated asset behind.

use std::path::{Path, PathBuf};

use reqwest::StatusCode;

use crate::error::MediaError;
use crate::limit::Limiter;
use crate::source::{Game, ImgType, MediaLink, VidType};

pub struct MediaDownloader {
    client: reqwest::Client,
    limit: Limiter,
}

/// Which assets to fetch for a game, and where to put them.
#[derive(Debug, Clone)]
pub struct MediaSelection {
    pub dir: PathBuf,
    pub image: Option<ImgType>,
    pub thumb: Option<ImgType>,
    pub video: Option<VidType>,
    /// Re-download even when the destination already exists
    pub force: bool,
}

/// Paths of the assets actually on disk after a download pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaPaths {
    pub image: Option<PathBuf>,
    pub thumb: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

impl MediaDownloader {
    pub fn new(limit: Limiter) -> Self {
        Self {
            client: reqwest::Client::new(),
            limit,
        }
    }

    /// Fetch `url` into `dest`. Skips the network entirely when `dest`
    /// already exists, unless `force` is set. HTTP 404 maps to
    /// [`MediaError::NotFound`] so callers can treat it as absence rather
    /// than failure.
    pub async fn download(&self, url: &str, dest: &Path, force: bool) -> Result<(), MediaError> {
        if !force && dest.exists() {
            log::debug!("media exists, skipping {}", dest.display());
            return Ok(());
        }
        let _permit = self.limit.acquire().await;

        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(MediaError::NotFound(url.to_string()));
        }
        let resp = resp.error_for_status()?;
        let body = resp.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = dest.with_extension("part");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, dest).await?;
        log::debug!("downloaded {} -> {}", url, dest.display());
        Ok(())
    }

    /// Download the selected assets for `game`, named by the ROM stem.
    /// Missing assets are skipped quietly; real failures propagate.
    pub async fn download_game_media(
        &self,
        game: &Game,
        stem: &str,
        selection: &MediaSelection,
    ) -> Result<MediaPaths, MediaError> {
        let mut paths = MediaPaths::default();

        if let Some(kind) = selection.image {
            if let Some(link) = game.images.get(&kind) {
                paths.image = self
                    .fetch_asset(link, &selection.dir, stem, "", selection.force)
                    .await?;
            }
        }
        if let Some(kind) = selection.thumb {
            if let Some(link) = game.thumbs.get(&kind) {
                paths.thumb = self
                    .fetch_asset(link, &selection.dir, stem, "-thumb", selection.force)
                    .await?;
            }
        }
        if let Some(kind) = selection.video {
            if let Some(link) = game.videos.get(&kind) {
                paths.video = self
                    .fetch_asset(link, &selection.dir, stem, "-video", selection.force)
                    .await?;
            }
        }
        Ok(paths)
    }

    async fn fetch_asset(
        &self,
        link: &MediaLink,
        dir: &Path,
        stem: &str,
        suffix: &str,
        force: bool,
    ) -> Result<Option<PathBuf>, MediaError> {
        let dest = dir.join(format!("{stem}{suffix}.{}", link.ext));
        match self.download(&link.url, &dest, force).await {
            Ok(()) => Ok(Some(dest)),
            Err(MediaError::NotFound(url)) => {
                log::warn!("media missing upstream: {url}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
