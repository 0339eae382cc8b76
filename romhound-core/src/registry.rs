//! Extension-to-decoder registry.
//!
//! Maps a file extension to a function that reduces the raw byte stream to
//! the canonical bytes that should be hashed (headers stripped, interleaved
//! dumps normalized, containers unwrapped). Pure and stateless; the registry
//! is built once and shared read-only across workers.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::container;
use crate::error::DecodeError;
use crate::formats;

/// A readable stream of canonical ROM bytes.
pub type RomStream = Box<dyn Read + Send>;

/// A decode function: takes the raw stream and its declared length, returns
/// a reader over exactly the bytes that should be hashed.
pub type DecodeFn =
    Box<dyn Fn(RomStream, u64) -> Result<RomStream, DecodeError> + Send + Sync>;

/// Container extensions handled by entry-selection rather than a decoder.
const CONTAINER_EXTS: [&str; 3] = ["zip", "7z", "gz"];

/// What to do when a header-optional format fails its magic-number check.
///
/// The legacy behavior silently passed the raw bytes through; whether that
/// was intentional leniency was never resolved upstream, so it is an
/// explicit choice here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MagicPolicy {
    /// Pass the unmodified bytes through when the magic is absent.
    #[default]
    Lenient,
    /// Fail with `InvalidFormat` when the magic is absent.
    Strict,
}

/// Registry of per-extension decode functions.
pub struct FormatRegistry {
    decoders: HashMap<String, DecodeFn>,
    extra: HashSet<String>,
}

impl FormatRegistry {
    /// An empty registry with no formats. Useful for tests and embedders
    /// that register their own decoders.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
            extra: HashSet::new(),
        }
    }

    /// A registry with the standard cartridge formats installed.
    pub fn with_builtin_formats(policy: MagicPolicy) -> Self {
        let mut reg = Self::new();
        formats::register_builtins(&mut reg, policy);
        reg
    }

    /// Register a decode function for an extension (leading dot optional,
    /// matched case-insensitively).
    pub fn register(&mut self, ext: &str, decode: DecodeFn) {
        self.decoders.insert(normalize_ext(ext), decode);
    }

    /// Allow-list an extension that decodes as a no-op passthrough.
    pub fn add_extra(&mut self, ext: &str) {
        self.extra.insert(normalize_ext(ext));
    }

    pub fn remove_extra(&mut self, ext: &str) {
        self.extra.remove(&normalize_ext(ext));
    }

    pub fn clear_extra(&mut self) {
        self.extra.clear();
    }

    /// True if the extension is a registered format, an extra passthrough,
    /// or a container.
    pub fn is_known(&self, ext: &str) -> bool {
        let ext = normalize_ext(ext);
        CONTAINER_EXTS.contains(&ext.as_str()) || self.has_decoder(&ext)
    }

    /// True if a non-container decoder (registered or extra) exists.
    /// Expects a normalized extension.
    pub(crate) fn has_decoder(&self, ext: &str) -> bool {
        self.decoders.contains_key(ext) || self.extra.contains(ext)
    }

    /// Run the decoder for a normalized extension over a raw stream.
    pub(crate) fn run_decoder(
        &self,
        ext: &str,
        stream: RomStream,
        declared_size: u64,
    ) -> Result<RomStream, DecodeError> {
        if let Some(decode) = self.decoders.get(ext) {
            decode(stream, declared_size)
        } else if self.extra.contains(ext) {
            Ok(stream)
        } else {
            Err(DecodeError::UnknownExtension(ext.to_string()))
        }
    }

    /// Decode the file at `path` into its canonical byte stream.
    ///
    /// Containers are unwrapped by picking the first entry, in
    /// container-native enumeration order, whose extension has a decoder.
    pub fn decode(&self, path: &Path) -> Result<RomStream, DecodeError> {
        let ext = path_ext(path);
        match ext.as_str() {
            "zip" => container::decode_zip(path, self),
            "gz" => container::decode_gzip(path, self),
            "7z" => container::decode_7z(path, self),
            _ => {
                let file =
                    File::open(path).map_err(|e| DecodeError::not_readable(path, e))?;
                let size = file.metadata().map(|m| m.len()).unwrap_or(0);
                self.run_decoder(&ext, Box::new(file), size)
            }
        }
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtin_formats(MagicPolicy::default())
    }
}

/// Lowercase, no leading dot.
pub fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

/// The normalized extension of a path ("" when absent).
pub fn path_ext(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_ext)
        .unwrap_or_default()
}
