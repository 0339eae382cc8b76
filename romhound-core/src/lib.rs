//! Pure, stateless ROM-format logic for romhound.
//!
//! This crate answers one question: given a file, what are the *canonical*
//! bytes that identify the ROM inside it? The [`FormatRegistry`] maps file
//! extensions to decode functions that strip copier headers, normalize
//! interleaved or byte-swapped dumps, and unwrap container formats. It has
//! no opinions on caching or concurrency; that lives in `romhound-lib`.

mod container;
pub mod error;
mod formats;
pub mod registry;

pub use error::DecodeError;
pub use formats::{deinterleave, interleave};
pub use registry::{normalize_ext, path_ext, DecodeFn, FormatRegistry, MagicPolicy, RomStream};
