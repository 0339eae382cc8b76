//! Concurrent content hasher.
//!
//! Decodes a ROM through the [`FormatRegistry`], streams the canonical bytes
//! through a rolling digest, and caches the result, successful or not, in an
//! LRU keyed by path. An in-flight lock per path guarantees at most one
//! computation for a given file no matter how many workers ask at once.

use std::collections::HashMap;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crc32fast::Hasher as Crc32;
use lru::LruCache;
use md5::Context as Md5Context;
use romhound_core::FormatRegistry;
use sha1::{Digest, Sha1};

use crate::error::HashError;

const CHUNK_SIZE: usize = 1024 * 1024;
const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Digest algorithm for ROM identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashKind {
    #[default]
    Sha1,
    Md5,
    Crc32,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Sha1 => "sha1",
            HashKind::Md5 => "md5",
            HashKind::Crc32 => "crc32",
        }
    }
}

impl std::str::FromStr for HashKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(HashKind::Sha1),
            "md5" => Ok(HashKind::Md5),
            "crc32" | "crc" => Ok(HashKind::Crc32),
            other => Err(format!("unknown hash kind: {other}")),
        }
    }
}

enum RollingDigest {
    Sha1(Sha1),
    Md5(Md5Context),
    Crc32(Crc32),
}

impl RollingDigest {
    fn new(kind: HashKind) -> Self {
        match kind {
            HashKind::Sha1 => RollingDigest::Sha1(Sha1::new()),
            HashKind::Md5 => RollingDigest::Md5(Md5Context::new()),
            HashKind::Crc32 => RollingDigest::Crc32(Crc32::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            RollingDigest::Sha1(h) => h.update(data),
            RollingDigest::Md5(c) => c.consume(data),
            RollingDigest::Crc32(h) => h.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            RollingDigest::Sha1(h) => hex(&h.finalize()),
            RollingDigest::Md5(c) => hex(&c.compute().0),
            RollingDigest::Crc32(h) => format!("{:08x}", h.finalize()),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Poisoning only happens when a holder panicked; the protected state is
/// still usable, so recover the guard instead of propagating the panic.
fn lock_mutex<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fixed pool of chunk buffers. Acquisition blocks when every buffer is
/// checked out, bounding hashing memory at `capacity` x 1 MiB.
struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    available: Condvar,
}

impl BufferPool {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let buffers = (0..capacity).map(|_| vec![0u8; CHUNK_SIZE]).collect();
        Self {
            buffers: Mutex::new(buffers),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) -> BufferGuard<'_> {
        let mut buffers = lock_mutex(&self.buffers);
        loop {
            if let Some(buf) = buffers.pop() {
                return BufferGuard { pool: self, buf: Some(buf) };
            }
            buffers = self
                .available
                .wait(buffers)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

struct BufferGuard<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl BufferGuard<'_> {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(buf) => buf.as_mut_slice(),
            // buf is only None after drop
            None => &mut [],
        }
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            lock_mutex(&self.pool.buffers).push(buf);
            self.pool.available.notify_one();
        }
    }
}

/// Shared, thread-safe hasher. Cheap to share behind an `Arc`; all methods
/// take `&self`.
pub struct Hasher {
    kind: HashKind,
    registry: Arc<FormatRegistry>,
    cache: Mutex<LruCache<PathBuf, Result<String, HashError>>>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    pool: BufferPool,
}

impl Hasher {
    pub fn new(kind: HashKind, registry: Arc<FormatRegistry>, threads: usize) -> Self {
        Self::with_cache_capacity(kind, registry, threads, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(
        kind: HashKind,
        registry: Arc<FormatRegistry>,
        threads: usize,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            kind,
            registry,
            cache: Mutex::new(LruCache::new(capacity)),
            locks: Mutex::new(HashMap::new()),
            pool: BufferPool::new(threads),
        }
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    /// Hash the canonical content of `path`. Concurrent calls for the same
    /// path compute once; everyone gets the same cached outcome, including
    /// errors.
    pub fn hash(&self, path: &Path) -> Result<String, HashError> {
        loop {
            if let Some(cached) = lock_mutex(&self.cache).get(path) {
                return cached.clone();
            }

            let mut locks = lock_mutex(&self.locks);
            if let Some(slot) = locks.get(path) {
                let slot = Arc::clone(slot);
                drop(locks);
                // Block until the in-flight computation finishes, then
                // restart from the cache check.
                drop(lock_mutex(&slot));
                continue;
            }

            // We own the computation. Lock the slot before publishing it so
            // waiters block until we are done.
            let slot = Arc::new(Mutex::new(()));
            let _guard = lock_mutex(&slot);
            locks.insert(path.to_path_buf(), Arc::clone(&slot));
            drop(locks);

            let result = self.compute(path);
            lock_mutex(&self.cache).put(path.to_path_buf(), result.clone());
            lock_mutex(&self.locks).remove(path);
            return result;
        }
    }

    /// Already-computed digest for `path`, if one is cached. Never hashes;
    /// cached errors report as `None`.
    pub fn cached_digest(&self, path: &Path) -> Option<String> {
        match lock_mutex(&self.cache).get(path) {
            Some(Ok(digest)) => Some(digest.clone()),
            _ => None,
        }
    }

    fn compute(&self, path: &Path) -> Result<String, HashError> {
        log::debug!("hashing {}", path.display());
        let mut stream = self.registry.decode(path)?;
        let mut digest = RollingDigest::new(self.kind);
        let mut buf = self.pool.acquire();
        loop {
            let n = stream
                .read(buf.as_mut_slice())
                .map_err(|e| HashError::Io(e.to_string()))?;
            if n == 0 {
                break;
            }
            digest.update(&buf.as_mut_slice()[..n]);
        }
        Ok(digest.finish())
    }
}
