//! Built-in cartridge format decoders.
//!
//! Each decoder consumes header/copier artifacts from the raw stream and
//! returns a reader over the canonical bytes. Formats with interleaved or
//! byte-swapped dumps are normalized to a single canonical ordering so the
//! same cartridge always hashes to the same digest regardless of dump tool.

use std::io::{self, Cursor, Read};

use crate::error::DecodeError;
use crate::registry::{FormatRegistry, MagicPolicy, RomStream};

/// Block size used by interleaved Mega Drive dumps.
const MD_BLOCK: usize = 16384;

/// Extensions that need no transformation at all.
const PASSTHROUGH_EXTS: [&str; 26] = [
    "bin", "a26", "a52", "rom", "cue", "gdi", "gb", "gba", "gbc", "32x", "gg", "pce", "sms",
    "col", "ngp", "ngc", "sg", "int", "vb", "vec", "gam", "j64", "jag", "mgw", "nds", "fds",
];

pub(crate) fn register_builtins(reg: &mut FormatRegistry, policy: MagicPolicy) {
    for ext in PASSTHROUGH_EXTS {
        reg.register(ext, Box::new(passthrough));
    }
    for ext in ["lnx", "lyx"] {
        reg.register(ext, Box::new(move |s, n| decode_lnx(s, n, policy)));
    }
    reg.register("a78", Box::new(move |s, n| decode_a78(s, n, policy)));
    reg.register("nes", Box::new(decode_nes));
    for ext in ["smc", "sfc", "fig", "swc"] {
        reg.register(ext, Box::new(decode_snes));
    }
    reg.register("smd", Box::new(|s, n| decode_md(s, n, MdVariant::Smd)));
    reg.register("mgd", Box::new(|s, n| decode_md(s, n, MdVariant::Mgd)));
    for ext in ["gen", "md"] {
        reg.register(ext, Box::new(|s, n| decode_md(s, n, MdVariant::Gen)));
    }
    for ext in ["n64", "v64", "z64"] {
        reg.register(ext, Box::new(|s, n| decode_n64(s, n)));
    }
}

fn passthrough(stream: RomStream, _size: u64) -> Result<RomStream, DecodeError> {
    Ok(stream)
}

/// Read up to `n` bytes, stopping early only at EOF.
fn read_up_to(reader: &mut dyn Read, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Header-optional format helper: strip `header_len` bytes when `matches`
/// says the magic is present, otherwise apply the configured policy.
fn strip_optional_header(
    mut stream: RomStream,
    header_len: usize,
    matches: impl Fn(&[u8]) -> bool,
    policy: MagicPolicy,
    what: &str,
) -> Result<RomStream, DecodeError> {
    let header = read_up_to(&mut stream, header_len)?;
    if header.len() == header_len && matches(&header) {
        return Ok(stream);
    }
    match policy {
        MagicPolicy::Lenient => Ok(Box::new(Cursor::new(header).chain(stream))),
        MagicPolicy::Strict => Err(DecodeError::invalid_format(format!(
            "missing {what} header magic"
        ))),
    }
}

/// Atari Lynx: optional 64-byte header starting with `LYNX`.
fn decode_lnx(stream: RomStream, size: u64, policy: MagicPolicy) -> Result<RomStream, DecodeError> {
    if size < 4 {
        return Err(DecodeError::invalid_format("Lynx image too small"));
    }
    strip_optional_header(stream, 64, |h| h.starts_with(b"LYNX"), policy, "LYNX")
}

/// Atari 7800: optional 128-byte header with `ATARI7800` at offset 1.
fn decode_a78(stream: RomStream, _size: u64, policy: MagicPolicy) -> Result<RomStream, DecodeError> {
    strip_optional_header(
        stream,
        128,
        |h| &h[1..10] == b"ATARI7800",
        policy,
        "ATARI7800",
    )
}

/// iNES: 16-byte header, optional 512-byte trainer; canonical bytes are the
/// PRG and CHR banks, exactly as sized by the header (NES 2.0 aware).
fn decode_nes(mut stream: RomStream, _size: u64) -> Result<RomStream, DecodeError> {
    let header = read_up_to(&mut stream, 16)?;
    if header.len() < 16 {
        return Err(DecodeError::invalid_format("truncated iNES header"));
    }
    let mut prg_banks = header[4] as u64;
    let mut chr_banks = header[5] as u64;
    if header[7] & 0x0C == 0x08 {
        // NES 2.0: byte 9 carries the high bits of both bank counts.
        let hi = header[9] as u64;
        chr_banks += (hi & 0x0F) << 8;
        prg_banks += (hi & 0xF0) << 4;
    }
    let data_len = prg_banks * 16 * 1024 + chr_banks * 8 * 1024;

    if header[6] & 0x04 == 0x04 {
        let trainer = read_up_to(&mut stream, 512)?;
        if trainer.len() < 512 {
            return Err(DecodeError::invalid_format("truncated iNES trainer"));
        }
    }
    Ok(Box::new(stream.take(data_len)))
}

/// SNES: strip a 512-byte copier header when the size betrays one.
fn decode_snes(mut stream: RomStream, size: u64) -> Result<RomStream, DecodeError> {
    if size % 1024 == 512 {
        let skipped = read_up_to(&mut stream, 512)?;
        if skipped.len() < 512 {
            return Err(DecodeError::invalid_format("truncated SNES copier header"));
        }
    }
    Ok(stream)
}

/// Which default transform a Mega Drive extension implies when the image
/// carries no recognizable in-band marker.
#[derive(Debug, Clone, Copy)]
enum MdVariant {
    /// Per-16K-block interleaved (Super Magic Drive dumps)
    Smd,
    /// Whole-image interleaved (Multi Game Doctor dumps)
    Mgd,
    /// Plain binary
    Gen,
}

fn region_eq(data: &[u8], offset: usize, pat: &[u8]) -> bool {
    data.len() >= offset + pat.len() && &data[offset..offset + pat.len()] == pat
}

/// Mega Drive family: strip the copier header, then pick the de-interleave
/// strategy from in-band markers, falling back to the extension default.
fn decode_md(mut stream: RomStream, size: u64, variant: MdVariant) -> Result<RomStream, DecodeError> {
    let mut size = size;
    if size % MD_BLOCK as u64 == 512 {
        let skipped = read_up_to(&mut stream, 512)?;
        if skipped.len() < 512 {
            return Err(DecodeError::invalid_format("truncated copier header"));
        }
        size -= 512;
    }
    if size % MD_BLOCK as u64 != 0 {
        return Err(DecodeError::invalid_format("invalid Mega Drive image size"));
    }

    let mut data = Vec::with_capacity(size as usize);
    stream.read_to_end(&mut data)?;

    if region_eq(&data, 256, b"SEGA") {
        return Ok(Box::new(Cursor::new(data)));
    }
    if region_eq(&data, 8320, b"SG EEI  ") || region_eq(&data, 8320, b"SG EADIE") {
        deinterleave_blocks(&mut data);
        return Ok(Box::new(Cursor::new(data)));
    }
    if region_eq(&data, 128, b"EAGNSS ") || region_eq(&data, 128, b"EAMG RV") {
        let data = deinterleave(&data);
        return Ok(Box::new(Cursor::new(data)));
    }

    match variant {
        MdVariant::Smd => {
            deinterleave_blocks(&mut data);
            Ok(Box::new(Cursor::new(data)))
        }
        MdVariant::Mgd => {
            if data.len() % 2 != 0 {
                return Err(DecodeError::invalid_format("odd-length MGD image"));
            }
            let data = deinterleave(&data);
            Ok(Box::new(Cursor::new(data)))
        }
        MdVariant::Gen => Ok(Box::new(Cursor::new(data))),
    }
}

fn deinterleave_blocks(data: &mut [u8]) {
    let mut start = 0;
    while start + MD_BLOCK <= data.len() {
        let block = deinterleave(&data[start..start + MD_BLOCK]);
        data[start..start + MD_BLOCK].copy_from_slice(&block);
        start += MD_BLOCK;
    }
}

/// Undo the two-plane interleaving used by SMD-style dumps: the second half
/// of the block holds the even bytes, the first half the odd bytes.
///
/// `block` must have even length.
pub fn deinterleave(block: &[u8]) -> Vec<u8> {
    debug_assert!(block.len() % 2 == 0, "deinterleave needs an even-length block");
    let len = block.len();
    let mid = len / 2;
    let mut out = vec![0u8; len];
    for (i, &x) in block.iter().enumerate() {
        if i < mid {
            out[i * 2 + 1] = x;
        } else {
            out[i * 2 - len] = x;
        }
    }
    out
}

/// Exact inverse of [`deinterleave`]: re-split a linear block into its two
/// interleaved byte planes.
pub fn interleave(block: &[u8]) -> Vec<u8> {
    debug_assert!(block.len() % 2 == 0, "interleave needs an even-length block");
    let len = block.len();
    let mid = len / 2;
    let mut out = vec![0u8; len];
    for i in 0..mid {
        out[i] = block[i * 2 + 1];
        out[mid + i] = block[i * 2];
    }
    out
}

/// Byte ordering of an N64 dump, sniffed from the first word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum N64Order {
    /// Already in canonical order
    AsIs,
    /// 16-bit swapped within each 4-byte word
    PairSwapped,
    /// Halfword-swapped 32-bit words
    WordSwapped,
}

impl N64Order {
    fn apply(self, buf: &mut [u8]) {
        match self {
            N64Order::AsIs => {}
            N64Order::PairSwapped => {
                for group in buf.chunks_exact_mut(4) {
                    group.swap(0, 1);
                    group.swap(2, 3);
                }
            }
            N64Order::WordSwapped => {
                for group in buf.chunks_exact_mut(4) {
                    group.swap(0, 2);
                    group.swap(1, 3);
                }
            }
        }
    }
}

/// N64: sniff the byte order from the boot word and normalize while
/// streaming. Incomplete trailing groups pass through untouched.
fn decode_n64(mut stream: RomStream, size: u64) -> Result<RomStream, DecodeError> {
    if size < 4 {
        return Err(DecodeError::invalid_format("N64 image too small"));
    }
    let head = read_up_to(&mut stream, 4)?;
    if head.len() < 4 {
        return Err(DecodeError::invalid_format("N64 image too small"));
    }
    let order = if head[0] == 0x80 {
        N64Order::PairSwapped
    } else if head[3] == 0x80 {
        N64Order::WordSwapped
    } else {
        N64Order::AsIs
    };
    let chained: RomStream = Box::new(Cursor::new(head).chain(stream));
    Ok(Box::new(SwapReader::new(chained, order)))
}

/// Reads the inner stream in full buffers and applies the byte-order swap
/// to complete 4-byte groups. Only the final refill can be short, so a
/// partial group can only occur at EOF (and is left as-is).
struct SwapReader {
    inner: RomStream,
    order: N64Order,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl SwapReader {
    fn new(inner: RomStream, order: N64Order) -> Self {
        Self {
            inner,
            order,
            buf: vec![0u8; 64 * 1024],
            pos: 0,
            len: 0,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.order.apply(&mut self.buf[..filled]);
        self.pos = 0;
        self.len = filled;
        Ok(())
    }
}

impl Read for SwapReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.len {
            self.refill()?;
            if self.len == 0 {
                return Ok(0);
            }
        }
        let n = out.len().min(self.len - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
