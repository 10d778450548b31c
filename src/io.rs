//! Line-oriented file access for dictionary-style inputs.
//!
//! Small files go through a buffered reader; files at or above a size
//! threshold are memory-mapped and scanned for `\n` boundaries. Both paths
//! strip the newline (and a trailing `\r`) from each returned line.
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use memmap2::Mmap;

use crate::background::CancelToken;

/// Threshold in bytes above which we attempt to use mmap for reading.
/// Callers can override via API; this is a reasonable default.
pub const DEFAULT_MMAP_THRESHOLD_BYTES: u64 = 16 * 1024 * 1024; // 16 MiB

pub type LineIter = Box<dyn Iterator<Item = io::Result<String>> + Send + 'static>;

/// Decide whether to use mmap based on file size and threshold.
pub fn should_use_mmap(file_size_bytes: u64, threshold_bytes: u64) -> bool {
    file_size_bytes >= threshold_bytes
}

/// Iterate lines from a file path using buffered reader (non-mmap).
pub fn iter_lines_bufread<P: AsRef<Path>>(path: P) -> Result<LineIter> {
    let file = File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    let reader = BufReader::new(file);
    Ok(Box::new(BufLines { reader, buf: Vec::new() }))
}

/// Buffered line reader that decodes lossily, like the mmap path.
struct BufLines {
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl Iterator for BufLines {
    type Item = io::Result<String>;
    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                let line = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
                Some(line_from_bytes(line))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Iterate lines from a file path using mmap. This avoids copying but still
/// allocates per-returned String; it scans for '\n' boundaries.
pub fn iter_lines_mmap<P: AsRef<Path>>(path: P) -> Result<LineIter> {
    let file = File::open(&path).with_context(|| format!("open {}", path.as_ref().display()))?;
    let mmap =
        unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.as_ref().display()))?;
    let iter = MmapLines { mmap, pos: 0 };
    Ok(Box::new(iter))
}

struct MmapLines {
    mmap: Mmap,
    pos: usize,
}

impl Iterator for MmapLines {
    type Item = io::Result<String>;
    fn next(&mut self) -> Option<Self::Item> {
        let data: &[u8] = &self.mmap;
        if self.pos >= data.len() {
            return None;
        }
        let start = self.pos;
        if let Some(off) = memchr::memchr(b'\n', &data[self.pos..]) {
            let end = self.pos + off;
            self.pos = end + 1;
            Some(line_from_bytes(&data[start..end]))
        } else {
            // Last line without trailing newline
            self.pos = data.len();
            Some(line_from_bytes(&data[start..]))
        }
    }
}

fn line_from_bytes(bytes: &[u8]) -> io::Result<String> {
    // Trim a trailing '\r' if present (handle Windows CRLF)
    let slice = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match std::str::from_utf8(slice) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Ok(String::from_utf8_lossy(slice).to_string()),
    }
}

/// Choose mmap or bufread and return an iterator over lines.
pub fn iter_lines_auto<P: AsRef<Path>>(path: P, threshold_bytes: u64) -> Result<LineIter> {
    let meta =
        std::fs::metadata(&path).with_context(|| format!("stat {}", path.as_ref().display()))?;
    if meta.is_file() && should_use_mmap(meta.len(), threshold_bytes) {
        iter_lines_mmap(path)
    } else {
        iter_lines_bufread(path)
    }
}

/// Count the lines `iter_lines_auto` would yield for `path`, checking
/// `cancel` once per line. Returns `Ok(None)` when cancelled.
///
/// A final segment without a trailing newline counts as a line; an empty
/// file has zero lines.
pub fn count_lines<P: AsRef<Path>>(
    path: P,
    threshold_bytes: u64,
    cancel: &CancelToken,
) -> Result<Option<u64>> {
    let path = path.as_ref();
    let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if meta.is_file() && should_use_mmap(meta.len(), threshold_bytes) {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", path.display()))?;
        let data: &[u8] = &mmap;
        let mut lines = 0u64;
        for _ in memchr::memchr_iter(b'\n', data) {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            lines += 1;
        }
        if !data.is_empty() && !data.ends_with(b"\n") {
            lines += 1;
        }
        Ok(Some(lines))
    } else {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut lines = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .with_context(|| format!("read {}", path.display()))?;
            if n == 0 {
                break;
            }
            lines += 1;
        }
        Ok(Some(lines))
    }
}
