// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Byte and text sources for parameter and weight streams.
//!
//! A [`DataReader`] exposes exactly two operations so that loading code is
//! independent of where the bytes come from:
//!
//! - `scan` — the next whitespace-delimited text token (parameter files).
//! - `read` — raw bytes (weight files).
//!
//! Both advance a single cursor monotonically. There is no seek or rewind.

use crate::ModelError;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;

/// A sequential byte/text origin.
pub trait DataReader {
    /// Scans the next whitespace-delimited token into `word`.
    ///
    /// Returns `true` on success and `false` at end of data (or if the
    /// token is not valid UTF-8). `word` is cleared in every case.
    fn scan(&mut self, word: &mut String) -> bool;

    /// Reads up to `buf.len()` bytes and returns how many were read.
    ///
    /// A short count means the origin is exhausted (or failed, which is
    /// logged). Reading at end of data returns 0.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl<T: DataReader + ?Sized> DataReader for &mut T {
    fn scan(&mut self, word: &mut String) -> bool {
        (**self).scan(word)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }
}

impl<T: DataReader + ?Sized> DataReader for Box<T> {
    fn scan(&mut self, word: &mut String) -> bool {
        (**self).scan(word)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }
}

/// Scans the next token and parses it as `T`.
///
/// Returns `None` at end of data or if the token does not parse.
pub fn scan_parsed<T: FromStr, R: DataReader + ?Sized>(reader: &mut R) -> Option<T> {
    let mut word = String::new();
    if !reader.scan(&mut word) {
        return None;
    }
    word.parse().ok()
}

/// Fills `buf` completely. Returns `false` if the origin ran out first.
pub fn read_exact<R: DataReader + ?Sized>(reader: &mut R, buf: &mut [u8]) -> bool {
    reader.read(buf) == buf.len()
}

// ── Stream origin ──────────────────────────────────────────────

/// A [`DataReader`] over any buffered stream, typically a file.
#[derive(Debug)]
pub struct StreamReader<R: BufRead> {
    inner: R,
}

impl<R: BufRead> StreamReader<R> {
    /// Wraps an already-buffered stream.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl StreamReader<BufReader<File>> {
    /// Opens a file for buffered streaming.
    pub fn open(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|e| ModelError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> DataReader for StreamReader<R> {
    fn scan(&mut self, word: &mut String) -> bool {
        scan_buffered(&mut self.inner, word)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        read_fully(&mut self.inner, buf)
    }
}

// ── Memory origin ──────────────────────────────────────────────

/// A [`DataReader`] over an in-memory buffer.
///
/// `B` can be an owned `Vec<u8>`, a borrowed `&[u8]`, or a memory map
/// (see [`MemoryReader::map_file`]).
#[derive(Debug)]
pub struct MemoryReader<B: AsRef<[u8]>> {
    cursor: Cursor<B>,
}

impl<B: AsRef<[u8]>> MemoryReader<B> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: B) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Number of bytes left to consume.
    pub fn remaining(&self) -> usize {
        self.cursor
            .get_ref()
            .as_ref()
            .len()
            .saturating_sub(self.position())
    }
}

impl MemoryReader<memmap2::Mmap> {
    /// Memory-maps a file and reads it as an in-memory buffer.
    pub fn map_file(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|e| ModelError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        // SAFETY: the mapping is read-only; the file is not expected to be
        // truncated by another process while the model is loading.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| ModelError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        tracing::debug!(
            "data reader: mapped {} ({} bytes)",
            path.display(),
            mmap.len()
        );
        Ok(Self::new(mmap))
    }
}

impl<B: AsRef<[u8]>> DataReader for MemoryReader<B> {
    fn scan(&mut self, word: &mut String) -> bool {
        scan_buffered(&mut self.cursor, word)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        read_fully(&mut self.cursor, buf)
    }
}

// ── Shared helpers ─────────────────────────────────────────────

/// Reads the next whitespace-delimited token from a buffered source.
fn scan_buffered<R: BufRead>(reader: &mut R, word: &mut String) -> bool {
    word.clear();
    match next_token(reader) {
        Ok(Some(bytes)) => match String::from_utf8(bytes) {
            Ok(token) => {
                *word = token;
                true
            }
            Err(_) => {
                tracing::warn!("data reader: token is not valid UTF-8");
                false
            }
        },
        Ok(None) => false,
        Err(e) => {
            tracing::warn!("data reader: scan failed: {e}");
            false
        }
    }
}

fn next_token<R: BufRead>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    // Skip leading whitespace.
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        let all_whitespace = skip == buf.len();
        reader.consume(skip);
        if !all_whitespace {
            break;
        }
    }

    let mut token = Vec::new();
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let take = buf.iter().take_while(|b| !b.is_ascii_whitespace()).count();
        token.extend_from_slice(&buf[..take]);
        let hit_delimiter = take < buf.len();
        reader.consume(take);
        if hit_delimiter {
            break;
        }
    }
    Ok(Some(token))
}

/// Reads until `buf` is full or the source is exhausted.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("data reader: read failed after {filled} bytes: {e}");
                break;
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn test_memory_scan_tokens() {
        let mut reader = MemoryReader::new("  7767517\n3 4\tInput  data=1 ".as_bytes());
        let mut word = String::new();
        let mut tokens = Vec::new();
        while reader.scan(&mut word) {
            tokens.push(word.clone());
        }
        assert_eq!(tokens, vec!["7767517", "3", "4", "Input", "data=1"]);
        assert!(word.is_empty());
    }

    #[test]
    fn test_scan_parsed() {
        let mut reader = MemoryReader::new(b"42 abc".to_vec());
        assert_eq!(scan_parsed::<i32, _>(&mut reader), Some(42));
        assert_eq!(scan_parsed::<i32, _>(&mut reader), None);
        assert_eq!(scan_parsed::<i32, _>(&mut reader), None);
    }

    #[test]
    fn test_memory_read_then_eof() {
        let mut reader = MemoryReader::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.read(&mut buf), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(reader.read(&mut buf), 0);
    }

    #[test]
    fn test_read_exact_short() {
        let mut reader = MemoryReader::new(vec![0u8; 3]);
        let mut buf = [0u8; 4];
        assert!(!read_exact(&mut reader, &mut buf));
    }

    #[test]
    fn test_mixed_scan_and_read() {
        let mut data = b"2 ".to_vec();
        data.extend_from_slice(&[0xAA, 0xBB]);
        let mut reader = MemoryReader::new(data);
        assert_eq!(scan_parsed::<usize, _>(&mut reader), Some(2));
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf), 2);
        assert_eq!(buf, [0xAA, 0xBB]);
    }

    #[test]
    fn test_stream_reader_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Bias bias0 0=3").unwrap();
        file.flush().unwrap();

        let mut reader = StreamReader::open(file.path()).unwrap();
        let mut word = String::new();
        assert!(reader.scan(&mut word));
        assert_eq!(word, "Bias");
        assert!(reader.scan(&mut word));
        assert_eq!(word, "bias0");
        assert!(reader.scan(&mut word));
        assert_eq!(word, "0=3");
        assert!(!reader.scan(&mut word));
    }

    #[test]
    fn test_stream_reader_missing_file() {
        let result = StreamReader::open(Path::new("/nonexistent/model.param"));
        assert!(matches!(result, Err(ModelError::ReadError { .. })));
    }

    #[test]
    fn test_mapped_file_reader() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[9u8, 8, 7, 6]).unwrap();
        file.flush().unwrap();

        let mut reader = MemoryReader::map_file(file.path()).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf), 4);
        assert_eq!(&buf[..4], &[9, 8, 7, 6]);
        assert_eq!(reader.read(&mut buf), 0);
    }

    #[test]
    fn test_dyn_reader_through_box() {
        let mut reader: Box<dyn DataReader> = Box::new(MemoryReader::new(b"x y".to_vec()));
        let mut word = String::new();
        assert!(reader.scan(&mut word));
        assert_eq!(word, "x");
    }

    proptest! {
        #[test]
        fn prop_memory_round_trip(
            data in proptest::collection::vec(any::<u8>(), 0..512),
            chunk in 1usize..64,
        ) {
            let mut reader = MemoryReader::new(data.clone());
            let mut out = Vec::new();
            let mut total = 0;
            let mut buf = vec![0u8; chunk];
            loop {
                let n = reader.read(&mut buf);
                if n == 0 {
                    break;
                }
                total += n;
                out.extend_from_slice(&buf[..n]);
            }
            prop_assert_eq!(total, data.len());
            prop_assert_eq!(out, data);
            prop_assert_eq!(reader.read(&mut buf), 0);
        }
    }
}
