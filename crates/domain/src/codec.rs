//! Versioned binary record encoding.
//!
//! Every record body is framed as `struct_v: u8, compat_v: u8, len: u32 LE`
//! followed by `len` bytes of fields. Strings are `u32 LE` length-prefixed
//! UTF-8, maps are a `u32 LE` entry count followed by key/value pairs and
//! integers are little-endian.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rolestore_core::{AppError, AppResult};

const FRAME_HEADER_LEN: usize = 6;

/// Append-only writer for versioned records.
#[derive(Debug, Default)]
pub struct RecordEncoder {
    buf: BytesMut,
}

impl RecordEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a little-endian `u64`.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Appends a length-prefixed string.
    pub fn put_str(&mut self, value: &str) -> AppResult<()> {
        self.put_len(value.len(), "string")?;
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Appends a counted sequence of string pairs.
    pub fn put_pairs<'a, I>(&mut self, pairs: I) -> AppResult<()>
    where
        I: ExactSizeIterator<Item = (&'a str, &'a str)>,
    {
        self.put_len(pairs.len(), "map")?;
        for (key, value) in pairs {
            self.put_str(key)?;
            self.put_str(value)?;
        }
        Ok(())
    }

    /// Appends a versioned frame whose body is written by `body`.
    pub fn put_versioned<F>(&mut self, struct_v: u8, compat_v: u8, body: F) -> AppResult<()>
    where
        F: FnOnce(&mut RecordEncoder) -> AppResult<()>,
    {
        let mut inner = RecordEncoder::new();
        body(&mut inner)?;

        self.buf.put_u8(struct_v);
        self.buf.put_u8(compat_v);
        self.put_len(inner.buf.len(), "record body")?;
        self.buf.put_slice(&inner.buf);
        Ok(())
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    fn put_len(&mut self, len: usize, what: &str) -> AppResult<()> {
        let len = u32::try_from(len).map_err(|_| {
            AppError::Validation(format!("{what} of {len} bytes exceeds the encodable size"))
        })?;
        self.buf.put_u32_le(len);
        Ok(())
    }
}

/// Bounds-checked reader for versioned records.
#[derive(Debug)]
pub struct RecordDecoder {
    buf: Bytes,
}

impl RecordDecoder {
    /// Creates a decoder over the given bytes.
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Reads a little-endian `u64`.
    pub fn get_u64(&mut self) -> AppResult<u64> {
        self.ensure(8, "u64")?;
        Ok(self.buf.get_u64_le())
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> AppResult<String> {
        let len = self.get_len("string")?;
        self.ensure(len, "string body")?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|error| AppError::Decode(format!("string is not valid UTF-8: {error}")))
    }

    /// Reads a counted sequence of string pairs, preserving order and duplicates.
    pub fn get_pairs(&mut self) -> AppResult<Vec<(String, String)>> {
        let count = self.get_len("map")?;
        // each pair needs at least two length prefixes
        if count > self.buf.remaining() / 8 {
            return Err(AppError::Decode(format!(
                "map declares {count} entries but only {} bytes remain",
                self.buf.remaining()
            )));
        }

        let mut pairs = Vec::with_capacity(count);
        for _ in 0..count {
            let key = self.get_string()?;
            let value = self.get_string()?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    /// Reads a string map. Duplicate keys are rejected.
    pub fn get_str_map(&mut self) -> AppResult<BTreeMap<String, String>> {
        let mut map = BTreeMap::new();
        for (key, value) in self.get_pairs()? {
            if map.contains_key(&key) {
                return Err(AppError::Decode(format!("duplicate map key '{key}'")));
            }
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Reads one versioned frame.
    ///
    /// `body` receives a decoder limited to the frame and the frame's
    /// `struct_v`; it must consume the whole frame.
    pub fn get_versioned<T, F>(&mut self, supported: u8, body: F) -> AppResult<T>
    where
        F: FnOnce(&mut RecordDecoder, u8) -> AppResult<T>,
    {
        self.ensure(FRAME_HEADER_LEN, "frame header")?;
        let struct_v = self.buf.get_u8();
        let compat_v = self.buf.get_u8();
        if struct_v == 0 || struct_v > supported || compat_v > struct_v {
            return Err(AppError::Decode(format!(
                "unsupported record version {struct_v} (compat {compat_v}), \
                 this build reads up to version {supported}"
            )));
        }

        let len = self.get_len("record body")?;
        self.ensure(len, "record body")?;
        let mut inner = RecordDecoder::new(self.buf.split_to(len));
        let value = body(&mut inner, struct_v)?;
        inner.finish()?;
        Ok(value)
    }

    /// Fails when unread bytes remain.
    pub fn finish(self) -> AppResult<()> {
        if self.buf.has_remaining() {
            return Err(AppError::Decode(format!(
                "{} unexpected trailing bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn get_len(&mut self, what: &str) -> AppResult<usize> {
        self.ensure(4, what)?;
        usize::try_from(self.buf.get_u32_le())
            .map_err(|error| AppError::Decode(format!("{what} length overflow: {error}")))
    }

    fn ensure(&self, needed: usize, what: &str) -> AppResult<()> {
        if self.buf.remaining() < needed {
            return Err(AppError::Decode(format!(
                "truncated record: {what} needs {needed} bytes, {} remain",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}
