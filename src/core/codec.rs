// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Bit-exact wire primitives shared by the transaction, block, and chain
//! codecs.
//!
//! All integers are little-endian with the declared width. UUIDs travel in
//! the little-endian byte order of their fields (the same permutation the
//! signatures are stamped over). Strings are UTF-8 with an explicit
//! preceding length and no terminator.

use ring::digest;
use thiserror::Error;
use uuid::Uuid;

/// Codec errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before the declared field width.
    #[error("unexpected end of input")]
    Eof,
    /// Payload is not valid UTF-8.
    #[error("invalid utf-8 payload")]
    Utf8,
    /// Payload is not a JSON object.
    #[error("invalid json payload")]
    Json,
    /// A decoded field violates the data rules.
    #[error("invalid field: {0}")]
    Field(&'static str),
}

/// Sequential reader over a byte slice.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wrap a slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Eof);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a UUID from its 16-byte little-endian field permutation.
    pub fn read_uuid(&mut self) -> Result<Uuid, CodecError> {
        let b = self.take(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(b);
        Ok(Uuid::from_bytes_le(raw))
    }

    /// Read a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let b = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }
}

/// Append a little-endian u32.
pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Append a UUID in little-endian field order.
pub fn write_uuid(out: &mut Vec<u8>, id: &Uuid) {
    out.extend_from_slice(&id.to_bytes_le());
}

/// SHA-256 digest.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let d = digest::digest(&digest::SHA256, bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}
