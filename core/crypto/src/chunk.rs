//! Chunked streaming encryption with random-access decode.
//!
//! A plaintext stream is split into fixed-size chunks, each sealed
//! independently through the AEAD wrapper, and the sealed chunks are
//! concatenated in stream order with no framing between them:
//!
//! ```text
//! nonce ‖ ciphertext(≤CHUNK_SIZE) ‖ tag │ nonce ‖ ciphertext ‖ tag │ ...
//! ```
//!
//! Every chunk except the last holds exactly `CHUNK_SIZE` plaintext bytes,
//! so the chunk containing any logical offset sits at a computable physical
//! offset. Decoding from an arbitrary position touches exactly one chunk
//! plus the chunks after it, never the whole file. This is what lets a
//! server answer HTTP range requests over encrypted storage cheaply.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::aead::{decrypt, encrypt, NONCE_SIZE, TAG_SIZE};
use crate::keys::MasterKey;
use cipherbox_common::Result;

/// Plaintext bytes per chunk (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Per-chunk overhead: nonce plus tag.
pub const CHUNK_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// On-disk size of a full encrypted chunk.
pub const ENCRYPTED_CHUNK_SIZE: usize = CHUNK_SIZE + CHUNK_OVERHEAD;

/// Compute the plaintext length of an encrypted file from its on-disk size.
///
/// Lets a caller answer content-length and range queries without touching
/// the file contents. `physical` sizes that are not a valid concatenation of
/// chunks clamp to zero rather than underflow.
pub fn physical_to_logical_size(physical: u64) -> u64 {
    physical_to_logical_size_with(CHUNK_SIZE, physical)
}

/// [`physical_to_logical_size`] for a non-default chunk size.
pub fn physical_to_logical_size_with(chunk_size: usize, physical: u64) -> u64 {
    let encrypted_chunk = (chunk_size + CHUNK_OVERHEAD) as u64;
    let chunks = physical.div_ceil(encrypted_chunk);
    physical.saturating_sub(chunks * CHUNK_OVERHEAD as u64)
}

/// Fill `buf` from `reader`, tolerating short reads. Returns the number of
/// bytes read, which is less than `buf.len()` only at end of stream.
fn read_fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Encrypting side of the chunk codec.
pub struct ChunkEncoder<'a> {
    key: &'a MasterKey,
    chunk_size: usize,
}

impl<'a> ChunkEncoder<'a> {
    /// Create an encoder with the default chunk size.
    pub fn new(key: &'a MasterKey) -> Self {
        Self {
            key,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Set a custom chunk size. Decoding must use the same size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Encrypt `reader` into `writer`, chunk by chunk.
    ///
    /// Reads pieces of exactly `chunk_size` plaintext bytes (the final piece
    /// may be shorter), seals each independently with a fresh nonce, and
    /// writes each sealed chunk as soon as it is ready; the plaintext is
    /// never buffered whole. Empty input produces empty output.
    ///
    /// Returns the number of plaintext bytes consumed.
    pub fn encode<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;

        loop {
            let n = read_fill(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let sealed = encrypt(self.key.as_bytes(), &buf[..n])?;
            writer.write_all(&sealed)?;
            total += n as u64;
        }

        Ok(total)
    }
}

/// Decrypting side of the chunk codec.
pub struct ChunkDecoder<'a> {
    key: &'a MasterKey,
    chunk_size: usize,
}

impl<'a> ChunkDecoder<'a> {
    /// Create a decoder with the default chunk size.
    pub fn new(key: &'a MasterKey) -> Self {
        Self {
            key,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Set a custom chunk size, matching the encoder's.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Decrypt all of `reader` into `writer`.
    pub fn decode<R: Read + Seek, W: Write>(&self, reader: R, writer: W) -> Result<u64> {
        self.decode_from(reader, writer, 0, || {})
    }

    /// Decrypt `reader` into `writer` starting at logical byte `start`.
    ///
    /// Seeks to the chunk containing `start`, decrypts it, discards the
    /// leading bytes before `start`, then decrypts every following chunk in
    /// full until the input is exhausted. A `start` at or past the end of
    /// the stream produces empty output.
    ///
    /// `progress` is invoked once before the first partial chunk's write and
    /// once before each subsequent chunk's read, so the caller can refresh
    /// liveness bookkeeping during long reads. It has no effect on the bytes
    /// produced.
    ///
    /// # Errors
    /// - [`cipherbox_common::Error::Authentication`] on any chunk whose tag
    ///   fails to verify; bytes already written to `writer` stay written, and
    ///   the caller must treat the partial output as unusable
    /// - I/O errors from `reader` and `writer`, including a sink closed
    ///   mid-stream, abort the decode and propagate unchanged
    pub fn decode_from<R: Read + Seek, W: Write, F: FnMut()>(
        &self,
        mut reader: R,
        mut writer: W,
        start: u64,
        mut progress: F,
    ) -> Result<u64> {
        let encrypted_chunk = self.chunk_size + CHUNK_OVERHEAD;
        let mut buf = vec![0u8; encrypted_chunk];
        let mut total = 0u64;

        if start > 0 {
            let index = start / self.chunk_size as u64;
            reader.seek(SeekFrom::Start(index * encrypted_chunk as u64))?;

            let n = read_fill(&mut reader, &mut buf)?;
            if n == 0 {
                return Ok(0);
            }
            let plain = decrypt(self.key.as_bytes(), &buf[..n])?;
            let skip = (start - index * self.chunk_size as u64) as usize;

            progress();
            if skip < plain.len() {
                writer.write_all(&plain[skip..])?;
                total += (plain.len() - skip) as u64;
            }
        }

        loop {
            progress();
            let n = read_fill(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let plain = decrypt(self.key.as_bytes(), &buf[..n])?;
            writer.write_all(&plain)?;
            total += plain.len() as u64;
        }

        Ok(total)
    }
}
