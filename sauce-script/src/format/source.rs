//! Embedded source recovery.
//!
//! Units compiled with debug information carry their original `.sau` text
//! after the bytecode, introduced by [`SOURCE_SENTINEL`]. The text is a run of
//! `\n`-terminated lines, each byte obfuscated by [`crypt_byte`]. A line that
//! decrypts to `$name` starts a new file.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::SobError;

use super::SEPARATOR;

/// Marks the presence of an embedded source block.
pub const SOURCE_SENTINEL: u32 = 0x1234_5678;

pub const SOURCE_KEY: &[u8] = b"badgravyday";

/// First character of a decrypted file header line.
pub const FILE_MARKER: u8 = b'$';

/// Apply the keystream to one byte. Bytes below 0x20 are left untouched, and
/// the mask never reaches bit 5, so the transform is its own inverse.
#[inline]
pub fn crypt_byte(code: u8, line: usize, pos: usize) -> u8 {
    if code < 0x20 {
        return code;
    }
    let k = SOURCE_KEY[pos % SOURCE_KEY.len()] as usize;
    let mask = k
        .wrapping_add(line >> 2)
        .wrapping_add(pos ^ 0xa)
        .wrapping_add(line)
        & 0x1f;
    code ^ mask as u8
}

pub fn decrypt_line(cipher: &[u8], line: usize) -> Vec<u8> {
    cipher
        .iter()
        .enumerate()
        .map(|(pos, &c)| crypt_byte(c, line, pos))
        .collect()
}

pub fn encrypt_line(plain: &[u8], line: usize) -> Vec<u8> {
    decrypt_line(plain, line)
}

/// One recovered source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Name taken from the header line (without the marker).
    pub name: Vec<u8>,
    /// Decrypted text, header line included, one `\n` per line.
    pub contents: Vec<u8>,
}

/// Result of walking an embedded source block.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedSource {
    /// Files that were completely recovered.
    pub files: Vec<SourceFile>,
    /// Number of ciphertext lines consumed.
    pub lines: usize,
    /// Set when the block ended before its closing separator.
    pub truncated: Option<SobError>,
}

enum State {
    AwaitingHeader,
    Writing(SourceFile),
}

struct SourceDecoder {
    state: State,
    files: Vec<SourceFile>,
    dropped: usize,
}

impl SourceDecoder {
    fn new() -> Self {
        Self {
            state: State::AwaitingHeader,
            files: Vec::new(),
            dropped: 0,
        }
    }

    fn flush(&mut self) {
        if let State::Writing(file) = std::mem::replace(&mut self.state, State::AwaitingHeader) {
            self.files.push(file);
        }
    }

    fn feed(&mut self, plain: Vec<u8>) {
        if plain.first() == Some(&FILE_MARKER) {
            self.flush();
            self.state = State::Writing(SourceFile {
                name: plain[1..].to_vec(),
                contents: Vec::new(),
            });
        }
        match &mut self.state {
            State::Writing(file) => {
                file.contents.extend_from_slice(&plain);
                file.contents.push(b'\n');
            }
            State::AwaitingHeader => self.dropped += 1,
        }
    }

    /// Drop whatever is in progress; only flushed files survive.
    fn abandon(mut self) -> Vec<SourceFile> {
        self.state = State::AwaitingHeader;
        self.files
    }

    fn finish(mut self) -> Vec<SourceFile> {
        self.flush();
        self.files
    }
}

/// Decode the block starting at `start` (just past the sentinel).
///
/// Returns the recovered files and the position of the closing separator, so
/// that the caller resumes exactly at it. On truncation the position is the
/// end of the buffer.
pub fn decode_embedded_source(
    bytes: &[u8],
    start: usize,
    unit: usize,
) -> (EmbeddedSource, usize) {
    let mut decoder = SourceDecoder::new();
    let mut offset = start;
    let mut line = 0usize;

    loop {
        if offset + 4 > bytes.len() {
            break;
        }
        if LittleEndian::read_u32(&bytes[offset..offset + 4]) == SEPARATOR {
            if decoder.dropped > 0 {
                log::warn!(
                    "unit #{unit}: dropped {} source lines before the first file header",
                    decoder.dropped
                );
            }
            let files = decoder.finish();
            return (
                EmbeddedSource {
                    files,
                    lines: line,
                    truncated: None,
                },
                offset,
            );
        }
        let Some(len) = bytes[offset..].iter().position(|&b| b == b'\n') else {
            break;
        };
        decoder.feed(decrypt_line(&bytes[offset..offset + len], line));
        offset += len + 1;
        line += 1;
    }

    log::warn!("unit #{unit}: embedded source ends without a separator at 0x{offset:X}");
    let files = decoder.abandon();
    (
        EmbeddedSource {
            files,
            lines: line,
            truncated: Some(SobError::CipherStreamTruncated { unit, offset }),
        },
        bytes.len(),
    )
}
