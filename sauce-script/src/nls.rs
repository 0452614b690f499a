use std::borrow::Cow;
use std::str::FromStr;

use anyhow::anyhow;
use encoding_rs::{SHIFT_JIS, UTF_8, WINDOWS_1252};

/// Text encoding of string literals and embedded file names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Nls {
    #[default]
    Latin1,
    ShiftJIS,
    UTF8,
}

impl FromStr for Nls {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "latin1" | "ascii" | "cp1252" => Ok(Nls::Latin1),
            "sjis" | "shiftjis" | "shift_jis" => Ok(Nls::ShiftJIS),
            "utf8" | "utf-8" => Ok(Nls::UTF8),
            _ => Err(anyhow!("unknown NLS: {s}")),
        }
    }
}

impl Nls {
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let enc = match self {
            Nls::Latin1 => WINDOWS_1252,
            Nls::ShiftJIS => SHIFT_JIS,
            Nls::UTF8 => UTF_8,
        };
        let (s, _, had_errors) = enc.decode(bytes);
        if had_errors {
            log::warn!("{:?} decode error", self);
        }
        s
    }

    /// Decode a C-style string, stopping at the first NUL.
    pub fn decode_cstr<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.decode(&bytes[..end])
    }
}
