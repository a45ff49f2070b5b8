//! Character-set names and the byte-preserving reinterpretation they drive.
//!
//! Charset names end up interpolated into statement text, so every name is
//! checked against a strict pattern before use. Names are also mapped onto
//! `encoding_rs` encodings, which lets the reinterpretation a rewrite
//! statement performs be reproduced in-process for previews and tests.

use std::sync::OnceLock;

use encoding_rs::{
    BIG5, EUC_JP, EUC_KR, Encoding, GBK, KOI8_R, SHIFT_JIS, UTF_8, UTF_16BE, UTF_16LE,
    WINDOWS_1252,
};
use regex::Regex;

use crate::error::{EncodeError, Result};

pub const DEFAULT_TARGET_CHARSET: &str = "utf8";
pub const DEFAULT_SOURCE_CHARSET: &str = "utf8";
/// Single-byte encoding whose code points map one-to-one onto byte values.
pub const LEGACY_CHARSET: &str = "latin1";

static CHARSET_NAME: OnceLock<Regex> = OnceLock::new();

fn charset_pattern() -> &'static Regex {
    CHARSET_NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("charset pattern compiles"))
}

/// Returns the trimmed name when it is safe to splice into SQL text.
pub fn validate_charset_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if charset_pattern().is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(EncodeError::InvalidCharset {
            name: name.to_string(),
        })
    }
}

/// Maps a database charset name onto the encoding that stores its bytes.
///
/// The engine's `latin1` is really windows-1252, which is also what
/// `encoding_rs` resolves the `latin1` label to.
pub fn resolve_charset(name: &str) -> Result<&'static Encoding> {
    let name = validate_charset_name(name)?;
    let lowered = name.to_ascii_lowercase();
    let encoding = match lowered.as_str() {
        "utf8" | "utf8mb3" | "utf8mb4" => Some(UTF_8),
        "latin1" | "ascii" => Some(WINDOWS_1252),
        "utf16" => Some(UTF_16BE),
        "utf16le" => Some(UTF_16LE),
        "sjis" | "cp932" => Some(SHIFT_JIS),
        "ujis" | "eucjpms" => Some(EUC_JP),
        "euckr" => Some(EUC_KR),
        "koi8r" => Some(KOI8_R),
        "gbk" | "gb2312" => Some(GBK),
        "big5" => Some(BIG5),
        other => Encoding::for_label(other.as_bytes()),
    };
    encoding.ok_or_else(|| EncodeError::InvalidCharset {
        name: name.to_string(),
    })
}

/// In-process model of `CONVERT(CAST(CONVERT(col USING legacy) AS BINARY) USING target)`.
#[derive(Debug, Clone, Copy)]
pub struct Reinterpretation {
    legacy: &'static Encoding,
    target: &'static Encoding,
}

impl Reinterpretation {
    pub fn new(legacy: &str, target: &str) -> Result<Self> {
        Ok(Self {
            legacy: resolve_charset(legacy)?,
            target: resolve_charset(target)?,
        })
    }

    pub fn legacy(&self) -> &'static Encoding {
        self.legacy
    }

    pub fn target(&self) -> &'static Encoding {
        self.target
    }

    /// Bytes the value occupies once converted to the legacy encoding.
    /// Characters the legacy encoding cannot represent become `?`.
    pub fn legacy_bytes(&self, value: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(value.len());
        let mut buffer = [0u8; 4];
        for ch in value.chars() {
            let (encoded, _, had_errors) = self.legacy.encode(ch.encode_utf8(&mut buffer));
            if had_errors {
                bytes.push(b'?');
            } else {
                bytes.extend_from_slice(&encoded);
            }
        }
        bytes
    }

    /// Stored value after the rewrite, or `None` when the recovered bytes are
    /// not valid in the target encoding (the engine stores NULL then).
    pub fn apply(&self, value: &str) -> Option<String> {
        let bytes = self.legacy_bytes(value);
        self.target
            .decode_without_bom_handling_and_without_replacement(&bytes)
            .map(|text| text.into_owned())
    }
}
