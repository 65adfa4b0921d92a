//! Text codec
//!
//! Every received payload is delivered both as raw bytes and as text decoded
//! with the session's codec. Raw bytes are never altered by the codec.

use serde::Deserialize;

/// Character encoding used for the text view of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextCodec {
    /// UTF-8, invalid sequences decode as U+FFFD
    #[default]
    Utf8,

    /// ISO-8859-1, one byte per code point
    Latin1,

    /// 7-bit ASCII
    Ascii,
}

/// Substituted for anything the codec cannot represent
const REPLACEMENT: u8 = b'?';

impl TextCodec {
    /// Decode bytes into text
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextCodec::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextCodec::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            TextCodec::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { REPLACEMENT as char })
                .collect(),
        }
    }

    /// Encode text into bytes
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextCodec::Utf8 => text.as_bytes().to_vec(),
            TextCodec::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT))
                .collect(),
            TextCodec::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { REPLACEMENT })
                .collect(),
        }
    }
}

/// Strip zero padding from the end of a receive buffer
pub fn trim_trailing_zeros(buf: &mut Vec<u8>) {
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    buf.truncate(end);
}
