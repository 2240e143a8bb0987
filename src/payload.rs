//! Payload normalization between protocol-engine messages and the
//! byte-stream surface.
//!
//! Incoming frames arrive either as binary buffers or as text. Text is
//! not application data at this layer: it is reinterpreted as a base64
//! encoding of binary data, matching peers that cannot send binary
//! frames. Normalization reduces every data-bearing frame to one of the
//! two canonical shapes; everything else is rejected.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

/// The maximum base64 text length for a given binary frame limit.
///
/// Standard base64 expansion, rounded up to a multiple of 4.
#[must_use]
pub const fn max_base64_len(size: usize) -> usize {
    ((4 * size / 3) + 3) & !3
}

/// Canonical form of a data-bearing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Normal {
    /// Text payload, passed through for base64 reinterpretation.
    Text(String),
    /// Binary payload.
    Binary(Bytes),
}

/// Normalize a protocol-engine message into its canonical payload shape.
///
/// Text and binary frames pass through. Ping, pong and close frames
/// carry no application data and normalize to `None` (the close frame's
/// lifecycle meaning is handled before normalization). Raw frames leak
/// no usable payload and fail with [`Error::BadPayload`].
pub(crate) fn normalize(message: Message) -> Result<Option<Normal>> {
    match message {
        Message::Text(text) => Ok(Some(Normal::Text(text.as_str().to_owned()))),
        Message::Binary(data) => Ok(Some(Normal::Binary(data))),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => Ok(None),
        Message::Frame(_) => Err(Error::BadPayload),
    }
}

/// Decode a base64 text payload into bytes.
pub(crate) fn decode_base64(text: &str) -> Result<Bytes> {
    STANDARD
        .decode(text)
        .map(Bytes::from)
        .map_err(|_| Error::InvalidBase64)
}

/// Text encoding applied to emitted data and accepted by text writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum Encoding {
    /// UTF-8 text (lossy on emission).
    #[default]
    Utf8,
    /// Lowercase hex digits.
    Hex,
    /// Standard base64.
    Base64,
}

impl Encoding {
    /// Render bytes as text in this encoding.
    #[must_use]
    pub fn encode(&self, data: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(data).into_owned(),
            Encoding::Hex => hex::encode(data),
            Encoding::Base64 => STANDARD.encode(data),
        }
    }

    /// Interpret text in this encoding as bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHex`] or [`Error::InvalidBase64`] when the
    /// text is not valid in the chosen encoding.
    pub fn decode(&self, text: &str) -> Result<Bytes> {
        match self {
            Encoding::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
            Encoding::Hex => hex::decode(text)
                .map(Bytes::from)
                .map_err(|_| Error::InvalidHex),
            Encoding::Base64 => decode_base64(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_base64_len_matches_expansion() {
        // exact base64 output length is (n + 2) / 3 * 4
        for size in 0..2048 {
            assert_eq!(max_base64_len(size), (size + 2) / 3 * 4, "size={size}");
        }
    }

    #[test]
    fn test_max_base64_len_multiple_of_four() {
        for size in [0, 1, 2, 3, 1000, 4_000_024] {
            assert_eq!(max_base64_len(size) % 4, 0);
        }
    }

    #[test]
    fn test_normalize_text_passes_through() {
        let normal = normalize(Message::text("aGVsbG8=")).unwrap();
        assert_eq!(normal, Some(Normal::Text("aGVsbG8=".to_string())));
    }

    #[test]
    fn test_normalize_binary_passes_through() {
        let normal = normalize(Message::binary(vec![1u8, 2, 3])).unwrap();
        assert_eq!(normal, Some(Normal::Binary(Bytes::from_static(&[1, 2, 3]))));
    }

    #[test]
    fn test_normalize_control_frames_carry_no_data() {
        assert_eq!(normalize(Message::Ping(Bytes::new())).unwrap(), None);
        assert_eq!(normalize(Message::Pong(Bytes::new())).unwrap(), None);
        assert_eq!(normalize(Message::Close(None)).unwrap(), None);
    }

    #[test]
    fn test_decode_base64() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(decode_base64("not base64!"), Err(Error::InvalidBase64));
    }

    #[test]
    fn test_encoding_round_trips() {
        let data = b"\x00\x01wsock\xff";
        for encoding in [Encoding::Hex, Encoding::Base64] {
            let text = encoding.encode(data);
            assert_eq!(encoding.decode(&text).unwrap(), Bytes::copy_from_slice(data));
        }
    }

    #[test]
    fn test_utf8_encoding() {
        assert_eq!(Encoding::Utf8.encode(b"hello"), "hello");
        assert_eq!(
            Encoding::Utf8.decode("hello").unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[test]
    fn test_invalid_hex() {
        assert_eq!(Encoding::Hex.decode("zz"), Err(Error::InvalidHex));
    }
}
