//! Chunked base64 framing for the server-to-server SASL relay.
//!
//! Mechanism output is base64-encoded and split into frames of at most
//! [`SASL_S2S_MAXLEN`] characters. The peer treats any frame shorter than that
//! as the end of the packet, so an output whose encoding is an exact multiple
//! of the frame size is followed by a `+` frame, and an empty output is sent
//! as a single `+`.

use base64ct::{Base64, Encoding};

/// Maximum length of one relayed frame (and of the mechanism advertisement).
pub const SASL_S2S_MAXLEN: usize = 400;

/// Maximum size of a reassembled client packet, and of its decoded form.
pub const SASL_C2S_MAXLEN: usize = 8192;

/// Frame used for "no data" in either direction.
pub const EMPTY_FRAME: &str = "+";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed base64 payload")]
    Malformed,
    #[error("decoded payload exceeds {SASL_C2S_MAXLEN} bytes")]
    DecodeOverflow,
    #[error("encoded payload of {0} bytes exceeds the outbound limit")]
    EncodeOverflow(usize),
}

/// A decoded client packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// The peer answered a challenge with no data (`+`).
    Empty,
    Data(Vec<u8>),
}

impl Packet {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Data(bytes) => bytes,
        }
    }
}

/// Encode mechanism output into outbound continuation frames.
///
/// # Errors
/// Returns `CodecError::EncodeOverflow` if the encoded form would not fit the
/// outbound buffer (twice the client packet limit).
pub fn encode(data: &[u8]) -> Result<Vec<String>, CodecError> {
    if data.is_empty() {
        return Ok(vec![EMPTY_FRAME.to_string()]);
    }

    let encoded = Base64::encode_string(data);
    if encoded.len() > SASL_C2S_MAXLEN * 2 {
        return Err(CodecError::EncodeOverflow(encoded.len()));
    }

    // base64 output is ASCII, chunking on byte offsets is safe
    let mut frames: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_S2S_MAXLEN)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();

    if frames.last().is_some_and(|last| last.len() == SASL_S2S_MAXLEN) {
        frames.push(EMPTY_FRAME.to_string());
    }

    Ok(frames)
}

/// Decode one reassembled client packet.
///
/// # Errors
/// Returns `CodecError::Malformed` for invalid base64 (or a payload that
/// decodes to nothing) and `CodecError::DecodeOverflow` when the decoded form
/// exceeds [`SASL_C2S_MAXLEN`].
pub fn decode(packet: &[u8]) -> Result<Packet, CodecError> {
    if packet == EMPTY_FRAME.as_bytes() {
        return Ok(Packet::Empty);
    }

    let text = std::str::from_utf8(packet).map_err(|_| CodecError::Malformed)?;
    let decoded = Base64::decode_vec(text).map_err(|_| CodecError::Malformed)?;

    if decoded.is_empty() {
        return Err(CodecError::Malformed);
    }
    if decoded.len() > SASL_C2S_MAXLEN {
        return Err(CodecError::DecodeOverflow);
    }

    Ok(Packet::Data(decoded))
}
