//! Codec for encoding and decoding Herald frames.
//!
//! Frames are UTF-8 JSON text, one notification per transport message.

use thiserror::Error;

use crate::frames::NotificationFrame;

/// Maximum accepted frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Frame is not a valid notification object.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Channel name outside the known set.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Endpoint URL could not be parsed.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    /// Endpoint URL uses an unsupported scheme.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Decode a notification frame.
///
/// # Errors
///
/// Returns an error if the data is too large, is not UTF-8 JSON, or does not
/// contain a string `message` field.
pub fn decode(data: &[u8]) -> Result<NotificationFrame, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }
    Ok(serde_json::from_slice(data)?)
}

/// Encode a notification frame as JSON text.
///
/// # Errors
///
/// Returns an error if the encoded frame exceeds [`MAX_FRAME_SIZE`].
pub fn encode(frame: &NotificationFrame) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(frame)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_minimal() {
        let frame = decode(br#"{"message":"hi"}"#).unwrap();
        assert_eq!(frame.message, "hi");
        assert_eq!(frame.timestamp, None);
    }

    #[test]
    fn test_encode_decode() {
        let frame = NotificationFrame::new("card declined").with_timestamp(1_700_000_000_123);
        let text = encode(&frame).unwrap();
        assert_eq!(decode(text.as_bytes()).unwrap(), frame);
    }

    #[test]
    fn test_decode_malformed() {
        for data in [
            &b"not json"[..],
            br#"{"message":"unterminated"#,
            br#""just a string""#,
            br#"{"timestamp":1}"#,
            br#"{"message":42}"#,
            &[0xff, 0xfe, 0x00][..],
        ] {
            assert!(
                matches!(decode(data), Err(ProtocolError::Malformed(_))),
                "{:?}",
                String::from_utf8_lossy(data)
            );
        }
    }

    #[test]
    fn test_decode_too_large() {
        let data = vec![b' '; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            decode(&data),
            Err(ProtocolError::FrameTooLarge(size)) if size == MAX_FRAME_SIZE + 1
        ));
    }
}
