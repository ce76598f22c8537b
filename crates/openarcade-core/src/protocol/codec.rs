//! Encoding and decoding of protocol lines.
//!
//! # Wire format
//!
//! One UTF-8 JSON object per line, each terminated by a single `\n`:
//!
//! ```text
//! {"cmd":"list_devices","id":1}\n
//! {"id":1,"ok":true,"devices":{...}}\n
//! ```
//!
//! Encoding produces compact JSON (no spaces), which guarantees the payload
//! itself never contains a raw newline: serde_json escapes `\n` inside
//! strings as the two characters `\` `n`.
//!
//! Decoding never fails.  A line that is not a JSON object becomes
//! `{"ok":false,"error":"invalid_json"}` so the caller can still account
//! for it as a response.

use thiserror::Error;
use tracing::debug;

use super::messages::{Request, Response};

/// Errors that can occur while encoding a protocol line.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Encodes a request as a newline-terminated JSON line.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, CodecError> {
    encode_line(request)
}

/// Encodes a response as a newline-terminated JSON line.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    encode_line(response)
}

fn encode_line<T: serde::Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes one received line (without its `\n`) into a [`Response`].
///
/// Surrounding whitespace is ignored.  Anything that is not a JSON object,
/// including an object whose `id`, `ok` or `error` field has the wrong type,
/// decodes to [`Response::invalid_json`].
pub fn decode_response(line: &str) -> Response {
    match serde_json::from_str::<Response>(line.trim()) {
        Ok(response) => response,
        Err(e) => {
            debug!("undecodable response line ({e}): {line:?}");
            Response::invalid_json()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{Command, INVALID_JSON};
    use serde_json::json;

    #[test]
    fn test_encode_request_is_one_compact_line() {
        // Arrange
        let request = Request::with_id(
            Command::GetDevice {
                device_id: "line\nbreak".to_string(),
            },
            2,
        );

        // Act
        let bytes = encode_request(&request).unwrap();

        // Assert
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(
            bytes.iter().filter(|&&b| b == b'\n').count(),
            1,
            "embedded newlines must be escaped"
        );
        assert!(!bytes.contains(&b' '));
    }

    #[test]
    fn test_decode_success_response() {
        let response = decode_response(r#"{"ok":true}"#);
        assert_eq!(response, Response::ack());
    }

    #[test]
    fn test_decode_failure_response_keeps_code() {
        let response = decode_response(r#"{"ok":false,"error":"set_mapping_failed"}"#);
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("set_mapping_failed"));
    }

    #[test]
    fn test_decode_ignores_surrounding_whitespace() {
        let response = decode_response("  {\"ok\":true,\"id\":5}\r");
        assert!(response.ok);
        assert_eq!(response.id, Some(5));
    }

    #[test]
    fn test_garbage_decodes_to_invalid_json() {
        for line in ["not json", "{\"ok\":tru", "[1,2,3]", "42", "{\"ok\":\"yes\"}"] {
            let response = decode_response(line);
            assert!(!response.ok, "{line}");
            assert_eq!(response.error.as_deref(), Some(INVALID_JSON), "{line}");
            assert_eq!(response.id, None);
        }
    }

    #[test]
    fn test_encode_response_round_trips_through_decode() {
        let response = Response::ack()
            .with_id(Some(11))
            .with_field("reply", json!("pong"));

        let bytes = encode_response(&response).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();

        assert_eq!(decode_response(text.trim_end_matches('\n')), response);
    }
}
