//! Version 1 of the payload contract: the body is the UTF-8 JSON encoding
//! of the event arguments, published with content type [`CONTENT_TYPE`].
//! Richer values (dates, decimals) are expressed in the Rust type of a
//! typed event and converted by serde, never guessed from strings.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

/// Content type of encoded payloads.
pub const CONTENT_TYPE: &str = "application/json";

/// Errors decoding a message body.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The message declares a content type other than [`CONTENT_TYPE`].
    #[error("unsupported content type {0:?}")]
    ContentType(String),

    /// The body is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The body is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes event arguments.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode(args: &Value) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(args).map(Bytes::from)
}

/// Decodes a message body. A missing content type is accepted.
///
/// # Errors
///
/// Returns an error if the content type is foreign or the body is not
/// UTF-8 JSON.
pub fn decode(body: &[u8], content_type: Option<&str>) -> Result<Value, DecodeError> {
    if let Some(foreign) = content_type.filter(|declared| *declared != CONTENT_TYPE) {
        return Err(DecodeError::ContentType(foreign.to_string()));
    }
    let text = std::str::from_utf8(body)?;
    Ok(serde_json::from_str(text)?)
}
