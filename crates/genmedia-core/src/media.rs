//! Helpers for base64 media payloads as they arrive from browsers and providers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{GenmediaError, Result};

/// Strip a `data:<mime>;base64,` prefix and repair missing `=` padding.
pub fn clean_base64(data: &str) -> String {
    let body = match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, b)| b).unwrap_or(data),
        None => data,
    };
    let mut cleaned = body.trim().to_string();
    let missing = cleaned.len() % 4;
    if missing != 0 {
        cleaned.push_str(&"=".repeat(4 - missing));
    }
    cleaned
}

/// Decode a (possibly data-URL wrapped) base64 payload.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(clean_base64(data))
        .map_err(|e| GenmediaError::InvalidInput(format!("invalid base64 payload: {}", e)))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// MIME type of PNG or JPEG bytes, judged by the file signature.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xff, 0xd8]) {
        Some("image/jpeg")
    } else {
        None
    }
}
