//! exchange-protocol
//!
//! Line-level encoding/decoding for the exchange.
//!
//! This crate turns logical exchange messages
//! (`exchange_core::Request` / `Response`) into text lines and back.
//!
//! - [`csv_codec`]  : comma-separated lines (netcat / scripts / replay)
//! - [`json_codec`] : one JSON object per line (programmatic clients)
//!
//! A stream picks its codec from the first byte it sends: `{` selects
//! JSON, anything else CSV (see [`Protocol::detect`]).

pub mod csv_codec;
pub mod json_codec;

use exchange_core::{Request, Response};
use thiserror::Error;

/// Errors that can arise when decoding a line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("{kind}: expected {expected} fields, got {got}")]
    FieldCount {
        kind: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Text protocol spoken by a client connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Protocol {
    Csv,
    Json,
}

impl Protocol {
    /// Pick the protocol from the first non-whitespace byte a client sends.
    pub fn detect(first_byte: u8) -> Self {
        if first_byte == b'{' {
            Protocol::Json
        } else {
            Protocol::Csv
        }
    }

    /// Decode one request line; `Ok(None)` for blank lines and comments.
    pub fn decode_request(self, line: &str) -> Result<Option<Request>, ProtocolError> {
        match self {
            Protocol::Csv => csv_codec::parse_input_line(line),
            Protocol::Json => {
                if line.trim().is_empty() {
                    return Ok(None);
                }
                json_codec::decode_request(line).map(Some)
            }
        }
    }

    /// Encode one response as text, without the trailing newline.
    pub fn encode_response(self, msg: &Response) -> Result<String, ProtocolError> {
        match self {
            Protocol::Csv => Ok(csv_codec::format_output(msg)),
            Protocol::Json => json_codec::encode_response(msg),
        }
    }
}
