//! JSON-lines codec.
//!
//! One serde-encoded [`Request`] or [`Response`] per line, tagged with a
//! `"type"` field, e.g.:
//!
//! ```text
//! {"type":"buy_market","username":"alice","symbol":"AAPL","quantity":10}
//! {"type":"submit_limit","username":"bob","symbol":"TSLA","side":"sell","price":800.0,"quantity":5}
//! ```
//!
//! `funding` defaults to `"cash"` when omitted.

use exchange_core::{Request, Response};

use crate::ProtocolError;

pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

pub fn encode_request(msg: &Request) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

pub fn encode_response(msg: &Response) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}
