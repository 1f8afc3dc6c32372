//! JSON codec for control channel documents.
//!
//! There is no length prefix and no delimiter: a message is everything the
//! sender writes before closing its side of the connection. Decoding always
//! runs over the fully accumulated buffer.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::protocol::{ProtocolError, Request, Response};

/// Encode a request document. Rejects an empty method name.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, ProtocolError> {
    if request.method.is_empty() {
        return Err(ProtocolError::EmptyMethod);
    }
    let json = serde_json::to_vec(request)?;
    tracing::trace!(
        method = %request.method,
        json_size_bytes = json.len(),
        "Encoding request"
    );
    Ok(json)
}

/// Decode a response document from a complete message buffer.
pub fn decode_response(bytes: &[u8]) -> Result<Response, ProtocolError> {
    decode_object(bytes)
}

/// Encode a response document (orchestrator side).
pub fn encode_response(response: &Response) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(response)?)
}

/// Decode a request document (orchestrator side).
pub fn decode_request(bytes: &[u8]) -> Result<Request, ProtocolError> {
    let request: Request = decode_object(bytes)?;
    if request.method.is_empty() {
        return Err(ProtocolError::EmptyMethod);
    }
    Ok(request)
}

fn decode_object<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::Empty);
    }

    let value: Value = serde_json::from_slice(bytes)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject(kind(&value)));
    }
    Ok(serde_json::from_value(value)?)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
