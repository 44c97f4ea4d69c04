//! InferLink wire protocol
//!
//! Request and response headers exchanged with the inference server, the
//! binary-carriage frame layout and the model readiness probe messages.
//!
//! A binary-carriage message is laid out as
//! `{u64 little-endian header length}{JSON header}{tensor bytes...}`, with
//! tensor bytes concatenated in header order and each binary tensor
//! declaring its length in the `binary_data_size` parameter. A
//! structured-text message is the JSON header alone, with tensor values in
//! each tensor's `data` array.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Parameter map attached to requests, tensors and responses
pub type Parameters = Map<String, Value>;

/// gRPC method carrying an inference exchange
pub const INFER_PATH: &str = "/inferlink.InferenceService/Infer";

/// gRPC method carrying a model readiness probe
pub const MODEL_READY_PATH: &str = "/inferlink.InferenceService/ModelReady";

/// Well-known parameter keys
pub mod params {
    pub const BINARY_DATA_SIZE: &str = "binary_data_size";
    pub const BINARY_DATA: &str = "binary_data";
    pub const BINARY_DATA_OUTPUT: &str = "binary_data_output";
    pub const CLASSIFICATION: &str = "classification";
    pub const SEQUENCE_ID: &str = "sequence_id";
    pub const SEQUENCE_START: &str = "sequence_start";
    pub const SEQUENCE_END: &str = "sequence_end";
    pub const PRIORITY: &str = "priority";
    pub const TIMEOUT: &str = "timeout";
}

/// Size of the header length prefix in a binary frame
pub const FRAME_PREFIX_LEN: usize = 8;

/// Framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    Truncated(usize),

    #[error("header length {header_len} exceeds frame body of {available} bytes")]
    HeaderOverrun { header_len: u64, available: usize },
}

// Inference request types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferRequestHeader {
    pub model_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Parameters,

    pub inputs: Vec<InputTensor>,

    /// Empty means every output the model produces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<RequestedOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputTensor {
    pub name: String,
    pub shape: Vec<i64>,
    pub datatype: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Parameters,

    /// Flattened values in structured-text carriage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedOutput {
    pub name: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Parameters,
}

// Inference response types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferResponseHeader {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Parameters,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputTensor>,

    /// Set when the server rejected the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTensor {
    pub name: String,
    pub datatype: String,
    pub shape: Vec<i64>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Parameters,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
}

// Model readiness probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReadyRequest {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReadyResponse {
    pub ready: bool,
}

/// Read the binary payload size declared in a tensor's parameters
pub fn binary_data_size(parameters: &Parameters) -> Option<u64> {
    parameters.get(params::BINARY_DATA_SIZE).and_then(Value::as_u64)
}

/// Build a binary frame from a serialized header and tensor payloads
pub fn encode_frame<'a, I>(header: &[u8], payloads: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let payloads: Vec<&[u8]> = payloads.into_iter().collect();
    let body_len: usize = payloads.iter().map(|p| p.len()).sum();

    let mut frame = Vec::with_capacity(FRAME_PREFIX_LEN + header.len() + body_len);
    frame.extend_from_slice(&(header.len() as u64).to_le_bytes());
    frame.extend_from_slice(header);
    for payload in payloads {
        frame.extend_from_slice(payload);
    }
    frame
}

/// Split a binary frame into its header and the trailing tensor bytes
pub fn split_frame(frame: &[u8]) -> Result<(&[u8], &[u8]), FrameError> {
    if frame.len() < FRAME_PREFIX_LEN {
        return Err(FrameError::Truncated(frame.len()));
    }

    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    prefix.copy_from_slice(&frame[..FRAME_PREFIX_LEN]);
    let header_len = u64::from_le_bytes(prefix);

    let rest = &frame[FRAME_PREFIX_LEN..];
    let header_len_usize = usize::try_from(header_len)
        .ok()
        .filter(|&len| len <= rest.len())
        .ok_or(FrameError::HeaderOverrun {
            header_len,
            available: rest.len(),
        })?;

    Ok(rest.split_at(header_len_usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_split() {
        let header = br#"{"model_name":"simple"}"#;
        let frame = encode_frame(header, [&[1u8, 2][..], &[3u8][..]]);

        assert_eq!(&frame[..8], &(header.len() as u64).to_le_bytes());

        let (h, body) = split_frame(&frame).unwrap();
        assert_eq!(h, header);
        assert_eq!(body, &[1, 2, 3]);
    }

    #[test]
    fn test_frame_errors() {
        assert_eq!(split_frame(&[1, 2, 3]), Err(FrameError::Truncated(3)));

        let mut frame = 100u64.to_le_bytes().to_vec();
        frame.extend_from_slice(b"{}");
        assert_eq!(
            split_frame(&frame),
            Err(FrameError::HeaderOverrun {
                header_len: 100,
                available: 2
            })
        );
    }

    #[test]
    fn test_request_header_omits_empty_fields() {
        let header = InferRequestHeader {
            model_name: "simple".to_string(),
            inputs: vec![InputTensor {
                name: "INPUT0".to_string(),
                shape: vec![1, 2],
                datatype: "INT32".to_string(),
                data: Some(vec![json!(1), json!(2)]),
                ..Default::default()
            }],
            ..Default::default()
        };

        let value = serde_json::to_value(&header).unwrap();
        assert_eq!(
            value,
            json!({
                "model_name": "simple",
                "inputs": [
                    {"name": "INPUT0", "shape": [1, 2], "datatype": "INT32", "data": [1, 2]}
                ]
            })
        );
    }

    #[test]
    fn test_response_header_error() {
        let header: InferResponseHeader =
            serde_json::from_str(r#"{"error":"unknown model"}"#).unwrap();

        assert_eq!(header.error.as_deref(), Some("unknown model"));
        assert!(header.outputs.is_empty());
    }
}
