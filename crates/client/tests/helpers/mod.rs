//! In-process stand-in for an inference server running the add/sub model
//!
//! The model takes INPUT0 and INPUT1 (INT32, shape [1, 16]) and produces
//! OUTPUT0 = INPUT0 + INPUT1 and OUTPUT1 = INPUT0 - INPUT1. Version "2"
//! swaps the two outputs so tests can tell which options a request used.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use inferlink_client::{
    Batch, CarriageMode, ClientConfig, ClientError, Datatype, InferInput, InferOptions,
    InferRequestedOutput, InferenceClient, Result, Transport,
};
use inferlink_proto::{
    binary_data_size, encode_frame, params, split_frame, InferRequestHeader, InferResponseHeader,
    InputTensor, OutputTensor,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ELEMENTS: usize = 16;

/// Model name the stub always reports as unreachable
pub const UNREACHABLE_MODEL: &str = "unreachable";

/// Model name the stub rejects with a server error
pub const UNKNOWN_MODEL: &str = "missing";

pub struct AddSubServer {
    carriage: CarriageMode,
    sends: AtomicUsize,
    completed: Mutex<Vec<i32>>,
    delay_step: Duration,
}

impl AddSubServer {
    pub fn new(carriage: CarriageMode) -> Arc<Self> {
        Self::with_delay(carriage, Duration::ZERO)
    }

    /// Request `i` (identified by INPUT0[0] == i) waits `(3 - i) * step`,
    /// so the first three requests complete in reverse order
    pub fn with_delay(carriage: CarriageMode, step: Duration) -> Arc<Self> {
        Arc::new(Self {
            carriage,
            sends: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
            delay_step: step,
        })
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Request tags (INPUT0[0]) in the order their responses were produced
    pub fn completion_order(&self) -> Vec<i32> {
        self.completed.lock().clone()
    }

    fn parse(&self, request: &[u8]) -> (InferRequestHeader, Vec<u8>) {
        match self.carriage {
            CarriageMode::Binary => {
                let (header, body) = split_frame(request).expect("request frame");
                (serde_json::from_slice(header).expect("request header"), body.to_vec())
            }
            CarriageMode::StructuredText => {
                (serde_json::from_slice(request).expect("request body"), Vec::new())
            }
        }
    }

    fn respond(&self, header: &InferRequestHeader, body: &[u8]) -> Bytes {
        let mut offset = 0;
        let mut inputs = Vec::new();
        for tensor in &header.inputs {
            inputs.push((tensor.name.clone(), tensor_values(tensor, body, &mut offset)));
        }
        let input = |name: &str| {
            inputs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| panic!("missing {name}"))
        };
        let (a, b) = (input("INPUT0"), input("INPUT1"));

        let sum: Vec<i32> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
        let diff: Vec<i32> = a.iter().zip(&b).map(|(x, y)| x - y).collect();
        let (output0, output1) = if header.model_version == "2" {
            (diff, sum)
        } else {
            (sum, diff)
        };

        let all_binary = header
            .parameters
            .get(params::BINARY_DATA_OUTPUT)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let requested: Vec<(String, bool)> = if header.outputs.is_empty() {
            vec![
                ("OUTPUT0".to_string(), all_binary),
                ("OUTPUT1".to_string(), all_binary),
            ]
        } else {
            header
                .outputs
                .iter()
                .map(|o| {
                    let binary = o
                        .parameters
                        .get(params::BINARY_DATA)
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    (o.name.clone(), binary)
                })
                .collect()
        };

        let mut outputs = Vec::new();
        let mut payload = Vec::new();
        for (name, binary) in requested {
            let values = if name == "OUTPUT0" { &output0 } else { &output1 };
            let mut tensor = OutputTensor {
                name,
                datatype: "INT32".to_string(),
                shape: vec![1, ELEMENTS as i64],
                ..Default::default()
            };
            if binary && self.carriage == CarriageMode::Binary {
                let start = payload.len();
                for v in values {
                    payload.extend_from_slice(&v.to_ne_bytes());
                }
                tensor
                    .parameters
                    .insert(params::BINARY_DATA_SIZE.to_string(), json!(payload.len() - start));
            } else {
                tensor.data = Some(values.iter().map(|&v| json!(v)).collect());
            }
            outputs.push(tensor);
        }

        let response = InferResponseHeader {
            model_name: header.model_name.clone(),
            model_version: header.model_version.clone(),
            id: header.id.clone(),
            outputs,
            ..Default::default()
        };
        self.encode(&response, &payload)
    }

    fn encode(&self, response: &InferResponseHeader, payload: &[u8]) -> Bytes {
        let header = serde_json::to_vec(response).expect("response header");
        match self.carriage {
            CarriageMode::Binary => Bytes::from(encode_frame(&header, [payload])),
            CarriageMode::StructuredText => Bytes::from(header),
        }
    }
}

fn tensor_values(tensor: &InputTensor, body: &[u8], offset: &mut usize) -> Vec<i32> {
    if let Some(size) = binary_data_size(&tensor.parameters) {
        let bytes = &body[*offset..*offset + size as usize];
        *offset += size as usize;
        return bytes
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
    }

    tensor
        .data
        .as_ref()
        .expect("tensor data")
        .iter()
        .map(|v| v.as_i64().expect("integer") as i32)
        .collect()
}

#[async_trait]
impl Transport for AddSubServer {
    async fn send(&self, request: Bytes) -> Result<Bytes> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let (header, body) = self.parse(&request);

        if header.model_name == UNREACHABLE_MODEL {
            return Err(ClientError::transport("connection refused"));
        }
        if header.model_name == UNKNOWN_MODEL {
            let response = InferResponseHeader {
                error: Some(format!("unknown model '{}'", header.model_name)),
                ..Default::default()
            };
            return Ok(self.encode(&response, &[]));
        }

        let response = self.respond(&header, &body);

        let tag = header
            .inputs
            .iter()
            .find(|t| t.name == "INPUT0")
            .map(|t| tensor_values(t, &body, &mut 0)[0])
            .unwrap_or_default();
        let delay = self.delay_step * (3 - tag.clamp(0, 3)) as u32;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.completed.lock().push(tag);
        Ok(response)
    }

    async fn is_model_ready(&self, name: &str, _version: &str) -> Result<bool> {
        Ok(name != UNKNOWN_MODEL && name != UNREACHABLE_MODEL)
    }
}

pub fn client(server: &Arc<AddSubServer>, carriage: CarriageMode) -> InferenceClient {
    let config = ClientConfig {
        carriage,
        ..ClientConfig::default()
    };
    let transport: Arc<dyn Transport> = server.clone();
    InferenceClient::with_transport(&config, transport).expect("client")
}

/// INPUT0 = [tag, tag + 1, ...], INPUT1 = [1; 16]
pub fn add_sub_inputs(tag: i32) -> Vec<InferInput> {
    let a: Vec<i32> = (0..ELEMENTS as i32).map(|k| tag + k).collect();
    let b = vec![1i32; ELEMENTS];

    let mut input0 = InferInput::new("INPUT0", vec![1, ELEMENTS as i64], Datatype::Int32).unwrap();
    input0.append(&a).unwrap();
    let mut input1 = InferInput::new("INPUT1", vec![1, ELEMENTS as i64], Datatype::Int32).unwrap();
    input1.append(&b).unwrap();
    vec![input0, input1]
}

pub fn expected_sum(tag: i32) -> Vec<i32> {
    (0..ELEMENTS as i32).map(|k| tag + k + 1).collect()
}

pub fn expected_diff(tag: i32) -> Vec<i32> {
    (0..ELEMENTS as i32).map(|k| tag + k - 1).collect()
}

pub fn outputs(names: &[&str]) -> Vec<InferRequestedOutput> {
    names.iter().map(|&n| InferRequestedOutput::new(n)).collect()
}

/// Three add/sub requests tagged 0, 1 and 2
pub fn batch(options: Vec<InferOptions>, outputs: Vec<Vec<InferRequestedOutput>>) -> Batch {
    Batch::new(options, (0..3).map(add_sub_inputs).collect(), outputs)
}

pub fn simple() -> InferOptions {
    InferOptions::new("simple")
}
