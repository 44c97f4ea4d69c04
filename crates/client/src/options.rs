//! Per-request inference options

use inferlink_proto::{params, Parameters};
use serde_json::Value;
use std::time::Duration;

/// Options for a single inference request
///
/// In a batch, one `InferOptions` may be broadcast to every request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferOptions {
    /// Model to run
    pub model_name: String,

    /// Model version, empty to let the server choose
    pub model_version: String,

    /// Identifier echoed back in the response
    pub request_id: String,

    /// Sequence correlation id, 0 when the request is not part of a sequence
    pub sequence_id: u64,

    /// First request of a sequence
    pub sequence_start: bool,

    /// Last request of a sequence
    pub sequence_end: bool,

    /// Scheduling priority, 0 for the model's default
    pub priority: u64,

    /// Server-side timeout, zero for none
    pub server_timeout: Duration,

    /// Custom request parameters
    pub parameters: Parameters,
}

impl InferOptions {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    pub fn model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    pub fn sequence(mut self, sequence_id: u64, start: bool, end: bool) -> Self {
        self.sequence_id = sequence_id;
        self.sequence_start = start;
        self.sequence_end = end;
        self
    }

    pub fn priority(mut self, priority: u64) -> Self {
        self.priority = priority;
        self
    }

    pub fn server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    /// Add a custom parameter; reserved keys are overwritten by the typed fields
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Request-level parameters as carried on the wire
    pub(crate) fn wire_parameters(&self) -> Parameters {
        let mut parameters = self.parameters.clone();

        if self.sequence_id != 0 {
            parameters.insert(params::SEQUENCE_ID.to_string(), Value::from(self.sequence_id));
            parameters.insert(params::SEQUENCE_START.to_string(), Value::from(self.sequence_start));
            parameters.insert(params::SEQUENCE_END.to_string(), Value::from(self.sequence_end));
        }
        if self.priority != 0 {
            parameters.insert(params::PRIORITY.to_string(), Value::from(self.priority));
        }
        if !self.server_timeout.is_zero() {
            let micros = u64::try_from(self.server_timeout.as_micros()).unwrap_or(u64::MAX);
            parameters.insert(params::TIMEOUT.to_string(), Value::from(micros));
        }

        parameters
    }
}
