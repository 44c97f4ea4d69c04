//! Wire request assembly

use crate::options::InferOptions;
use crate::tensor::{decode_to_scalars, InferInput, InferRequestedOutput};
use inferlink_common::{CarriageMode, ClientError, Result, TensorFailure};
use inferlink_proto::{encode_frame, params, InferRequestHeader, InputTensor, Parameters, RequestedOutput};
use serde_json::Value;
use tracing::trace;

/// Builds one wire request from options, inputs and requested outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAssembler {
    carriage: CarriageMode,
    binary_outputs: bool,
}

impl RequestAssembler {
    pub fn new(carriage: CarriageMode, binary_outputs: bool) -> Self {
        Self {
            carriage,
            binary_outputs,
        }
    }

    pub fn carriage(&self) -> CarriageMode {
        self.carriage
    }

    /// Serialize one request
    ///
    /// Every input that cannot be converted is reported in a single
    /// [`ClientError::TensorConversion`]; no bytes are produced in that case.
    pub fn assemble(
        &self,
        options: &InferOptions,
        inputs: &[InferInput],
        outputs: &[InferRequestedOutput],
    ) -> Result<Vec<u8>> {
        if options.model_name.is_empty() {
            return Err(ClientError::invalid_input("model name must not be empty"));
        }

        let mut parameters = options.wire_parameters();
        if self.carriage == CarriageMode::Binary && outputs.is_empty() && self.binary_outputs {
            parameters.insert(params::BINARY_DATA_OUTPUT.to_string(), Value::Bool(true));
        }

        let mut tensors = Vec::with_capacity(inputs.len());
        let mut failures = Vec::new();
        for input in inputs {
            match self.input_tensor(input) {
                Ok(tensor) => tensors.push(tensor),
                Err(failure) => failures.push(failure),
            }
        }
        if !failures.is_empty() {
            return Err(ClientError::TensorConversion(failures));
        }

        let header = InferRequestHeader {
            model_name: options.model_name.clone(),
            model_version: options.model_version.clone(),
            id: options.request_id.clone(),
            parameters,
            inputs: tensors,
            outputs: outputs.iter().map(|output| self.requested_output(output)).collect(),
        };
        let header = serde_json::to_vec(&header)?;

        trace!(
            model = %options.model_name,
            inputs = inputs.len(),
            outputs = outputs.len(),
            carriage = ?self.carriage,
            "assembled request"
        );

        Ok(match self.carriage {
            CarriageMode::Binary => encode_frame(&header, inputs.iter().map(InferInput::raw_data)),
            CarriageMode::StructuredText => header,
        })
    }

    fn input_tensor(&self, input: &InferInput) -> std::result::Result<InputTensor, TensorFailure> {
        let mut tensor = InputTensor {
            name: input.name().to_string(),
            shape: input.shape().to_vec(),
            datatype: input.datatype().as_str().to_string(),
            ..Default::default()
        };

        match self.carriage {
            CarriageMode::Binary => {
                tensor.parameters.insert(
                    params::BINARY_DATA_SIZE.to_string(),
                    Value::from(input.byte_size() as u64),
                );
            }
            CarriageMode::StructuredText => {
                let values = input
                    .element_count()
                    .and_then(|count| decode_to_scalars(input.raw_data(), count, input.datatype()))
                    .map_err(|error| TensorFailure {
                        tensor: input.name().to_string(),
                        error,
                    })?;
                tensor.data = Some(values);
            }
        }

        Ok(tensor)
    }

    fn requested_output(&self, output: &InferRequestedOutput) -> RequestedOutput {
        let mut parameters = Parameters::new();

        if output.class_count() > 0 {
            parameters.insert(
                params::CLASSIFICATION.to_string(),
                Value::from(output.class_count() as u64),
            );
        }
        // Structured-text responses cannot carry a binary side channel
        if self.carriage == CarriageMode::Binary {
            let binary = output.binary_data().unwrap_or(self.binary_outputs);
            parameters.insert(params::BINARY_DATA.to_string(), Value::Bool(binary));
        }

        RequestedOutput {
            name: output.name().to_string(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Datatype;
    use inferlink_common::CodecError;
    use inferlink_proto::split_frame;
    use serde_json::json;

    fn int_input(name: &str, values: &[i32]) -> InferInput {
        let mut input = InferInput::new(name, vec![1, values.len() as i64], Datatype::Int32).unwrap();
        input.append(values).unwrap();
        input
    }

    #[test]
    fn test_binary_frame_layout() {
        let assembler = RequestAssembler::new(CarriageMode::Binary, true);
        let inputs = vec![int_input("INPUT0", &[1, 2]), int_input("INPUT1", &[3])];
        let outputs = vec![InferRequestedOutput::new("OUTPUT0")];

        let frame = assembler
            .assemble(&InferOptions::new("simple"), &inputs, &outputs)
            .unwrap();
        let (header, body) = split_frame(&frame).unwrap();
        let header: InferRequestHeader = serde_json::from_slice(header).unwrap();

        assert_eq!(header.model_name, "simple");
        assert_eq!(header.inputs[0].parameters["binary_data_size"], json!(8));
        assert_eq!(header.inputs[1].parameters["binary_data_size"], json!(4));
        assert!(header.inputs[0].data.is_none());
        assert_eq!(header.outputs[0].parameters["binary_data"], json!(true));
        assert!(!header.parameters.contains_key("binary_data_output"));

        let mut expected = inputs[0].raw_data().to_vec();
        expected.extend_from_slice(inputs[1].raw_data());
        assert_eq!(body, expected.as_slice());
    }

    #[test]
    fn test_binary_requests_all_outputs_as_binary() {
        let assembler = RequestAssembler::new(CarriageMode::Binary, true);
        let frame = assembler
            .assemble(&InferOptions::new("simple"), &[int_input("INPUT0", &[1])], &[])
            .unwrap();
        let (header, _) = split_frame(&frame).unwrap();
        let header: InferRequestHeader = serde_json::from_slice(header).unwrap();

        assert!(header.outputs.is_empty());
        assert_eq!(header.parameters["binary_data_output"], json!(true));
    }

    #[test]
    fn test_structured_text_body() {
        let assembler = RequestAssembler::new(CarriageMode::StructuredText, true);
        let mut text = InferInput::new("TEXT", vec![2], Datatype::Bytes).unwrap();
        text.append_bytes(&["ab", "cd"]).unwrap();
        let outputs = vec![InferRequestedOutput::new("OUTPUT0")
            .with_binary_data(true)
            .with_class_count(3)];

        let body = assembler
            .assemble(
                &InferOptions::new("simple").request_id("7"),
                &[int_input("INPUT0", &[-1, 2]), text],
                &outputs,
            )
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(
            value,
            json!({
                "model_name": "simple",
                "id": "7",
                "inputs": [
                    {"name": "INPUT0", "shape": [1, 2], "datatype": "INT32", "data": [-1, 2]},
                    {"name": "TEXT", "shape": [2], "datatype": "BYTES", "data": ["ab", "cd"]}
                ],
                "outputs": [
                    {"name": "OUTPUT0", "parameters": {"classification": 3}}
                ]
            })
        );
    }

    #[test]
    fn test_structured_text_reports_every_failed_tensor() {
        let assembler = RequestAssembler::new(CarriageMode::StructuredText, true);
        let mut half = InferInput::new("HALF", vec![1], Datatype::Fp16).unwrap();
        half.append_raw(&[0, 0]);
        let mut short = InferInput::new("SHORT", vec![4], Datatype::Int32).unwrap();
        short.append(&[1i32, 2, 3]).unwrap();

        let err = assembler
            .assemble(
                &InferOptions::new("simple"),
                &[half, int_input("GOOD", &[1]), short],
                &[],
            )
            .unwrap_err();

        match err {
            ClientError::TensorConversion(failures) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].tensor, "HALF");
                assert_eq!(failures[0].error, CodecError::unsupported("FP16"));
                assert_eq!(failures[1].tensor, "SHORT");
                assert_eq!(
                    failures[1].error,
                    CodecError::SizeMismatch { expected: 16, actual: 12 }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_model_name_rejected() {
        let assembler = RequestAssembler::new(CarriageMode::Binary, true);
        let err = assembler
            .assemble(&InferOptions::default(), &[int_input("INPUT0", &[1])], &[])
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput(_)));
    }
}
