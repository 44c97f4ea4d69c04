//! JSON batch description read by the CLI
//!
//! ```json
//! {
//!   "options": [{"model_name": "simple"}],
//!   "inputs": [[{"name": "INPUT0", "shape": [1, 2], "datatype": "INT32", "data": [1, 2]}]],
//!   "outputs": [["OUTPUT0"]]
//! }
//! ```
//!
//! `options` and `outputs` follow the batch broadcast rules.

use inferlink_client::{Batch, Datatype, InferInput, InferOptions, InferRequestedOutput};
use inferlink_common::{ClientError, Result};
use inferlink_proto::InputTensor;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct RequestOptions {
    pub model_name: String,

    #[serde(default)]
    pub model_version: String,

    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchFile {
    pub options: Vec<RequestOptions>,
    pub inputs: Vec<Vec<InputTensor>>,

    #[serde(default)]
    pub outputs: Vec<Vec<String>>,
}

impl BatchFile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Distinct (model, version) pairs named by the batch
    pub fn models(&self) -> BTreeSet<(String, String)> {
        self.options
            .iter()
            .map(|o| (o.model_name.clone(), o.model_version.clone()))
            .collect()
    }

    pub fn to_batch(&self) -> Result<Batch> {
        let options = self
            .options
            .iter()
            .map(|o| {
                InferOptions::new(o.model_name.clone())
                    .model_version(o.model_version.clone())
                    .request_id(o.request_id.clone())
            })
            .collect();

        let inputs = self
            .inputs
            .iter()
            .map(|tensors| tensors.iter().map(to_input).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;

        let outputs = self
            .outputs
            .iter()
            .map(|names| names.iter().map(InferRequestedOutput::new).collect())
            .collect();

        Ok(Batch::new(options, inputs, outputs))
    }
}

fn to_input(tensor: &InputTensor) -> Result<InferInput> {
    let datatype: Datatype = tensor.datatype.parse()?;
    let mut input = InferInput::new(tensor.name.clone(), tensor.shape.clone(), datatype)?;

    let values = tensor.data.as_deref().ok_or_else(|| {
        ClientError::invalid_input(format!("input '{}' has no data", tensor.name))
    })?;
    input.append_scalars(values)?;

    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_batch_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "options": [{{"model_name": "simple", "model_version": "2"}}],
                "inputs": [
                    [{{"name": "INPUT0", "shape": [2], "datatype": "INT32", "data": [1, 2]}}],
                    [{{"name": "INPUT0", "shape": [1], "datatype": "BYTES", "data": ["hi"]}}]
                ],
                "outputs": [["OUTPUT0"]]
            }}"#
        )
        .unwrap();

        let batch_file = BatchFile::from_file(file.path()).unwrap();
        let batch = batch_file.to_batch().unwrap();

        assert_eq!(batch.validate().unwrap(), 2);
        assert_eq!(batch.inputs[0][0].byte_size(), 8);
        assert_eq!(batch.inputs[1][0].raw_data(), &[2, 0, 0, 0, b'h', b'i']);
        assert_eq!(batch.request(1).outputs[0].name(), "OUTPUT0");
        assert_eq!(
            batch_file.models().into_iter().collect::<Vec<_>>(),
            [("simple".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_input_without_data_is_rejected() {
        let batch_file: BatchFile = serde_json::from_str(
            r#"{"options": [{"model_name": "simple"}],
                "inputs": [[{"name": "INPUT0", "shape": [1], "datatype": "INT32"}]]}"#,
        )
        .unwrap();

        assert!(matches!(
            batch_file.to_batch(),
            Err(ClientError::InvalidInput(_))
        ));
    }
}
