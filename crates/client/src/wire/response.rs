//! Wire response decoding and the decoded result set

use crate::tensor::{
    decode_to_scalars, element_count, encode_from_scalars, expected_byte_size, split_bytes_elements,
    Datatype, Element, Shape,
};
use inferlink_common::{CarriageMode, ClientError, CodecError, Result, TensorFailure};
use inferlink_proto::{binary_data_size, split_frame, InferResponseHeader, OutputTensor, Parameters};
use serde_json::Value;
use tracing::trace;

/// One decoded output tensor, always held as raw bytes
#[derive(Debug, Clone, PartialEq)]
pub struct InferOutput {
    name: String,
    datatype: Datatype,
    shape: Shape,
    data: Vec<u8>,
}

impl InferOutput {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    pub fn element_count(&self) -> std::result::Result<usize, CodecError> {
        element_count(&self.shape)
    }
}

/// Successful outcome of one inference request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferResult {
    model_name: String,
    model_version: String,
    id: String,
    parameters: Parameters,
    outputs: Vec<InferOutput>,
}

impl InferResult {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Request id echoed by the server
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Outputs in the order the server returned them
    pub fn outputs(&self) -> &[InferOutput] {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Option<&InferOutput> {
        self.outputs.iter().find(|output| output.name == name)
    }

    pub fn raw_data(&self, name: &str) -> Result<&[u8]> {
        self.require(name).map(InferOutput::raw_data)
    }

    pub fn shape(&self, name: &str) -> Result<&[i64]> {
        self.require(name).map(InferOutput::shape)
    }

    pub fn datatype(&self, name: &str) -> Result<Datatype> {
        self.require(name).map(InferOutput::datatype)
    }

    /// Output values as structured-text scalars
    pub fn as_scalars(&self, name: &str) -> Result<Vec<Value>> {
        let output = self.require(name)?;
        Ok(decode_to_scalars(
            &output.data,
            output.element_count()?,
            output.datatype,
        )?)
    }

    /// Output values as native elements
    pub fn as_vec<T: Element>(&self, name: &str) -> Result<Vec<T>> {
        let output = self.require(name)?;
        if output.datatype != T::DATATYPE {
            return Err(ClientError::invalid_input(format!(
                "output '{}' is {}, not {}",
                name,
                output.datatype,
                T::DATATYPE
            )));
        }

        let count = output.element_count()?;
        let expected = count
            .checked_mul(T::WIDTH)
            .ok_or_else(|| CodecError::overflow(format!("{} elements of {} bytes", count, T::WIDTH)))?;
        if output.data.len() != expected {
            return Err(CodecError::SizeMismatch {
                expected,
                actual: output.data.len(),
            }
            .into());
        }

        Ok(output.data.chunks_exact(T::WIDTH).map(T::read_ne).collect())
    }

    /// Contents of each element of a BYTES output
    pub fn as_bytes_elements(&self, name: &str) -> Result<Vec<Vec<u8>>> {
        let output = self.require(name)?;
        if output.datatype != Datatype::Bytes {
            return Err(ClientError::invalid_input(format!(
                "output '{}' is {}, not BYTES",
                name, output.datatype
            )));
        }

        let elements = split_bytes_elements(&output.data, output.element_count()?)?;
        Ok(elements.into_iter().map(<[u8]>::to_vec).collect())
    }

    fn require(&self, name: &str) -> Result<&InferOutput> {
        self.output(name)
            .ok_or_else(|| ClientError::invalid_input(format!("no output named '{}'", name)))
    }
}

/// Parses one wire response into an [`InferResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultDecoder {
    carriage: CarriageMode,
}

impl ResultDecoder {
    pub fn new(carriage: CarriageMode) -> Self {
        Self { carriage }
    }

    /// Decode a response in this decoder's carriage mode
    ///
    /// Outputs that cannot be decoded are all reported together in one
    /// [`ClientError::TensorConversion`].
    pub fn decode(&self, response: &[u8]) -> Result<InferResult> {
        let (header, body) = match self.carriage {
            CarriageMode::Binary => {
                split_frame(response).map_err(|e| ClientError::server(format!("malformed response: {}", e)))?
            }
            CarriageMode::StructuredText => (response, &[][..]),
        };

        let header: InferResponseHeader = serde_json::from_slice(header)?;
        if let Some(error) = header.error {
            return Err(ClientError::Server(error));
        }

        let mut outputs = Vec::with_capacity(header.outputs.len());
        let mut failures = Vec::new();
        let mut offset = 0;

        for tensor in header.outputs {
            let name = tensor.name.clone();
            match decode_output(tensor, body, &mut offset) {
                Ok(output) => outputs.push(output),
                Err(error) => failures.push(TensorFailure { tensor: name, error }),
            }
        }

        if !failures.is_empty() {
            return Err(ClientError::TensorConversion(failures));
        }
        if offset != body.len() {
            return Err(CodecError::SizeMismatch {
                expected: offset,
                actual: body.len(),
            }
            .into());
        }

        trace!(model = %header.model_name, outputs = outputs.len(), "decoded response");

        Ok(InferResult {
            model_name: header.model_name,
            model_version: header.model_version,
            id: header.id,
            parameters: header.parameters,
            outputs,
        })
    }
}

fn decode_output(
    tensor: OutputTensor,
    body: &[u8],
    offset: &mut usize,
) -> std::result::Result<InferOutput, CodecError> {
    // Claim the binary slice first so later outputs stay aligned
    let binary = match binary_data_size(&tensor.parameters) {
        Some(size) => {
            let start = *offset;
            let end = start.saturating_add(size as usize);
            *offset = end;
            Some(body.get(start..end).ok_or(CodecError::SizeMismatch {
                expected: end,
                actual: body.len(),
            })?)
        }
        None => None,
    };

    let datatype: Datatype = tensor.datatype.parse()?;

    let data = match (binary, tensor.data) {
        (Some(bytes), _) => bytes.to_vec(),
        (None, Some(values)) => {
            let data = encode_from_scalars(&values, datatype)?;
            let count = element_count(&tensor.shape)?;
            match expected_byte_size(datatype, count)? {
                Some(expected) if expected != data.len() => {
                    return Err(CodecError::SizeMismatch {
                        expected,
                        actual: data.len(),
                    })
                }
                None if values.len() != count => {
                    return Err(CodecError::malformed(
                        datatype.as_str(),
                        format!("{} elements for shape {:?}", values.len(), tensor.shape),
                    ))
                }
                _ => data,
            }
        }
        (None, None) => {
            return Err(CodecError::malformed(
                datatype.as_str(),
                "output carries neither binary data nor a data array",
            ))
        }
    };

    Ok(InferOutput {
        name: tensor.name,
        datatype,
        shape: tensor.shape,
        data,
    })
}
