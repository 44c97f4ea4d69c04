//! Tensor descriptors and datatypes
//!
//! An [`InferInput`] owns the raw bytes of one input tensor. The buffer is
//! grown by appends while the caller builds a request and is only read once
//! the descriptor is handed to the client, so a descriptor is either being
//! built (`&mut`) or being sent (`&` / moved), never both.

pub mod codec;

pub use codec::{decode_to_scalars, encode_from_scalars, expected_byte_size, split_bytes_elements};

use inferlink_common::{ClientError, CodecError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Tensor shape
pub type Shape = Vec<i64>;

/// Scalar element types a tensor may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    /// Recognized on the wire but not convertible by the codec
    Fp16,
    /// Recognized on the wire but not convertible by the codec
    Bf16,
    Fp32,
    Fp64,
    /// Variable-length, each element prefixed by a u32 little-endian length
    Bytes,
}

impl Datatype {
    /// Wire name of this datatype
    pub const fn as_str(self) -> &'static str {
        match self {
            Datatype::Bool => "BOOL",
            Datatype::Uint8 => "UINT8",
            Datatype::Uint16 => "UINT16",
            Datatype::Uint32 => "UINT32",
            Datatype::Uint64 => "UINT64",
            Datatype::Int8 => "INT8",
            Datatype::Int16 => "INT16",
            Datatype::Int32 => "INT32",
            Datatype::Int64 => "INT64",
            Datatype::Fp16 => "FP16",
            Datatype::Bf16 => "BF16",
            Datatype::Fp32 => "FP32",
            Datatype::Fp64 => "FP64",
            Datatype::Bytes => "BYTES",
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BOOL" => Some(Datatype::Bool),
            "UINT8" => Some(Datatype::Uint8),
            "UINT16" => Some(Datatype::Uint16),
            "UINT32" => Some(Datatype::Uint32),
            "UINT64" => Some(Datatype::Uint64),
            "INT8" => Some(Datatype::Int8),
            "INT16" => Some(Datatype::Int16),
            "INT32" => Some(Datatype::Int32),
            "INT64" => Some(Datatype::Int64),
            "FP16" => Some(Datatype::Fp16),
            "BF16" => Some(Datatype::Bf16),
            "FP32" => Some(Datatype::Fp32),
            "FP64" => Some(Datatype::Fp64),
            "BYTES" => Some(Datatype::Bytes),
            _ => None,
        }
    }

    /// Bytes per element, `None` for the variable-width BYTES type
    pub const fn byte_width(self) -> Option<usize> {
        match self {
            Datatype::Bool | Datatype::Uint8 | Datatype::Int8 => Some(1),
            Datatype::Uint16 | Datatype::Int16 | Datatype::Fp16 | Datatype::Bf16 => Some(2),
            Datatype::Uint32 | Datatype::Int32 | Datatype::Fp32 => Some(4),
            Datatype::Uint64 | Datatype::Int64 | Datatype::Fp64 => Some(8),
            Datatype::Bytes => None,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datatype {
    type Err = CodecError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Datatype::parse(s).ok_or_else(|| CodecError::unsupported(s))
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Native scalar types with a fixed-width wire representation
pub trait Element: Copy + sealed::Sealed {
    const DATATYPE: Datatype;
    const WIDTH: usize;

    /// Append the native-endian bytes of `self`
    fn write_ne(self, out: &mut Vec<u8>);

    /// Read one element from exactly `WIDTH` bytes
    fn read_ne(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($t:ty => $dt:expr),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}

            impl Element for $t {
                const DATATYPE: Datatype = $dt;
                const WIDTH: usize = std::mem::size_of::<$t>();

                fn write_ne(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn read_ne(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_element! {
    u8 => Datatype::Uint8,
    u16 => Datatype::Uint16,
    u32 => Datatype::Uint32,
    u64 => Datatype::Uint64,
    i8 => Datatype::Int8,
    i16 => Datatype::Int16,
    i32 => Datatype::Int32,
    i64 => Datatype::Int64,
    f32 => Datatype::Fp32,
    f64 => Datatype::Fp64,
}

impl sealed::Sealed for bool {}

impl Element for bool {
    const DATATYPE: Datatype = Datatype::Bool;
    const WIDTH: usize = 1;

    fn write_ne(self, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    fn read_ne(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Number of elements described by a shape (1 for a rank-0 tensor)
pub fn element_count(shape: &[i64]) -> std::result::Result<usize, CodecError> {
    shape
        .iter()
        .try_fold(1usize, |count, &d| count.checked_mul(d.max(0) as usize))
        .ok_or_else(|| CodecError::overflow(format!("shape {:?}", shape)))
}

fn check_shape(shape: &[i64]) -> Result<()> {
    if let Some(d) = shape.iter().find(|&&d| d < 0) {
        return Err(ClientError::invalid_input(format!(
            "shape {:?} contains negative dimension {}",
            shape, d
        )));
    }
    element_count(shape)?;
    Ok(())
}

/// One named input tensor and its raw contents
#[derive(Debug, Clone, PartialEq)]
pub struct InferInput {
    name: String,
    shape: Shape,
    datatype: Datatype,
    buffer: Vec<u8>,
}

impl InferInput {
    /// Create an empty input descriptor
    pub fn new(name: impl Into<String>, shape: Shape, datatype: Datatype) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ClientError::invalid_input("input name must not be empty"));
        }
        check_shape(&shape)?;

        Ok(Self {
            name,
            shape,
            datatype,
            buffer: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// Replace the shape, e.g. when reusing a descriptor across requests
    pub fn set_shape(&mut self, shape: Shape) -> Result<()> {
        check_shape(&shape)?;
        self.shape = shape;
        Ok(())
    }

    /// Number of elements implied by the shape
    pub fn element_count(&self) -> std::result::Result<usize, CodecError> {
        element_count(&self.shape)
    }

    /// Append raw bytes; successive appends concatenate
    ///
    /// Sizes are not checked here. A buffer that disagrees with the shape is
    /// rejected when the tensor is converted to structured text.
    pub fn append_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append typed values in native byte order
    pub fn append<T: Element>(&mut self, values: &[T]) -> Result<()> {
        if T::DATATYPE != self.datatype {
            return Err(ClientError::invalid_input(format!(
                "cannot append {} values to {} input '{}'",
                T::DATATYPE,
                self.datatype,
                self.name
            )));
        }

        self.buffer.reserve(values.len() * T::WIDTH);
        for &value in values {
            value.write_ne(&mut self.buffer);
        }
        Ok(())
    }

    /// Append BYTES elements, each with its u32 little-endian length prefix
    pub fn append_bytes<S: AsRef<[u8]>>(&mut self, elements: &[S]) -> Result<()> {
        if self.datatype != Datatype::Bytes {
            return Err(ClientError::invalid_input(format!(
                "cannot append BYTES elements to {} input '{}'",
                self.datatype, self.name
            )));
        }

        for element in elements {
            let element = element.as_ref();
            let len = u32::try_from(element.len()).map_err(|_| {
                ClientError::invalid_input(format!(
                    "BYTES element of {} bytes exceeds the u32 length prefix",
                    element.len()
                ))
            })?;
            self.buffer.extend_from_slice(&len.to_le_bytes());
            self.buffer.extend_from_slice(element);
        }
        Ok(())
    }

    /// Append structured-text values, encoded for this input's datatype
    pub fn append_scalars(&mut self, values: &[Value]) -> Result<()> {
        let encoded = encode_from_scalars(values, self.datatype)?;
        self.buffer.extend_from_slice(&encoded);
        Ok(())
    }

    /// Current length of the raw buffer
    pub fn byte_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.buffer
    }

    /// Clear the buffer so the descriptor can be refilled
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// An output the caller wants returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferRequestedOutput {
    name: String,
    class_count: usize,
    binary_data: Option<bool>,
}

impl InferRequestedOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_count: 0,
            binary_data: None,
        }
    }

    /// Request the top `class_count` classifications instead of the raw tensor
    pub fn with_class_count(mut self, class_count: usize) -> Self {
        self.class_count = class_count;
        self
    }

    /// Override the client's default output carriage for this output
    pub fn with_binary_data(mut self, binary: bool) -> Self {
        self.binary_data = Some(binary);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn binary_data(&self) -> Option<bool> {
        self.binary_data
    }
}
