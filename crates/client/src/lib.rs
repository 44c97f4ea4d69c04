//! InferLink client library
//!
//! Encodes inference requests, dispatches them to a remote server one at a
//! time or as batches and decodes the typed results.

pub mod batching;
pub mod client;
mod dispatch;
pub mod options;
pub mod tensor;
pub mod transport;
pub mod wire;

pub use batching::{Batch, BatchResult, RequestRef};
pub use client::InferenceClient;
pub use options::InferOptions;
pub use tensor::{Datatype, Element, InferInput, InferRequestedOutput, Shape};
pub use transport::{GrpcTransport, Transport};
pub use wire::{InferOutput, InferResult, RequestAssembler, ResultDecoder};

pub use inferlink_common::{CarriageMode, ClientConfig, ClientError, CodecError, Result};
