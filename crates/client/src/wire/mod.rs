//! Request assembly and result decoding
//!
//! Both halves branch on the client's [`CarriageMode`]: binary carriage
//! frames the JSON header with the raw tensor bytes appended, structured
//! text puts every tensor's values in its `data` array.

mod request;
mod response;

pub use request::RequestAssembler;
pub use response::{InferOutput, InferResult, ResultDecoder};

pub use inferlink_common::CarriageMode;
