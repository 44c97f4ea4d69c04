//! InferLink common library
//!
//! This crate contains the error taxonomy, configuration and metrics shared
//! by the InferLink client and tools.

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::{CarriageMode, ClientConfig};
pub use error::{ClientError, CodecError, Result, TensorFailure};
pub use metrics::{MetricsRegistry, METRICS};
