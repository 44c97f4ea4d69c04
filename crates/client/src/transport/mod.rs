//! Transport seam between the dispatcher and the network
//!
//! The dispatcher only ever needs an opaque request/response exchange and a
//! readiness probe. Connection handling, framing and deadlines belong to the
//! implementation.

mod grpc;

pub use grpc::GrpcTransport;

use async_trait::async_trait;
use bytes::Bytes;
use inferlink_common::Result;

/// Opaque exchange with an inference server
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one encoded request and wait for its encoded response
    ///
    /// Failures to reach the server are reported as
    /// [`ClientError::Transport`](inferlink_common::ClientError::Transport).
    async fn send(&self, request: Bytes) -> Result<Bytes>;

    /// Whether `name` (at `version`, empty for the server's choice) can serve requests
    async fn is_model_ready(&self, name: &str, version: &str) -> Result<bool>;
}
