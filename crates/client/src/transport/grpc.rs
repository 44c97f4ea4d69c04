//! gRPC transport carrying opaque request bytes

use super::Transport;
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use inferlink_common::{ClientError, Result};
use inferlink_proto::{ModelReadyRequest, ModelReadyResponse, INFER_PATH, MODEL_READY_PATH};
use std::time::Duration;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::{debug, info};

/// Unary gRPC calls whose messages are passed through untouched
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    channel: Channel,
    endpoint: String,
}

impl GrpcTransport {
    /// Connect to `endpoint`, applying `timeout` as the per-call deadline
    pub async fn connect(endpoint: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| ClientError::transport(format!("invalid endpoint '{}': {}", endpoint, e)))?
            .timeout(timeout)
            .connect()
            .await
            .map_err(|e| ClientError::transport(format!("failed to connect to {}: {}", endpoint, e)))?;

        info!(endpoint, "connected to inference server");

        Ok(Self {
            channel,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn unary(&self, path: &'static str, message: Bytes) -> Result<Bytes> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| ClientError::transport(format!("{} not ready: {}", self.endpoint, e)))?;

        let response = grpc
            .unary(
                tonic::Request::new(message),
                PathAndQuery::from_static(path),
                RawCodec,
            )
            .await
            .map_err(status_error)?;

        Ok(response.into_inner())
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn send(&self, request: Bytes) -> Result<Bytes> {
        debug!(bytes = request.len(), "sending inference request");
        self.unary(INFER_PATH, request).await
    }

    async fn is_model_ready(&self, name: &str, version: &str) -> Result<bool> {
        let request = serde_json::to_vec(&ModelReadyRequest {
            name: name.to_string(),
            version: version.to_string(),
        })?;

        let response = self.unary(MODEL_READY_PATH, Bytes::from(request)).await?;
        let response: ModelReadyResponse = serde_json::from_slice(&response)?;
        Ok(response.ready)
    }
}

/// Unreachable-server codes are transport failures, anything else was decided by the server
fn status_error(status: Status) -> ClientError {
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled | Code::Unknown => {
            ClientError::transport(format!("{:?}: {}", status.code(), status.message()))
        }
        code => ClientError::server(format!("{:?}: {}", code, status.message())),
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Bytes, dst: &mut EncodeBuf<'_>) -> std::result::Result<(), Status> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> std::result::Result<Option<Bytes>, Status> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_endpoint_is_a_transport_error() {
        let err = GrpcTransport::connect("not a uri", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_transport_error() {
        let err = GrpcTransport::connect("http://127.0.0.1:1", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(Status::unavailable("down")).is_transport());
        assert!(status_error(Status::deadline_exceeded("slow")).is_transport());
        assert!(matches!(
            status_error(Status::invalid_argument("bad shape")),
            ClientError::Server(msg) if msg.contains("bad shape")
        ));
    }
}
