//! One request's assemble, send and decode round trip

use crate::options::InferOptions;
use crate::tensor::{InferInput, InferRequestedOutput};
use crate::transport::Transport;
use crate::wire::{InferResult, RequestAssembler, ResultDecoder};
use bytes::Bytes;
use inferlink_common::{ClientConfig, Result, METRICS};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Shared by every in-flight exchange of a client
pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    assembler: RequestAssembler,
    decoder: ResultDecoder,
    metrics_enabled: bool,
}

impl Dispatcher {
    pub(crate) fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            assembler: RequestAssembler::new(config.carriage, config.binary_outputs),
            decoder: ResultDecoder::new(config.carriage),
            metrics_enabled: config.observability.enable_metrics,
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run one request end to end, recording client metrics
    pub(crate) async fn exchange(
        &self,
        options: &InferOptions,
        inputs: &[InferInput],
        outputs: &[InferRequestedOutput],
    ) -> Result<InferResult> {
        if !self.metrics_enabled {
            return self.round_trip(options, inputs, outputs).await;
        }

        let metrics = &METRICS.requests;
        metrics.requests_total.inc();
        metrics.in_flight.inc();
        let start = Instant::now();

        let result = self.round_trip(options, inputs, outputs).await;

        metrics.in_flight.dec();
        metrics.request_duration.observe(start.elapsed().as_secs_f64());
        match &result {
            Ok(_) => metrics.requests_success.inc(),
            Err(e) => {
                metrics.requests_failed.inc();
                metrics.codec_failures.inc_by(e.codec_failures().len() as u64);
            }
        }

        result
    }

    async fn round_trip(
        &self,
        options: &InferOptions,
        inputs: &[InferInput],
        outputs: &[InferRequestedOutput],
    ) -> Result<InferResult> {
        let request = self.assembler.assemble(options, inputs, outputs)?;
        debug!(
            model = %options.model_name,
            version = %options.model_version,
            bytes = request.len(),
            "dispatching request"
        );

        let response = self.transport.send(Bytes::from(request)).await?;
        trace!(bytes = response.len(), "received response");

        self.decoder.decode(&response)
    }
}
