//! Inference client facade
//!
//! The client owns a multi-threaded Tokio runtime. Blocking calls drive it
//! with `block_on` and must therefore not be made from inside an async
//! context; the callback forms only spawn onto it and return immediately.
//!
//! Dropping the client shuts the runtime down. Requests still in flight are
//! cancelled and their callbacks are never called.

use crate::batching::{Batch, BatchResult, CompletionTask};
use crate::dispatch::Dispatcher;
use crate::options::InferOptions;
use crate::tensor::{InferInput, InferRequestedOutput};
use crate::transport::{GrpcTransport, Transport};
use crate::wire::InferResult;
use inferlink_common::{CarriageMode, ClientConfig, ClientError, Result, METRICS};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Client for a remote inference server
pub struct InferenceClient {
    runtime: Runtime,
    dispatcher: Arc<Dispatcher>,
    config: ClientConfig,
}

impl InferenceClient {
    /// Connect to the configured endpoint over gRPC
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let runtime = build_runtime(config)?;
        let transport =
            runtime.block_on(GrpcTransport::connect(&config.endpoint, config.request_timeout()))?;

        Ok(Self::from_parts(config, runtime, Arc::new(transport)))
    }

    /// Build a client over an existing transport
    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let runtime = build_runtime(config)?;

        Ok(Self::from_parts(config, runtime, transport))
    }

    fn from_parts(config: &ClientConfig, runtime: Runtime, transport: Arc<dyn Transport>) -> Self {
        info!(
            endpoint = %config.endpoint,
            carriage = ?config.carriage,
            "inference client ready"
        );

        Self {
            runtime,
            dispatcher: Arc::new(Dispatcher::new(config, transport)),
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn carriage(&self) -> CarriageMode {
        self.config.carriage
    }

    /// Ask the server whether a model can serve requests
    pub fn is_model_ready(&self, name: &str, version: &str) -> Result<bool> {
        self.runtime
            .block_on(self.dispatcher.transport().is_model_ready(name, version))
    }

    /// Run one request and wait for its result
    pub fn infer(
        &self,
        options: &InferOptions,
        inputs: &[InferInput],
        outputs: &[InferRequestedOutput],
    ) -> Result<InferResult> {
        self.runtime
            .block_on(self.dispatcher.exchange(options, inputs, outputs))
    }

    /// Run one request in the background and hand its result to `callback`
    pub fn async_infer<F>(
        &self,
        callback: F,
        options: InferOptions,
        inputs: Vec<InferInput>,
        outputs: Vec<InferRequestedOutput>,
    ) -> Result<()>
    where
        F: FnOnce(Result<InferResult>) + Send + 'static,
    {
        let batch = Batch::new(vec![options], vec![inputs], vec![outputs]);
        self.async_infer_multi(batch, move |results| {
            let result = results
                .into_iter()
                .next()
                .unwrap_or_else(|| Err(ClientError::internal("single request produced no result")));
            callback(result)
        })
    }

    /// Run every request of `batch` in order and wait for all of them
    ///
    /// A mismatched batch is rejected before anything is sent. Otherwise
    /// each request's outcome, success or failure, lands in its own slot.
    pub fn infer_multi(&self, batch: &Batch) -> Result<BatchResult> {
        let count = self.admit(batch)?;
        let batch_id = Uuid::new_v4();
        debug!(%batch_id, requests = count, "dispatching batch sequentially");

        let results = self.runtime.block_on(async {
            let mut results = Vec::with_capacity(count);
            for index in 0..count {
                let request = batch.request(index);
                let result = self
                    .dispatcher
                    .exchange(request.options, request.inputs, request.outputs)
                    .await;
                if let Err(e) = &result {
                    warn!(%batch_id, index, error = %e, "request failed");
                }
                results.push(result);
            }
            results
        });

        debug!(%batch_id, "batch complete");
        Ok(results)
    }

    /// Submit every request of `batch` concurrently
    ///
    /// Returns once the requests are spawned. `on_complete` is called once,
    /// after the last response, with results in submission order. A
    /// mismatched batch is rejected here and `on_complete` is never called.
    ///
    /// The client must outlive the batch. Dropping it first cancels the
    /// outstanding requests and drops `on_complete` without calling it.
    pub fn async_infer_multi<F>(&self, batch: Batch, on_complete: F) -> Result<()>
    where
        F: FnOnce(BatchResult) + Send + 'static,
    {
        let count = self.admit(&batch)?;
        if count == 0 {
            on_complete(Vec::new());
            return Ok(());
        }

        let batch_id = Uuid::new_v4();
        debug!(%batch_id, requests = count, "dispatching batch concurrently");

        let batch = Arc::new(batch);
        let task = Arc::new(CompletionTask::new(count, on_complete));

        for index in 0..count {
            let batch = Arc::clone(&batch);
            let dispatcher = Arc::clone(&self.dispatcher);
            let exchange = self.runtime.spawn(async move {
                let request = batch.request(index);
                dispatcher
                    .exchange(request.options, request.inputs, request.outputs)
                    .await
            });

            let task = Arc::clone(&task);
            self.runtime.spawn(async move {
                let result = exchange
                    .await
                    .unwrap_or_else(|e| Err(ClientError::internal(format!("request task failed: {}", e))));
                if let Err(e) = &result {
                    warn!(%batch_id, index, error = %e, "request failed");
                }
                task.complete(index, result);
            });
        }

        Ok(())
    }

    fn admit(&self, batch: &Batch) -> Result<usize> {
        let validated = batch.validate();
        if !self.config.observability.enable_metrics {
            return validated;
        }

        match validated {
            Ok(count) => {
                METRICS.batches.batches_total.inc();
                METRICS.batches.batch_size.observe(count as f64);
                Ok(count)
            }
            Err(e) => {
                METRICS.batches.batches_rejected.inc();
                Err(e)
            }
        }
    }
}

fn build_runtime(config: &ClientConfig) -> Result<Runtime> {
    let mut builder = Builder::new_multi_thread();
    builder.enable_all().thread_name("inferlink-dispatch");
    if config.runtime.worker_threads > 0 {
        builder.worker_threads(config.runtime.worker_threads);
    }
    Ok(builder.build()?)
}
