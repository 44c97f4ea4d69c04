//! Multi-request batches and completion aggregation
//!
//! A [`Batch`] groups independent requests submitted through one call.
//! Options and outputs may be given once and broadcast to every request,
//! so validation resolves the effective triple for each index before
//! anything is sent.

use crate::options::InferOptions;
use crate::tensor::{InferInput, InferRequestedOutput};
use crate::wire::InferResult;
use inferlink_common::{ClientError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Per-request outcomes, index-aligned with the batch
pub type BatchResult = Vec<Result<InferResult>>;

/// Options, inputs and outputs of one request resolved from a batch
#[derive(Debug, Clone, Copy)]
pub struct RequestRef<'a> {
    pub options: &'a InferOptions,
    pub inputs: &'a [InferInput],
    pub outputs: &'a [InferRequestedOutput],
}

/// A caller-built group of inference requests
///
/// The number of requests is `inputs.len()`. `options` holds one entry
/// for every request or a single entry for all of them; `outputs` holds
/// one list per request, a single list for all of them, or nothing, in
/// which case every request returns all model outputs.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub options: Vec<InferOptions>,
    pub inputs: Vec<Vec<InferInput>>,
    pub outputs: Vec<Vec<InferRequestedOutput>>,
}

impl Batch {
    pub fn new(
        options: Vec<InferOptions>,
        inputs: Vec<Vec<InferInput>>,
        outputs: Vec<Vec<InferRequestedOutput>>,
    ) -> Self {
        Self {
            options,
            inputs,
            outputs,
        }
    }

    /// Number of requests in the batch
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Check the options and outputs counts against the request count
    ///
    /// Returns the request count. An empty batch is always valid.
    pub fn validate(&self) -> Result<usize> {
        let requests = self.len();
        if requests == 0 {
            return Ok(0);
        }

        let options = self.options.len();
        if options != 1 && options != requests {
            return Err(ClientError::MismatchedOptionsCount { options, requests });
        }

        let outputs = self.outputs.len();
        if outputs > 1 && outputs != requests {
            return Err(ClientError::MismatchedOutputsCount { outputs, requests });
        }

        Ok(requests)
    }

    /// Effective request at `index`, with broadcast entries resolved
    ///
    /// Only meaningful on a batch that passed [`Batch::validate`].
    pub fn request(&self, index: usize) -> RequestRef<'_> {
        let options = match self.options.len() {
            1 => &self.options[0],
            _ => &self.options[index],
        };
        let outputs: &[InferRequestedOutput] = match self.outputs.len() {
            0 => &[],
            1 => &self.outputs[0],
            _ => &self.outputs[index],
        };

        RequestRef {
            options,
            inputs: &self.inputs[index],
            outputs,
        }
    }
}

type Callback<T> = Box<dyn FnOnce(Vec<T>) + Send>;

/// Tracks N outstanding exchanges and fires a callback once all are done
///
/// Results are stored by index, so the callback sees submission order
/// regardless of completion order. The callback runs exactly once, on the
/// thread that delivers the last result.
pub(crate) struct CompletionTask<T> {
    slots: Mutex<Vec<Option<T>>>,
    remaining: AtomicUsize,
    callback: Mutex<Option<Callback<T>>>,
}

impl<T> CompletionTask<T> {
    pub(crate) fn new<F>(count: usize, callback: F) -> Self
    where
        F: FnOnce(Vec<T>) + Send + 'static,
    {
        let mut slots = Vec::with_capacity(count);
        slots.resize_with(count, || None);

        Self {
            slots: Mutex::new(slots),
            remaining: AtomicUsize::new(count),
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Store the result for `index`; the last one in triggers the callback
    pub(crate) fn complete(&self, index: usize, result: T) {
        {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(index) else {
                warn!(index, "completion for unknown slot ignored");
                return;
            };
            if slot.is_some() {
                warn!(index, "duplicate completion ignored");
                return;
            }
            *slot = Some(result);
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn finish(&self) {
        let results: Vec<T> = std::mem::take(&mut *self.slots.lock())
            .into_iter()
            .flatten()
            .collect();

        if let Some(callback) = self.callback.lock().take() {
            callback(results);
        }
    }
}
