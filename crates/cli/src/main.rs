//! InferLink CLI - Main Entry Point
//!
//! Runs the batch described in a JSON file against an inference server and
//! prints every request's outcome as JSON.

mod batch_file;

use anyhow::{bail, Context, Result};
use batch_file::BatchFile;
use inferlink_client::{InferResult, InferenceClient};
use inferlink_common::{ClientConfig, METRICS};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: inferlink-cli <batch.json>")?;

    // Load configuration
    let config = match std::env::var("INFERLINK_CONFIG") {
        Ok(config_path) => ClientConfig::from_file(&config_path)
            .with_context(|| format!("loading {}", config_path))?,
        Err(_) => ClientConfig::from_env()?,
    };

    init_tracing(&config);
    info!(endpoint = %config.endpoint, carriage = ?config.carriage, "Starting InferLink CLI");

    let batch_file = BatchFile::from_file(&path).with_context(|| format!("reading {}", path))?;
    let batch = batch_file.to_batch()?;

    let client = InferenceClient::connect(&config)?;

    for (model, version) in batch_file.models() {
        if !client.is_model_ready(&model, &version)? {
            bail!("model '{}' (version '{}') is not ready", model, version);
        }
    }

    info!(requests = batch.len(), "Running batch");
    let results = client.infer_multi(&batch)?;

    let report: Vec<Value> = results
        .iter()
        .enumerate()
        .map(|(index, result)| match result {
            Ok(result) => json!({ "index": index, "result": render(result) }),
            Err(e) => {
                warn!(index, error = %e, "request failed");
                json!({ "index": index, "error": e.to_string() })
            }
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&report)?);

    if config.observability.enable_metrics {
        debug!("client metrics:\n{}", METRICS.gather()?);
    }

    Ok(())
}

fn init_tracing(config: &ClientConfig) {
    let level = &config.observability.log_level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("inferlink_cli={level},inferlink_client={level}").into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.structured_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn render(result: &InferResult) -> Value {
    let outputs: Vec<Value> = result
        .outputs()
        .iter()
        .map(|output| {
            let data = result
                .as_scalars(output.name())
                .map(Value::Array)
                .unwrap_or_else(|e| json!({ "error": e.to_string() }));
            json!({
                "name": output.name(),
                "datatype": output.datatype().as_str(),
                "shape": output.shape(),
                "data": data,
            })
        })
        .collect();

    json!({
        "model_name": result.model_name(),
        "model_version": result.model_version(),
        "id": result.id(),
        "outputs": outputs,
    })
}
