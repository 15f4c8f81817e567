//! Threshold Search
//!
//! Scores a labeled JSON-lines file with an exported model, sweeps decision
//! thresholds and reports the best one. With `--write` the chosen threshold
//! and its evaluation are stored in the model metadata file.
//!
//! Usage: threshold-search <model.onnx> <labeled.jsonl> [metric] [--write]

use anyhow::{bail, Context, Result};
use cross_sell_scoring::models::{ModelMetadata, ScoringEngine};
use cross_sell_scoring::threshold::ThresholdMetric;
use cross_sell_scoring::types::{LabeledRecord, RawCustomerRecord};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Used only to build the engine; the sweep ignores it.
const PLACEHOLDER_THRESHOLD: f64 = 0.5;

fn read_labeled<P: AsRef<Path>>(path: P) -> Result<Vec<LabeledRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<RawCustomerRecord>(&line)
            .map_err(anyhow::Error::from)
            .and_then(|raw| LabeledRecord::from_raw(raw).map_err(anyhow::Error::from));
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = line_no + 1, error = %e, "Skipping unreadable record"),
        }
    }
    Ok(records)
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("threshold_search=info".parse()?)
                .add_directive("cross_sell_scoring=warn".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let write = args.iter().any(|a| a == "--write");
    let positional: Vec<&str> = args
        .iter()
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect();

    let (model_path, data_path) = match positional.as_slice() {
        [model, data, ..] => (*model, *data),
        _ => bail!("usage: threshold-search <model.onnx> <labeled.jsonl> [metric] [--write]"),
    };
    let metric: ThresholdMetric = match positional.get(2) {
        Some(m) => m.parse().map_err(anyhow::Error::msg)?,
        None => ThresholdMetric::default(),
    };

    let engine = ScoringEngine::load(model_path, None, 1, PLACEHOLDER_THRESHOLD)?;
    let records = read_labeled(data_path)?;
    info!(
        model = %engine.model_name(),
        records = records.len(),
        metric = %metric,
        "Searching threshold"
    );

    let search = engine.search_threshold(&records, metric)?;
    let evaluation = engine.evaluate(&records, Some(search.best_threshold))?;

    println!("threshold  precision  recall     f1         accuracy");
    for point in &search.sweep {
        let marker = if point.threshold == search.best_threshold { " <" } else { "" };
        println!(
            "{:<10.2} {:<10.4} {:<10.4} {:<10.4} {:<10.4}{}",
            point.threshold, point.precision, point.recall, point.f1, point.accuracy, marker
        );
    }
    println!();
    println!(
        "best threshold by {}: {:.2} (score {:.4}, {} samples)",
        metric, search.best_threshold, search.best_score, search.samples
    );
    if let Some(auc) = evaluation.auc_roc {
        println!("roc auc: {:.4}", auc);
    }

    if write {
        let metadata_path = ModelMetadata::path_for_model(model_path);
        let mut metadata = engine.metadata().clone();
        metadata.threshold = Some(search.best_threshold);
        metadata.validation_metrics = Some(evaluation);
        metadata.save(&metadata_path)?;
        info!(path = %metadata_path.display(), "Threshold written to model metadata");
    }

    Ok(())
}
