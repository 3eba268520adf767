//! Multi-country orchestration.
//!
//! Countries are loaded and cleaned concurrently, bounded by a semaphore.
//! Unification starts only once every country has finished or failed, and a
//! failed country never stops the others.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info};

use crate::clean::clean;
use crate::config::PipelineConfig;
use crate::country::lookup;
use crate::error::{PipelineError, Result};
use crate::source::{fetch_bytes, parse_table};
use crate::unify::{CountryBatch, Unification, unify};

/// Result of loading a set of countries: cleaned batches and per-country
/// failures.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub batches: HashMap<String, CountryBatch>,
    pub failures: Vec<(String, PipelineError)>,
}

/// Loads and cleans one country's extract.
#[tracing::instrument(skip(config))]
pub async fn load_country(config: &PipelineConfig, code: &str) -> Result<CountryBatch> {
    let schema = lookup(code)?;
    let locator = config.source_for(schema);
    info!(source = %locator, "Loading country extract");

    let bytes = fetch_bytes(&locator).await?;
    let columns = schema.commodity_columns();
    let table = tokio::task::spawn_blocking(move || {
        let raw = parse_table(&bytes, &locator)?;
        clean(&raw, &columns)
    })
    .await??;

    Ok(CountryBatch {
        profile: schema.profile(),
        table,
    })
}

/// Upper-cases country codes and drops repeats, keeping first-seen order.
pub fn dedup_codes(codes: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

/// Loads every listed country once, at most `config.concurrency` at a time.
pub async fn load_countries(config: &PipelineConfig, codes: &[String]) -> LoadOutcome {
    let config = Arc::new(config.clone());
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let codes = dedup_codes(codes);
    let mut tasks = Vec::with_capacity(codes.len());

    for code in codes {
        let sem = semaphore.clone();
        let config = config.clone();
        let span = tracing::info_span!("load_country_task", country = %code);
        let task_code = code.clone();

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await;
                load_country(&config, &task_code).await
            }
            .instrument(span),
        );
        tasks.push((code, task));
    }

    let outcome = collect_outcome(tasks).await;
    info!(
        loaded = outcome.batches.len(),
        failed = outcome.failures.len(),
        "Country loading finished"
    );
    outcome
}

/// Awaits each country's load task. A panicked task is recorded as that
/// country's failure.
async fn collect_outcome(tasks: Vec<(String, JoinHandle<Result<CountryBatch>>)>) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();
    for (code, task) in tasks {
        match task.await {
            Ok(Ok(batch)) => {
                info!(country = %code, rows = batch.table.len(), "Country loaded");
                outcome.batches.insert(code, batch);
            }
            Ok(Err(e)) => {
                error!(country = %code, error = %e, "Country load failed");
                outcome.failures.push((code, e));
            }
            Err(e) => {
                error!(country = %code, error = %e, "Country load task panicked");
                outcome.failures.push((code, PipelineError::Task(e)));
            }
        }
    }
    outcome
}

/// Unifies loaded countries in `order`, attaching each load failure's
/// reason to the matching skip notice.
pub fn unify_loaded(order: &[String], outcome: LoadOutcome) -> Unification {
    let order = dedup_codes(order);
    let failures: HashMap<String, PipelineError> = outcome.failures.into_iter().collect();

    let mut unification = unify(&order, outcome.batches);
    for notice in &mut unification.skipped {
        if let Some(err) = failures.get(&notice.country_code) {
            notice.kind = err.kind().to_string();
            notice.reason = err.to_string();
        }
    }
    unification
}

/// Loads, cleans and unifies the listed countries.
pub async fn run(config: &PipelineConfig, codes: &[String]) -> Unification {
    let outcome = load_countries(config, codes).await;
    unify_loaded(codes, outcome)
}
