//! CLI entry point for PricePulse.
//!
//! Provides subcommands for cleaning a single country's extract, unifying
//! several countries into one long-format dataset, and summarizing a
//! unified dataset by arbitrary group keys.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pricepulse::aggregate::{GroupKey, GroupedSummary, PriceSpread, aggregate_rows};
use pricepulse::config::{PipelineConfig, parse_source_override};
use pricepulse::country::{self, CountrySchema, REGISTRY};
use pricepulse::geo::{NAIROBI, market_distances};
use pricepulse::output::{read_unified, write_clean_table, write_json, write_unified};
use pricepulse::pipeline::{dedup_codes, load_countries, load_country, unify_loaded};
use pricepulse::report::{CleanReport, DatasetReport, DistanceReport, GroupReport};
use pricepulse::unify::{CountryBatch, unify};
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "pricepulse")]
#[command(about = "Clean and unify per-country food price extracts", long_about = None)]
struct Cli {
    /// Directory holding the raw per-country extracts
    #[arg(long, global = true, value_name = "DIR")]
    raw_dir: Option<PathBuf>,

    /// Directory for cleaned and unified outputs
    #[arg(long, global = true, value_name = "DIR")]
    processed_dir: Option<PathBuf>,

    /// Override one country's input, e.g. `KEN=raw/kenya.csv` or a URL
    #[arg(long = "source", global = true, value_name = "CODE=LOCATOR", value_parser = parse_source_override)]
    sources: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean one country's extract and save the cleaned table
    Clean {
        /// Country code, e.g. KEN
        #[arg(value_name = "CODE")]
        country: String,

        /// Decimal places in the printed market summary
        #[arg(short, long, default_value_t = 2)]
        precision: usize,
    },
    /// Clean several countries and concatenate them into one long table
    Unify {
        /// Country codes in output order (defaults to every known country)
        #[arg(short, long, value_delimiter = ',')]
        countries: Vec<String>,

        /// Maximum number of countries loaded at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Do not write the per-country cleaned tables
        #[arg(long, default_value_t = false)]
        no_clean_output: bool,
    },
    /// Print grouped statistics for a unified table
    Summarize {
        /// Unified CSV (defaults to the processed directory's unified file)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Group keys: country, commodity, market, year_month, month
        #[arg(short, long, value_delimiter = ',', default_value = "country,commodity")]
        group_by: Vec<GroupKey>,

        /// Only include this commodity
        #[arg(long)]
        commodity: Option<String>,

        /// Only include this country code
        #[arg(long)]
        country: Option<String>,

        /// Decimal places for display
        #[arg(short, long, default_value_t = 2)]
        precision: u32,

        /// Length of the volatility ranking
        #[arg(short, long, default_value_t = 5)]
        top: usize,

        /// Also write the rounded summary as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Print each market's rough distance from Nairobi
        #[arg(long, default_value_t = false)]
        distances: bool,
    },
    /// List the countries and commodity vocabularies known to the registry
    Countries,
}

#[derive(Serialize)]
struct SummaryJson {
    input: String,
    observations: usize,
    summary: GroupedSummary,
    spread: Option<PriceSpread>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/pricepulse.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("pricepulse.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = PipelineConfig::from_env()
        .with_raw_dir(cli.raw_dir)
        .with_processed_dir(cli.processed_dir)
        .with_sources(cli.sources);

    match cli.command {
        Commands::Clean { country, precision } => {
            clean_country(&config, &country, precision).await?;
        }
        Commands::Unify {
            countries,
            concurrency,
            no_clean_output,
        } => {
            let codes = if countries.is_empty() {
                country::all_codes()
            } else {
                countries
            };
            let config = config.with_concurrency(concurrency);
            unify_countries(&config, &codes, !no_clean_output).await?;
        }
        Commands::Summarize {
            input,
            group_by,
            commodity,
            country,
            precision,
            top,
            json,
            distances,
        } => {
            let input = input.unwrap_or_else(|| config.unified_output());
            let table = read_unified(&input)
                .with_context(|| format!("reading unified table {}", input.display()))?;

            let rows: Vec<_> = table
                .observations
                .iter()
                .filter(|o| commodity.as_deref().is_none_or(|c| o.commodity == c))
                .filter(|o| {
                    country
                        .as_deref()
                        .is_none_or(|c| o.country_code().eq_ignore_ascii_case(c))
                })
                .collect();
            info!(
                input = %input.display(),
                total = table.len(),
                selected = rows.len(),
                "Summarizing unified table"
            );

            let summary = aggregate_rows(rows.iter().copied(), &group_by);
            print!(
                "{}",
                GroupReport {
                    summary: &summary,
                    precision: precision as usize,
                    top,
                }
            );

            if distances {
                let found = market_distances(rows.iter().copied(), NAIROBI);
                println!();
                print!(
                    "{}",
                    DistanceReport {
                        reference_name: "Nairobi",
                        distances: &found,
                    }
                );
            }

            if let Some(path) = json {
                let rounded = summary.rounded(precision);
                let spread = rounded.price_spread();
                let doc = SummaryJson {
                    input: input.display().to_string(),
                    observations: rows.len(),
                    summary: rounded,
                    spread,
                };
                write_json(&path, &doc)?;
            }
        }
        Commands::Countries => {
            for schema in REGISTRY {
                println!(
                    "{} {:<12} {:<16} {:<20} {:>6.0}M  {}",
                    schema.code,
                    schema.name,
                    schema.region,
                    schema.sub_region,
                    schema.population_millions,
                    schema.commodities.join(", ")
                );
            }
        }
    }

    Ok(())
}

/// Loads, cleans and saves one country, then prints its summary.
#[tracing::instrument(skip(config))]
async fn clean_country(config: &PipelineConfig, code: &str, precision: usize) -> Result<()> {
    let schema = country::lookup(code)?;
    let batch = match load_country(config, schema.code).await {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "Country clean failed, no output written");
            return Err(e.into());
        }
    };

    let output = config.clean_output_for(schema);
    write_clean_table(&output, &batch.table)
        .with_context(|| format!("writing {}", output.display()))?;

    let markets = market_summary(&batch);
    print!(
        "{}",
        CleanReport {
            profile: &batch.profile,
            table: &batch.table,
            markets: &markets,
            precision,
        }
    );
    println!();
    println!(
        "{} data cleaned and saved to {}",
        batch.profile.name,
        output.display()
    );
    Ok(())
}

/// Market × commodity statistics for a single cleaned country.
fn market_summary(batch: &CountryBatch) -> GroupedSummary {
    let code = batch.profile.code.clone();
    let mut batches = HashMap::new();
    batches.insert(code.clone(), batch.clone());
    let single = unify(&[code], batches);
    aggregate_rows(
        &single.table.observations,
        &[GroupKey::Market, GroupKey::Commodity],
    )
}

/// Loads and cleans every listed country, unifies the survivors and writes
/// the unified table.
#[tracing::instrument(skip(config))]
async fn unify_countries(config: &PipelineConfig, codes: &[String], write_clean: bool) -> Result<()> {
    let codes = dedup_codes(codes);
    let outcome = load_countries(config, &codes).await;

    if write_clean {
        for (code, batch) in &outcome.batches {
            let schema = country::lookup(code)?;
            let path = config.clean_output_for(schema);
            if let Err(e) = write_clean_table(&path, &batch.table) {
                error!(country = %code, error = %e, "Failed to write cleaned table");
            }
        }
    }

    let loaded: Vec<&CountrySchema> = codes
        .iter()
        .filter(|c| outcome.batches.contains_key(c.as_str()))
        .filter_map(|c| country::lookup(c).ok())
        .collect();
    let shared = country::shared_commodities(&loaded);

    let unification = unify_loaded(&codes, outcome);
    let output = config.unified_output();
    write_unified(&output, &unification.table)
        .with_context(|| format!("writing {}", output.display()))?;

    print!(
        "{}",
        DatasetReport {
            unification: &unification,
            shared: &shared,
        }
    );
    println!();
    println!(
        "Unified dataset saved: {} ({} observations)",
        output.display(),
        unification.table.len()
    );
    Ok(())
}
