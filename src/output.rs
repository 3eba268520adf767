//! Persistence for cleaned and unified tables and JSON summaries.

use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clean::{CleanTable, parse_date};
use crate::country::CountryProfile;
use crate::error::{PipelineError, Result};
use crate::unify::{UnifiedObservation, UnifiedTable};

const UNIFIED_HEAD: &[&str] = &[
    "country_code",
    "country_name",
    "region",
    "sub_region",
    "population_millions",
    "market",
    "adm1_name",
    "date",
];
const UNIFIED_COORDS: &[&str] = &["lat", "lon"];
const UNIFIED_TAIL: &[&str] = &["currency", "commodity", "price"];

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Writes a cleaned country table with the input's header, delimiter and
/// original field text.
pub fn write_clean_table(path: impl AsRef<Path>, table: &CleanTable) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let mut writer = WriterBuilder::new()
        .delimiter(table.delimiter)
        .has_headers(false)
        .from_path(path)?;

    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(&row.record)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = table.len(), "Cleaned table written");
    Ok(())
}

/// Writes the unified long table. `lat`/`lon` columns are emitted only when
/// at least one observation has coordinates.
pub fn write_unified(path: impl AsRef<Path>, table: &UnifiedTable) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let with_coords = table.has_coordinates();
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;

    let mut header: Vec<&str> = UNIFIED_HEAD.to_vec();
    if with_coords {
        header.extend_from_slice(UNIFIED_COORDS);
    }
    header.extend_from_slice(UNIFIED_TAIL);
    writer.write_record(&header)?;

    for obs in &table.observations {
        let p = &obs.profile;
        let mut record = vec![
            p.code.clone(),
            p.name.clone(),
            p.region.clone(),
            p.sub_region.clone(),
            p.population_millions.to_string(),
            obs.market.clone(),
            obs.admin_region.clone().unwrap_or_default(),
            obs.date.format("%Y-%m-%d").to_string(),
        ];
        if with_coords {
            let (lat, lon) = obs
                .coordinates
                .map(|(lat, lon)| (lat.to_string(), lon.to_string()))
                .unwrap_or_default();
            record.push(lat);
            record.push(lon);
        }
        record.push(obs.currency.clone().unwrap_or_default());
        record.push(obs.commodity.clone());
        record.push(obs.price.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        path = %path.display(),
        rows = table.len(),
        with_coords,
        "Unified table written"
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
struct UnifiedRow {
    country_code: String,
    country_name: String,
    region: String,
    sub_region: String,
    population_millions: f64,
    market: String,
    #[serde(default)]
    adm1_name: Option<String>,
    date: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    commodity: String,
    price: f64,
}

/// Reads a unified table previously produced by [`write_unified`].
pub fn read_unified(path: impl AsRef<Path>) -> Result<UnifiedTable> {
    let path = path.as_ref();
    let label = path.display().to_string();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::NotFound(label));
        }
        Err(e) => return Err(e.into()),
    };

    let mut rdr = csv::Reader::from_reader(file);
    let mut profiles: HashMap<String, Arc<CountryProfile>> = HashMap::new();
    let mut observations = Vec::new();

    for (i, result) in rdr.deserialize().enumerate() {
        let row: UnifiedRow =
            result.map_err(|e| PipelineError::parse(format!("{label}: {e}")))?;
        let date = parse_date(&row.date).ok_or_else(|| {
            PipelineError::parse(format!("{label}: row {}: unparseable date {:?}", i + 2, row.date))
        })?;
        if !row.price.is_finite() {
            return Err(PipelineError::parse(format!(
                "{label}: row {}: non-finite price",
                i + 2
            )));
        }

        let profile = profiles
            .entry(row.country_code.clone())
            .or_insert_with(|| {
                Arc::new(CountryProfile {
                    code: row.country_code.clone(),
                    name: row.country_name.clone(),
                    region: row.region.clone(),
                    sub_region: row.sub_region.clone(),
                    population_millions: row.population_millions,
                })
            })
            .clone();

        observations.push(UnifiedObservation {
            profile,
            market: row.market,
            admin_region: row.adm1_name.filter(|s| !s.is_empty()),
            date,
            coordinates: row.lat.zip(row.lon),
            currency: row.currency.filter(|s| !s.is_empty()),
            commodity: row.commodity,
            price: row.price,
        });
    }

    debug!(path = %label, rows = observations.len(), "Unified table read");
    Ok(UnifiedTable { observations })
}

/// Serializes a value as pretty JSON to `path`.
pub fn write_json(path: impl AsRef<Path>, value: &impl Serialize) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    info!(path = %path.display(), "JSON summary written");
    Ok(())
}
