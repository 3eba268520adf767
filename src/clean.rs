//! Per-country cleaning: date parsing, empty-row and sentinel filtering, and
//! the year-month bucket.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::source::RawTable;

pub const MARKET_COLUMN: &str = "mkt_name";
pub const DATE_COLUMN: &str = "price_date";
pub const CURRENCY_COLUMN: &str = "currency";
pub const ADMIN_COLUMN: &str = "adm1_name";
pub const LAT_COLUMN: &str = "lat";
pub const LON_COLUMN: &str = "lon";

/// Aggregate row injected by the data source; not a real market.
pub const AGGREGATE_MARKET: &str = "Market Average";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%SZ"];

/// A raw row that survived cleaning.
#[derive(Debug, Clone)]
pub struct CleanRow {
    /// Original field text, written back verbatim on save.
    pub record: StringRecord,
    pub market: String,
    pub admin_region: Option<String>,
    pub currency: Option<String>,
    pub date: NaiveDate,
    pub coordinates: Option<(f64, f64)>,
    /// One slot per entry of [`CleanTable::commodities`]; at least one is `Some`.
    pub prices: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct CleanTable {
    pub headers: StringRecord,
    pub delimiter: u8,
    /// Commodity vocabulary available for this country, in registry order.
    pub commodities: Vec<String>,
    pub rows: Vec<CleanRow>,
    pub original_rows: usize,
}

/// Non-null observation count for one commodity column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommodityAvailability {
    pub commodity: String,
    pub observations: usize,
    pub percent: f64,
}

impl CleanTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn markets(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.market.as_str()).collect()
    }

    pub fn currencies(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .filter_map(|r| r.currency.as_deref())
            .collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.rows.iter().map(|r| r.date).min()?;
        let max = self.rows.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// Number of non-null commodity cells across all rows.
    pub fn non_null_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.prices.iter().filter(|p| p.is_some()).count())
            .sum()
    }

    pub fn availability(&self) -> Vec<CommodityAvailability> {
        self.commodities
            .iter()
            .enumerate()
            .map(|(i, commodity)| {
                let observations = self.rows.iter().filter(|r| r.prices[i].is_some()).count();
                CommodityAvailability {
                    commodity: commodity.clone(),
                    observations,
                    percent: crate::stats::pct(observations, self.rows.len()),
                }
            })
            .collect()
    }
}

/// Parses a price cell. Empty or non-numeric text is missing, not an error.
pub fn parse_price(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses the date forms used by the published extracts.
pub fn parse_date(field: &str) -> Option<NaiveDate> {
    let field = field.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(field, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(field, f).ok())
                .map(|dt| dt.date())
        })
}

/// First day of the date's month.
pub fn month_bucket(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn optional_field(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Cleans one country's raw table against its candidate commodity columns.
///
/// # Errors
///
/// - [`PipelineError::SchemaMismatch`] if the market or date column is absent,
///   or none of `known_commodities` is present.
/// - [`PipelineError::ParseError`] if any row carries an unparseable date.
#[tracing::instrument(skip_all, fields(rows = raw.len()))]
pub fn clean(raw: &RawTable, known_commodities: &[String]) -> Result<CleanTable> {
    let market_idx = raw
        .column(MARKET_COLUMN)
        .ok_or_else(|| PipelineError::schema(format!("missing column `{MARKET_COLUMN}`")))?;
    let date_idx = raw
        .column(DATE_COLUMN)
        .ok_or_else(|| PipelineError::schema(format!("missing column `{DATE_COLUMN}`")))?;
    let currency_idx = raw.column(CURRENCY_COLUMN);
    let admin_idx = raw.column(ADMIN_COLUMN);
    let lat_idx = raw.column(LAT_COLUMN);
    let lon_idx = raw.column(LON_COLUMN);

    let (commodities, commodity_idx): (Vec<String>, Vec<usize>) = known_commodities
        .iter()
        .filter_map(|c| raw.column(c).map(|i| (c.clone(), i)))
        .unzip();

    if commodities.is_empty() {
        return Err(PipelineError::schema(format!(
            "none of the commodity columns {known_commodities:?} are present"
        )));
    }
    debug!(?commodities, "Available commodity columns");

    // Dates are validated for every row before filtering.
    let mut dates = Vec::with_capacity(raw.len());
    for (i, record) in raw.records.iter().enumerate() {
        let text = record.get(date_idx).unwrap_or_default();
        let date = parse_date(text).ok_or_else(|| {
            PipelineError::parse(format!("row {}: unparseable date {:?}", i + 2, text))
        })?;
        dates.push(date);
    }

    let mut rows = Vec::new();
    let mut sentinel_rows = 0usize;

    for (record, date) in raw.records.iter().zip(dates) {
        let prices: Vec<Option<f64>> = commodity_idx
            .iter()
            .map(|&i| record.get(i).and_then(parse_price))
            .collect();
        if prices.iter().all(Option::is_none) {
            continue;
        }

        let market = record.get(market_idx).unwrap_or_default().trim().to_string();
        if market == AGGREGATE_MARKET {
            sentinel_rows += 1;
            continue;
        }

        let coordinates = match (
            lat_idx.and_then(|i| record.get(i)).and_then(parse_price),
            lon_idx.and_then(|i| record.get(i)).and_then(parse_price),
        ) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };

        rows.push(CleanRow {
            record: record.clone(),
            market,
            admin_region: optional_field(record, admin_idx),
            currency: optional_field(record, currency_idx),
            date,
            coordinates,
            prices,
        });
    }

    let table = CleanTable {
        headers: raw.headers.clone(),
        delimiter: raw.delimiter,
        commodities,
        rows,
        original_rows: raw.len(),
    };

    info!(
        original_rows = table.original_rows,
        kept_rows = table.len(),
        sentinel_rows,
        markets = table.markets().len(),
        "Country table cleaned"
    );

    Ok(table)
}
