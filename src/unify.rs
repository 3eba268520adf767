//! Wide-to-long reshape of cleaned country tables and cross-country
//! concatenation into one unified dataset.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clean::CleanTable;
use crate::country::CountryProfile;

/// One price observation: (country, market, date, commodity) → price.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedObservation {
    pub profile: Arc<CountryProfile>,
    pub market: String,
    pub admin_region: Option<String>,
    pub date: NaiveDate,
    pub coordinates: Option<(f64, f64)>,
    pub currency: Option<String>,
    pub commodity: String,
    /// Local-currency price; never null.
    pub price: f64,
}

impl UnifiedObservation {
    pub fn country_code(&self) -> &str {
        &self.profile.code
    }

    pub fn country_name(&self) -> &str {
        &self.profile.name
    }
}

/// A cleaned country table paired with its reference metadata.
#[derive(Debug, Clone)]
pub struct CountryBatch {
    pub profile: CountryProfile,
    pub table: CleanTable,
}

/// Notice recorded for every country left out of a unification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipNotice {
    pub country_code: String,
    pub kind: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedTable {
    pub observations: Vec<UnifiedObservation>,
}

#[derive(Debug, Clone, Default)]
pub struct Unification {
    pub table: UnifiedTable,
    pub skipped: Vec<SkipNotice>,
}

/// Regional coverage entry: member country names and their total population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionCoverage {
    pub region: String,
    pub countries: Vec<String>,
    pub population_millions: f64,
}

impl UnifiedTable {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// True when any observation carries coordinates.
    pub fn has_coordinates(&self) -> bool {
        self.observations.iter().any(|o| o.coordinates.is_some())
    }

    /// Distinct country profiles in order of first appearance.
    pub fn countries(&self) -> Vec<Arc<CountryProfile>> {
        let mut seen = HashSet::new();
        self.observations
            .iter()
            .filter(|o| seen.insert(o.profile.code.clone()))
            .map(|o| Arc::clone(&o.profile))
            .collect()
    }

    pub fn markets(&self) -> HashSet<&str> {
        self.observations.iter().map(|o| o.market.as_str()).collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.observations.iter().map(|o| o.date).min()?;
        let max = self.observations.iter().map(|o| o.date).max()?;
        Some((min, max))
    }

    /// Rows contributed by one country, in insertion order.
    pub fn for_country<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a UnifiedObservation> {
        self.observations
            .iter()
            .filter(move |o| o.profile.code == code)
    }

    /// Population counted once per country.
    pub fn population_covered(&self) -> f64 {
        self.countries().iter().map(|p| p.population_millions).sum()
    }

    pub fn regional_coverage(&self) -> Vec<RegionCoverage> {
        let mut regions: BTreeMap<String, RegionCoverage> = BTreeMap::new();
        for profile in self.countries() {
            let entry = regions
                .entry(profile.region.clone())
                .or_insert_with(|| RegionCoverage {
                    region: profile.region.clone(),
                    countries: Vec::new(),
                    population_millions: 0.0,
                });
            entry.countries.push(profile.name.clone());
            entry.population_millions += profile.population_millions;
        }
        regions
            .into_values()
            .map(|mut r| {
                r.countries.sort();
                r
            })
            .collect()
    }

    /// Pivots one country's observations back to wide form, keyed by
    /// (market, date). Later rows overwrite earlier ones for the same key.
    pub fn to_wide(&self, code: &str) -> BTreeMap<(String, NaiveDate), BTreeMap<String, f64>> {
        let mut wide: BTreeMap<(String, NaiveDate), BTreeMap<String, f64>> = BTreeMap::new();
        for obs in self.for_country(code) {
            wide.entry((obs.market.clone(), obs.date))
                .or_default()
                .insert(obs.commodity.clone(), obs.price);
        }
        wide
    }
}

/// Reshapes one cleaned wide table into long rows, one per non-null
/// (row, commodity) cell of the table's own vocabulary.
pub fn melt(profile: &Arc<CountryProfile>, table: &CleanTable) -> Vec<UnifiedObservation> {
    let mut out = Vec::with_capacity(table.non_null_cells());
    for row in &table.rows {
        for (commodity, price) in table.commodities.iter().zip(&row.prices) {
            let Some(price) = *price else {
                continue;
            };
            out.push(UnifiedObservation {
                profile: Arc::clone(profile),
                market: row.market.clone(),
                admin_region: row.admin_region.clone(),
                date: row.date,
                coordinates: row.coordinates,
                currency: row.currency.clone(),
                commodity: commodity.clone(),
                price,
            });
        }
    }
    out
}

/// Concatenates the long form of every country named in `order`, in that
/// order.
///
/// Codes in `order` without a batch are skipped with a warning and recorded
/// in [`Unification::skipped`]. Batches not named in `order` are ignored.
#[tracing::instrument(skip_all, fields(countries = order.len()))]
pub fn unify(order: &[String], mut batches: HashMap<String, CountryBatch>) -> Unification {
    let mut unification = Unification::default();
    let mut seen = HashSet::new();

    for code in order {
        if !seen.insert(code.as_str()) {
            debug!(country = %code, "Duplicate country in order, ignoring");
            continue;
        }

        let Some(batch) = batches.remove(code) else {
            warn!(country = %code, "No cleaned table for country, skipping");
            unification.skipped.push(SkipNotice {
                country_code: code.clone(),
                kind: "missing".to_string(),
                reason: "no cleaned table supplied".to_string(),
            });
            continue;
        };

        let profile = Arc::new(batch.profile);
        let rows = melt(&profile, &batch.table);
        info!(
            country = %code,
            clean_rows = batch.table.len(),
            observations = rows.len(),
            "Country reshaped to long form"
        );
        unification.table.observations.extend(rows);
    }

    for code in batches.keys() {
        debug!(country = %code, "Country not in unification order, ignoring");
    }

    info!(
        observations = unification.table.len(),
        skipped = unification.skipped.len(),
        "Unification complete"
    );
    unification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::clean;
    use crate::country::lookup;
    use crate::source::parse_table;

    fn batch(code: &str, data: &str) -> CountryBatch {
        let schema = lookup(code).unwrap();
        let raw = parse_table(data.as_bytes(), code).unwrap();
        CountryBatch {
            profile: schema.profile(),
            table: clean(&raw, &schema.commodity_columns()).unwrap(),
        }
    }

    fn order(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    const KENYA: &str = "mkt_name,price_date,currency,maize,potatoes,sorghum\n\
        Kitui,2020-01-01,KES,30,50,\n\
        Kitui,2020-02-01,KES,,,\n\
        Mandera,2020-01-01,KES,40,,45\n";

    const SENEGAL: &str = "mkt_name,price_date,currency,maize,millet,rice,sorghum\n\
        Dakar,2020-01-01,XOF,200,,300,\n";

    #[test]
    fn test_melt_drops_null_cells() {
        let b = batch("KEN", KENYA);
        let profile = Arc::new(b.profile.clone());
        let rows = melt(&profile, &b.table);

        assert_eq!(rows.len(), 4);
        assert_eq!(rows.len(), b.table.non_null_cells());
        let labels: Vec<(&str, &str, f64)> = rows
            .iter()
            .map(|o| (o.market.as_str(), o.commodity.as_str(), o.price))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("Kitui", "maize", 30.0),
                ("Kitui", "potatoes", 50.0),
                ("Mandera", "maize", 40.0),
                ("Mandera", "sorghum", 45.0),
            ]
        );
    }

    #[test]
    fn test_unify_respects_order() {
        let mut batches = HashMap::new();
        batches.insert("KEN".to_string(), batch("KEN", KENYA));
        batches.insert("SEN".to_string(), batch("SEN", SENEGAL));

        let result = unify(&order(&["SEN", "KEN"]), batches);
        assert!(result.skipped.is_empty());
        assert_eq!(result.table.len(), 6);
        assert_eq!(result.table.observations[0].country_code(), "SEN");
        assert_eq!(result.table.observations[2].country_code(), "KEN");

        let codes: Vec<String> = result.table.countries().iter().map(|p| p.code.clone()).collect();
        assert_eq!(codes, order(&["SEN", "KEN"]));
    }

    #[test]
    fn test_unify_records_missing_country() {
        let mut batches = HashMap::new();
        batches.insert("KEN".to_string(), batch("KEN", KENYA));

        let result = unify(&order(&["KEN", "NGA"]), batches);
        assert_eq!(result.table.len(), 4);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].country_code, "NGA");
    }

    #[test]
    fn test_unify_empty_country_contributes_nothing() {
        let mut batches = HashMap::new();
        batches.insert("KEN".to_string(), batch("KEN", KENYA));
        batches.insert(
            "SEN".to_string(),
            batch("SEN", "mkt_name,price_date,maize\nDakar,2020-01-01,\n"),
        );

        let result = unify(&order(&["KEN", "SEN"]), batches);
        assert!(result.skipped.is_empty());
        assert_eq!(result.table.len(), 4);
        assert!(result.table.for_country("SEN").next().is_none());
    }

    #[test]
    fn test_unify_ignores_unlisted_and_duplicate_codes() {
        let mut batches = HashMap::new();
        batches.insert("KEN".to_string(), batch("KEN", KENYA));
        batches.insert("SEN".to_string(), batch("SEN", SENEGAL));

        let result = unify(&order(&["KEN", "KEN"]), batches);
        assert!(result.skipped.is_empty());
        assert_eq!(result.table.len(), 4);
    }

    #[test]
    fn test_to_wide_reconstructs_non_null_cells() {
        let b = batch("KEN", KENYA);
        let mut batches = HashMap::new();
        batches.insert("KEN".to_string(), b.clone());
        let result = unify(&order(&["KEN"]), batches);

        let wide = result.table.to_wide("KEN");
        for row in &b.table.rows {
            let cells = &wide[&(row.market.clone(), row.date)];
            for (commodity, price) in b.table.commodities.iter().zip(&row.prices) {
                assert_eq!(cells.get(commodity).copied(), *price);
            }
        }
    }

    #[test]
    fn test_dataset_summaries() {
        let mut batches = HashMap::new();
        batches.insert("KEN".to_string(), batch("KEN", KENYA));
        batches.insert("SEN".to_string(), batch("SEN", SENEGAL));
        let table = unify(&order(&["KEN", "SEN"]), batches).table;

        assert_eq!(table.population_covered(), 71.0);
        assert_eq!(table.markets().len(), 3);
        assert!(!table.has_coordinates());

        let regions = table.regional_coverage();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region, "East Africa");
        assert_eq!(regions[1].countries, vec!["Senegal".to_string()]);
    }
}
