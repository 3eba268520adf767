//! Grouped descriptive statistics over the unified table.
//!
//! Groups are keyed by an ordered subset of [`GroupKey`] and enumerate in
//! ascending key order. Values within a group are summed in sorted order, so
//! results do not depend on the order of input rows.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::clean::month_bucket;
use crate::stats::{mean, round_to, sample_stddev};
use crate::unify::{UnifiedObservation, UnifiedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Country,
    Commodity,
    Market,
    YearMonth,
    /// Calendar month of year, for seasonal patterns.
    Month,
}

impl GroupKey {
    fn value(self, obs: &UnifiedObservation) -> String {
        match self {
            GroupKey::Country => obs.country_code().to_string(),
            GroupKey::Commodity => obs.commodity.clone(),
            GroupKey::Market => obs.market.clone(),
            GroupKey::YearMonth => month_bucket(obs.date).format("%Y-%m").to_string(),
            GroupKey::Month => format!("{:02}", obs.date.month()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupKey::Country => "country",
            GroupKey::Commodity => "commodity",
            GroupKey::Market => "market",
            GroupKey::YearMonth => "year_month",
            GroupKey::Month => "month",
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "country" => Ok(GroupKey::Country),
            "commodity" => Ok(GroupKey::Commodity),
            "market" => Ok(GroupKey::Market),
            "year_month" | "year-month" => Ok(GroupKey::YearMonth),
            "month" => Ok(GroupKey::Month),
            other => Err(format!(
                "unknown group key `{other}` (expected country, commodity, market, year_month or month)"
            )),
        }
    }
}

/// Descriptive statistics for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` when `count < 2`.
    pub std: Option<f64>,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

impl GroupStats {
    /// Copy with mean and std rounded for display.
    pub fn rounded(&self, precision: u32) -> GroupStats {
        GroupStats {
            mean: round_to(self.mean, precision),
            std: self.std.map(|s| round_to(s, precision)),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: Vec<String>,
    pub stats: GroupStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedSummary {
    pub keys: Vec<GroupKey>,
    pub groups: Vec<GroupSummary>,
}

/// Gap between the most and least expensive groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSpread {
    pub highest: GroupSummary,
    pub lowest: GroupSummary,
    pub difference: f64,
    /// Difference relative to the lowest mean; `None` when that mean is zero.
    pub percent: Option<f64>,
}

impl GroupedSummary {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &[&str]) -> Option<&GroupStats> {
        self.groups
            .iter()
            .find(|g| g.key.iter().map(String::as_str).eq(key.iter().copied()))
            .map(|g| &g.stats)
    }

    /// Copy with every group's statistics rounded for display.
    pub fn rounded(&self, precision: u32) -> GroupedSummary {
        GroupedSummary {
            keys: self.keys.clone(),
            groups: self
                .groups
                .iter()
                .map(|g| GroupSummary {
                    key: g.key.clone(),
                    stats: g.stats.rounded(precision),
                })
                .collect(),
        }
    }

    /// Group with the highest mean; ties go to the first in enumeration order.
    pub fn highest_mean(&self) -> Option<&GroupSummary> {
        self.groups.iter().fold(None::<&GroupSummary>, |best, g| match best {
            Some(b) if b.stats.mean >= g.stats.mean => Some(b),
            _ => Some(g),
        })
    }

    /// Group with the lowest mean; ties go to the first in enumeration order.
    pub fn lowest_mean(&self) -> Option<&GroupSummary> {
        self.groups.iter().fold(None::<&GroupSummary>, |best, g| match best {
            Some(b) if b.stats.mean <= g.stats.mean => Some(b),
            _ => Some(g),
        })
    }

    /// Groups by descending standard deviation. Undefined deviations rank last.
    pub fn volatility_ranking(&self) -> Vec<&GroupSummary> {
        let mut ranked: Vec<&GroupSummary> = self.groups.iter().collect();
        ranked.sort_by(|a, b| match (a.stats.std, b.stats.std) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        ranked
    }

    pub fn price_spread(&self) -> Option<PriceSpread> {
        let highest = self.highest_mean()?.clone();
        let lowest = self.lowest_mean()?.clone();
        let difference = highest.stats.mean - lowest.stats.mean;
        let percent = (lowest.stats.mean != 0.0).then(|| difference / lowest.stats.mean * 100.0);
        Some(PriceSpread {
            highest,
            lowest,
            difference,
            percent,
        })
    }
}

/// Aggregates the whole unified table.
pub fn aggregate(table: &UnifiedTable, keys: &[GroupKey]) -> GroupedSummary {
    aggregate_rows(&table.observations, keys)
}

/// Aggregates any selection of observations.
///
/// # Panics
///
/// Panics if an observation carries a non-finite price; the unified table
/// never produces one.
pub fn aggregate_rows<'a, I>(rows: I, keys: &[GroupKey]) -> GroupedSummary
where
    I: IntoIterator<Item = &'a UnifiedObservation>,
{
    let mut buckets: BTreeMap<Vec<String>, (Vec<f64>, NaiveDate, NaiveDate)> = BTreeMap::new();

    for obs in rows {
        assert!(
            obs.price.is_finite(),
            "non-finite price in unified table: {} {} {}",
            obs.country_code(),
            obs.market,
            obs.commodity
        );
        let key: Vec<String> = keys.iter().map(|k| k.value(obs)).collect();
        let entry = buckets
            .entry(key)
            .or_insert_with(|| (Vec::new(), obs.date, obs.date));
        entry.0.push(obs.price);
        entry.1 = entry.1.min(obs.date);
        entry.2 = entry.2.max(obs.date);
    }

    let groups = buckets
        .into_iter()
        .filter_map(|(key, (mut values, first_date, last_date))| {
            values.sort_by(f64::total_cmp);
            let avg = mean(&values)?;
            Some(GroupSummary {
                key,
                stats: GroupStats {
                    count: values.len(),
                    mean: avg,
                    std: sample_stddev(&values, avg),
                    first_date,
                    last_date,
                },
            })
        })
        .collect();

    GroupedSummary {
        keys: keys.to_vec(),
        groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::country::lookup;
    use std::sync::Arc;

    fn obs(code: &str, market: &str, date: &str, commodity: &str, price: f64) -> UnifiedObservation {
        UnifiedObservation {
            profile: Arc::new(lookup(code).unwrap().profile()),
            market: market.to_string(),
            admin_region: None,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            coordinates: None,
            currency: None,
            commodity: commodity.to_string(),
            price,
        }
    }

    fn table(rows: Vec<UnifiedObservation>) -> UnifiedTable {
        UnifiedTable { observations: rows }
    }

    fn sample() -> UnifiedTable {
        table(vec![
            obs("KEN", "Kitui", "2020-01-01", "maize", 30.0),
            obs("KEN", "Kitui", "2020-02-01", "maize", 34.0),
            obs("KEN", "Mandera", "2020-01-01", "maize", 50.0),
            obs("KEN", "Mandera", "2020-01-15", "sorghum", 45.0),
            obs("SEN", "Dakar", "2020-01-01", "maize", 200.0),
            obs("SEN", "Dakar", "2020-02-01", "maize", 210.0),
            obs("SEN", "Dakar", "2020-03-01", "maize", 190.0),
        ])
    }

    #[test]
    fn test_group_key_parse() {
        assert_eq!("Country".parse::<GroupKey>(), Ok(GroupKey::Country));
        assert_eq!("year-month".parse::<GroupKey>(), Ok(GroupKey::YearMonth));
        assert!("region".parse::<GroupKey>().is_err());
    }

    #[test]
    fn test_single_observation_has_no_std() {
        let summary = aggregate(&sample(), &[GroupKey::Market, GroupKey::Commodity]);
        let stats = summary.get(&["Mandera", "sorghum"]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, 45.0);
        assert_eq!(stats.std, None);
    }

    #[test]
    fn test_identical_prices_have_zero_std() {
        let t = table(vec![
            obs("KEN", "Kitui", "2020-01-01", "maize", 30.0),
            obs("KEN", "Kitui", "2020-02-01", "maize", 30.0),
        ]);
        let summary = aggregate(&t, &[GroupKey::Market]);
        assert_eq!(summary.get(&["Kitui"]).unwrap().std, Some(0.0));
    }

    #[test]
    fn test_group_by_country_and_commodity() {
        let summary = aggregate(&sample(), &[GroupKey::Country, GroupKey::Commodity]);
        assert_eq!(summary.len(), 3);

        let keys: Vec<Vec<String>> = summary.groups.iter().map(|g| g.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                vec!["KEN".to_string(), "maize".to_string()],
                vec!["KEN".to_string(), "sorghum".to_string()],
                vec!["SEN".to_string(), "maize".to_string()],
            ]
        );

        let sen = summary.get(&["SEN", "maize"]).unwrap();
        assert_eq!(sen.count, 3);
        assert_eq!(sen.mean, 200.0);
        assert_eq!(sen.std, Some(10.0));
        assert_eq!(sen.first_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(sen.last_date, NaiveDate::from_ymd_opt(2020, 3, 1).unwrap());
    }

    #[test]
    fn test_group_by_year_month_and_month() {
        let summary = aggregate(&sample(), &[GroupKey::YearMonth]);
        assert_eq!(summary.get(&["2020-01"]).unwrap().count, 4);

        let mut rows = sample().observations;
        rows.push(obs("KEN", "Kitui", "2020-01-31", "maize", 32.0));
        let summary = aggregate(&table(rows), &[GroupKey::YearMonth]);
        let january = summary.get(&["2020-01"]).unwrap();
        assert_eq!(january.count, 5);
        assert_eq!(january.last_date, NaiveDate::from_ymd_opt(2020, 1, 31).unwrap());

        let seasonal = aggregate(&sample(), &[GroupKey::Month]);
        assert_eq!(seasonal.get(&["03"]).unwrap().count, 1);
    }

    #[test]
    fn test_empty_keys_is_one_group() {
        let summary = aggregate(&sample(), &[]);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary.groups[0].stats.count, 7);
    }

    #[test]
    fn test_empty_table() {
        let summary = aggregate(&UnifiedTable::default(), &[GroupKey::Country]);
        assert!(summary.is_empty());
        assert!(summary.highest_mean().is_none());
        assert!(summary.price_spread().is_none());
    }

    #[test]
    fn test_order_independence() {
        let forward = sample();
        let mut reversed = sample();
        reversed.observations.reverse();
        reversed.observations.swap(0, 3);

        let keys = [GroupKey::Country, GroupKey::Commodity, GroupKey::Market];
        assert_eq!(aggregate(&forward, &keys), aggregate(&reversed, &keys));
    }

    #[test]
    fn test_rounding_keeps_raw_values() {
        let t = table(vec![
            obs("KEN", "Kitui", "2020-01-01", "maize", 1.0),
            obs("KEN", "Kitui", "2020-02-01", "maize", 2.0),
            obs("KEN", "Kitui", "2020-03-01", "maize", 2.0),
        ]);
        let summary = aggregate(&t, &[GroupKey::Market]);
        let rounded = summary.rounded(2);

        assert_eq!(rounded.groups[0].stats.mean, 1.67);
        assert!((summary.groups[0].stats.mean - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(rounded.groups[0].stats.std, Some(0.58));
    }

    #[test]
    fn test_highest_and_lowest_mean_ties() {
        let t = table(vec![
            obs("KEN", "B", "2020-01-01", "maize", 10.0),
            obs("KEN", "A", "2020-01-01", "maize", 10.0),
            obs("KEN", "C", "2020-01-01", "maize", 5.0),
        ]);
        let summary = aggregate(&t, &[GroupKey::Market]);
        assert_eq!(summary.highest_mean().unwrap().key, vec!["A".to_string()]);
        assert_eq!(summary.lowest_mean().unwrap().key, vec!["C".to_string()]);
    }

    #[test]
    fn test_volatility_ranking_puts_undefined_last() {
        let summary = aggregate(&sample(), &[GroupKey::Market]);
        let ranked: Vec<&str> = summary
            .volatility_ranking()
            .iter()
            .map(|g| g.key[0].as_str())
            .collect();
        // Dakar std 10, Mandera std ~3.54, Kitui std ~2.83
        assert_eq!(ranked, vec!["Dakar", "Mandera", "Kitui"]);

        let t = table(vec![
            obs("KEN", "Solo", "2020-01-01", "maize", 10.0),
            obs("KEN", "Flat", "2020-01-01", "maize", 10.0),
            obs("KEN", "Flat", "2020-02-01", "maize", 10.0),
        ]);
        let ranked: Vec<String> = aggregate(&t, &[GroupKey::Market])
            .volatility_ranking()
            .iter()
            .map(|g| g.key[0].clone())
            .collect();
        assert_eq!(ranked, vec!["Flat".to_string(), "Solo".to_string()]);
    }

    #[test]
    fn test_price_spread() {
        let t = table(vec![
            obs("KEN", "Kitui", "2020-01-01", "maize", 30.0),
            obs("KEN", "Mandera", "2020-01-01", "maize", 45.0),
        ]);
        let spread = aggregate(&t, &[GroupKey::Market]).price_spread().unwrap();
        assert_eq!(spread.highest.key, vec!["Mandera".to_string()]);
        assert_eq!(spread.lowest.key, vec!["Kitui".to_string()]);
        assert_eq!(spread.difference, 15.0);
        assert_eq!(spread.percent, Some(50.0));
    }

    #[test]
    #[should_panic(expected = "non-finite price")]
    fn test_non_finite_price_is_contract_violation() {
        let t = table(vec![obs("KEN", "Kitui", "2020-01-01", "maize", f64::NAN)]);
        aggregate(&t, &[GroupKey::Market]);
    }
}
