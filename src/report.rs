//! Plain-text summaries printed by the CLI.

use std::fmt;

use crate::aggregate::{GroupSummary, GroupedSummary};
use crate::clean::CleanTable;
use crate::country::CountryProfile;
use crate::geo::MarketDistance;
use crate::unify::Unification;

const SAMPLE_MARKETS: usize = 5;

fn fmt_std(std: Option<f64>, precision: usize) -> String {
    match std {
        Some(s) => format!("{s:.precision$}"),
        None => "-".to_string(),
    }
}

fn fmt_key(group: &GroupSummary) -> String {
    if group.key.is_empty() {
        "(all)".to_string()
    } else {
        group.key.join(" / ")
    }
}

/// Summary of one country's cleaning run.
pub struct CleanReport<'a> {
    pub profile: &'a CountryProfile,
    pub table: &'a CleanTable,
    /// Market × commodity statistics, shown for the first few markets.
    pub markets: &'a GroupedSummary,
    pub precision: usize,
}

impl fmt::Display for CleanReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.table;
        let p = self.precision;
        writeln!(f, "=== PROCESSING {} DATA ===", self.profile.name.to_uppercase())?;
        writeln!(f, "Original rows: {}", t.original_rows)?;
        writeln!(f, "After cleaning: {}", t.len())?;
        let markets = t.markets();
        writeln!(f, "Markets after cleaning: {}", markets.len())?;
        let availability = t.availability();
        let reported: Vec<&str> = availability
            .iter()
            .filter(|a| a.observations > 0)
            .map(|a| a.commodity.as_str())
            .collect();
        writeln!(f, "Commodities available: {}", reported.join(", "))?;
        let sample: Vec<&str> = markets.iter().take(SAMPLE_MARKETS).copied().collect();
        writeln!(f, "Sample markets: {}", sample.join(", "))?;
        let currencies: Vec<&str> = t.currencies().into_iter().collect();
        writeln!(f, "Currency: {}", currencies.join(", "))?;
        if let Some((min, max)) = t.date_range() {
            writeln!(f, "Date range: {min} to {max}")?;
        }

        writeln!(f)?;
        writeln!(f, "Commodity data availability:")?;
        for a in &availability {
            writeln!(
                f,
                "  {}: {} observations ({:.1}%)",
                a.commodity, a.observations, a.percent
            )?;
        }

        if !self.markets.is_empty() {
            writeln!(f)?;
            writeln!(f, "Market summary (first {SAMPLE_MARKETS} markets):")?;
            writeln!(
                f,
                "  {:<28} {:<12} {:>6} {:>12} {:>12}  {}",
                "market", "commodity", "count", "mean", "std", "dates"
            )?;
            let shown: Vec<&str> = markets.iter().take(SAMPLE_MARKETS).copied().collect();
            for g in self
                .markets
                .groups
                .iter()
                .filter(|g| g.key.first().is_some_and(|m| shown.contains(&m.as_str())))
            {
                writeln!(
                    f,
                    "  {:<28} {:<12} {:>6} {:>12.p$} {:>12}  {} to {}",
                    g.key[0],
                    g.key.get(1).map(String::as_str).unwrap_or("-"),
                    g.stats.count,
                    g.stats.mean,
                    fmt_std(g.stats.std, p),
                    g.stats.first_date,
                    g.stats.last_date
                )?;
            }
        }
        Ok(())
    }
}

/// Summary of a multi-country unification.
pub struct DatasetReport<'a> {
    pub unification: &'a Unification,
    pub shared: &'a [(String, Vec<String>)],
}

impl fmt::Display for DatasetReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = &self.unification.table;
        let countries = table.countries();

        writeln!(f, "COMBINED DATASET SUMMARY:")?;
        writeln!(f, "Total observations: {}", table.len())?;
        writeln!(f, "Countries: {}", countries.len())?;
        writeln!(f, "Markets: {}", table.markets().len())?;
        writeln!(
            f,
            "Total population covered: {:.0}M people",
            table.population_covered()
        )?;
        if let Some((min, max)) = table.date_range() {
            writeln!(f, "Date range: {min} to {max}")?;
        }

        writeln!(f)?;
        writeln!(f, "COUNTRY BREAKDOWN:")?;
        for profile in &countries {
            let rows: Vec<_> = table.for_country(&profile.code).collect();
            let markets: std::collections::HashSet<&str> =
                rows.iter().map(|o| o.market.as_str()).collect();
            writeln!(
                f,
                "  {}: {} obs, {} markets, {}",
                profile.name,
                rows.len(),
                markets.len(),
                profile.region
            )?;
        }

        if !self.unification.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "SKIPPED COUNTRIES:")?;
            for notice in &self.unification.skipped {
                writeln!(
                    f,
                    "  {} ({}): {}",
                    notice.country_code, notice.kind, notice.reason
                )?;
            }
        }

        if !self.shared.is_empty() {
            writeln!(f)?;
            writeln!(f, "SHARED COMMODITIES:")?;
            for (commodity, names) in self.shared {
                writeln!(
                    f,
                    "  {}: {} countries - {}",
                    commodity.to_uppercase(),
                    names.len(),
                    names.join(", ")
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "REGIONAL COVERAGE:")?;
        for region in table.regional_coverage() {
            writeln!(
                f,
                "  {}: {} ({:.0}M people)",
                region.region,
                region.countries.join(", "),
                region.population_millions
            )?;
        }
        Ok(())
    }
}

/// Grouped statistics with the derived rankings.
pub struct GroupReport<'a> {
    pub summary: &'a GroupedSummary,
    pub precision: usize,
    /// Number of entries in the volatility ranking.
    pub top: usize,
}

impl fmt::Display for GroupReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.precision;
        let keys: Vec<&str> = self.summary.keys.iter().map(|k| k.as_str()).collect();
        writeln!(f, "Grouped by: {}", keys.join(", "))?;
        writeln!(f, "{:<40} {:>8} {:>14} {:>14}", "group", "count", "mean", "std")?;
        for g in &self.summary.groups {
            writeln!(
                f,
                "{:<40} {:>8} {:>14.p$} {:>14}",
                fmt_key(g),
                g.stats.count,
                g.stats.mean,
                fmt_std(g.stats.std, p)
            )?;
        }

        if let Some(spread) = self.summary.price_spread() {
            writeln!(f)?;
            writeln!(
                f,
                "Highest average: {} ({:.p$})",
                fmt_key(&spread.highest),
                spread.highest.stats.mean
            )?;
            writeln!(
                f,
                "Lowest average: {} ({:.p$})",
                fmt_key(&spread.lowest),
                spread.lowest.stats.mean
            )?;
            match spread.percent {
                Some(pct) => writeln!(
                    f,
                    "Price difference: {:.p$} ({pct:.1}% variation)",
                    spread.difference
                )?,
                None => writeln!(f, "Price difference: {:.p$}", spread.difference)?,
            }
        }

        let ranked = self.summary.volatility_ranking();
        if !ranked.is_empty() {
            writeln!(f)?;
            writeln!(f, "Price volatility ranking:")?;
            for (i, g) in ranked.iter().take(self.top).enumerate() {
                writeln!(
                    f,
                    "{}. {}: {} std deviation",
                    i + 1,
                    fmt_key(g),
                    fmt_std(g.stats.std, p)
                )?;
            }
        }
        Ok(())
    }
}

/// Market distances from a reference point.
pub struct DistanceReport<'a> {
    pub reference_name: &'a str,
    pub distances: &'a [MarketDistance],
}

impl fmt::Display for DistanceReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Distance from {}:", self.reference_name)?;
        for d in self.distances {
            writeln!(f, "  {}: ~{:.0}km", d.market, d.distance_km)?;
        }
        Ok(())
    }
}
