//! Declarative per-country schema.
//!
//! Each supported country is one [`CountrySchema`] entry: its profile, the
//! commodity columns its extract may carry, and the default file names used
//! for raw input and cleaned output. Cleaning logic is shared and only looks
//! entries up here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{PipelineError, Result};

/// Static reference metadata attached to every record of a country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryProfile {
    pub code: String,
    pub name: String,
    pub region: String,
    pub sub_region: String,
    pub population_millions: f64,
}

/// One registry entry.
#[derive(Debug, Clone, Copy)]
pub struct CountrySchema {
    pub code: &'static str,
    pub name: &'static str,
    pub region: &'static str,
    pub sub_region: &'static str,
    pub population_millions: f64,
    pub commodities: &'static [&'static str],
}

pub static REGISTRY: &[CountrySchema] = &[
    CountrySchema {
        code: "KEN",
        name: "Kenya",
        region: "East Africa",
        sub_region: "East Africa",
        population_millions: 54.0,
        commodities: &["maize", "potatoes", "sorghum"],
    },
    CountrySchema {
        code: "NGA",
        name: "Nigeria",
        region: "West Africa",
        sub_region: "West Africa",
        population_millions: 218.0,
        commodities: &["rice", "sorghum", "beans", "millet", "yam"],
    },
    CountrySchema {
        code: "MLI",
        name: "Mali",
        region: "Sahel",
        sub_region: "West Africa",
        population_millions: 22.0,
        commodities: &["beans", "groundnuts", "maize", "millet", "rice", "sorghum"],
    },
    CountrySchema {
        code: "MOZ",
        name: "Mozambique",
        region: "Southern Africa",
        sub_region: "SADC",
        population_millions: 32.0,
        commodities: &[
            "cowpeas",
            "groundnuts",
            "maize",
            "maize_meal",
            "oil",
            "rice",
            "sugar",
            "wheat_flour",
        ],
    },
    CountrySchema {
        code: "SEN",
        name: "Senegal",
        region: "West Africa",
        sub_region: "Coastal West Africa",
        population_millions: 17.0,
        commodities: &["maize", "millet", "rice", "sorghum"],
    },
    CountrySchema {
        code: "SOM",
        name: "Somalia",
        region: "Horn of Africa",
        sub_region: "East Africa",
        population_millions: 17.0,
        commodities: &["maize", "oil", "rice", "sorghum"],
    },
];

impl CountrySchema {
    pub fn profile(&self) -> CountryProfile {
        CountryProfile {
            code: self.code.to_string(),
            name: self.name.to_string(),
            region: self.region.to_string(),
            sub_region: self.sub_region.to_string(),
            population_millions: self.population_millions,
        }
    }

    pub fn commodity_columns(&self) -> Vec<String> {
        self.commodities.iter().map(|c| c.to_string()).collect()
    }

    /// File name of the raw extract as published by the data source.
    pub fn raw_file_name(&self) -> String {
        format!("{}_RTFP_mkt_2007_2025-06-30.csv", self.code)
    }

    pub fn clean_file_name(&self) -> String {
        format!("{}_prices_clean.csv", self.name.to_lowercase())
    }
}

/// Looks up a country by code, case-insensitively.
pub fn lookup(code: &str) -> Result<&'static CountrySchema> {
    REGISTRY
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(code.trim()))
        .ok_or_else(|| PipelineError::UnknownCountry(code.to_string()))
}

pub fn all_codes() -> Vec<String> {
    REGISTRY.iter().map(|c| c.code.to_string()).collect()
}

/// Commodities recognized by more than one of the given countries, with the
/// display names of the countries that carry them.
///
/// Sorted by number of countries descending, then by commodity name. A
/// country listed twice counts once.
pub fn shared_commodities(schemas: &[&CountrySchema]) -> Vec<(String, Vec<String>)> {
    let mut seen = HashSet::new();
    let mut by_commodity: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for schema in schemas.iter().filter(|s| seen.insert(s.code)) {
        for commodity in schema.commodities {
            by_commodity
                .entry(*commodity)
                .or_default()
                .push(schema.name.to_string());
        }
    }

    let mut shared: Vec<(String, Vec<String>)> = by_commodity
        .into_iter()
        .filter(|(_, countries)| countries.len() > 1)
        .map(|(commodity, countries)| (commodity.to_string(), countries))
        .collect();
    shared.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    shared
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let ken = lookup("ken").unwrap();
        assert_eq!(ken.name, "Kenya");
        assert_eq!(ken.commodities, &["maize", "potatoes", "sorghum"]);
    }

    #[test]
    fn test_lookup_unknown_code() {
        let err = lookup("XYZ").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownCountry(_)));
    }

    #[test]
    fn test_registry_codes_are_unique() {
        let mut codes = all_codes();
        let before = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), before);
    }

    #[test]
    fn test_file_names() {
        let moz = lookup("MOZ").unwrap();
        assert_eq!(moz.raw_file_name(), "MOZ_RTFP_mkt_2007_2025-06-30.csv");
        assert_eq!(moz.clean_file_name(), "mozambique_prices_clean.csv");
    }

    #[test]
    fn test_profile_carries_metadata() {
        let profile = lookup("SEN").unwrap().profile();
        assert_eq!(profile.code, "SEN");
        assert_eq!(profile.sub_region, "Coastal West Africa");
        assert_eq!(profile.population_millions, 17.0);
    }

    #[test]
    fn test_shared_commodities_across_registry() {
        let all: Vec<&CountrySchema> = REGISTRY.iter().collect();
        let shared = shared_commodities(&all);

        // maize, rice and sorghum are each carried by five of the six countries
        let top: Vec<&str> = shared[..3].iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(top, vec!["maize", "rice", "sorghum"]);
        assert_eq!(shared[0].1.len(), 5);

        assert!(shared.iter().all(|(_, c)| c.len() > 1));
        assert!(!shared.iter().any(|(name, _)| name == "potatoes"));
    }

    #[test]
    fn test_shared_commodities_single_country_is_empty() {
        let ken = lookup("KEN").unwrap();
        assert!(shared_commodities(&[ken]).is_empty());
    }

    #[test]
    fn test_shared_commodities_counts_repeated_country_once() {
        let ken = lookup("KEN").unwrap();
        assert!(shared_commodities(&[ken, ken]).is_empty());

        let moz = lookup("MOZ").unwrap();
        let shared = shared_commodities(&[ken, moz, ken]);
        assert_eq!(
            shared,
            vec![(
                "maize".to_string(),
                vec!["Kenya".to_string(), "Mozambique".to_string()]
            )]
        );
    }
}
