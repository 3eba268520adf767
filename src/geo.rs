//! Rough distance of markets from a reference point.
//!
//! Flat-Earth approximation on degrees, good enough for display only.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::unify::UnifiedObservation;

const KM_PER_DEGREE: f64 = 111.0;

/// Nairobi, as (latitude, longitude).
pub const NAIROBI: (f64, f64) = (-1.29, 36.82);

pub fn flat_distance_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let lat_diff = to.0 - from.0;
    let lon_diff = to.1 - from.1;
    (lat_diff.powi(2) + lon_diff.powi(2)).sqrt() * KM_PER_DEGREE
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketDistance {
    pub market: String,
    pub distance_km: f64,
}

/// Distance of every market that carries coordinates, sorted by market name.
/// The first coordinates seen for a market are used.
pub fn market_distances<'a, I>(rows: I, reference: (f64, f64)) -> Vec<MarketDistance>
where
    I: IntoIterator<Item = &'a UnifiedObservation>,
{
    let mut coords: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for obs in rows {
        if let Some(c) = obs.coordinates {
            coords.entry(obs.market.as_str()).or_insert(c);
        }
    }
    coords
        .into_iter()
        .map(|(market, c)| MarketDistance {
            market: market.to_string(),
            distance_km: flat_distance_km(reference, c),
        })
        .collect()
}
