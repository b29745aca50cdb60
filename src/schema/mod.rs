//! Canonical feature schema and header normalization
//!
//! Every mission catalogue (Kepler KOI, K2, TESS TOI) names the same seven
//! transit/stellar quantities differently. This module maps arbitrary headers
//! onto one canonical key per feature so downstream code sees a single layout.

use crate::error::Result;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of model input features
pub const N_FEATURES: usize = 7;

/// One of the seven model inputs, in fixed vector order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    OrbitalPeriod,
    TransitDuration,
    PlanetaryRadius,
    TransitDepth,
    StellarTemperature,
    StellarRadius,
    StellarSurfaceGravity,
}

impl Feature {
    /// All features in model input order
    pub const ALL: [Feature; N_FEATURES] = [
        Feature::OrbitalPeriod,
        Feature::TransitDuration,
        Feature::PlanetaryRadius,
        Feature::TransitDepth,
        Feature::StellarTemperature,
        Feature::StellarRadius,
        Feature::StellarSurfaceGravity,
    ];

    /// Canonical column key (Kepler KOI naming)
    pub fn canonical_key(&self) -> &'static str {
        match self {
            Feature::OrbitalPeriod => "koi_period",
            Feature::TransitDuration => "koi_duration",
            Feature::PlanetaryRadius => "koi_prad",
            Feature::TransitDepth => "koi_depth",
            Feature::StellarTemperature => "koi_steff",
            Feature::StellarRadius => "koi_srad",
            Feature::StellarSurfaceGravity => "koi_slogg",
        }
    }

    /// Key accepted by the single-prediction API
    pub fn friendly_key(&self) -> &'static str {
        match self {
            Feature::OrbitalPeriod => "orbital_period",
            Feature::TransitDuration => "transit_duration",
            Feature::PlanetaryRadius => "planetary_radius",
            Feature::TransitDepth => "transit_depth",
            Feature::StellarTemperature => "stellar_temperature",
            Feature::StellarRadius => "stellar_radius",
            Feature::StellarSurfaceGravity => "stellar_surface_gravity",
        }
    }

    /// Header required by the batch CSV path
    pub fn display_name(&self) -> &'static str {
        match self {
            Feature::OrbitalPeriod => "Orbital Period",
            Feature::TransitDuration => "Transit Duration",
            Feature::PlanetaryRadius => "Planetary Radius",
            Feature::TransitDepth => "Transit Depth",
            Feature::StellarTemperature => "Stellar Effective Temperature",
            Feature::StellarRadius => "Stellar Radius",
            Feature::StellarSurfaceGravity => "Stellar Surface Gravity",
        }
    }

    /// Physical unit, used in rationale text
    pub fn unit(&self) -> &'static str {
        match self {
            Feature::OrbitalPeriod => "days",
            Feature::TransitDuration => "hours",
            Feature::PlanetaryRadius => "Earth radii",
            Feature::TransitDepth => "ppm",
            Feature::StellarTemperature => "K",
            Feature::StellarRadius => "solar radii",
            Feature::StellarSurfaceGravity => "log g",
        }
    }

    /// Normalized aliases, tried in order. The canonical key comes first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Feature::OrbitalPeriod => &[
                "koi_period", "orbital_period", "pl_orbper", "period", "orbper",
            ],
            Feature::TransitDuration => &[
                "koi_duration", "transit_duration", "pl_trandurh", "pl_trandur", "duration",
            ],
            Feature::PlanetaryRadius => &[
                "koi_prad", "planetary_radius", "planet_radius", "pl_rade", "prad",
            ],
            Feature::TransitDepth => &[
                "koi_depth", "transit_depth", "pl_trandep", "depth",
            ],
            Feature::StellarTemperature => &[
                "koi_steff", "stellar_temperature", "stellar_effective_temperature",
                "star_s_effective_temperature", "st_teff", "teff",
            ],
            Feature::StellarRadius => &[
                "koi_srad", "stellar_radius", "star_s_radius", "st_rad", "srad",
            ],
            Feature::StellarSurfaceGravity => &[
                "koi_slogg", "stellar_surface_gravity", "star_s_surface_gravity",
                "st_logg", "logg", "slogg",
            ],
        }
    }

    pub fn from_friendly_key(key: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.friendly_key() == key)
    }

    pub fn from_canonical_key(key: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.canonical_key() == key)
    }

    pub fn index(&self) -> usize {
        Feature::ALL.iter().position(|f| f == self).unwrap_or(0)
    }
}

/// Canonical keys in model input order
pub fn canonical_keys() -> Vec<&'static str> {
    Feature::ALL.iter().map(|f| f.canonical_key()).collect()
}

/// Headers that may carry the disposition label, in priority order
pub const LABEL_ALIASES: &[&str] = &[
    "koi_disposition",
    "disposition",
    "tfopwg_disp",
    "disp",
    "label",
    "class",
];

/// Disposition classes known to the classifier
pub const KNOWN_LABELS: &[&str] = &["CANDIDATE", "CONFIRMED", "FALSE POSITIVE"];

/// Normalize a raw disposition value.
///
/// Values are trimmed and upper-cased; TESS TFOPWG codes are mapped onto the
/// Kepler vocabulary. Empty values yield `None`. Unknown values are returned
/// upper-cased so callers can decide whether to keep them.
pub fn normalize_label(raw: &str) -> Option<String> {
    let value = raw.trim().to_uppercase();
    if value.is_empty() || value == "NAN" || value == "NULL" {
        return None;
    }
    let mapped = match value.as_str() {
        "CP" | "KP" => "CONFIRMED",
        "PC" | "APC" => "CANDIDATE",
        "FP" | "FA" => "FALSE POSITIVE",
        "FALSE_POSITIVE" | "FALSE-POSITIVE" => "FALSE POSITIVE",
        other => return Some(other.to_string()),
    };
    Some(mapped.to_string())
}

/// Resolves arbitrary mission headers to canonical feature columns
pub struct SchemaNormalizer {
    parenthesised: Regex,
    separators: Regex,
}

impl Default for SchemaNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaNormalizer {
    pub fn new() -> Self {
        Self {
            parenthesised: Regex::new(r"\([^)]*\)").unwrap(),
            separators: Regex::new(r"[^a-z0-9]+").unwrap(),
        }
    }

    /// Lower-case, strip parenthesised units, collapse punctuation to `_`.
    ///
    /// `"Orbital Period (days)"` becomes `"orbital_period"`.
    pub fn normalize_header(&self, header: &str) -> String {
        let lowered = header.to_lowercase();
        let stripped = self.parenthesised.replace_all(&lowered, " ");
        let collapsed = self.separators.replace_all(&stripped, "_");
        collapsed.trim_matches('_').to_string()
    }

    /// Exact-match pass: display names and friendly keys become canonical keys.
    pub fn apply_friendly_names(&self, mut df: DataFrame) -> Result<DataFrame> {
        let headers = column_names(&df);
        for feature in Feature::ALL {
            let key = feature.canonical_key();
            if df.column(key).is_ok() {
                continue;
            }
            let source = headers
                .iter()
                .find(|h| h.as_str() == feature.display_name() || h.as_str() == feature.friendly_key());
            if let Some(source) = source {
                copy_column(&mut df, source, key)?;
            }
        }
        Ok(df)
    }

    /// Normalized-match pass over the alias table.
    pub fn apply_aliases(&self, mut df: DataFrame) -> Result<DataFrame> {
        let headers = column_names(&df);
        let normalized: Vec<String> = headers.iter().map(|h| self.normalize_header(h)).collect();

        for feature in Feature::ALL {
            let key = feature.canonical_key();
            if df.column(key).is_ok() {
                continue;
            }
            let source = feature.aliases().iter().find_map(|alias| {
                normalized
                    .iter()
                    .position(|n| n == alias)
                    .map(|pos| headers[pos].clone())
            });
            if let Some(source) = source {
                debug!(feature = key, source = %source, "Resolved column alias");
                copy_column(&mut df, &source, key)?;
            }
        }
        Ok(df)
    }

    /// Full normalization: friendly names, aliases, then NaN fill for anything
    /// still unresolved. Never fails on unknown headers.
    pub fn normalize(&self, df: DataFrame) -> Result<DataFrame> {
        let df = self.apply_friendly_names(df)?;
        let mut df = self.apply_aliases(df)?;

        let height = df.height();
        for feature in Feature::ALL {
            let key = feature.canonical_key();
            if df.column(key).is_err() {
                debug!(feature = key, "Column unresolved, filling with NaN");
                df.with_column(Series::new(key.into(), vec![f64::NAN; height]))?;
            }
        }
        Ok(df)
    }

    /// Find the column holding the disposition label, if any.
    pub fn resolve_label_column(&self, df: &DataFrame) -> Option<String> {
        let headers = column_names(df);
        let normalized: Vec<String> = headers.iter().map(|h| self.normalize_header(h)).collect();
        LABEL_ALIASES.iter().find_map(|alias| {
            normalized
                .iter()
                .position(|n| n == alias)
                .map(|pos| headers[pos].clone())
        })
    }
}

/// Normalized disposition of every row of `column`; missing values are `None`
pub fn label_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(column)?.as_materialized_series().cast(&DataType::String)?;
    Ok(series.str()?.into_iter().map(|v| v.and_then(normalize_label)).collect())
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

fn copy_column(df: &mut DataFrame, source: &str, target: &str) -> Result<()> {
    let mut series = df.column(source)?.as_materialized_series().clone();
    series.rename(target.into());
    df.with_column(series)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(headers: &[&str]) -> DataFrame {
        let columns: Vec<Column> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| Series::new((*h).into(), vec![i as f64 + 1.0, i as f64 + 2.0]).into())
            .collect();
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn test_normalize_header() {
        let n = SchemaNormalizer::new();
        assert_eq!(n.normalize_header("Orbital Period (days)"), "orbital_period");
        assert_eq!(n.normalize_header("  Stellar-Radius  "), "stellar_radius");
        assert_eq!(n.normalize_header("Star’s Surface Gravity"), "star_s_surface_gravity");
        assert_eq!(n.normalize_header("pl_orbper"), "pl_orbper");
    }

    #[test]
    fn test_header_variants_resolve_to_same_column() {
        let n = SchemaNormalizer::new();
        for header in ["Orbital Period (days)", "orbital_period", "pl_orbper"] {
            let df = n.normalize(frame(&[header])).unwrap();
            let col = df.column("koi_period").unwrap();
            let v = col.as_materialized_series().cast(&DataType::Float64).unwrap();
            assert_eq!(v.f64().unwrap().get(0), Some(1.0), "header {header}");
        }
    }

    #[test]
    fn test_canonical_order_is_mission_independent() {
        let n = SchemaNormalizer::new();
        let kepler = n.normalize(frame(&["koi_slogg", "koi_period"])).unwrap();
        let tess = n.normalize(frame(&["st_logg", "pl_orbper", "pl_trandurh"])).unwrap();
        for df in [kepler, tess] {
            for key in canonical_keys() {
                assert!(df.column(key).is_ok(), "missing {key}");
            }
        }
    }

    #[test]
    fn test_existing_canonical_not_overwritten() {
        let n = SchemaNormalizer::new();
        let df = DataFrame::new(vec![
            Series::new("pl_orbper".into(), vec![99.0]).into(),
            Series::new("koi_period".into(), vec![3.0]).into(),
        ])
        .unwrap();
        let df = n.normalize(df).unwrap();
        let period = df.column("koi_period").unwrap().f64().unwrap().get(0);
        assert_eq!(period, Some(3.0));
    }

    #[test]
    fn test_first_alias_wins() {
        let n = SchemaNormalizer::new();
        let df = DataFrame::new(vec![
            Series::new("period".into(), vec![1.0]).into(),
            Series::new("pl_orbper".into(), vec![2.0]).into(),
        ])
        .unwrap();
        let df = n.normalize(df).unwrap();
        assert_eq!(df.column("koi_period").unwrap().f64().unwrap().get(0), Some(2.0));
    }

    #[test]
    fn test_unresolved_columns_are_nan() {
        let n = SchemaNormalizer::new();
        let df = n.normalize(frame(&["unrelated"])).unwrap();
        let depth = df.column("koi_depth").unwrap().f64().unwrap().get(0).unwrap();
        assert!(depth.is_nan());
    }

    #[test]
    fn test_friendly_names_exact_only() {
        let n = SchemaNormalizer::new();
        let df = n.apply_friendly_names(frame(&["Transit Depth", "transit duration"])).unwrap();
        assert!(df.column("koi_depth").is_ok());
        assert!(df.column("koi_duration").is_err());
    }

    #[test]
    fn test_resolve_label_column() {
        let n = SchemaNormalizer::new();
        let df = frame(&["koi_period", "TFOPWG Disp"]);
        assert_eq!(n.resolve_label_column(&df), Some("TFOPWG Disp".to_string()));
        assert_eq!(n.resolve_label_column(&frame(&["koi_period"])), None);
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label(" confirmed "), Some("CONFIRMED".to_string()));
        assert_eq!(normalize_label("PC"), Some("CANDIDATE".to_string()));
        assert_eq!(normalize_label("fp"), Some("FALSE POSITIVE".to_string()));
        assert_eq!(normalize_label("  "), None);
    }

    #[test]
    fn test_feature_keys_roundtrip() {
        for f in Feature::ALL {
            assert_eq!(Feature::from_friendly_key(f.friendly_key()), Some(f));
            assert_eq!(Feature::from_canonical_key(f.canonical_key()), Some(f));
        }
        assert_eq!(Feature::StellarRadius.index(), 5);
    }
}
