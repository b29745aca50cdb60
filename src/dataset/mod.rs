//! Mission dataset browser
//!
//! Serves paginated, searchable views over the static per-mission CSV
//! snapshots in the data directory. Rows without a disposition column are
//! labelled by the predictor.

use crate::error::{ExoError, Result};
use crate::inference::Predictor;
use crate::preprocessing::extract_raw;
use crate::schema::{label_values, Feature, SchemaNormalizer};
use crate::utils::DataLoader;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Largest page size a caller may request
pub const MAX_PAGE_LIMIT: usize = 500;
/// Page size when none is given
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Class bucket for rows whose label is missing
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Survey mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mission {
    Kepler,
    K2,
    Tess,
}

impl Mission {
    pub const ALL: [Mission; 3] = [Mission::Kepler, Mission::K2, Mission::Tess];

    pub fn id(&self) -> &'static str {
        match self {
            Mission::Kepler => "kepler",
            Mission::K2 => "k2",
            Mission::Tess => "tess",
        }
    }

    /// Snapshot file inside the data directory
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.id())
    }

    /// Prefix of the synthetic row identifier
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Mission::Kepler => "KEP",
            Mission::K2 => "K2",
            Mission::Tess => "TESS",
        }
    }

    /// Native object-name columns, in preference order
    pub fn name_columns(&self) -> &'static [&'static str] {
        match self {
            Mission::Kepler => &["kepoi_name", "kepler_name"],
            Mission::K2 => &["pl_name"],
            Mission::Tess => &["toi", "pl_name"],
        }
    }

    pub fn row_id(&self, index: usize) -> String {
        format!("{}-{:06}", self.id_prefix(), index + 1)
    }
}

impl FromStr for Mission {
    type Err = ExoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "kepler" => Ok(Mission::Kepler),
            "k2" => Ok(Mission::K2),
            "tess" => Ok(Mission::Tess),
            other => Err(ExoError::ValidationError(format!(
                "Unknown mission '{}', expected kepler, k2 or tess",
                other
            ))),
        }
    }
}

impl fmt::Display for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Page request over one mission
#[derive(Debug, Clone)]
pub struct DatasetQuery {
    pub mission: Mission,
    pub page: usize,
    pub limit: usize,
    pub search: Option<String>,
}

impl DatasetQuery {
    pub fn new(mission: Mission) -> Self {
        Self {
            mission,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            search: None,
        }
    }

    /// Page is at least 1; limit is clamped to 1..=MAX_PAGE_LIMIT
    pub fn with_page(mut self, page: usize, limit: usize) -> Self {
        self.page = page.max(1);
        self.limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = if search.trim().is_empty() { None } else { Some(search) };
        self
    }
}

/// One browsable candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRow {
    pub id: String,
    pub mission: Mission,
    pub name: Option<String>,
    pub disposition: String,
    /// Feature values by friendly key; missing values are null
    #[serde(flatten)]
    pub features: BTreeMap<String, Option<f64>>,
}

/// A page of rows plus totals over the whole filtered set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetPage {
    pub mission: Mission,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub rows: Vec<DatasetRow>,
    pub class_counts: BTreeMap<String, usize>,
}

/// Reads and filters mission snapshots
pub struct DatasetBrowser {
    data_dir: PathBuf,
    normalizer: SchemaNormalizer,
}

impl DatasetBrowser {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            normalizer: SchemaNormalizer::new(),
        }
    }

    /// Whether the mission's snapshot file is present
    pub fn has_mission(&self, mission: Mission) -> bool {
        self.data_dir.join(mission.file_name()).exists()
    }

    /// All rows of a mission, normalized and labelled
    pub fn load(&self, mission: Mission, predictor: Option<&Predictor>) -> Result<Vec<DatasetRow>> {
        let path = self.data_dir.join(mission.file_name());
        if !self.has_mission(mission) {
            return Err(ExoError::DataError(format!("Dataset not found: {}", path.display())));
        }
        let df = self.normalizer.normalize(DataLoader::new().load_csv(&path)?)?;

        let labels: Vec<String> = match (self.normalizer.resolve_label_column(&df), predictor) {
            (Some(column), _) => label_values(&df, &column)?
                .into_iter()
                .map(|l| l.unwrap_or_else(|| UNKNOWN_LABEL.to_string()))
                .collect(),
            (None, Some(predictor)) => {
                debug!(mission = %mission, "No label column, labelling with the predictor");
                predictor.predict_frame(&df)?
            }
            (None, None) => vec![UNKNOWN_LABEL.to_string(); df.height()],
        };

        let names = name_values(&df, mission)?;
        let x = extract_raw(&df)?;

        Ok((0..df.height())
            .map(|i| DatasetRow {
                id: mission.row_id(i),
                mission,
                name: names.as_ref().and_then(|n| n[i].clone()),
                disposition: labels[i].clone(),
                features: Feature::ALL
                    .iter()
                    .map(|f| {
                        let v = x[[i, f.index()]];
                        (f.friendly_key().to_string(), v.is_finite().then_some(v))
                    })
                    .collect(),
            })
            .collect())
    }

    /// Filter, count and paginate
    pub fn query(&self, query: &DatasetQuery, predictor: Option<&Predictor>) -> Result<DatasetPage> {
        let rows = self.load(query.mission, predictor)?;
        Ok(paginate(rows, query))
    }
}

/// Apply search, class counts and page slicing to loaded rows
pub fn paginate(rows: Vec<DatasetRow>, query: &DatasetQuery) -> DatasetPage {
    let needle = query.search.as_ref().map(|s| s.trim().to_lowercase());
    let filtered: Vec<DatasetRow> = rows
        .into_iter()
        .filter(|row| match &needle {
            None => true,
            Some(needle) => {
                row.id.to_lowercase().contains(needle.as_str())
                    || row.name.as_ref().is_some_and(|n| n.to_lowercase().contains(needle.as_str()))
            }
        })
        .collect();

    let mut class_counts = BTreeMap::new();
    for row in &filtered {
        *class_counts.entry(row.disposition.clone()).or_insert(0) += 1;
    }

    let total = filtered.len();
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, MAX_PAGE_LIMIT);
    let rows = filtered
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    DatasetPage {
        mission: query.mission,
        page,
        limit,
        total,
        rows,
        class_counts,
    }
}

fn name_values(df: &DataFrame, mission: Mission) -> Result<Option<Vec<Option<String>>>> {
    let Some(column) = mission.name_columns().iter().find(|c| df.column(c).is_ok()) else {
        return Ok(None);
    };
    let series = df.column(column)?.as_materialized_series().cast(&DataType::String)?;
    Ok(Some(series.str()?.into_iter().map(|v| v.map(str::to_string)).collect()))
}
