//! Coercion, imputation and scaling of canonical feature columns

use super::scaler::StandardScaler;
use crate::error::{ExoError, Result};
use crate::schema::{Feature, N_FEATURES};
use ndarray::{Array2, ArrayView2, Axis};
use polars::prelude::*;

/// A feature matrix that has been imputed and scaled.
///
/// Only produced by [`FeaturePreparer`]; there is no way to hand it back to
/// the preparer, so scaling cannot be applied twice.
#[derive(Debug, Clone)]
pub struct PreparedMatrix(Array2<f64>);

impl PreparedMatrix {
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.0.view()
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.0
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.0
    }

    pub fn nrows(&self) -> usize {
        self.0.nrows()
    }
}

/// Extract the canonical columns of a normalized frame as raw `f64` values.
///
/// Casting is non-strict: unparseable strings, nulls, NaN and infinities all
/// become NaN (missing).
pub fn extract_raw(df: &DataFrame) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let mut x = Array2::from_elem((n_rows, N_FEATURES), f64::NAN);

    for feature in Feature::ALL {
        let key = feature.canonical_key();
        let column = df
            .column(key)
            .map_err(|_| ExoError::PreprocessingError(format!("Column '{}' not found", key)))?;
        let casted = column.as_materialized_series().cast(&DataType::Float64)?;
        let ca = casted.f64()?;
        let j = feature.index();
        for (i, value) in ca.into_iter().enumerate() {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                x[[i, j]] = v;
            }
        }
    }
    Ok(x)
}

/// Median of the finite values in each column, `None` when a column is empty
pub fn column_medians(x: &Array2<f64>) -> Vec<Option<f64>> {
    x.axis_iter(Axis(1))
        .map(|col| {
            let mut values: Vec<f64> = col.iter().copied().filter(|v| v.is_finite()).collect();
            if values.is_empty() {
                return None;
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let mid = values.len() / 2;
            Some(if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            })
        })
        .collect()
}

/// Replace non-finite entries with the per-column fill value.
///
/// Idempotent: a matrix with no missing values is returned unchanged.
pub fn impute_raw(x: &mut Array2<f64>, fill: &[f64]) {
    for (j, mut col) in x.axis_iter_mut(Axis(1)).enumerate() {
        let value = fill.get(j).copied().unwrap_or(0.0);
        col.mapv_inplace(|v| if v.is_finite() { v } else { value });
    }
}

/// Column medians with zero standing in for all-missing columns
pub fn median_fill(x: &Array2<f64>) -> Vec<f64> {
    column_medians(x).into_iter().map(|m| m.unwrap_or(0.0)).collect()
}

/// Turns canonical frames into model-ready matrices using a fitted scaler
pub struct FeaturePreparer<'a> {
    scaler: &'a StandardScaler,
}

impl<'a> FeaturePreparer<'a> {
    pub fn new(scaler: &'a StandardScaler) -> Self {
        Self { scaler }
    }

    /// Fill values in priority order: scaler mean, column median, zero
    pub fn fill_values(&self, x: &Array2<f64>) -> Vec<f64> {
        let medians = column_medians(x);
        (0..x.ncols())
            .map(|j| {
                self.scaler
                    .mean()
                    .get(j)
                    .copied()
                    .filter(|m| m.is_finite())
                    .or(medians.get(j).copied().flatten())
                    .unwrap_or(0.0)
            })
            .collect()
    }

    /// Coerce, impute and scale a frame that already carries canonical columns
    pub fn prepare_frame(&self, df: &DataFrame) -> Result<PreparedMatrix> {
        let raw = extract_raw(df)?;
        self.prepare_raw(raw)
    }

    /// Impute and scale a raw matrix in canonical column order
    pub fn prepare_raw(&self, mut raw: Array2<f64>) -> Result<PreparedMatrix> {
        let fill = self.fill_values(&raw);
        impute_raw(&mut raw, &fill);
        Ok(PreparedMatrix(self.scaler.transform(&raw)?))
    }
}
