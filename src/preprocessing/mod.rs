//! Data preprocessing module
//!
//! Provides the fitted transforms shared by training and inference:
//! - Standard scaling of the seven canonical features
//! - Label encoding of disposition classes
//! - Coercion and imputation of raw frames (`FeaturePreparer`)

mod encoder;
pub mod prepare;
mod scaler;

pub use encoder::LabelEncoder;
pub use prepare::{column_medians, extract_raw, impute_raw, median_fill, FeaturePreparer, PreparedMatrix};
pub use scaler::StandardScaler;
