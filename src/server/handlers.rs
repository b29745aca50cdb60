//! Request handlers for the prediction API

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Multipart, Query, State,
    },
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::dataset::{DatasetQuery, Mission, DEFAULT_PAGE_LIMIT};
use crate::inference::ModelSelector;
use crate::schema::{Feature, N_FEATURES};
use crate::utils::{DataLoader, DataSaver};

use super::error::{Result, ServerError};
use super::state::AppState;

// ============================================================================
// Status Handlers
// ============================================================================

/// Liveness plus the timestamp of the loaded model
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "last_ingest_iso": state.trained_at().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: &'static str,
    pub name: &'static str,
}

/// Selectable models, stacking first
pub async fn list_models() -> Json<serde_json::Value> {
    let models: Vec<ModelEntry> = ModelSelector::all()
        .into_iter()
        .map(|m| ModelEntry { id: m.id(), name: m.name() })
        .collect();
    Json(json!({ "models": models }))
}

#[derive(Debug, Serialize)]
pub struct ModelScores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Evaluate every model against the validation CSV
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let path = &state.config.validation_csv;
    if !std::path::Path::new(path).exists() {
        return Err(ServerError::NotFound(format!("Validation data not found: {}", path)));
    }

    let df = DataLoader::new().load_csv(path)?;
    let reports = state.predictor.evaluate_frame(df)?;

    let mut models = BTreeMap::new();
    let mut overall = None;
    for (model, report) in &reports {
        models.insert(
            model.id(),
            ModelScores {
                accuracy: report.accuracy,
                precision: report.weighted_avg.precision,
                recall: report.weighted_avg.recall,
                f1: report.weighted_avg.f1,
            },
        );
        if *model == ModelSelector::Stacking {
            overall = Some(report);
        }
    }
    let overall = overall.ok_or_else(|| ServerError::Internal("Stacking model was not evaluated".to_string()))?;

    info!(rows = overall.n_samples, accuracy = overall.accuracy, "Computed validation metrics");
    Ok(Json(json!({
        "overall": {
            "accuracy": overall.accuracy,
            "precision": overall.weighted_avg.precision,
            "recall": overall.weighted_avg.recall,
            "f1": overall.weighted_avg.f1,
            "samples": overall.n_samples,
        },
        "models": models,
        "confusionMatrix": overall.confusion_matrix,
        "classNames": overall.class_names,
    })))
}

/// Ensemble feature importances, uniform when no tree learner reports any
pub async fn get_features(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let importances = state
        .predictor
        .bundle()
        .model
        .classifier
        .feature_importances()
        .filter(|imp| imp.len() == N_FEATURES)
        .map(|imp| imp.to_vec())
        .unwrap_or_else(|| vec![1.0 / N_FEATURES as f64; N_FEATURES]);

    let features: Vec<serde_json::Value> = Feature::ALL
        .iter()
        .zip(importances)
        .map(|(f, importance)| json!({ "feature": f.display_name(), "importance": importance }))
        .collect();
    Json(json!({ "features": features }))
}

// ============================================================================
// Prediction Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: HashMap<String, f64>,
    #[serde(rename = "modelId")]
    pub model_id: Option<String>,
}

/// Classify one candidate
pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>> {
    let Json(request) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    let model = ModelSelector::parse(request.model_id.as_deref())?;
    let prediction = state.predictor.predict_one(&request.features, Some(model.id()))?;

    let shap: Vec<serde_json::Value> = prediction
        .attributions
        .iter()
        .map(|c| {
            json!({
                "feature": c.feature_name,
                "value": c.feature_value,
                "contribution": c.contribution,
            })
        })
        .collect();

    debug!(model = model.id(), label = %prediction.label, "Single prediction");
    Ok(Json(json!({
        "prediction": prediction.label,
        "probabilities": prediction.probabilities,
        "shap": shap,
        "rationale": prediction.rationale,
        "modelId": model.id(),
    })))
}

/// Classify every row of an uploaded CSV and return it with two extra columns
pub async fn predict_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| ServerError::BadRequest(e.to_string()))? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) = upload.ok_or_else(|| ServerError::BadRequest("Missing file field".to_string()))?;
    if !file_name.to_lowercase().ends_with(".csv") {
        return Err(ServerError::BadRequest(format!(
            "Unsupported file type: {}. Upload a .csv file.",
            file_name
        )));
    }
    info!(file = %file_name, bytes = data.len(), "Received batch prediction upload");

    let df = DataLoader::new()
        .load_csv_bytes(&data)
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let mut out = state.predictor.predict_batch(df)?;
    let body = DataSaver::to_csv_bytes(&mut out)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"predictions.csv\""),
        ],
        body,
    ))
}

// ============================================================================
// Dataset Handlers
// ============================================================================

/// Query string for `/dataset`. Empty values count as absent.
#[derive(Debug, Deserialize)]
pub struct DatasetParams {
    pub mission: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_count(name: &str, value: Option<&str>) -> Result<Option<usize>> {
    match non_empty(value) {
        Some(v) => v
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ServerError::BadRequest(format!("Invalid {}: {}", name, v))),
        None => Ok(None),
    }
}

/// Browse a mission snapshot
pub async fn get_dataset(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<DatasetParams>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(params) = params.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    let mission: Mission = match non_empty(params.mission.as_deref()) {
        Some(m) => m.parse::<Mission>()?,
        None => Mission::Kepler,
    };
    let page = parse_count("page", params.page.as_deref())?.unwrap_or(1);
    let limit = parse_count("limit", params.limit.as_deref())?.unwrap_or(DEFAULT_PAGE_LIMIT);

    let mut query = DatasetQuery::new(mission).with_page(page, limit);
    if let Some(search) = params.search {
        query = query.with_search(search);
    }

    if !state.browser.has_mission(mission) {
        return Err(ServerError::NotFound(format!("No data for mission {}", mission)));
    }
    let page = state.browser.query(&query, Some(&state.predictor))?;
    Ok(Json(page))
}
