//! Job submission, polling, and user-operation handlers.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use snapact::service::SubmitRequest;
use snapact::{ErrorCode, Source};

use crate::error::ApiError;
use crate::state::AppState;

const USER_ID_HEADER: &str = "x-user-id";
const UI_LANG_HEADER: &str = "x-ui-lang";

/// Reads the mandatory owner id header.
fn owner_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| ApiError::bad_request(ErrorCode::MissingUserId, "missing user id"))
}

fn ui_lang(headers: &HeaderMap) -> String {
    headers
        .get(UI_LANG_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("en")
        .to_string()
}

/// `POST /jobs` — accepts a multipart submission and returns the job
/// handle immediately; processing continues in the background.
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = owner_id(&headers)?;
    let lang = ui_lang(&headers);

    let mut image: Option<Vec<u8>> = None;
    let mut want_thumb = false;
    let mut source = Source::Picker;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::bad_request(ErrorCode::InvalidImage, format!("malformed multipart body: {}", e))
    })? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("image") => {
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(
                        ErrorCode::InvalidImage,
                        format!("failed to read image field: {}", e),
                    )
                })?;
                image = Some(bytes.to_vec());
            }
            Some("wantThumb") => {
                let value = field.text().await.unwrap_or_default();
                want_thumb = matches!(value.trim(), "true" | "1");
            }
            Some("source") => {
                let value = field.text().await.unwrap_or_default();
                source = Source::parse(value.trim());
            }
            _ => {}
        }
    }

    let receipt = state.service.submit(SubmitRequest {
        owner_id,
        image: image.unwrap_or_default(),
        want_thumb,
        source,
        lang,
    })?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// `GET /jobs/:id` — owner-scoped poll of the full job state.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = owner_id(&headers)?;
    let view = state.service.get(&job_id, &owner_id)?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFieldsBody {
    #[serde(default)]
    pub fields: Option<serde_json::Value>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// `PATCH /jobs/:id` — partial edit of the projected fields and summary.
pub async fn update_fields(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateFieldsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = owner_id(&headers)?;
    let patch = body.fields.unwrap_or_else(|| json!({}));
    let merged = state
        .service
        .update_fields(&job_id, &owner_id, &patch, body.summary.as_deref())?;
    Ok(Json(json!({ "fields": merged })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkActionBody {
    pub applied: bool,
    #[serde(rename = "type", default)]
    pub action_type: Option<String>,
}

/// `POST /jobs/:id/mark-action` — records that the user acted on the
/// result.
pub async fn mark_action(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MarkActionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = owner_id(&headers)?;
    state
        .service
        .mark_action(&job_id, &owner_id, body.applied, body.action_type.as_deref())?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteBody {
    pub is_favorite: bool,
}

/// `POST /jobs/:id/favorite` — toggles the favorite flag.
pub async fn favorite(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<FavoriteBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = owner_id(&headers)?;
    let is_favorite = state
        .service
        .set_favorite(&job_id, &owner_id, body.is_favorite)?;
    Ok(Json(json!({ "isFavorite": is_favorite })))
}

/// `DELETE /jobs/:id`
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = owner_id(&headers)?;
    state.service.delete(&job_id, &owner_id)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckLimitResponse {
    pub allowed: bool,
    pub used: u64,
    pub limit: u32,
    pub remaining: u64,
    pub reset_date: String,
    pub message: String,
}

/// `GET /jobs/check-limit` — the owner's quota standing.
pub async fn check_limit(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = owner_id(&headers)?;
    let status = state.service.check_limit(&owner_id)?;

    let message = if status.allowed {
        format!(
            "{} of {} submissions used this month",
            status.used, status.limit
        )
    } else {
        format!(
            "Monthly limit of {} reached; resets {}",
            status.limit,
            status.resets_at.format("%Y-%m-%d")
        )
    };

    Ok(Json(CheckLimitResponse {
        allowed: status.allowed,
        used: status.used,
        limit: status.limit,
        remaining: status.remaining(),
        reset_date: status.resets_at.to_rfc3339(),
        message,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// `GET /stats?from&to` — aggregate daily processing counters.
pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .service
        .stats(params.from.as_deref(), params.to.as_deref())?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: Option<String>,
}

/// `GET /history?limit&cursor&type` — keyset-paginated job history,
/// newest first.
pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = owner_id(&headers)?;
    let page = state.service.history(
        &owner_id,
        params.limit,
        params.cursor.as_deref(),
        params.item_type.as_deref(),
    )?;
    Ok(Json(page))
}
