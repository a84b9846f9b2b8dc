use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use regret_db::models::{ListQuery, SortField, SortOrder};
use regret_types::api::{
    ConfessionEnvelope, ConfessionPage, ConfessionResponse, CreateConfessionRequest,
    DeleteResponse, NearbyResponse, ReactRequest, ReactionResponse, UpdateConfessionRequest,
};
use regret_types::models::{Emotion, GeoPoint, ReactionType};

use crate::error::{ApiError, ValidationCode, ValidationErrors};
use crate::middleware::{Requester, can_modify};
use crate::state::AppState;
use crate::validate::validate_patch;

const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_DISTANCE_M: f64 = 10_000.0;
const DEFAULT_NEARBY_LIMIT: u32 = 50;
/// A century
const MAX_WINDOW_HOURS: u32 = 24 * 365 * 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    /// Comma separated, matches any
    pub emotions: Option<String>,
    pub is_public: Option<bool>,
    pub window_hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyParams {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Meters
    pub max_distance: Option<f64>,
    pub limit: Option<u32>,
}

pub async fn create_confession(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    payload: Result<Json<CreateConfessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let confession = state.submit_confession(req, requester.user_id()).await?;

    Ok((
        StatusCode::CREATED,
        Json(ConfessionResponse {
            message: "Confession submitted successfully".into(),
            confession,
        }),
    ))
}

pub async fn list_confessions(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;
    let query = list_query(&params)?;

    // Private confessions are never listed
    if params.is_public == Some(false) {
        return Ok(Json(ConfessionPage {
            total: 0,
            total_pages: 1,
            current_page: query.page,
            confessions: vec![],
        }));
    }

    let page = state.with_db(move |db| Ok(db.list_confessions(&query)?)).await?;

    Ok(Json(ConfessionPage {
        total: page.total,
        total_pages: page.total_pages,
        current_page: page.page,
        confessions: page.confessions,
    }))
}

fn list_query(params: &ListParams) -> Result<ListQuery, ApiError> {
    let mut query = ListQuery::default();

    if let Some(page) = params.page {
        if page == 0 {
            return Err(ApiError::BadRequest("page starts at 1".into()));
        }
        query.page = page;
    }
    if let Some(limit) = params.limit {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        query.limit = limit;
    }

    query.sort_by = match params.sort_by.as_deref() {
        None | Some("createdAt") => SortField::CreatedAt,
        Some("updatedAt") => SortField::UpdatedAt,
        Some(other) => return Err(ApiError::BadRequest(format!("cannot sort by '{}'", other))),
    };
    query.order = match params.sort_order.as_deref() {
        None | Some("desc") => SortOrder::Desc,
        Some("asc") => SortOrder::Asc,
        Some(other) => return Err(ApiError::BadRequest(format!("unknown sort order '{}'", other))),
    };

    if let Some(raw) = &params.emotions {
        let mut errors = ValidationErrors::default();
        for value in raw.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            match value.to_lowercase().parse::<Emotion>() {
                Ok(emotion) if !query.emotions.contains(&emotion) => query.emotions.push(emotion),
                Ok(_) => {}
                Err(_) => errors.push(
                    "emotions",
                    ValidationCode::InvalidEmotion,
                    format!("Unknown emotion '{}'", value),
                ),
            }
        }
        errors.finish(())?;
    }

    if let Some(hours) = params.window_hours {
        if hours > MAX_WINDOW_HOURS {
            return Err(ApiError::BadRequest(format!(
                "windowHours must be at most {}",
                MAX_WINDOW_HOURS
            )));
        }
        query.since = Utc::now().checked_sub_signed(TimeDelta::hours(i64::from(hours)));
    }

    Ok(query)
}

pub async fn nearby_confessions(
    State(state): State<AppState>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params?;

    let center = params
        .longitude
        .zip(params.latitude)
        .and_then(|(lon, lat)| GeoPoint::new(lon, lat))
        .ok_or_else(|| {
            ApiError::BadRequest("longitude and latitude are required and must be in range".into())
        })?;

    let max_distance = params.max_distance.unwrap_or(DEFAULT_MAX_DISTANCE_M);
    if !max_distance.is_finite() || max_distance <= 0.0 {
        return Err(ApiError::BadRequest("maxDistance must be a positive number of meters".into()));
    }
    let limit = params.limit.unwrap_or(DEFAULT_NEARBY_LIMIT).clamp(1, MAX_PAGE_SIZE);

    let hits = state
        .with_db(move |db| Ok(db.nearby_confessions(center, max_distance, limit)?))
        .await?;

    let confessions: Vec<_> = hits.into_iter().map(|(confession, _)| confession).collect();
    Ok(Json(NearbyResponse {
        count: confessions.len(),
        confessions,
    }))
}

pub async fn get_confession(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;

    let confession = state
        .with_db(move |db| Ok(db.get_confession(id)?))
        .await?
        .filter(|c| requester.can_view(c))
        .ok_or(ApiError::NotFound("Confession"))?;

    Ok(Json(ConfessionEnvelope { confession }))
}

pub async fn update_confession(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateConfessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = requester.claims()?.clone();
    let Path(id) = id?;
    let Json(req) = payload?;

    let patch = validate_patch(req)?;
    if patch.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }

    let confession = state
        .with_db(move |db| {
            let existing = db.get_confession(id)?.ok_or(ApiError::NotFound("Confession"))?;
            if !can_modify(&claims, &existing) {
                return Err(ApiError::Forbidden);
            }
            db.update_confession(id, &patch)?
                .ok_or(ApiError::NotFound("Confession"))
        })
        .await?;

    info!("Confession {} updated", id);
    Ok(Json(ConfessionResponse {
        message: "Confession updated successfully".into(),
        confession,
    }))
}

pub async fn delete_confession(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = requester.claims()?.clone();
    let Path(id) = id?;

    state
        .with_db(move |db| {
            let existing = db.get_confession(id)?.ok_or(ApiError::NotFound("Confession"))?;
            if !can_modify(&claims, &existing) {
                return Err(ApiError::Forbidden);
            }
            if !db.delete_confession(id)? {
                return Err(ApiError::NotFound("Confession"));
            }
            Ok(())
        })
        .await?;

    info!("Confession {} deleted", id);
    Ok(Json(DeleteResponse {
        message: "Confession deleted successfully".into(),
        confession_id: id,
    }))
}

pub async fn react_to_confession(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ReactRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let Json(req) = payload?;

    let reaction: ReactionType = req
        .reaction_type
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid reaction type: {}", e)))?;

    let reactions = state
        .with_db(move |db| Ok(db.increment_reaction(id, reaction)?))
        .await?
        .ok_or(ApiError::NotFound("Confession"))?;

    Ok(Json(ReactionResponse {
        message: "Reaction added successfully".into(),
        reactions,
    }))
}
