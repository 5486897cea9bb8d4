use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::instrument;

use crate::error::AppResult;
use crate::models::{CreateVentureRequest, UpdateVentureRequest, Venture};
use crate::state::AppState;
use crate::validation::{parse_venture_id, validate_create, validate_update};

/// List all ventures.
#[instrument(skip(state))]
pub async fn list_ventures(State(state): State<AppState>) -> Json<Vec<Venture>> {
    Json(state.ventures.list().await)
}

/// Get a venture by id.
#[instrument(skip(state))]
pub async fn get_venture(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Venture>> {
    let id = parse_venture_id(&id)?;
    Ok(Json(state.ventures.get(id).await?))
}

/// Create a venture.
#[instrument(skip(state, payload))]
pub async fn create_venture(
    State(state): State<AppState>,
    payload: Result<Json<CreateVentureRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Venture>)> {
    let Json(payload) = payload?;
    validate_create(&payload)?;

    let venture = state.ventures.create(payload).await;

    Ok((StatusCode::CREATED, Json(venture)))
}

/// Update a venture. Absent fields keep their value.
#[instrument(skip(state, payload))]
pub async fn update_venture(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateVentureRequest>, JsonRejection>,
) -> AppResult<Json<Venture>> {
    // Path first, so a malformed id is reported even with a bad body
    let id = parse_venture_id(&id)?;
    let Json(payload) = payload?;
    validate_update(&payload)?;

    Ok(Json(state.ventures.update(id, payload).await?))
}

/// Delete a venture.
#[instrument(skip(state))]
pub async fn delete_venture(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_venture_id(&id)?;
    state.ventures.delete(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
