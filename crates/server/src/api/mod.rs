use std::{collections::BTreeMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use shared::{
    domain::{Direction, SessionName},
    protocol::{PresentationState, ReactionRequest, SetSlideRequest},
};

use tracing::warn;

use crate::app_state::{bad_body, internal, ApiResult, AppState};

pub(crate) mod ws;

pub(crate) async fn healthz() -> &'static str {
    "ok"
}

pub(crate) async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionName>> {
    Json(state.sessions.session_names().await)
}

pub(crate) async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> ApiResult<Json<PresentationState>> {
    let handle = state.existing_session(&session).await?;
    let update = handle.snapshot().await.map_err(internal)?;
    Ok(Json(update.state))
}

pub(crate) async fn advance_forward(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> ApiResult<StatusCode> {
    advance(&state, &session, Direction::Forward).await
}

pub(crate) async fn advance_backward(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> ApiResult<StatusCode> {
    advance(&state, &session, Direction::Backward).await
}

async fn advance(state: &AppState, session: &str, direction: Direction) -> ApiResult<StatusCode> {
    let handle = state.session(session).await?;
    handle.advance_slide(direction).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn set_slide(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    body: Result<Json<SetSlideRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(req) = body.map_err(bad_body)?;
    let handle = state.session(&session).await?;
    handle.set_slide(req).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `202 Accepted` unless the session or its storage fails. Bodies that are
/// not a `ReactionRequest` are dropped like off-vocabulary reactions.
pub(crate) async fn submit_reaction(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let handle = state.session(&session).await?;
    let req = match serde_json::from_slice::<ReactionRequest>(&body) {
        Ok(req) => req,
        Err(error) => {
            warn!(session = %handle.name(), %error, "dropping malformed reaction");
            return Ok(StatusCode::ACCEPTED);
        }
    };
    handle
        .submit_reaction(req.reaction)
        .await
        .map_err(internal)?;
    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn reaction_totals(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
) -> ApiResult<Json<BTreeMap<String, u64>>> {
    let handle = state.existing_session(&session).await?;
    let totals = handle.reaction_totals().await.map_err(internal)?;
    Ok(Json(totals.into_iter().collect()))
}
