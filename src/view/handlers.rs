use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    state::AppState,
    users::services::page_offset,
    view::composer::UsersView,
    view::dto::{CreatedView, GenderRequest, PageRequest, SearchRequest, SelectionRequest, ViewState},
};

type ViewResult = Result<Json<ViewState>, (StatusCode, String)>;

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/views", post(create_view))
        .route("/views/:id", get(get_view).delete(delete_view))
}

pub fn intent_routes() -> Router<AppState> {
    Router::new()
        .route("/views/:id/search", put(set_search))
        .route("/views/:id/clear-search", post(clear_search))
        .route("/views/:id/gender", put(set_gender))
        .route("/views/:id/clear-filters", post(clear_filters))
        .route("/views/:id/page", put(set_page))
        .route("/views/:id/page/next", post(next_page))
        .route("/views/:id/page/prev", post(prev_page))
        .route("/views/:id/refetch", post(refetch))
        .route("/views/:id/selection", put(select_user).delete(close_detail))
}

fn find(state: &AppState, id: &Uuid) -> Result<Arc<UsersView>, (StatusCode, String)> {
    state.views.get(id).ok_or_else(|| {
        warn!(%id, "unknown view session");
        (StatusCode::NOT_FOUND, "View not found".into())
    })
}

#[instrument(skip(state))]
pub async fn create_view(State(state): State<AppState>) -> (StatusCode, Json<CreatedView>) {
    let (id, view) = state.views.create();
    (
        StatusCode::CREATED,
        Json(CreatedView {
            id,
            state: view.state(),
        }),
    )
}

#[instrument(skip(state))]
pub async fn get_view(State(state): State<AppState>, Path(id): Path<Uuid>) -> ViewResult {
    Ok(Json(find(&state, &id)?.state()))
}

#[instrument(skip(state))]
pub async fn delete_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.views.remove(&id) {
        info!(%id, "view session closed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "View not found".into()))
    }
}

#[instrument(skip(state, body))]
pub async fn set_search(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SearchRequest>,
) -> ViewResult {
    let view = find(&state, &id)?;
    view.set_search_text(body.text);
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn clear_search(State(state): State<AppState>, Path(id): Path<Uuid>) -> ViewResult {
    let view = find(&state, &id)?;
    view.clear_search();
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn set_gender(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<GenderRequest>,
) -> ViewResult {
    let view = find(&state, &id)?;
    view.set_gender(body.gender);
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn clear_filters(State(state): State<AppState>, Path(id): Path<Uuid>) -> ViewResult {
    let view = find(&state, &id)?;
    view.clear_filters();
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn set_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PageRequest>,
) -> ViewResult {
    if page_offset(body.page, state.config.view.page_size).is_none() {
        return Err((StatusCode::BAD_REQUEST, "page is out of range".into()));
    }
    let view = find(&state, &id)?;
    view.set_page(body.page);
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn next_page(State(state): State<AppState>, Path(id): Path<Uuid>) -> ViewResult {
    let view = find(&state, &id)?;
    view.next_page();
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn prev_page(State(state): State<AppState>, Path(id): Path<Uuid>) -> ViewResult {
    let view = find(&state, &id)?;
    view.prev_page();
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn refetch(State(state): State<AppState>, Path(id): Path<Uuid>) -> ViewResult {
    let view = find(&state, &id)?;
    view.refetch();
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn select_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectionRequest>,
) -> ViewResult {
    let view = find(&state, &id)?;
    view.select_user(body.user_id);
    Ok(Json(view.state()))
}

#[instrument(skip(state))]
pub async fn close_detail(State(state): State<AppState>, Path(id): Path<Uuid>) -> ViewResult {
    let view = find(&state, &id)?;
    view.close_detail();
    Ok(Json(view.state()))
}
