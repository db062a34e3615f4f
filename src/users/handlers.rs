use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, instrument};

use crate::{
    state::AppState,
    users::dto::{ListParams, User, UsersResponse},
    users::services::page_offset,
    view::query::Query as UsersQuery,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user))
}

/// One-shot listing without a view session: no debounce, no cache.
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<UsersResponse>, (StatusCode, String)> {
    let limit = p.limit.unwrap_or(state.config.view.page_size);
    if limit == 0 {
        return Err((StatusCode::BAD_REQUEST, "limit must be positive".into()));
    }
    if page_offset(p.page, limit).is_none() {
        return Err((StatusCode::BAD_REQUEST, "page is out of range".into()));
    }

    let query = UsersQuery::new(p.page, &p.q, p.gender, limit);
    let res = state.directory.query(&query).await.map_err(|e| {
        error!(error = %e, ?query, "list_users failed");
        (StatusCode::BAD_GATEWAY, e.to_string())
    })?;
    Ok(Json(res))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<User>, (StatusCode, String)> {
    match state.directory.fetch_user_by_id(id).await {
        Ok(user) => Ok(Json(user)),
        Err(e) => {
            error!(error = %e, %id, "user not found");
            Err((StatusCode::NOT_FOUND, "User not found".into()))
        }
    }
}
