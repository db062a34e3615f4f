pub mod cache;
pub mod composer;
pub mod debounce;
pub mod dto;
pub mod handlers;
pub mod query;
pub mod sessions;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::session_routes())
        .merge(handlers::intent_routes())
}
