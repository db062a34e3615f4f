pub mod dto;
pub mod error;
pub mod handlers;
pub mod services;
pub mod upstream;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::read_routes())
}
