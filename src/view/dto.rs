use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::dto::{GenderFilter, User};

/// Everything a users table needs to render one frame.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub page: usize,
    pub search_input: String,
    pub search_term: String,
    pub gender: GenderFilter,
    pub users: Vec<User>,
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
    pub total_pages: usize,
    pub range_start: usize,
    pub range_end: usize,
    pub has_prev: bool,
    pub has_next: bool,
    pub is_loading: bool,
    pub is_fetching: bool,
    /// Rows belong to a previous query while the current one loads.
    pub is_placeholder: bool,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub active_filters: ActiveFilters,
    pub detail: Option<DetailState>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveFilters {
    pub search: Option<String>,
    pub gender: Option<GenderFilter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailState {
    pub user_id: u64,
    pub user: Option<User>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedView {
    pub id: Uuid,
    pub state: ViewState,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct GenderRequest {
    pub gender: GenderFilter,
}

#[derive(Debug, Deserialize)]
pub struct PageRequest {
    pub page: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub user_id: u64,
}
