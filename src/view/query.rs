use serde::Serialize;

use crate::users::dto::GenderFilter;

/// Cache key of the users table. Two queries are equal iff every field is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub page: usize,
    pub search_term: String,
    pub gender: GenderFilter,
    pub limit: usize,
}

impl Query {
    /// The search term is trimmed; blank means "no search".
    pub fn new(page: usize, search_term: &str, gender: GenderFilter, limit: usize) -> Self {
        Self {
            page,
            search_term: search_term.trim().to_string(),
            gender,
            limit,
        }
    }

    pub fn is_search(&self) -> bool {
        !self.search_term.is_empty()
    }
}
