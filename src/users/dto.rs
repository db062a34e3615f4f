use serde::{Deserialize, Serialize};

/// Gender as reported by the upstream directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Gender filter chosen by the operator; `All` disables filtering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GenderFilter {
    #[default]
    All,
    Male,
    Female,
}

impl GenderFilter {
    pub fn as_gender(self) -> Option<Gender> {
        match self {
            GenderFilter::All => None,
            GenderFilter::Male => Some(Gender::Male),
            GenderFilter::Female => Some(Gender::Female),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Company {
    pub name: String,
    pub department: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

/// User record as served by the upstream API. Never mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maiden_name: Option<String>,
    pub age: u32,
    pub gender: Gender,
    pub email: String,
    pub phone: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<Company>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One page of users. `total` counts the whole (possibly filtered) result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsersResponse {
    pub users: Vec<User>,
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
}

/// Query string of `GET /users`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub page: usize,
    pub limit: Option<usize>,
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub gender: GenderFilter,
}
