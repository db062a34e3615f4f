use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::users::dto::{User, UsersResponse};
use crate::users::error::DirectoryError;

/// The third-party user API. Only non-2xx and transport failures are errors.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    async fn list_users(&self, limit: usize, skip: usize) -> Result<UsersResponse, DirectoryError>;
    async fn search_users(
        &self,
        q: &str,
        limit: usize,
        skip: usize,
    ) -> Result<UsersResponse, DirectoryError>;
    async fn get_user(&self, id: u64) -> Result<User, DirectoryError>;
}

#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        what: &str,
        req: RequestBuilder,
    ) -> Result<T, DirectoryError> {
        let res = req.send().await.map_err(|e| {
            warn!(error = %e, what, "upstream request failed");
            DirectoryError::fetch_failed(what, e)
        })?;

        let status = res.status();
        if !status.is_success() {
            warn!(%status, what, "upstream returned non-success status");
            return Err(DirectoryError::fetch_failed(
                what,
                format!("upstream returned {}", status),
            ));
        }

        res.json::<T>()
            .await
            .map_err(|e| DirectoryError::fetch_failed(what, e))
    }
}

#[async_trait]
impl UpstreamApi for HttpUpstream {
    async fn list_users(&self, limit: usize, skip: usize) -> Result<UsersResponse, DirectoryError> {
        debug!(limit, skip, "GET /users");
        let req = self
            .client
            .get(format!("{}/users", self.base_url))
            .query(&[("limit", limit), ("skip", skip)]);
        self.fetch_json("users", req).await
    }

    async fn search_users(
        &self,
        q: &str,
        limit: usize,
        skip: usize,
    ) -> Result<UsersResponse, DirectoryError> {
        debug!(q, limit, skip, "GET /users/search");
        let req = self
            .client
            .get(format!("{}/users/search", self.base_url))
            .query(&[("q", q)])
            .query(&[("limit", limit), ("skip", skip)]);
        self.fetch_json("users", req).await
    }

    async fn get_user(&self, id: u64) -> Result<User, DirectoryError> {
        debug!(id, "GET /users/:id");
        let req = self.client.get(format!("{}/users/{}", self.base_url, id));
        self.fetch_json("user details", req).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn user_json(id: u64) -> serde_json::Value {
        json!({
            "id": id,
            "firstName": "Emily",
            "lastName": "Johnson",
            "age": 28,
            "gender": "female",
            "email": "emily.johnson@x.dummyjson.com",
            "phone": "+81 965-431-3024",
            "username": "emilys"
        })
    }

    #[tokio::test]
    async fn list_users_sends_limit_and_skip() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/users")
                    .query_param("limit", "10")
                    .query_param("skip", "20");
                then.status(200).json_body(json!({
                    "users": [user_json(21)],
                    "total": 208,
                    "skip": 20,
                    "limit": 10
                }));
            })
            .await;

        let upstream = HttpUpstream::new(&server.base_url(), None).unwrap();
        let res = upstream.list_users(10, 20).await.expect("list ok");

        assert_eq!(res.total, 208);
        assert_eq!(res.skip, 20);
        assert_eq!(res.users[0].id, 21);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn search_users_passes_query_term() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/users/search")
                    .query_param("q", "john doe")
                    .query_param("limit", "10")
                    .query_param("skip", "0");
                then.status(200).json_body(json!({
                    "users": [], "total": 0, "skip": 0, "limit": 10
                }));
            })
            .await;

        let upstream = HttpUpstream::new(&format!("{}/", server.base_url()), None).unwrap();
        let res = upstream.search_users("john doe", 10, 0).await.expect("search ok");

        assert!(res.users.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users");
                then.status(500).body("boom");
            })
            .await;

        let upstream = HttpUpstream::new(&server.base_url(), None).unwrap();
        let err = upstream.list_users(10, 0).await.unwrap_err();

        let DirectoryError::FetchFailed { what, reason } = err;
        assert_eq!(what, "users");
        assert!(reason.contains("500"), "reason was {reason}");
    }

    #[tokio::test]
    async fn get_user_404_is_fetch_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users/9999");
                then.status(404).json_body(json!({"message": "User with id '9999' not found"}));
            })
            .await;

        let upstream = HttpUpstream::new(&server.base_url(), None).unwrap();
        let err = upstream.get_user(9999).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to fetch user details"));
    }

    #[tokio::test]
    async fn get_user_decodes_single_record() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users/3");
                then.status(200).json_body(user_json(3));
            })
            .await;

        let upstream = HttpUpstream::new(&server.base_url(), None).unwrap();
        let user = upstream.get_user(3).await.expect("user");
        assert_eq!(user.id, 3);
        assert_eq!(user.username, "emilys");
    }

    #[tokio::test]
    async fn malformed_body_is_fetch_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/users");
                then.status(200).body("not json");
            })
            .await;

        let upstream = HttpUpstream::new(&server.base_url(), None).unwrap();
        assert!(upstream.list_users(10, 0).await.is_err());
    }
}
