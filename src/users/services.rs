use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::users::dto::{Gender, User, UsersResponse};
use crate::users::error::DirectoryError;
use crate::users::upstream::UpstreamApi;
use crate::view::query::Query;

/// How free-text search is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Pull the user set and match locally on full name and email.
    Scan,
    /// Use the upstream `/users/search` endpoint when no gender filter is set.
    Upstream,
}

impl std::str::FromStr for SearchStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(SearchStrategy::Scan),
            "upstream" => Ok(SearchStrategy::Upstream),
            other => anyhow::bail!("unknown search strategy {:?}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub chunk_size: usize,
    pub search_strategy: SearchStrategy,
    /// `None` scans the whole upstream set.
    pub search_scan_limit: Option<usize>,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            search_strategy: SearchStrategy::Scan,
            search_scan_limit: None,
        }
    }
}

/// Directory client: turns page/search/filter requests into upstream calls
/// and normalizes the result into a [`UsersResponse`].
pub struct UserDirectory {
    upstream: Arc<dyn UpstreamApi>,
    settings: DirectorySettings,
}

impl UserDirectory {
    pub fn new(upstream: Arc<dyn UpstreamApi>, settings: DirectorySettings) -> Self {
        Self { upstream, settings }
    }

    /// Resolves a composed query key.
    pub async fn query(&self, query: &Query) -> Result<UsersResponse, DirectoryError> {
        let gender = query.gender.as_gender();
        if query.is_search() {
            self.search_users(&query.search_term, query.page, query.limit, gender)
                .await
        } else {
            self.fetch_page(query.page, query.limit, gender).await
        }
    }

    /// Without a gender filter this is a single paged request returned as-is.
    /// With one, the upstream has no server-side filter, so the whole set is
    /// pulled, filtered and re-paginated; `total` is then the filtered count.
    #[instrument(skip(self))]
    pub async fn fetch_page(
        &self,
        page: usize,
        limit: usize,
        gender: Option<Gender>,
    ) -> Result<UsersResponse, DirectoryError> {
        let skip = checked_skip(page, limit)?;
        let Some(gender) = gender else {
            return self.upstream.list_users(limit, skip).await;
        };

        let (all, _) = self.fetch_all(None).await?;
        let filtered: Vec<User> = all.into_iter().filter(|u| u.gender == gender).collect();
        Ok(paginate(filtered, skip, limit))
    }

    /// Case-insensitive match of `term` against "first last" and email.
    #[instrument(skip(self))]
    pub async fn search_users(
        &self,
        term: &str,
        page: usize,
        limit: usize,
        gender: Option<Gender>,
    ) -> Result<UsersResponse, DirectoryError> {
        let skip = checked_skip(page, limit)?;
        if self.settings.search_strategy == SearchStrategy::Upstream && gender.is_none() {
            return self.upstream.search_users(term, limit, skip).await;
        }

        let (all, truncated) = self.fetch_all(self.settings.search_scan_limit).await?;
        if truncated {
            warn!(
                term,
                scanned = all.len(),
                "search scan hit the configured limit; later matches are not included"
            );
        }

        let matched: Vec<User> = all
            .into_iter()
            .filter(|u| gender.map_or(true, |g| u.gender == g))
            .filter(|u| matches_term(u, term))
            .collect();
        debug!(term, matched = matched.len(), "search complete");
        Ok(paginate(matched, skip, limit))
    }

    #[instrument(skip(self))]
    pub async fn fetch_user_by_id(&self, id: u64) -> Result<User, DirectoryError> {
        self.upstream.get_user(id).await
    }

    /// Walks the upstream set in chunks until `total` is covered. Returns the
    /// users and whether `cap` stopped the walk early.
    async fn fetch_all(&self, cap: Option<usize>) -> Result<(Vec<User>, bool), DirectoryError> {
        let chunk = self.settings.chunk_size.max(1);
        let mut users: Vec<User> = Vec::new();

        loop {
            let limit = match cap {
                Some(cap) if users.len() >= cap => return Ok((users, true)),
                Some(cap) => chunk.min(cap - users.len()),
                None => chunk,
            };

            let res = self.upstream.list_users(limit, users.len()).await?;
            if res.users.is_empty() {
                break;
            }
            users.extend(res.users);
            if users.len() >= res.total {
                break;
            }
        }

        debug!(fetched = users.len(), "fetched full user set");
        Ok((users, false))
    }
}

pub(crate) fn matches_term(user: &User, term: &str) -> bool {
    let needle = term.to_lowercase();
    user.full_name().to_lowercase().contains(&needle) || user.email.to_lowercase().contains(&needle)
}

/// Offset of the first row of `page`, or `None` when it does not fit in a `usize`.
pub fn page_offset(page: usize, limit: usize) -> Option<usize> {
    page.checked_mul(limit)
}

fn checked_skip(page: usize, limit: usize) -> Result<usize, DirectoryError> {
    page_offset(page, limit)
        .ok_or_else(|| DirectoryError::fetch_failed("users", format!("page {} is out of range", page)))
}

/// Slices `[skip, skip + limit)` out of an already filtered set.
pub(crate) fn paginate(users: Vec<User>, skip: usize, limit: usize) -> UsersResponse {
    let total = users.len();
    let users = users.into_iter().skip(skip).take(limit).collect();
    UsersResponse {
        users,
        total,
        skip,
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::dto::GenderFilter;
    use crate::users::upstream::fake::{sample_users, InMemoryUpstream};

    fn directory(upstream: Arc<InMemoryUpstream>, settings: DirectorySettings) -> UserDirectory {
        UserDirectory::new(upstream, settings)
    }

    #[tokio::test]
    async fn unfiltered_page_is_a_single_request() {
        let upstream = Arc::new(InMemoryUpstream::with_users(208));
        let dir = directory(upstream.clone(), DirectorySettings::default());

        let res = dir.fetch_page(0, 10, None).await.unwrap();
        assert_eq!(res.skip, 0);
        assert_eq!(res.users.len(), 10);
        assert_eq!(res.total, 208);
        assert_eq!(upstream.list_calls(), 1);
    }

    #[tokio::test]
    async fn unfiltered_pages_respect_min_of_limit_and_remaining() {
        let upstream = Arc::new(InMemoryUpstream::with_users(208));
        let dir = directory(upstream, DirectorySettings::default());

        for page in [0usize, 5, 20, 21] {
            let res = dir.fetch_page(page, 10, None).await.unwrap();
            assert_eq!(res.skip, page * 10);
            assert_eq!(res.users.len(), 10usize.min(res.total.saturating_sub(res.skip)));
        }
    }

    #[tokio::test]
    async fn female_filter_second_page() {
        let upstream = Arc::new(InMemoryUpstream::with_users(208));
        let dir = directory(upstream.clone(), DirectorySettings::default());

        let res = dir.fetch_page(1, 10, Some(Gender::Female)).await.unwrap();
        assert_eq!(res.skip, 10);
        assert_eq!(res.users.len(), 10);
        assert!(res.users.iter().all(|u| u.gender == Gender::Female));
        assert_eq!(res.total, 104);
        // 208 users in chunks of 100
        assert_eq!(upstream.list_calls(), 3);
    }

    #[tokio::test]
    async fn gender_filter_total_is_filtered_count() {
        let users: Vec<User> = sample_users(30)
            .into_iter()
            .map(|mut u| {
                if u.id > 3 {
                    u.gender = Gender::Female;
                }
                u
            })
            .collect();
        let upstream = Arc::new(InMemoryUpstream::new(users));
        let dir = directory(upstream, DirectorySettings::default());

        let res = dir.fetch_page(0, 10, Some(Gender::Male)).await.unwrap();
        assert_eq!(res.total, 2);
        assert_eq!(res.users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn search_matches_name_or_email_case_insensitively() {
        let upstream = Arc::new(InMemoryUpstream::with_users(208));
        let dir = directory(upstream, DirectorySettings::default());

        let res = dir.search_users("JOHN", 0, 10, None).await.unwrap();
        assert!(!res.users.is_empty());
        assert!(res.users.iter().all(|u| {
            u.full_name().to_lowercase().contains("john") || u.email.contains("john")
        }));

        let expected = sample_users(208).iter().filter(|u| matches_term(u, "john")).count();
        assert_eq!(res.total, expected);
    }

    #[tokio::test]
    async fn search_matches_across_first_and_last_name() {
        let upstream = Arc::new(InMemoryUpstream::with_users(40));
        let dir = directory(upstream, DirectorySettings::default());

        let res = dir.search_users("emily johnson", 0, 50, None).await.unwrap();
        assert!(!res.users.is_empty());
        assert!(res
            .users
            .iter()
            .all(|u| u.first_name == "Emily" && u.last_name == "Johnson"));
    }

    #[tokio::test]
    async fn search_combines_with_gender_filter() {
        let upstream = Arc::new(InMemoryUpstream::with_users(208));
        let dir = directory(upstream, DirectorySettings::default());

        let res = dir
            .search_users("smith", 0, 10, Some(Gender::Male))
            .await
            .unwrap();
        assert!(!res.users.is_empty());
        assert!(res
            .users
            .iter()
            .all(|u| u.gender == Gender::Male && matches_term(u, "smith")));
    }

    #[tokio::test]
    async fn search_scans_past_a_thousand_records_by_default() {
        let mut users = sample_users(1200);
        users[1150].first_name = "Zebulon".into();
        let upstream = Arc::new(InMemoryUpstream::new(users));
        let dir = directory(upstream, DirectorySettings::default());

        let res = dir.search_users("zebulon", 0, 10, None).await.unwrap();
        assert_eq!(res.total, 1);
        assert_eq!(res.users[0].id, 1151);
    }

    #[tokio::test]
    async fn configured_scan_limit_truncates_the_search() {
        let mut users = sample_users(1200);
        users[1150].first_name = "Zebulon".into();
        let upstream = Arc::new(InMemoryUpstream::new(users));
        let dir = directory(
            upstream.clone(),
            DirectorySettings {
                search_scan_limit: Some(1000),
                ..Default::default()
            },
        );

        let res = dir.search_users("zebulon", 0, 10, None).await.unwrap();
        assert_eq!(res.total, 0);
        assert_eq!(upstream.list_calls(), 10);
    }

    #[tokio::test]
    async fn upstream_strategy_delegates_only_without_gender() {
        let upstream = Arc::new(InMemoryUpstream::with_users(50));
        let dir = directory(
            upstream.clone(),
            DirectorySettings {
                search_strategy: SearchStrategy::Upstream,
                ..Default::default()
            },
        );

        dir.search_users("john", 0, 10, None).await.unwrap();
        assert_eq!(upstream.search_calls(), 1);
        assert_eq!(upstream.list_calls(), 0);

        dir.search_users("john", 0, 10, Some(Gender::Female)).await.unwrap();
        assert_eq!(upstream.search_calls(), 1);
        assert_eq!(upstream.list_calls(), 1);
    }

    #[tokio::test]
    async fn query_dispatches_on_search_term() {
        let upstream = Arc::new(InMemoryUpstream::with_users(25));
        let dir = directory(upstream, DirectorySettings::default());

        let listed = dir
            .query(&Query::new(2, "", GenderFilter::All, 10))
            .await
            .unwrap();
        assert_eq!(listed.skip, 20);
        assert_eq!(listed.users.len(), 5);

        let searched = dir
            .query(&Query::new(0, "  ava ", GenderFilter::All, 10))
            .await
            .unwrap();
        assert!(searched.users.iter().all(|u| matches_term(u, "ava")));
    }

    #[tokio::test]
    async fn failures_propagate_as_fetch_failed() {
        let upstream = Arc::new(InMemoryUpstream::with_users(25));
        upstream.set_failing(true);
        let dir = directory(upstream, DirectorySettings::default());

        let err = dir.fetch_page(0, 10, Some(Gender::Male)).await.unwrap_err();
        assert!(matches!(err, DirectoryError::FetchFailed { .. }));
        assert!(dir.fetch_user_by_id(1).await.is_err());
    }

    #[tokio::test]
    async fn unknown_user_is_fetch_failed() {
        let upstream = Arc::new(InMemoryUpstream::with_users(5));
        let dir = directory(upstream, DirectorySettings::default());

        assert_eq!(dir.fetch_user_by_id(3).await.unwrap().id, 3);
        assert!(dir.fetch_user_by_id(99).await.is_err());
    }

    #[test]
    fn paginate_past_the_end_is_empty() {
        let res = paginate(sample_users(12), 20, 10);
        assert!(res.users.is_empty());
        assert_eq!(res.total, 12);
        assert_eq!(res.skip, 20);
    }

    #[tokio::test]
    async fn overflowing_page_is_fetch_failed_without_upstream_calls() {
        let upstream = Arc::new(InMemoryUpstream::with_users(30));
        let dir = directory(upstream.clone(), DirectorySettings::default());

        let err = dir.fetch_page(usize::MAX, 10, None).await.unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(dir.fetch_page(usize::MAX / 5, 10, Some(Gender::Male)).await.is_err());
        assert!(dir.search_users("john", usize::MAX, 10, None).await.is_err());
        assert_eq!(upstream.list_calls(), 0);
        assert_eq!(upstream.search_calls(), 0);
    }

    #[test]
    fn page_offset_detects_overflow() {
        assert_eq!(page_offset(3, 10), Some(30));
        assert_eq!(page_offset(usize::MAX, 1), Some(usize::MAX));
        assert_eq!(page_offset(usize::MAX / 5, 10), None);
    }

    #[test]
    fn search_strategy_parses() {
        assert_eq!("Scan".parse::<SearchStrategy>().unwrap(), SearchStrategy::Scan);
        assert_eq!("upstream".parse::<SearchStrategy>().unwrap(), SearchStrategy::Upstream);
        assert!("fuzzy".parse::<SearchStrategy>().is_err());
    }
}
