use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::users::dto::{GenderFilter, User, UsersResponse};
use crate::users::error::DirectoryError;
use crate::users::services::{page_offset, UserDirectory};
use crate::view::cache::{CacheEntry, Lookup, QueryCache};
use crate::view::debounce::Debouncer;
use crate::view::dto::{ActiveFilters, DetailState, ViewState};
use crate::view::query::Query;

#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub page_size: usize,
    pub debounce: Duration,
    pub stale_time: Duration,
    pub max_entries: usize,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            debounce: Duration::from_millis(400),
            stale_time: Duration::from_secs(5 * 60),
            max_entries: 64,
        }
    }
}

struct Shown {
    key: Query,
    response: UsersResponse,
    updated_at: OffsetDateTime,
}

struct Detail {
    user_id: u64,
    user: Option<User>,
    error: Option<String>,
}

struct ViewInner {
    page: usize,
    search_input: String,
    search_term: String,
    gender: GenderFilter,
    latest: Option<Query>,
    in_flight: HashSet<Query>,
    shown: Option<Shown>,
    error: Option<String>,
    results: QueryCache<Query, UsersResponse>,
    detail: Option<Detail>,
    details: QueryCache<u64, User>,
    detail_in_flight: HashSet<u64>,
}

impl ViewInner {
    fn show(&mut self, key: Query, entry: CacheEntry<UsersResponse>) {
        self.shown = Some(Shown {
            key,
            response: entry.value,
            updated_at: entry.updated_at,
        });
    }

    /// Total of the displayed rows, if they belong to the latest key.
    fn current_total(&self) -> Option<usize> {
        self.shown
            .as_ref()
            .filter(|s| self.latest.as_ref() == Some(&s.key))
            .map(|s| s.response.total)
    }
}

/// One operator's users table: page, debounced search and gender filter
/// composed into a cache key, with results reused across keys.
///
/// Only the response for the most recently requested key reaches the
/// published state; late responses for superseded keys only warm the cache.
pub struct UsersView {
    directory: Arc<UserDirectory>,
    settings: ViewSettings,
    debouncer: Debouncer,
    inner: Mutex<ViewInner>,
    state_tx: watch::Sender<ViewState>,
}

impl UsersView {
    /// Creates the view and starts loading the first page.
    pub fn open(directory: Arc<UserDirectory>, settings: ViewSettings) -> Arc<Self> {
        let inner = ViewInner {
            page: 0,
            search_input: String::new(),
            search_term: String::new(),
            gender: GenderFilter::All,
            latest: None,
            in_flight: HashSet::new(),
            shown: None,
            error: None,
            results: QueryCache::new(settings.stale_time, settings.max_entries),
            detail: None,
            details: QueryCache::new(settings.stale_time, settings.max_entries),
            detail_in_flight: HashSet::new(),
        };
        let (state_tx, _) = watch::channel(ViewState::default());
        let view = Arc::new(Self {
            directory,
            settings,
            debouncer: Debouncer::new(),
            inner: Mutex::new(inner),
            state_tx,
        });
        view.apply(false, |_| {});
        view
    }

    pub fn state(&self) -> ViewState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state_tx.subscribe()
    }

    /// Raw keystrokes. The page resets right away; the term joins the query
    /// key only after the debounce delay passes without further input.
    pub fn set_search_text(self: &Arc<Self>, text: impl Into<String>) {
        let text = text.into();
        let input = text.clone();
        self.apply(false, move |inner| {
            inner.search_input = input;
            inner.page = 0;
        });

        let weak = Arc::downgrade(self);
        self.debouncer
            .start(text, self.settings.debounce, move |settled: String| {
                if let Some(view) = weak.upgrade() {
                    view.promote_search(settled);
                }
            });
    }

    pub fn clear_search(self: &Arc<Self>) {
        self.debouncer.cancel();
        self.apply(false, |inner| {
            inner.search_input.clear();
            inner.search_term.clear();
            inner.page = 0;
        });
    }

    pub fn set_gender(self: &Arc<Self>, gender: GenderFilter) {
        self.apply(false, move |inner| {
            inner.gender = gender;
            inner.page = 0;
        });
    }

    pub fn clear_filters(self: &Arc<Self>) {
        self.debouncer.cancel();
        self.apply(false, |inner| {
            inner.search_input.clear();
            inner.search_term.clear();
            inner.gender = GenderFilter::All;
            inner.page = 0;
        });
    }

    pub fn set_page(self: &Arc<Self>, page: usize) {
        self.apply(false, move |inner| inner.page = page);
    }

    /// No-op on the last page of the current result. While placeholder rows
    /// are shown the real total is unknown, so the move is allowed.
    pub fn next_page(self: &Arc<Self>) {
        let page_size = self.settings.page_size;
        self.apply(false, move |inner| {
            let next = inner.page.saturating_add(1);
            let allowed = inner
                .current_total()
                .map_or(true, |total| next < total.div_ceil(page_size));
            if allowed && page_offset(next, page_size).is_some() {
                inner.page = next;
            }
        });
    }

    pub fn prev_page(self: &Arc<Self>) {
        self.apply(false, |inner| inner.page = inner.page.saturating_sub(1));
    }

    /// Re-requests the current key even if its cached result is fresh.
    pub fn refetch(self: &Arc<Self>) {
        self.apply(true, |_| {});
    }

    pub fn select_user(self: &Arc<Self>, user_id: u64) {
        let spawn = {
            let mut inner = self.inner.lock();
            let (user, needs_fetch) = match inner.details.lookup(&user_id, Instant::now()) {
                Lookup::Fresh(entry) => (Some(entry.value), false),
                Lookup::Stale(entry) => (Some(entry.value), true),
                Lookup::Miss => (None, true),
            };
            inner.detail = Some(Detail {
                user_id,
                user,
                error: None,
            });
            let spawn = needs_fetch && inner.detail_in_flight.insert(user_id);
            self.publish(&inner);
            spawn
        };

        if spawn {
            let view = Arc::clone(self);
            tokio::spawn(async move {
                let directory = Arc::clone(&view.directory);
                let fetch = tokio::spawn(async move { directory.fetch_user_by_id(user_id).await });
                let result = fetch
                    .await
                    .unwrap_or_else(|e| Err(DirectoryError::fetch_failed("user details", e)));
                view.commit_detail(user_id, result);
            });
        }
    }

    pub fn close_detail(&self) {
        let mut inner = self.inner.lock();
        inner.detail = None;
        self.publish(&inner);
    }

    fn promote_search(self: &Arc<Self>, term: String) {
        self.apply(false, move |inner| {
            if inner.search_input != term {
                debug!(term = %term, "dropping settled term superseded by newer input");
                return;
            }
            debug!(term = %term, "search term settled");
            inner.search_term = term;
        });
    }

    fn apply(self: &Arc<Self>, force: bool, change: impl FnOnce(&mut ViewInner)) {
        let spawn = {
            let mut inner = self.inner.lock();
            change(&mut *inner);
            let spawn = self.activate(&mut *inner, force);
            self.publish(&inner);
            spawn
        };

        if let Some(key) = spawn {
            let view = Arc::clone(self);
            tokio::spawn(async move {
                let directory = Arc::clone(&view.directory);
                let query = key.clone();
                let fetch = tokio::spawn(async move { directory.query(&query).await });
                // a panicking fetch still has to release its in-flight slot
                let result = fetch
                    .await
                    .unwrap_or_else(|e| Err(DirectoryError::fetch_failed("users", e)));
                view.commit(key, result);
            });
        }
    }

    /// Makes the current inputs the latest key. Returns the key when a fetch
    /// has to be started for it.
    fn activate(&self, inner: &mut ViewInner, force: bool) -> Option<Query> {
        let key = Query::new(
            inner.page,
            &inner.search_term,
            inner.gender,
            self.settings.page_size,
        );
        let changed = inner.latest.as_ref() != Some(&key);
        if !changed && !force {
            return None;
        }
        if changed {
            debug!(?key, "query key changed");
        }
        inner.error = None;
        inner.latest = Some(key.clone());

        match inner.results.lookup(&key, Instant::now()) {
            Lookup::Fresh(entry) => {
                inner.show(key.clone(), entry);
                if !force {
                    return None;
                }
            }
            Lookup::Stale(entry) => inner.show(key.clone(), entry),
            Lookup::Miss => {}
        }

        if inner.in_flight.insert(key.clone()) {
            Some(key)
        } else {
            None
        }
    }

    fn commit(&self, key: Query, result: Result<UsersResponse, DirectoryError>) {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(&key);
        let current = inner.latest.as_ref() == Some(&key);

        match result {
            Ok(response) => {
                let entry = inner.results.insert(key.clone(), response, Instant::now());
                if current {
                    inner.error = None;
                    inner.show(key, entry);
                } else {
                    debug!(?key, "discarding response for superseded query");
                }
            }
            Err(e) if current => {
                warn!(error = %e, ?key, "users query failed");
                inner.error = Some(e.to_string());
            }
            Err(e) => {
                debug!(error = %e, ?key, "dropping failure for superseded query");
            }
        }

        self.publish(&inner);
    }

    fn commit_detail(&self, user_id: u64, result: Result<User, DirectoryError>) {
        let mut inner = self.inner.lock();
        inner.detail_in_flight.remove(&user_id);
        if let Ok(user) = &result {
            inner.details.insert(user_id, user.clone(), Instant::now());
        }

        match inner.detail.as_mut() {
            Some(detail) if detail.user_id == user_id => match result {
                Ok(user) => {
                    detail.user = Some(user);
                    detail.error = None;
                }
                Err(e) => {
                    warn!(error = %e, user_id, "user details failed");
                    detail.error = Some(e.to_string());
                }
            },
            _ => debug!(user_id, "details arrived for a closed selection"),
        }

        self.publish(&inner);
    }

    fn publish(&self, inner: &ViewInner) {
        self.state_tx.send_replace(self.render(inner));
    }

    fn render(&self, inner: &ViewInner) -> ViewState {
        let limit = self.settings.page_size;
        let is_fetching = inner
            .latest
            .as_ref()
            .is_some_and(|k| inner.in_flight.contains(k));

        let (users, total, skip, updated_at, is_placeholder) = match &inner.shown {
            Some(s) => (
                s.response.users.clone(),
                s.response.total,
                s.response.skip,
                Some(s.updated_at),
                inner.latest.as_ref() != Some(&s.key),
            ),
            None => (Vec::new(), 0, inner.page.saturating_mul(limit), None, false),
        };
        let total_pages = total.div_ceil(limit.max(1));
        let range_start = if users.is_empty() { 0 } else { skip.saturating_add(1) };
        let range_end = skip.saturating_add(users.len());

        let detail = inner.detail.as_ref().map(|d| DetailState {
            user_id: d.user_id,
            user: d.user.clone(),
            is_loading: d.user.is_none()
                && d.error.is_none()
                && inner.detail_in_flight.contains(&d.user_id),
            error: d.error.clone(),
        });

        ViewState {
            page: inner.page,
            search_input: inner.search_input.clone(),
            search_term: inner.search_term.clone(),
            gender: inner.gender,
            users,
            total,
            skip,
            limit,
            total_pages,
            range_start,
            range_end,
            has_prev: inner.page > 0,
            has_next: inner.page.saturating_add(1) < total_pages,
            is_loading: is_fetching && inner.shown.is_none(),
            is_fetching,
            is_placeholder,
            error: inner.error.clone(),
            updated_at,
            active_filters: ActiveFilters {
                search: Some(inner.search_input.trim().to_string()).filter(|s| !s.is_empty()),
                gender: Some(inner.gender).filter(|g| *g != GenderFilter::All),
            },
            detail,
        }
    }
}
