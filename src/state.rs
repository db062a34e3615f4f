use crate::config::AppConfig;
use crate::users::services::UserDirectory;
use crate::users::upstream::{HttpUpstream, UpstreamApi};
use crate::view::sessions::ViewRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<UserDirectory>,
    pub views: Arc<ViewRegistry>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let upstream = Arc::new(HttpUpstream::new(
            &config.upstream.base_url,
            config.upstream.timeout,
        )?) as Arc<dyn UpstreamApi>;

        tracing::info!(
            base_url = %config.upstream.base_url,
            strategy = ?config.directory.search_strategy,
            scan_limit = ?config.directory.search_scan_limit,
            "upstream directory configured"
        );

        Ok(Self::from_parts(Arc::new(config), upstream))
    }

    pub fn from_parts(config: Arc<AppConfig>, upstream: Arc<dyn UpstreamApi>) -> Self {
        let directory = Arc::new(UserDirectory::new(upstream, config.directory.clone()));
        let views = Arc::new(ViewRegistry::new(
            Arc::clone(&directory),
            config.view.clone(),
            config.view_idle,
        ));
        Self {
            config,
            directory,
            views,
        }
    }

    #[cfg(test)]
    pub fn fake(users: u64) -> Self {
        use crate::users::upstream::fake::InMemoryUpstream;

        let config = AppConfig::from_lookup(|_| None).expect("default config");
        let upstream = Arc::new(InMemoryUpstream::with_users(users)) as Arc<dyn UpstreamApi>;
        Self::from_parts(Arc::new(config), upstream)
    }
}
