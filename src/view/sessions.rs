use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::users::services::UserDirectory;
use crate::view::composer::{UsersView, ViewSettings};

struct Session {
    view: Arc<UsersView>,
    last_access: Instant,
}

/// Open users-table sessions, one per connected operator.
pub struct ViewRegistry {
    directory: Arc<UserDirectory>,
    settings: ViewSettings,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl ViewRegistry {
    pub fn new(directory: Arc<UserDirectory>, settings: ViewSettings, idle_timeout: Duration) -> Self {
        Self {
            directory,
            settings,
            idle_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self) -> (Uuid, Arc<UsersView>) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();

        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.last_access) < self.idle_timeout);
        if sessions.len() < before {
            debug!(pruned = before - sessions.len(), "dropped idle view sessions");
        }

        let id = Uuid::new_v4();
        let view = UsersView::open(Arc::clone(&self.directory), self.settings.clone());
        sessions.insert(
            id,
            Session {
                view: Arc::clone(&view),
                last_access: now,
            },
        );
        info!(%id, open = sessions.len(), "view session created");
        (id, view)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<UsersView>> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id)?;
        session.last_access = Instant::now();
        Some(Arc::clone(&session.view))
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.sessions.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}
