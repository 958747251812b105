use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use shared::domain::SessionName;
use storage::StoreLocation;
use tokio::sync::Mutex;
use tracing::info;

use crate::endpoint::{spawn_session, SessionHandle};

/// Lazily starts one endpoint per session name, each with its own store.
#[derive(Clone)]
pub struct SessionRegistry {
    location: StoreLocation,
    slide_limit: Option<u32>,
    event_capacity: usize,
    sessions: Arc<Mutex<HashMap<SessionName, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new(location: StoreLocation, slide_limit: Option<u32>, event_capacity: usize) -> Self {
        Self {
            location,
            slide_limit,
            event_capacity,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the running session, starting it first when needed.
    pub async fn open(&self, name: &SessionName) -> Result<SessionHandle> {
        if let Some(handle) = self.sessions.lock().await.get(name) {
            return Ok(handle.clone());
        }
        self.start(name).await
    }

    /// Like [`open`](Self::open), but never creates a store: `None` unless
    /// the session is running or has a database from an earlier run.
    pub async fn get(&self, name: &SessionName) -> Result<Option<SessionHandle>> {
        if let Some(handle) = self.sessions.lock().await.get(name) {
            return Ok(Some(handle.clone()));
        }
        if !self.location.has_store(name) {
            return Ok(None);
        }
        self.start(name).await.map(Some)
    }

    async fn start(&self, name: &SessionName) -> Result<SessionHandle> {
        // The store opens without the lock; a racing start for the same name
        // wins if it inserts first and this store is dropped.
        let storage = self.location.open(name).await?;

        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(name) {
            return Ok(handle.clone());
        }
        let handle = spawn_session(
            name.clone(),
            Arc::new(storage),
            self.slide_limit,
            self.event_capacity,
        );
        info!(
            session = %name,
            database_url = %self.location.database_url(name),
            "opened session"
        );
        sessions.insert(name.clone(), handle.clone());
        Ok(handle)
    }

    pub async fn session_names(&self) -> Vec<SessionName> {
        let mut names: Vec<_> = self.sessions.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}
