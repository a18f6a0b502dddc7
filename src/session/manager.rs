//! Process-wide owner of the single active session.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::{SessionHandle, SessionOptions};
use crate::transport::{ConnectParams, Connector};
use crate::Result;

/// Keeps at most one session open at a time.
///
/// Connecting while a session is active closes the previous one first.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    options: SessionOptions,
    current: Mutex<Option<Arc<SessionHandle>>>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, options: SessionOptions) -> Self {
        Self {
            connector,
            options,
            current: Mutex::new(None),
        }
    }

    /// Open a new session, replacing any active one.
    pub async fn connect(&self, params: ConnectParams) -> Result<Arc<SessionHandle>> {
        let handle = Arc::new(SessionHandle::new(params, self.options.clone()));
        self.connect_handle(handle).await
    }

    /// Connect a handle created by the caller (e.g. after subscribing to
    /// its state), replacing any active session.
    pub async fn connect_handle(&self, handle: Arc<SessionHandle>) -> Result<Arc<SessionHandle>> {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            info!(host = %previous.host(), "closing previous session");
            previous.disconnect().await;
        }

        handle.connect(Arc::clone(&self.connector)).await?;
        *current = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// The active session, if any.
    pub async fn current(&self) -> Option<Arc<SessionHandle>> {
        self.current.lock().await.clone()
    }

    /// Close the active session. No-op when none is open.
    pub async fn disconnect(&self) {
        let previous = self.current.lock().await.take();
        if let Some(session) = previous {
            session.disconnect().await;
        }
    }
}
