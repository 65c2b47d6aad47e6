//! Registry of open full-page capture sessions.
//!
//! Owns session identity and tab affinity: a tab may hold at most one open
//! session, and every lookup is checked against the requesting tab.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::types::capture::CaptureMeta;
use crate::types::errors::SessionError;

/// An open capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSession {
    pub session_id: String,
    pub tab_id: i64,
    pub window_id: i64,
    pub meta: CaptureMeta,
    pub created_at: i64,
}

/// Trait defining the session registry interface.
pub trait SessionRegistryTrait {
    fn open(&mut self, tab_id: i64, window_id: i64, meta: CaptureMeta) -> Result<String, SessionError>;
    fn validate(&self, session_id: &str, tab_id: i64) -> Result<&CaptureSession, SessionError>;
    fn close(&mut self, session_id: &str) -> Option<CaptureSession>;
    fn close_for_tab(&mut self, tab_id: i64) -> Option<CaptureSession>;
    fn get(&self, session_id: &str) -> Option<&CaptureSession>;
    fn session_for_tab(&self, tab_id: i64) -> Option<&CaptureSession>;
    fn session_count(&self) -> usize;
}

/// In-memory session registry.
pub struct SessionRegistry {
    sessions: HashMap<String, CaptureSession>,
    by_tab: HashMap<i64, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            by_tab: HashMap::new(),
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistryTrait for SessionRegistry {
    /// Opens a session for `tab_id` and returns its fresh ID.
    ///
    /// Fails on invalid metadata or when the tab already has an open session.
    fn open(&mut self, tab_id: i64, window_id: i64, meta: CaptureMeta) -> Result<String, SessionError> {
        meta.validate().map_err(SessionError::InvalidMeta)?;
        if let Some(existing) = self.by_tab.get(&tab_id) {
            return Err(SessionError::TabBusy {
                tab_id,
                session_id: existing.clone(),
            });
        }

        let session_id = Uuid::new_v4().to_string();
        self.sessions.insert(
            session_id.clone(),
            CaptureSession {
                session_id: session_id.clone(),
                tab_id,
                window_id,
                meta,
                created_at: Self::now(),
            },
        );
        self.by_tab.insert(tab_id, session_id.clone());
        Ok(session_id)
    }

    /// Looks up a session on behalf of `tab_id` without changing anything.
    fn validate(&self, session_id: &str, tab_id: i64) -> Result<&CaptureSession, SessionError> {
        if session_id.trim().is_empty() {
            return Err(SessionError::MalformedId(session_id.to_string()));
        }
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if session.tab_id != tab_id {
            return Err(SessionError::TabMismatch {
                session_id: session_id.to_string(),
                expected: session.tab_id,
                actual: tab_id,
            });
        }
        Ok(session)
    }

    fn close(&mut self, session_id: &str) -> Option<CaptureSession> {
        let session = self.sessions.remove(session_id)?;
        if self.by_tab.get(&session.tab_id).map(String::as_str) == Some(session_id) {
            self.by_tab.remove(&session.tab_id);
        }
        Some(session)
    }

    fn close_for_tab(&mut self, tab_id: i64) -> Option<CaptureSession> {
        let session_id = self.by_tab.remove(&tab_id)?;
        self.sessions.remove(&session_id)
    }

    fn get(&self, session_id: &str) -> Option<&CaptureSession> {
        self.sessions.get(session_id)
    }

    fn session_for_tab(&self, tab_id: i64) -> Option<&CaptureSession> {
        self.by_tab
            .get(&tab_id)
            .and_then(|id| self.sessions.get(id))
    }

    fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
