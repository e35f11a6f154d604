//! Login and ban state
//!
//! Only the client's receive path writes this; everything else reads a
//! snapshot. The ban is sticky for the life of the process unless an
//! operator clears it.

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: Option<String>,
    pub logged_in: bool,
    pub banned: bool,
    pub ban_reason: Option<String>,
}

/// Shared handle to the process-wide [`Session`]
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock().logged_in
    }

    pub fn is_banned(&self) -> bool {
        self.lock().banned
    }

    pub fn session_id(&self) -> Option<String> {
        let session = self.lock();
        session
            .logged_in
            .then(|| session.session_id.clone())
            .flatten()
    }

    pub fn ban_reason(&self) -> Option<String> {
        self.lock().ban_reason.clone()
    }

    pub(crate) fn login(&self, session_id: impl Into<String>) {
        let mut session = self.lock();
        session.session_id = Some(session_id.into());
        session.logged_in = true;
    }

    /// Forget the session; the next send logs in again
    pub(crate) fn logout(&self) {
        let mut session = self.lock();
        session.session_id = None;
        session.logged_in = false;
    }

    pub(crate) fn ban(&self, reason: impl Into<String>) {
        let mut session = self.lock();
        session.banned = true;
        session.ban_reason = Some(reason.into());
        session.logged_in = false;
        session.session_id = None;
    }

    /// Operator action lifting a ban so sending resumes
    pub fn clear_ban(&self) {
        let mut session = self.lock();
        session.banned = false;
        session.ban_reason = None;
    }
}
