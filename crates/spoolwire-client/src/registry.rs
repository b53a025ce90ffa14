// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-wide state behind the global lock.
//
// The lock guards exactly these values and nothing per-thread:
//   - the transport new sessions dial through
//   - the server override (`host[:port]`)
//   - the requesting-user override
//   - the registry of live sessions, keyed by owning thread
//
// Sessions copy the overrides when they are created; changing them later
// affects only sessions created afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::ThreadId;

use tracing::{debug, warn};

use crate::transport::{HttpTransport, Transport};

/// Process-unique identifier of a session context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// The process-wide values guarded by [`lock_global`].
#[derive(Default)]
pub struct GlobalSettings {
    /// Transport used by sessions created from now on.
    pub transport: Option<Arc<dyn Transport>>,
    /// Server override, `host[:port]`.
    pub server: Option<String>,
    /// Requesting-user override.
    pub user: Option<String>,
    sessions: HashMap<ThreadId, ContextId>,
}

impl GlobalSettings {
    /// The configured transport, or plain HTTP.
    pub fn transport(&self) -> Arc<dyn Transport> {
        match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(HttpTransport::default()),
        }
    }

    /// Record a new session for `thread`.
    pub(crate) fn register(&mut self, thread: ThreadId, id: ContextId) {
        if let Some(previous) = self.sessions.insert(thread, id) {
            warn!(%previous, %id, "thread already had a live session");
        }
        debug!(%id, live = self.sessions.len(), "session registered");
    }

    /// Forget the session owned by `thread`.
    ///
    /// Returns `false` when nothing was registered, which makes a second
    /// teardown of the same thread observable.
    pub(crate) fn destroy(&mut self, thread: ThreadId) -> bool {
        match self.sessions.remove(&thread) {
            Some(id) => {
                debug!(%id, live = self.sessions.len(), "session destroyed");
                true
            }
            None => false,
        }
    }

    /// Whether the session `id` is still alive on some thread.
    pub fn is_live(&self, id: ContextId) -> bool {
        self.sessions.values().any(|live| *live == id)
    }

    /// The live session on `thread`, if any.
    pub fn session_of(&self, thread: ThreadId) -> Option<ContextId> {
        self.sessions.get(&thread).copied()
    }

    pub fn live_count(&self) -> usize {
        self.sessions.len()
    }
}

static GLOBALS: OnceLock<Mutex<GlobalSettings>> = OnceLock::new();

/// One-time initialisation of the global state. Cheap after the first call.
pub(crate) fn init() -> &'static Mutex<GlobalSettings> {
    GLOBALS.get_or_init(|| {
        debug!("initialising global session state");
        Mutex::new(GlobalSettings::default())
    })
}

/// Acquire the global lock. Dropping the guard releases it.
///
/// A panic while the lock was held does not make the state unusable: the
/// guarded values are plain settings that stay valid.
pub fn lock_global() -> MutexGuard<'static, GlobalSettings> {
    init().lock().unwrap_or_else(PoisonError::into_inner)
}

/// Route sessions created from now on through `transport`.
pub fn set_transport(transport: Arc<dyn Transport>) {
    lock_global().transport = Some(transport);
}

/// Override the spooler address for sessions created from now on.
pub fn set_server(server: Option<String>) {
    lock_global().server = server;
}

/// Override the requesting user for sessions created from now on.
pub fn set_user(user: Option<String>) {
    lock_global().user = user;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("ctx-"));
    }

    #[test]
    fn destroy_reports_missing_registration() {
        let thread = std::thread::spawn(|| std::thread::current().id())
            .join()
            .expect("join");
        let id = ContextId::next();

        let mut globals = lock_global();
        globals.register(thread, id);
        assert!(globals.is_live(id));
        assert_eq!(globals.session_of(thread), Some(id));
        assert!(globals.destroy(thread));
        assert!(!globals.destroy(thread));
        assert!(!globals.is_live(id));
    }

    #[test]
    fn server_override_is_shared_process_wide() {
        set_server(Some("spooler.test:8631".into()));
        let seen = std::thread::spawn(|| lock_global().server.clone())
            .join()
            .expect("join");
        set_server(None);
        assert_eq!(seen.as_deref(), Some("spooler.test:8631"));
    }

    #[test]
    fn lock_survives_poisoning() {
        let _ = std::thread::spawn(|| {
            let _guard = lock_global();
            panic!("poison the global lock");
        })
        .join();
        let globals = lock_global();
        let _ = globals.live_count();
    }
}
