// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-thread session state.
//
// Every protocol call runs against the calling thread's session: its
// connection, its last-error state, its buffer pool, and its cached default
// destination. A session is created on first use, lives in a thread-local
// slot, and is torn down by that slot's destructor when the thread exits.
//
// The environment (directory overrides, server/user variables, LPDEST and
// PRINTER) is read once, when the session is created.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tracing::{debug, warn};

use spoolwire_core::config::ClientConfig;
use spoolwire_core::error::{Result, SpoolwireError};
use spoolwire_core::types::{AttributeMessage, LastError, StatusCode};

use crate::buffers::BufferPool;
use crate::config::{self, Overrides};
use crate::defaults;
use crate::dirs::{Directories, Environment, SystemEnvironment};
use crate::registry::{self, ContextId};
use crate::transport::{Connection, Transport};

/// Initial size of the scratch buffer lent to the transport.
const SCRATCH_CAPACITY: usize = 4096;

/// Mutable state owned by one session.
pub struct SessionContext {
    id: ContextId,
    owner: ThreadId,
    transport: Arc<dyn Transport>,
    connection: Option<Box<dyn Connection>>,
    last_error: LastError,
    buffers: BufferPool,
    default_dest: Option<Rc<str>>,
    env_default_dest: Option<String>,
    directories: Directories,
    config: ClientConfig,
    next_request_id: u32,
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.buffers.clear();
        self.default_dest = None;
        self.last_error = LastError::ok();
        debug!(id = %self.id, "session torn down");
    }
}

/// Handle to a session context.
///
/// Cheap to clone. Not `Send`: a session never leaves the thread that owns it.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Rc<RefCell<SessionContext>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ctx = self.inner.borrow();
        f.debug_struct("SessionHandle")
            .field("id", &ctx.id)
            .field("owner", &ctx.owner)
            .field("connected", &ctx.connection.is_some())
            .finish()
    }
}

impl SessionHandle {
    /// Build a session that is not bound to the calling thread's slot.
    ///
    /// Used for embedding with an explicit transport, and by tests. It is not
    /// listed in the session registry and tears down when the last handle
    /// drops.
    pub fn standalone<E: Environment + ?Sized>(env: &E, transport: Arc<dyn Transport>) -> Self {
        let overrides = {
            let globals = registry::lock_global();
            Overrides {
                server: globals.server.clone(),
                user: globals.user.clone(),
            }
        };
        Self::build(env, ContextId::next(), transport, &overrides)
    }

    /// Create the session for the calling thread and register it.
    fn create_for_current_thread() -> Self {
        let env = SystemEnvironment;
        let id = ContextId::next();
        let (transport, overrides) = {
            let mut globals = registry::lock_global();
            globals.register(thread::current().id(), id);
            let overrides = Overrides {
                server: globals.server.clone(),
                user: globals.user.clone(),
            };
            (globals.transport(), overrides)
        };
        Self::build(&env, id, transport, &overrides)
    }

    fn build<E: Environment + ?Sized>(
        env: &E,
        id: ContextId,
        transport: Arc<dyn Transport>,
        overrides: &Overrides,
    ) -> Self {
        let directories = Directories::resolve(env);
        let config = config::resolve(env, &directories, overrides);
        let context = SessionContext {
            id,
            owner: thread::current().id(),
            transport,
            connection: None,
            last_error: LastError::ok(),
            buffers: BufferPool::new(),
            default_dest: None,
            env_default_dest: defaults::from_environment(env),
            directories,
            config,
            next_request_id: 1,
        };
        debug!(%id, "session created");
        Self {
            inner: Rc::new(RefCell::new(context)),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.borrow().id
    }

    /// The thread this session belongs to.
    pub fn owner(&self) -> ThreadId {
        self.inner.borrow().owner
    }

    /// Whether both handles refer to the same session.
    pub fn same_context(&self, other: &SessionHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // -- error state --------------------------------------------------------

    /// Outcome of the most recent operation on this session.
    pub fn last_error(&self) -> LastError {
        self.inner.borrow().last_error.clone()
    }

    pub fn set_last_error(&self, status: StatusCode, message: Option<String>) {
        self.inner.borrow_mut().last_error = LastError { status, message };
    }

    /// Record the outcome of an operation and pass it through.
    pub fn record<T>(&self, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Ok(_) => self.set_last_error(StatusCode::OK, None),
            Err(e) => self.set_last_error(e.status(), e.status_message()),
        }
        outcome
    }

    // -- configuration ------------------------------------------------------

    pub fn directories(&self) -> Directories {
        self.inner.borrow().directories.clone()
    }

    pub fn config(&self) -> ClientConfig {
        self.inner.borrow().config.clone()
    }

    /// The requesting user name sent with every request.
    pub fn user(&self) -> String {
        self.inner
            .borrow()
            .config
            .user
            .clone()
            .unwrap_or_else(|| "anonymous".to_string())
    }

    // -- default destination cache ------------------------------------------

    pub fn cached_default(&self) -> Option<Rc<str>> {
        self.inner.borrow().default_dest.clone()
    }

    pub(crate) fn cache_default(&self, name: &str) -> Rc<str> {
        let name: Rc<str> = Rc::from(name);
        self.inner.borrow_mut().default_dest = Some(Rc::clone(&name));
        name
    }

    /// Forget the cached default so the next lookup asks again.
    pub fn clear_default_cache(&self) {
        self.inner.borrow_mut().default_dest = None;
    }

    pub(crate) fn env_default(&self) -> Option<String> {
        self.inner.borrow().env_default_dest.clone()
    }

    // -- buffers ------------------------------------------------------------

    pub fn take_buffer(&self, min_capacity: usize) -> Result<Vec<u8>> {
        self.inner.borrow_mut().buffers.take(min_capacity)
    }

    pub fn give_buffer(&self, buf: Vec<u8>) {
        self.inner.borrow_mut().buffers.give(buf);
    }

    pub fn pooled_buffers(&self) -> usize {
        self.inner.borrow().buffers.pooled()
    }

    // -- requests -----------------------------------------------------------

    pub(crate) fn next_request_id(&self) -> u32 {
        let mut ctx = self.inner.borrow_mut();
        let id = ctx.next_request_id;
        ctx.next_request_id = ctx.next_request_id.wrapping_add(1).max(1);
        id
    }

    pub fn is_connected(&self) -> bool {
        self.inner.borrow().connection.is_some()
    }

    /// Send `request` over this session's connection, dialling the default
    /// server on first use.
    ///
    /// The connection is checked out of the context for the duration of the
    /// call, so no borrow of the session is held while blocked on I/O.
    pub fn send(&self, request: &AttributeMessage, resource: &str) -> Result<AttributeMessage> {
        let mut connection = self.checkout_connection()?;

        let scratch = self.inner.borrow_mut().buffers.take(SCRATCH_CAPACITY);
        let mut scratch = match scratch {
            Ok(buf) => buf,
            Err(e) => {
                self.inner.borrow_mut().connection = Some(connection);
                return Err(e);
            }
        };

        let response = connection.send_request(request, resource, &mut scratch);

        let mut ctx = self.inner.borrow_mut();
        ctx.buffers.give(scratch);
        ctx.connection = Some(connection);
        response
    }

    fn checkout_connection(&self) -> Result<Box<dyn Connection>> {
        let (transport, config) = {
            let mut ctx = self.inner.borrow_mut();
            if let Some(connection) = ctx.connection.take() {
                return Ok(connection);
            }
            (Arc::clone(&ctx.transport), ctx.config.clone())
        };
        debug!(server = %config.server, port = config.port, "dialling default server");
        transport.connect_default(&config)
    }
}

// ---------------------------------------------------------------------------
// Thread-local slot
// ---------------------------------------------------------------------------

/// Holds the thread's session. Dropped by the runtime at thread exit, and
/// only if the thread ever touched it.
struct Slot {
    session: RefCell<Option<SessionHandle>>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let Some(handle) = self.session.get_mut().take() else {
            return;
        };
        let (id, owner) = (handle.id(), handle.owner());
        drop(handle);
        if !registry::lock_global().destroy(owner) {
            warn!(%id, "session was not registered at teardown");
        }
    }
}

thread_local! {
    static SLOT: Slot = const {
        Slot {
            session: RefCell::new(None),
        }
    };
}

/// The calling thread's session, created on first use.
///
/// Fails with [`SpoolwireError::NoContext`] once the thread has started
/// tearing down its thread-locals.
pub fn acquire_context() -> Result<SessionHandle> {
    registry::init();
    SLOT.try_with(|slot| {
        if let Some(handle) = slot.session.borrow().as_ref() {
            return handle.clone();
        }
        let handle = SessionHandle::create_for_current_thread();
        *slot.session.borrow_mut() = Some(handle.clone());
        handle
    })
    .map_err(|_| SpoolwireError::NoContext)
}

/// Last-error state of the calling thread's session.
pub fn last_error() -> Result<LastError> {
    Ok(acquire_context()?.last_error())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::dirs::tests::FakeEnv;

    /// Replays canned responses and records what was sent.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub responses: Mutex<VecDeque<Result<AttributeMessage>>>,
        pub sent: Mutex<Vec<(AttributeMessage, String)>>,
        pub dials: Mutex<usize>,
        pub refuse: bool,
    }

    impl ScriptedTransport {
        pub(crate) fn replying(responses: Vec<Result<AttributeMessage>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            })
        }

        pub(crate) fn refusing() -> Arc<Self> {
            Arc::new(Self {
                refuse: true,
                ..Self::default()
            })
        }

        pub(crate) fn sent(&self) -> Vec<(AttributeMessage, String)> {
            self.sent.lock().expect("sent lock").clone()
        }

        pub(crate) fn dials(&self) -> usize {
            *self.dials.lock().expect("dials lock")
        }
    }

    struct ScriptedConnection {
        script: Arc<ScriptedTransport>,
    }

    impl Connection for ScriptedConnection {
        fn send_request(
            &mut self,
            request: &AttributeMessage,
            resource: &str,
            _scratch: &mut Vec<u8>,
        ) -> Result<AttributeMessage> {
            self.script
                .sent
                .lock()
                .expect("sent lock")
                .push((request.clone(), resource.to_string()));
            self.script
                .responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err(SpoolwireError::Transport("script exhausted".into())))
        }
    }

    /// Wraps an `Arc<ScriptedTransport>` so connections can share the script.
    pub(crate) struct Scripted(pub Arc<ScriptedTransport>);

    impl Transport for Scripted {
        fn connect_default(&self, _config: &ClientConfig) -> Result<Box<dyn Connection>> {
            *self.0.dials.lock().expect("dials lock") += 1;
            if self.0.refuse {
                return Err(SpoolwireError::Transport("connection refused".into()));
            }
            Ok(Box::new(ScriptedConnection {
                script: Arc::clone(&self.0),
            }))
        }
    }

    /// Route `tracing` output through the test harness. `RUST_LOG` filters.
    pub(crate) fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    pub(crate) fn scripted_session(script: &Arc<ScriptedTransport>) -> SessionHandle {
        init_tracing();
        let env = FakeEnv::new().set("USER", "alice");
        SessionHandle::standalone(&env, Arc::new(Scripted(Arc::clone(script))))
    }

    #[test]
    fn same_thread_gets_same_context() {
        let a = acquire_context().expect("context");
        let b = acquire_context().expect("context");
        assert!(a.same_context(&b));
        assert_eq!(a.id(), b.id());
        assert_eq!(a.owner(), thread::current().id());
    }

    #[test]
    fn contexts_are_isolated_between_threads() {
        let here = acquire_context().expect("context");
        here.set_last_error(StatusCode::NOT_FOUND, Some("only on this thread".into()));

        let there = thread::spawn(|| {
            let ctx = acquire_context().expect("context");
            (ctx.id(), ctx.last_error())
        })
        .join()
        .expect("join");

        assert_ne!(there.0, here.id());
        assert_eq!(there.1, LastError::ok());
        assert_eq!(here.last_error().status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn teardown_runs_at_thread_exit() {
        let (id, thread_id) = thread::spawn(|| {
            let ctx = acquire_context().expect("context");
            assert!(registry::lock_global().is_live(ctx.id()));
            (ctx.id(), thread::current().id())
        })
        .join()
        .expect("join");

        let globals = registry::lock_global();
        assert!(!globals.is_live(id));
        assert_eq!(globals.session_of(thread_id), None);
    }

    #[test]
    fn thread_that_never_asks_creates_nothing() {
        let thread_id = thread::spawn(|| thread::current().id())
            .join()
            .expect("join");
        assert_eq!(registry::lock_global().session_of(thread_id), None);
    }

    #[test]
    fn concurrent_first_use_creates_one_context_per_thread() {
        let ids: Vec<ContextId> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    let a = acquire_context().expect("context");
                    let b = acquire_context().expect("context");
                    assert!(a.same_context(&b));
                    a.id()
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().expect("join"))
            .collect();

        let mut unique = ids.clone();
        unique.sort_by_key(|id| id.to_string());
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn record_overwrites_error_state() {
        let script = ScriptedTransport::replying(vec![]);
        let session = scripted_session(&script);

        let failed: Result<()> = Err(SpoolwireError::Protocol {
            status: StatusCode::FORBIDDEN,
            message: Some("not allowed".into()),
        });
        assert!(session.record(failed).is_err());
        assert_eq!(session.last_error().status, StatusCode::FORBIDDEN);
        assert_eq!(session.last_error().describe(), "not allowed");

        assert!(session.record(Ok(())).is_ok());
        assert_eq!(session.last_error(), LastError::ok());
    }

    #[test]
    fn connection_is_dialled_lazily_and_reused() {
        let ok = AttributeMessage::response(StatusCode::OK, 1);
        let script = ScriptedTransport::replying(vec![Ok(ok.clone()), Ok(ok)]);
        let session = scripted_session(&script);
        assert!(!session.is_connected());
        assert_eq!(script.dials(), 0);

        let request = AttributeMessage::request(spoolwire_core::Operation::GetJobs, 1);
        session.send(&request, "/").expect("first");
        session.send(&request, "/").expect("second");

        assert!(session.is_connected());
        assert_eq!(script.dials(), 1);
        assert_eq!(script.sent().len(), 2);
        assert_eq!(session.pooled_buffers(), 1);
    }

    #[test]
    fn refused_connection_is_an_error_not_a_panic() {
        let script = ScriptedTransport::refusing();
        let session = scripted_session(&script);
        let request = AttributeMessage::request(spoolwire_core::Operation::GetJobs, 1);

        let err = session.send(&request, "/").expect_err("refused");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!session.is_connected());
    }

    #[test]
    fn request_ids_increase() {
        let script = ScriptedTransport::replying(vec![]);
        let session = scripted_session(&script);
        assert_eq!(session.next_request_id(), 1);
        assert_eq!(session.next_request_id(), 2);
    }

    #[test]
    fn default_cache_round_trip() {
        let script = ScriptedTransport::replying(vec![]);
        let session = scripted_session(&script);
        assert!(session.cached_default().is_none());
        session.cache_default("office");
        assert_eq!(session.cached_default().as_deref(), Some("office"));
        session.clear_default_cache();
        assert!(session.cached_default().is_none());
    }

    #[test]
    fn standalone_session_uses_environment_user() {
        let script = ScriptedTransport::replying(vec![]);
        let session = scripted_session(&script);
        assert_eq!(session.user(), "alice");
        assert!(!registry::lock_global().is_live(session.id()));
    }

    #[test]
    fn closing_on_drop_happens_once() {
        struct Counting(Arc<Mutex<usize>>);
        impl Connection for Counting {
            fn send_request(
                &mut self,
                _request: &AttributeMessage,
                _resource: &str,
                _scratch: &mut Vec<u8>,
            ) -> Result<AttributeMessage> {
                Ok(AttributeMessage::response(StatusCode::OK, 1))
            }
            fn close(&mut self) {
                *self.0.lock().expect("count") += 1;
            }
        }
        struct CountingTransport(Arc<Mutex<usize>>);
        impl Transport for CountingTransport {
            fn connect_default(&self, _config: &ClientConfig) -> Result<Box<dyn Connection>> {
                Ok(Box::new(Counting(Arc::clone(&self.0))))
            }
        }

        let closes = Arc::new(Mutex::new(0));
        let session = SessionHandle::standalone(
            &FakeEnv::new(),
            Arc::new(CountingTransport(Arc::clone(&closes))),
        );
        let request = AttributeMessage::request(spoolwire_core::Operation::GetJobs, 1);
        session.send(&request, "/").expect("send");
        let clone = session.clone();
        drop(session);
        assert_eq!(*closes.lock().expect("count"), 0);
        drop(clone);
        assert_eq!(*closes.lock().expect("count"), 1);
    }
}
