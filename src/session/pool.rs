use crate::config::Config;
use crate::runtime::{Browser, BrowserContext, Cookie, RuntimeError};
use crate::session::{Authenticator, SessionError, SessionState};
use futures::future::join_all;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

/// An authenticated browser context occupying one pool slot
pub struct SessionHandle {
    slot: usize,
    generation: u64,
    context: Arc<dyn BrowserContext>,
}

impl SessionHandle {
    /// Pool slot this handle occupies
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of times the slot was logged in again after invalidation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn context(&self) -> &Arc<dyn BrowserContext> {
        &self.context
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Exclusive loan of a [`SessionHandle`]
///
/// Dropping the lease returns the handle to the pool, so a cancelled page
/// visit never leaks a slot.
pub struct SessionLease {
    handle: Option<SessionHandle>,
    pool: Arc<PoolShared>,
}

impl SessionLease {
    pub fn handle(&self) -> &SessionHandle {
        // Only `take()` in `invalidate`/`drop` empties the option, and both consume the lease
        self.handle.as_ref().unwrap_or_else(|| unreachable!("lease without handle"))
    }

    pub fn context(&self) -> &Arc<dyn BrowserContext> {
        self.handle().context()
    }

    pub fn slot(&self) -> usize {
        self.handle().slot()
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionLease").field(&self.handle).finish()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.return_handle(handle);
        }
    }
}

/// Pool of authenticated browser contexts
///
/// The semaphore holds exactly one permit per idle handle. `acquire` takes a
/// permit and pops a handle; returning a handle pushes it back and adds the
/// permit again. The semaphore is closed once every slot is closed.
#[derive(Clone)]
pub struct SessionPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    browser: Arc<dyn Browser>,
    authenticator: Option<Authenticator>,
    base_url: Url,
    login_attempts: u32,
    available: Semaphore,
    idle: Mutex<VecDeque<SessionHandle>>,
    states: Mutex<Vec<SessionState>>,
    live_slots: AtomicUsize,
    shared_cookies: Mutex<Vec<Cookie>>,
}

/// Locks a mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionPool {
    /// Creates the pool and logs every slot in
    ///
    /// Slot 0 logs in first. The remaining slots then log in concurrently,
    /// starting from the cookies slot 0 obtained, so a still-valid session
    /// skips the form entirely.
    ///
    /// # Arguments
    ///
    /// * `config` - Site, login and session settings
    /// * `browser` - Runtime that creates the browser contexts
    ///
    /// # Returns
    ///
    /// * `Ok(SessionPool)` - At least one slot is authenticated
    /// * `Err(SessionError::AuthenticationFailed)` - Every slot exhausted its
    ///   login attempts
    pub async fn start(config: &Config, browser: Arc<dyn Browser>) -> Result<Self, SessionError> {
        let base_url = Url::parse(&config.site.base_url).map_err(RuntimeError::from)?;
        let authenticator = if config.login.required {
            Some(
                Authenticator::new(
                    &base_url,
                    config.login.clone(),
                    &config.session,
                    Duration::from_millis(config.crawler.navigation_timeout),
                )
                .map_err(RuntimeError::from)?,
            )
        } else {
            None
        };

        let pool_size = config.session.pool_size.max(1) as usize;
        let login_attempts = config.session.login_attempts.max(1);
        let shared = Arc::new(PoolShared {
            browser,
            authenticator,
            base_url,
            login_attempts,
            available: Semaphore::new(0),
            idle: Mutex::new(VecDeque::with_capacity(pool_size)),
            states: Mutex::new(vec![SessionState::Fresh; pool_size]),
            live_slots: AtomicUsize::new(0),
            shared_cookies: Mutex::new(Vec::new()),
        });

        tracing::info!(
            "Starting session pool with {} slot(s), login {}",
            pool_size,
            if shared.authenticator.is_some() { "required" } else { "not required" }
        );

        let first = shared.open_slot(0, 0).await;
        let rest = join_all((1..pool_size).map(|slot| shared.open_slot(slot, 0))).await;

        let mut last_error = None;
        for result in std::iter::once(first).chain(rest) {
            match result {
                Ok(handle) => {
                    shared.live_slots.fetch_add(1, Ordering::SeqCst);
                    shared.return_handle(handle);
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    last_error = Some(e);
                }
            }
        }

        let live = shared.live_slots.load(Ordering::SeqCst);
        if live == 0 {
            shared.available.close();
            return Err(last_error.unwrap_or(SessionError::AuthenticationFailed {
                slot: 0,
                attempts: login_attempts,
            }));
        }

        tracing::info!("Session pool ready: {}/{} slot(s) authenticated", live, pool_size);
        Ok(Self { shared })
    }

    /// Borrows an authenticated handle, waiting until one is free
    ///
    /// # Returns
    ///
    /// * `Ok(SessionLease)` - Exclusive loan of an authenticated handle
    /// * `Err(SessionError::PoolClosed)` - Every slot is closed
    pub async fn acquire(&self) -> Result<SessionLease, SessionError> {
        loop {
            let permit = self
                .shared
                .available
                .acquire()
                .await
                .map_err(|_| SessionError::PoolClosed)?;
            permit.forget();

            if let Some(handle) = lock(&self.shared.idle).pop_front() {
                return Ok(SessionLease {
                    handle: Some(handle),
                    pool: Arc::clone(&self.shared),
                });
            }
        }
    }

    /// Returns a handle to the pool
    pub fn release(&self, lease: SessionLease) {
        drop(lease);
    }

    /// Takes the handle out of rotation and logs its slot in again in the background
    ///
    /// The slot comes back with its generation incremented once the login
    /// succeeds. If the retry budget runs out the slot is closed, and closing
    /// the last slot closes the pool.
    pub fn invalidate(&self, mut lease: SessionLease) {
        let Some(handle) = lease.handle.take() else {
            return;
        };
        let slot = handle.slot;
        let generation = handle.generation + 1;

        if !self.shared.set_state(slot, SessionState::Invalidated) {
            return;
        }
        tracing::info!("Session on slot {} invalidated, logging in again", slot);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(e) = handle.context.close().await {
                tracing::debug!("Closing invalidated context on slot {} failed: {}", slot, e);
            }
            drop(handle);

            match shared.open_slot(slot, generation).await {
                Ok(handle) => shared.return_handle(handle),
                Err(e) => {
                    tracing::warn!("{}", e);
                    shared.retire_slot(slot);
                }
            }
        });
    }

    /// Closes every slot; waiting and future `acquire` calls fail with `PoolClosed`
    pub async fn shutdown(&self) {
        self.shared.available.close();
        for state in lock(&self.shared.states).iter_mut() {
            *state = SessionState::Closed;
        }

        let idle: Vec<SessionHandle> = lock(&self.shared.idle).drain(..).collect();
        for handle in &idle {
            if let Err(e) = handle.context.close().await {
                tracing::debug!("Closing context on slot {} failed: {}", handle.slot, e);
            }
        }
        tracing::debug!("Session pool shut down ({} idle context(s) closed)", idle.len());
    }

    /// Current state of a slot
    pub fn state(&self, slot: usize) -> Option<SessionState> {
        lock(&self.shared.states).get(slot).copied()
    }

    /// Number of slots that are not closed
    pub fn live_slots(&self) -> usize {
        self.shared.live_slots.load(Ordering::SeqCst)
    }

    /// Number of handles ready to be lent
    pub fn idle_count(&self) -> usize {
        self.shared.available.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.available.is_closed()
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("states", &*lock(&self.shared.states))
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl PoolShared {
    /// Moves a slot to `next`, refusing illegal transitions
    fn set_state(&self, slot: usize, next: SessionState) -> bool {
        let mut states = lock(&self.states);
        let Some(current) = states.get_mut(slot) else {
            return false;
        };
        if !current.can_transition_to(next) {
            tracing::debug!("Slot {} cannot move from {} to {}", slot, current, next);
            return false;
        }
        *current = next;
        true
    }

    /// Logs a slot in, retrying up to the login budget
    async fn open_slot(&self, slot: usize, generation: u64) -> Result<SessionHandle, SessionError> {
        self.set_state(slot, SessionState::LoggingIn);

        for attempt in 1..=self.login_attempts {
            match self.open_context(slot).await {
                Ok(context) => {
                    self.set_state(slot, SessionState::Authenticated);
                    return Ok(SessionHandle {
                        slot,
                        generation,
                        context,
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        "Login attempt {}/{} on slot {} failed: {}",
                        attempt,
                        self.login_attempts,
                        slot,
                        e
                    );
                }
            }
        }

        self.set_state(slot, SessionState::Closed);
        Err(SessionError::AuthenticationFailed {
            slot,
            attempts: self.login_attempts,
        })
    }

    /// Creates a context and, when login is required, authenticates it
    async fn open_context(&self, slot: usize) -> Result<Arc<dyn BrowserContext>, SessionError> {
        let context = self.browser.new_context().await?;
        let Some(authenticator) = &self.authenticator else {
            return Ok(context);
        };

        let stored = lock(&self.shared_cookies).clone();
        if !stored.is_empty() {
            context.set_cookies(&self.base_url, &stored).await?;
        }

        match authenticator.login(context.as_ref(), slot).await {
            Ok(()) => {
                let cookies = context.cookies(&self.base_url).await?;
                if !cookies.is_empty() {
                    *lock(&self.shared_cookies) = cookies;
                }
                Ok(context)
            }
            Err(e) => {
                if let Err(close_err) = context.close().await {
                    tracing::debug!("Closing failed context on slot {}: {}", slot, close_err);
                }
                Err(e)
            }
        }
    }

    /// Puts a handle back into rotation, unless its slot left it meanwhile
    fn return_handle(&self, handle: SessionHandle) {
        let lendable = lock(&self.states)
            .get(handle.slot)
            .is_some_and(|state| state.is_lendable());
        if !lendable || self.available.is_closed() {
            return;
        }
        lock(&self.idle).push_back(handle);
        self.available.add_permits(1);
    }

    /// Accounts for a slot that closed for good
    fn retire_slot(&self, slot: usize) {
        let remaining = self.live_slots.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        tracing::warn!("Slot {} closed, {} slot(s) remain", slot, remaining);
        if remaining == 0 {
            tracing::error!("No authenticated session remains, closing the pool");
            self.available.close();
        }
    }
}
