// crates/orchestrator/src/runner_pool.rs
//! Bounded pool of isolated audit engines
//!
//! Runners are created lazily up to `max_concurrency`. Callers that find no
//! free runner and no room to spawn one wait in FIFO order; a released
//! runner goes straight to the oldest waiter. Pool bookkeeping sits behind a
//! synchronous lock that is never held across an await.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use parade_common::{AuditError, AuditReport, AuditSettings};
use parade_engine::{EngineConnection, EngineSpawner, ShutdownController};

/// How long `close` waits for engines to exit before killing them.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

type Waiter = oneshot::Sender<Result<Runner, AuditError>>;

struct Shared {
    spawner: Arc<dyn EngineSpawner>,
    settings: AuditSettings,
    max: usize,
    timeout: Duration,
    controller: ShutdownController,
    state: Mutex<PoolState>,
    created: AtomicUsize,
    in_flight: AtomicUsize,
}

#[derive(Default)]
struct PoolState {
    free: VecDeque<EngineConnection>,
    waiters: VecDeque<Waiter>,
    alive: usize,
    next_id: usize,
    closed: bool,
}

impl PoolState {
    fn reserve_slot(&mut self) -> usize {
        self.alive += 1;
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub struct RunnerPool {
    shared: Arc<Shared>,
}

impl RunnerPool {
    pub fn new(
        spawner: Arc<dyn EngineSpawner>,
        settings: AuditSettings,
        max_concurrency: usize,
        audit_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                spawner,
                settings,
                max: max_concurrency.max(1),
                timeout: audit_timeout,
                controller: ShutdownController::new(),
                state: Mutex::new(PoolState::default()),
                created: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// A free runner, a newly spawned one if below the limit, or the next one
    /// released, in request order.
    pub async fn get_next_available(&self) -> Result<Runner, AuditError> {
        let rx = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(AuditError::PoolClosed);
            }
            if let Some(conn) = state.free.pop_front() {
                return Ok(Runner::new(conn, Arc::clone(&self.shared)));
            }
            if state.alive < self.shared.max {
                let id = state.reserve_slot();
                drop(state);
                return self.shared.spawn_runner(id);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!(waiting = state.waiters.len(), "all runners busy, queued");
            rx
        };
        rx.await.unwrap_or(Err(AuditError::PoolClosed))
    }

    /// Fail pending requests, ask idle engines to exit, then terminate the
    /// rest and wait for every engine to be gone.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let (waiters, free) = self.shared.shut();
        fail_waiters(waiters);

        let closing = free.into_iter().map(|conn| conn.close(CLOSE_GRACE));
        let closed = futures::future::join_all(closing).await;
        let lingering = closed.iter().filter(|exited| !**exited).count();
        if lingering > 0 {
            warn!(lingering, "engines did not exit after close, killing");
        }

        self.shared.controller.trigger();
        if !self.shared.controller.wait(CLOSE_GRACE).await {
            warn!("some engines were still running when the pool closed");
        }
        info!(created = self.created(), "runner pool closed");
    }

    /// Kill every engine without waiting. Used on interrupt.
    pub fn terminate_all(&self) {
        let (waiters, free) = self.shared.shut();
        fail_waiters(waiters);
        drop(free);
        self.shared.controller.trigger();
    }

    /// Wait up to `limit` for engines to exit after [`terminate_all`](Self::terminate_all).
    pub async fn wait_for_exit(&self, limit: Duration) -> bool {
        self.shared.controller.wait(limit).await
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.shared.max
    }

    /// Engines currently running, busy or idle.
    #[must_use]
    pub fn alive(&self) -> usize {
        self.shared.state.lock().alive
    }

    /// Engines spawned over the pool's lifetime, replacements included.
    #[must_use]
    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiters.len()
    }
}

fn fail_waiters(waiters: VecDeque<Waiter>) {
    for waiter in waiters {
        let _ = waiter.send(Err(AuditError::PoolClosed));
    }
}

impl Shared {
    fn spawn_runner(self: &Arc<Self>, id: usize) -> Result<Runner, AuditError> {
        let spawned = match self.controller.context(id) {
            Some(ctx) => self.spawner.spawn(ctx),
            None => Err(AuditError::PoolClosed),
        };
        match spawned {
            Ok(conn) => {
                let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                info!(runner = id, created, spawner = self.spawner.name(), "runner started");
                Ok(Runner::new(conn, Arc::clone(self)))
            }
            Err(e) => {
                warn!(runner = id, "failed to start runner: {e}");
                self.state.lock().alive -= 1;
                self.replenish();
                Err(e)
            }
        }
    }

    /// Mark closed and take everything that is waiting or idle.
    fn shut(&self) -> (VecDeque<Waiter>, Vec<EngineConnection>) {
        let mut state = self.state.lock();
        state.closed = true;
        let waiters = std::mem::take(&mut state.waiters);
        let free: Vec<_> = state.free.drain(..).collect();
        state.alive -= free.len();
        (waiters, free)
    }

    /// Hand a healthy connection to the oldest live waiter, or park it.
    fn release(self: &Arc<Self>, mut conn: EngineConnection) {
        let mut state = self.state.lock();
        if state.closed {
            state.alive -= 1;
            drop(state);
            debug!(runner = conn.id(), "pool closed, dropping released runner");
            return;
        }
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(Ok(Runner::new(conn, Arc::clone(self)))) {
                Ok(()) => return,
                // The waiter gave up; take the connection back without running
                // Runner's drop, which would re-enter this lock.
                Err(Ok(mut runner)) => match runner.slot.take() {
                    Some(back) => conn = back,
                    None => return,
                },
                Err(Err(_)) => return,
            }
        }
        state.free.push_back(conn);
    }

    /// Drop a broken connection and use the freed slot for the oldest waiter.
    fn discard(self: &Arc<Self>, conn: EngineConnection) {
        let id = conn.id();
        drop(conn);
        self.state.lock().alive -= 1;
        debug!(runner = id, "runner discarded");
        self.replenish();
    }

    fn replenish(self: &Arc<Self>) {
        let (id, waiter) = {
            let mut state = self.state.lock();
            state.waiters.retain(|w| !w.is_closed());
            if state.closed || state.alive >= self.max {
                return;
            }
            let Some(waiter) = state.waiters.pop_front() else {
                return;
            };
            (state.reserve_slot(), waiter)
        };
        info!(runner = id, "starting replacement runner");
        let spawned = self.spawn_runner(id);
        // A runner the waiter no longer wants drops here and is released.
        let _ = waiter.send(spawned);
    }
}

/// Exclusive handle to one engine. Dropping it returns the engine to the pool.
pub struct Runner {
    slot: Option<EngineConnection>,
    busy: bool,
    pool: Arc<Shared>,
}

impl Runner {
    fn new(conn: EngineConnection, pool: Arc<Shared>) -> Self {
        Self {
            slot: Some(conn),
            busy: false,
            pool,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<usize> {
        self.slot.as_ref().map(EngineConnection::id)
    }

    /// Audit `url` and give the runner back to the pool before returning.
    ///
    /// An engine that exited, timed out or answered garbage is discarded
    /// instead, and its slot is reused for a replacement.
    #[instrument(skip(self), fields(runner = self.id()))]
    pub async fn run(mut self, url: &str) -> Result<AuditReport, AuditError> {
        let Some(conn) = self.slot.as_mut() else {
            return Err(AuditError::PoolClosed);
        };
        self.busy = true;
        self.pool.in_flight.fetch_add(1, Ordering::Relaxed);

        let result = conn.audit(url, &self.pool.settings, self.pool.timeout).await;

        self.busy = false;
        self.pool.in_flight.fetch_sub(1, Ordering::Relaxed);
        if let Err(e) = &result {
            if e.is_engine_fatal() {
                warn!("engine failed, replacing runner: {e}");
                if let Some(conn) = self.slot.take() {
                    self.pool.discard(conn);
                }
            }
        }
        result
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        let Some(conn) = self.slot.take() else {
            return;
        };
        if self.busy {
            // Cancelled mid-audit: the engine's state is unknown.
            self.pool.in_flight.fetch_sub(1, Ordering::Relaxed);
            self.pool.discard(conn);
        } else {
            self.pool.release(conn);
        }
    }
}
