//! The wake protocol and pool lifecycle.
//!
//! One pool per process. `prepare` spawns the roster exactly once; the
//! public operations compose the idle stack and the per-worker slots into
//! the three-way protocol: workers park themselves, producers claim a
//! parked worker and publish into its mailbox, and `wakeup` kicks a worker
//! whose idleness has gone stale.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use crossbeam::utils::Backoff;

use crate::idle_stack::IdleStack;
use crate::roster::{Roster, WorkerId, MAIN_ID};

/// Distinguished unwind payload for the ordinary shutdown path. Thrown with
/// `resume_unwind` so the panic hook stays quiet, and filtered out of the
/// aggregate at join time.
struct Terminate;

/// Process-wide pool state. Lives forever once initialized.
struct Pool {
    roster: Roster,
    idle: IdleStack,
    terminated: AtomicBool,
    /// Join handles for the spawned workers, drained by `shutdown`.
    handles: Mutex<Vec<(WorkerId, JoinHandle<()>)>>,
}

impl Pool {
    fn new(count: usize) -> Self {
        Pool {
            roster: Roster::new(count),
            idle: IdleStack::new(count),
            terminated: AtomicBool::new(false),
            handles: Mutex::new(Vec::with_capacity(count.saturating_sub(1))),
        }
    }
}

static POOL: OnceLock<Pool> = OnceLock::new();

/// One-shot latch: only the first `prepare` installs workers.
static PREPARED: AtomicBool = AtomicBool::new(false);

const UNMANAGED: usize = usize::MAX;

thread_local! {
    static CURRENT: Cell<usize> = const { Cell::new(UNMANAGED) };
}

/// Worker count the platform recommends: one per hardware thread.
pub fn recommended_count() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Initializes the process-wide pool with `count` workers, clamped into
/// `[1, recommended_count()]`. The calling thread becomes the main worker;
/// the remaining `count - 1` run on freshly spawned OS threads. Returns
/// once every worker is ready.
///
/// Idempotent: only the first call takes effect.
///
/// # Example
///
/// ```no_run
/// parkpool::prepare(4);
/// assert!(parkpool::is_managed(parkpool::current()));
/// ```
pub fn prepare(count: usize) {
    let count = count.clamp(1, recommended_count());
    if PREPARED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }

    let pool: &'static Pool = POOL.get_or_init(|| Pool::new(count));
    CURRENT.with(|c| c.set(MAIN_ID));

    // Everyone, main included, rendezvouses here; no worker enters its main
    // loop before all siblings are installed.
    let barrier = Arc::new(Barrier::new(count));
    for id in 1..count {
        let barrier = Arc::clone(&barrier);
        let handle = thread::Builder::new()
            .name(format!("parkpool-worker-{id}"))
            .spawn(move || {
                CURRENT.with(|c| c.set(id));
                barrier.wait();
                worker_main(pool, id);
            })
            .expect("failed to spawn worker thread");
        pool.handles.lock().unwrap().push((id, handle));
    }
    barrier.wait();
}

/// Like [`prepare`], with `None` meaning [`recommended_count`].
pub fn prepare_opt(count: Option<usize>) {
    prepare(count.unwrap_or_else(recommended_count));
}

/// Main loop of a spawned worker: park on the idle stack, drain the
/// mailbox, run the task, repeat. A task that panics unwinds the thread;
/// the payload is observed at join time by [`shutdown`].
fn worker_main(pool: &'static Pool, id: WorkerId) {
    let slot = pool.roster.slot(id);
    loop {
        if pool.terminated.load(Ordering::Acquire) {
            break;
        }
        pool.idle.register(id);
        let task = slot.park();
        task(id);
    }
}

/// Opportunistically hands `task` to an idle worker.
///
/// Returns `true` if some worker accepted the task and will run it exactly
/// once on its own thread. Returns `false` immediately when no worker looks
/// idle, when the claim loses a race, or when the claimed worker turns out
/// to be spoken for. The miss is advisory, not an error; callers chain this
/// with other placement strategies and never see a retry loop here.
///
/// Writes made before a successful call are visible to the task.
///
/// # Example
///
/// ```no_run
/// parkpool::prepare(4);
/// if !parkpool::try_spawn(|id| println!("running on worker {id}")) {
///     // nobody idle, run it here instead
/// }
/// ```
pub fn try_spawn<F>(task: F) -> bool
where
    F: FnOnce(WorkerId) + Send + 'static,
{
    let Some(pool) = POOL.get() else {
        return false;
    };
    // Workers that died at shutdown can leave stale registrations behind;
    // accepting a task then would break the exactly-once guarantee.
    if pool.terminated.load(Ordering::Acquire) {
        return false;
    }
    match pool.idle.try_claim() {
        Some(idx) => pool.roster.slot(idx).publish(Box::new(task)),
        None => false,
    }
}

/// Ensures the worker `id` is not left parked.
///
/// If its mailbox is empty a do-nothing task is installed and the worker is
/// signaled; a pending task means the worker is waking anyway and the call
/// does nothing. Used to kick a worker whose idleness is stale, typically
/// after work was pushed into some external structure the worker polls.
/// Does not remove the worker from the idle registry.
pub fn wakeup(id: WorkerId) {
    let pool = POOL.get().expect("worker pool is not initialized");
    assert!(pool.roster.contains(id), "wakeup of unknown worker {id}");
    pool.roster.slot(id).nudge();
}

/// Parks the calling worker until `until(state)` holds.
///
/// Must be called from a managed worker thread. While parked the worker is
/// registered idle, so producers may hand it tasks; each one runs on this
/// thread before the predicate is re-checked. External code makes the
/// predicate true by mutating `state` and then calling [`wakeup`] with this
/// worker's id.
pub fn idle<T, F>(state: &T, until: F)
where
    F: Fn(&T) -> bool,
{
    let pool = POOL.get().expect("worker pool is not initialized");
    let id = current();
    let slot = pool.roster.slot(id);
    while !until(state) {
        pool.idle.register(id);
        if let Some(task) = slot.park_until(state, &until) {
            task(id);
        }
    }
}

/// Id of the calling worker. Must be called from a managed worker thread.
pub fn current() -> WorkerId {
    let id = CURRENT.with(|c| c.get());
    assert!(id != UNMANAGED, "not a managed worker thread");
    id
}

/// Whether `id` names a worker in the roster.
pub fn is_managed(id: WorkerId) -> bool {
    POOL.get().is_some_and(|p| p.roster.contains(id))
}

/// Snapshot of every worker id, in sibling-ring order starting at main.
pub fn all_workers() -> Vec<WorkerId> {
    POOL.get().map_or_else(Vec::new, |p| p.roster.cycle())
}

/// Number of workers in the roster; zero before [`prepare`].
pub fn worker_count() -> usize {
    POOL.get().map_or(0, |p| p.roster.len())
}

/// One relaxed load: is any worker currently registered idle?
///
/// Advisory. "No" does not exclude a worker mid-registration, and "yes"
/// reserves nothing.
pub fn has_idle() -> bool {
    POOL.get().is_some_and(|p| p.idle.has_idle())
}

/// Drains the pool: every spawned worker is terminated and joined.
///
/// Call once at process exit. Tasks that panicked leave their payloads in
/// the returned [`ShutdownError`], in reverse join order; the ordinary
/// terminate signal is the one unwind filtered out. Idempotent: later calls
/// find nothing to join and return `Ok`.
pub fn shutdown() -> Result<(), ShutdownError> {
    let Some(pool) = POOL.get() else {
        return Ok(());
    };
    pool.terminated.store(true, Ordering::Release);

    let handles: Vec<_> = pool.handles.lock().unwrap().drain(..).collect();

    // Deliver the terminate signal. A busy worker drains its mailbox after
    // every task, so the publish retry is bounded by task length; a worker
    // that already unwound never drains, hence the liveness check.
    for (id, handle) in &handles {
        let slot = pool.roster.slot(*id);
        let backoff = Backoff::new();
        while !handle.is_finished() {
            if slot.publish(Box::new(|_| panic::resume_unwind(Box::new(Terminate)))) {
                break;
            }
            backoff.snooze();
        }
    }

    let mut payloads: Vec<Box<dyn Any + Send>> = Vec::new();
    for (id, handle) in handles {
        if let Err(payload) = handle.join() {
            if payload.downcast_ref::<Terminate>().is_none() {
                eprintln!("worker {id} panicked: {}", payload_message(&payload));
                payloads.push(payload);
            }
        }
    }

    payloads.reverse();
    if payloads.is_empty() {
        Ok(())
    } else {
        Err(ShutdownError { payloads })
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Aggregate of the panic payloads collected while joining workers.
pub struct ShutdownError {
    payloads: Vec<Box<dyn Any + Send>>,
}

impl ShutdownError {
    /// The raw payloads, in reverse join order.
    pub fn payloads(&self) -> &[Box<dyn Any + Send>] {
        &self.payloads
    }

    pub fn into_payloads(self) -> Vec<Box<dyn Any + Send>> {
        self.payloads
    }
}

impl fmt::Debug for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownError")
            .field("panics", &self.payloads.len())
            .finish()
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} worker task(s) panicked:", self.payloads.len())?;
        for payload in &self.payloads {
            write!(f, " {:?};", payload_message(payload.as_ref()))?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {}
