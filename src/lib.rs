//! # Parkpool - Cooperative Worker Pool with a Lock-Free Idle Registry
//!
//! A fixed roster of worker threads sitting between concurrency-bearing
//! primitives (task schedulers, futures runtimes, actor systems) and the
//! operating system. Any thread in the process can test in one relaxed
//! atomic load whether a worker is idle, and hand an idle worker a callback
//! that runs on the worker's own thread before it returns to the idle set.
//! Workers are cooperative: they go idle voluntarily, they accept work, and
//! they cannot be stolen from.
//!
//! ## Architecture
//!
//! - **Idle stack**: a Treiber stack of parked worker ids whose top is a
//!   single tagged atomic word, giving ABA protection with one word-sized
//!   compare-and-swap
//! - **Slots**: one mutex + condvar + single-task mailbox per worker; the
//!   park/publish halves of the wake protocol
//! - **Roster**: the fixed slot array and the circular sibling ring over
//!   all worker ids, frozen after initialization
//! - **Pool**: the process-wide singleton composing the above into
//!   `try_spawn`, `wakeup`, and `idle`
//!
//! ## Example
//!
//! ```no_run
//! parkpool::prepare(4);
//!
//! let accepted = parkpool::try_spawn(|id| {
//!     println!("hello from worker {id}");
//! });
//! assert!(accepted || !parkpool::has_idle());
//!
//! parkpool::shutdown().unwrap();
//! ```

mod idle_stack;
mod tagged;

pub mod pool;
pub mod roster;
pub mod slot;

pub use pool::{
    all_workers, current, has_idle, idle, is_managed, prepare, prepare_opt, recommended_count,
    shutdown, try_spawn, wakeup, worker_count, ShutdownError,
};
pub use roster::{WorkerId, MAIN_ID};
pub use slot::Task;
