//! Lock-free registry of idle workers.
//!
//! A Treiber stack of worker indices. The top is a single tagged atomic
//! word; per-worker `next` links live in a fixed array indexed by worker id,
//! so the stack stores indices rather than pointers. Workers push themselves
//! when they go idle; producers claim the top worker with one
//! compare-and-swap and then publish into its mailbox.
//!
//! The cheap-check property is the point of the design: "is anyone idle?"
//! is one relaxed load of the top, no fence and no cacheline write, so the
//! common case (a check that finds no one, or a check before committing to
//! a claim) costs nearly nothing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;

use crate::tagged;

/// Per-worker stack linkage.
struct Link {
    /// Index of the next idle worker below this one. Meaningful only while
    /// this worker is linked into the stack; undefined scratch otherwise.
    next: AtomicUsize,
    /// True while this worker's registration is live on the stack. Set by
    /// the owning worker on push, cleared by the claiming producer right
    /// after a winning pop. Makes `register` idempotent: a worker woken by
    /// a nudge is still linked and must not push a second entry, since its
    /// single `next` link cannot serve two.
    linked: AtomicBool,
}

/// Treiber stack of idle worker indices.
pub(crate) struct IdleStack {
    /// Tagged index of the topmost idle worker, or the none sentinel.
    top: CachePadded<AtomicUsize>,
    links: Box<[Link]>,
}

impl IdleStack {
    /// Creates an empty stack able to hold workers `0..capacity`.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity < tagged::IDX_MASK, "roster too large for the index field");
        let links = (0..capacity)
            .map(|_| Link {
                next: AtomicUsize::new(tagged::NONE_IDX),
                linked: AtomicBool::new(false),
            })
            .collect();
        IdleStack {
            top: CachePadded::new(AtomicUsize::new(tagged::NONE_IDX)),
            links,
        }
    }

    /// One relaxed load: is any worker currently registered idle?
    ///
    /// Advisory only. Observing "none" does not exclude a worker that is
    /// mid-push, and observing "some" does not reserve anyone.
    #[inline]
    pub(crate) fn has_idle(&self) -> bool {
        tagged::target_of(self.top.load(Ordering::Relaxed)) != tagged::NONE_IDX
    }

    /// Pushes `id` onto the stack. Called only by the worker itself when it
    /// goes idle. A no-op if the worker's previous registration is still
    /// live (it was woken without being claimed).
    pub(crate) fn register(&self, id: usize) {
        let link = &self.links[id];
        if link.linked.load(Ordering::Acquire) {
            return;
        }
        link.linked.store(true, Ordering::Relaxed);
        loop {
            let old = self.top.load(Ordering::Acquire);
            link.next.store(tagged::target_of(old), Ordering::Relaxed);
            let new = tagged::retag(old, id);
            if self
                .top
                .compare_exchange(old, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Claims the topmost idle worker with a single compare-and-swap
    /// attempt. Returns `None` if the stack is empty or the swap lost a
    /// race; losing is advisory, not an error, and the caller chooses
    /// whether to try again.
    pub(crate) fn try_claim(&self) -> Option<usize> {
        let old = self.top.load(Ordering::Acquire);
        let idx = tagged::target_of(old);
        if idx == tagged::NONE_IDX {
            return None;
        }
        // Reading the link before the swap is fine: only the owning worker
        // writes it, and a stale read loses the tag comparison below.
        let next = self.links[idx].next.load(Ordering::Acquire);
        let new = tagged::retag(old, next);
        if self
            .top
            .compare_exchange(old, new, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.links[idx].linked.store(false, Ordering::Release);
            Some(idx)
        } else {
            None
        }
    }

    #[cfg(test)]
    fn raw_top(&self) -> usize {
        self.top.load(Ordering::SeqCst)
    }
}
