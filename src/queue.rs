//! The channel's serial execution context (SPEC_FULL.md §5).
//!
//! The teacher crate has no equivalent: its `process()` call is synchronous
//! and the caller's own event loop decides when to invoke it. This crate's
//! engine instead dispatches onto a queue so that public API calls,
//! transport completion callbacks, and `step` re-entries are all
//! serialized relative to one channel, per SPEC_FULL.md §5: "all state
//! transitions for a given channel occur on one serial execution context".

/// A serial execution context: something that runs queued closures one at
/// a time, in submission order, relative to a single channel.
///
/// Implementations are free to run jobs on a dedicated thread, a
/// single-threaded executor, or (for tests) immediately and synchronously.
/// Cross-channel concurrency is unconstrained: different channels may use
/// different queues running on different threads simultaneously.
pub trait Queue {
    /// Submit a job for execution on this queue.
    ///
    /// Jobs are not required to be [`Send`]: a channel and its adapter are
    /// confined to one queue for their entire lifetime (SPEC_FULL.md §5),
    /// so their shared state is ordinary `Rc<RefCell<_>>`, not `Arc<Mutex<_>>`.
    /// An embedder backing this with a real thread pool must pin each
    /// channel to a single worker rather than migrating it between calls.
    fn dispatch(&self, job: Box<dyn FnOnce() + 'static>);
}

/// A [`Queue`] that runs every job immediately, synchronously, on the
/// calling thread.
///
/// This is the queue used by this crate's tests and benchmarks, where a
/// single thread drives both sides of a loopback connection and there is
/// no need for real concurrency. A production embedder driving a real
/// socket would back [`Queue`] with something that actually serializes
/// across asynchronous completions (a dedicated thread, a
/// `tokio::task::LocalSet`, or similar).
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateQueue;

impl Queue for ImmediateQueue {
    fn dispatch(&self, job: Box<dyn FnOnce() + 'static>) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn immediate_queue_runs_synchronously() {
        let ran = Rc::new(RefCell::new(false));
        let ran2 = ran.clone();
        ImmediateQueue.dispatch(Box::new(move || {
            *ran2.borrow_mut() = true;
        }));
        assert!(*ran.borrow());
    }
}
