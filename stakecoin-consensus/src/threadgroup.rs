//! Shutdown coordination.
//!
//! A [`ThreadGroup`] tracks in-flight callers of the consensus set so a
//! graceful shutdown can drain them before the store closes. A
//! [`CancelToken`] is the polled cancellation signal handed to long-running
//! operations like plugin catch-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Counts in-flight operations and refuses new ones once stopped.
pub struct ThreadGroup {
    inner: Arc<Inner>,
}

struct Inner {
    stopped: AtomicBool,
    active: Mutex<usize>,
    drained: Condvar,
}

/// Returned by [`ThreadGroup::add`] when the group has been stopped.
#[derive(Debug)]
pub struct Stopped;

/// Decrements the in-flight count when dropped.
pub struct ThreadGroupGuard {
    inner: Arc<Inner>,
}

impl Default for ThreadGroup {
    fn default() -> Self {
        ThreadGroup {
            inner: Arc::new(Inner {
                stopped: AtomicBool::new(false),
                active: Mutex::new(0),
                drained: Condvar::new(),
            }),
        }
    }
}

impl ThreadGroup {
    pub fn new() -> ThreadGroup {
        ThreadGroup::default()
    }

    /// Register an in-flight operation. Fails once `stop` has been called.
    pub fn add(&self) -> Result<ThreadGroupGuard, Stopped> {
        let mut active = self.inner.active.lock();
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(Stopped);
        }
        *active += 1;
        Ok(ThreadGroupGuard {
            inner: self.inner.clone(),
        })
    }

    /// Stop accepting new operations, then block until every in-flight
    /// operation has finished.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let mut active = self.inner.active.lock();
        while *active > 0 {
            self.inner.drained.wait(&mut active);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for ThreadGroupGuard {
    fn drop(&mut self) {
        let mut active = self.inner.active.lock();
        *active -= 1;
        if *active == 0 {
            self.inner.drained.notify_all();
        }
    }
}

/// A cloneable, polled cancellation signal.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_fails_after_stop() {
        let tg = ThreadGroup::new();
        let guard = tg.add().expect("group accepts work before stop");
        drop(guard);
        tg.stop();
        assert!(tg.add().is_err());
    }

    #[test]
    fn stop_waits_for_guards() {
        let tg = Arc::new(ThreadGroup::new());
        let guard = tg.add().unwrap();
        let stopper = {
            let tg = tg.clone();
            std::thread::spawn(move || tg.stop())
        };
        // The stopper cannot finish while the guard is alive.
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!stopper.is_finished());
        drop(guard);
        stopper.join().unwrap();
        assert!(tg.is_stopped());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
