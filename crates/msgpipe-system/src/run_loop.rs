//! Single-threaded run loop with handle watches.
//!
//! A [`RunLoop`] lives on one thread. Handles are registered with
//! [`RunLoop::watch`]; when another endpoint writes to or closes the pipe,
//! the loop is woken (from any thread) and the watch callback runs during the
//! next dispatch step on the loop's own thread. Nothing runs outside
//! `run`, `run_for` or `run_until_idle`.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Result, SystemError};
use crate::message_pipe::{MessagePipeHandle, Pipe};
use crate::result::ResultCode;
use crate::signals::HandleSignals;

/// Identifier of a registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

type WatchCallback = Box<dyn FnMut(ResultCode)>;

struct Watch {
    pipe: Arc<Pipe>,
    side: usize,
    signals: HandleSignals,
    /// `None` while the callback is running.
    callback: Option<WatchCallback>,
}

#[derive(Default)]
struct Pending {
    /// Watches notified by their pipe.
    ready: BTreeSet<WatchId>,
    /// Watches whose signals still held after their last callback.
    rearmed: BTreeSet<WatchId>,
    quit: bool,
}

impl Pending {
    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.rearmed.is_empty()
    }
}

/// Cross-thread half of the loop: the ready set and the wakeup condvar.
#[derive(Default)]
struct Shared {
    pending: Mutex<Pending>,
    wakeup: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(&self, id: WatchId) {
        self.lock().ready.insert(id);
        self.wakeup.notify_all();
    }

    fn rearm(&self, id: WatchId) {
        self.lock().rearmed.insert(id);
    }

    fn quit(&self) {
        self.lock().quit = true;
        self.wakeup.notify_all();
    }
}

struct Inner {
    shared: Arc<Shared>,
    watches: RefCell<BTreeMap<WatchId, Watch>>,
    next_id: Cell<u64>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (id, watch) in std::mem::take(self.watches.get_mut()) {
            watch.pipe.remove_observer(watch.side, id.0);
        }
    }
}

/// A single-threaded reactor for handle watches.
///
/// Cloning yields another reference to the same loop. The loop is `!Send`;
/// callbacks only ever run on the thread that owns it.
#[derive(Clone)]
pub struct RunLoop {
    inner: Rc<Inner>,
}

/// Stops a [`RunLoop`] from any thread.
#[derive(Clone)]
pub struct QuitHandle {
    shared: Arc<Shared>,
}

impl QuitHandle {
    pub fn quit(&self) {
        self.shared.quit();
    }
}

impl fmt::Debug for QuitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuitHandle").finish_non_exhaustive()
    }
}

enum Outcome {
    Fire(ResultCode),
    Spurious,
}

impl RunLoop {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                shared: Arc::new(Shared::default()),
                watches: RefCell::new(BTreeMap::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Watch `handle` for `signals`.
    ///
    /// Each time the handle is notified and any of `signals` holds, the
    /// callback receives `Ok`. When the signals can never hold again it
    /// receives `FailedPrecondition`, and `Cancelled` if the handle itself
    /// was closed; both end the watch. A freshly registered watch is checked
    /// on the next dispatch step, so already-queued messages are seen.
    pub fn watch<F>(&self, handle: &MessagePipeHandle, signals: HandleSignals, callback: F) -> Result<WatchId>
    where
        F: FnMut(ResultCode) + 'static,
    {
        let (pipe, side) = handle.watch_target().ok_or(SystemError::InvalidHandle)?;
        let id = WatchId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let shared: Weak<Shared> = Arc::downgrade(&self.inner.shared);
        let observer = Arc::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.signal(id);
            }
        });
        if !pipe.add_observer(side, id.0, observer) {
            return Err(SystemError::InvalidHandle);
        }

        self.inner.watches.borrow_mut().insert(
            id,
            Watch {
                pipe,
                side,
                signals,
                callback: Some(Box::new(callback)),
            },
        );
        self.inner.shared.signal(id);
        trace!(watch = %id, handle = %handle.id(), ?signals, "watch registered");
        Ok(id)
    }

    /// Remove a watch. Its callback will not run again, even if it was
    /// already signalled. Returns false if the watch was not registered.
    pub fn cancel(&self, id: WatchId) -> bool {
        let removed = self.inner.watches.borrow_mut().remove(&id);
        match removed {
            Some(watch) => {
                watch.pipe.remove_observer(watch.side, id.0);
                trace!(watch = %id, "watch cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of registered watches.
    pub fn watch_count(&self) -> usize {
        self.inner.watches.borrow().len()
    }

    /// Ask the loop to return from `run` or `run_for`.
    pub fn quit(&self) {
        self.inner.shared.quit();
    }

    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            shared: Arc::clone(&self.inner.shared),
        }
    }

    /// Dispatch until no watch has a pending notification.
    ///
    /// A watch whose signals still hold after its callback runs again in the
    /// next pass, but does not by itself keep this call going.
    pub fn run_until_idle(&self) {
        loop {
            self.dispatch_ready();
            if self.inner.shared.lock().ready.is_empty() {
                return;
            }
        }
    }

    /// Dispatch for `duration`, sleeping while idle. Returns early on `quit`.
    pub fn run_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            self.dispatch_ready();
            if self.take_quit() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            self.sleep(Some(deadline - now));
        }
    }

    /// Dispatch until `quit` is called.
    pub fn run(&self) {
        debug!("run loop started");
        loop {
            self.dispatch_ready();
            if self.take_quit() {
                break;
            }
            self.sleep(None);
        }
        debug!("run loop stopped");
    }

    fn take_quit(&self) -> bool {
        std::mem::take(&mut self.inner.shared.lock().quit)
    }

    fn sleep(&self, timeout: Option<Duration>) {
        let shared = &self.inner.shared;
        let pending = shared.lock();
        if !pending.is_idle() || pending.quit {
            return;
        }
        match timeout {
            Some(timeout) => {
                let (_guard, _) = shared
                    .wakeup
                    .wait_timeout(pending, timeout)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            None => {
                let _guard = shared
                    .wakeup
                    .wait(pending)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    /// Run callbacks for every signalled or re-armed watch, once each.
    /// Returns how many fired.
    fn dispatch_ready(&self) -> usize {
        let ready = {
            let mut pending = self.inner.shared.lock();
            let mut ready = std::mem::take(&mut pending.ready);
            ready.append(&mut pending.rearmed);
            ready
        };
        let mut fired = 0;
        for id in ready {
            if self.dispatch_one(id) {
                fired += 1;
            }
        }
        fired
    }

    fn dispatch_one(&self, id: WatchId) -> bool {
        let (outcome, callback) = {
            let mut watches = self.inner.watches.borrow_mut();
            let Some(watch) = watches.get_mut(&id) else {
                return false;
            };
            if watch.callback.is_none() {
                return false;
            }
            let outcome = match watch.pipe.signals_state(watch.side) {
                None => Outcome::Fire(ResultCode::Cancelled),
                Some(state) if state.satisfies_any(watch.signals) => Outcome::Fire(ResultCode::Ok),
                Some(state) if state.never_satisfies(watch.signals) => {
                    Outcome::Fire(ResultCode::FailedPrecondition)
                }
                Some(_) => Outcome::Spurious,
            };
            match outcome {
                Outcome::Spurious => return false,
                Outcome::Fire(code) => (code, watch.callback.take()),
            }
        };
        let Some(mut callback) = callback else {
            return false;
        };

        if !outcome.is_ok() {
            self.cancel(id);
        }
        trace!(watch = %id, result = %outcome, "dispatching watch");
        callback(outcome);

        if outcome.is_ok() {
            let mut watches = self.inner.watches.borrow_mut();
            if let Some(watch) = watches.get_mut(&id) {
                watch.callback = Some(callback);
                // The notification that closed the peer may have been consumed by
                // this dispatch, so a terminal state is signalled again. Signals
                // left satisfied are re-armed for the next pass.
                match watch.pipe.signals_state(watch.side) {
                    None => self.inner.shared.signal(id),
                    Some(state) if state.never_satisfies(watch.signals) => {
                        self.inner.shared.signal(id)
                    }
                    Some(state) if state.satisfies_any(watch.signals) => {
                        self.inner.shared.rearm(id)
                    }
                    Some(_) => {}
                }
            }
        }
        true
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoop")
            .field("watches", &self.watch_count())
            .finish()
    }
}
