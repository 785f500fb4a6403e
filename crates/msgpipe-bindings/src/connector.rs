use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use msgpipe_system::{
    HandleSignals, MessagePipeHandle, ReadFlags, ResultCode, RunLoop, SystemError, WatchId,
    WriteFlags,
};
use tracing::{debug, trace, warn};

use crate::error::ConnectionError;
use crate::message::Message;
use crate::receiver::{ConnectionErrorHandler, MessageReceiver};

/// Lifecycle of a [`Connector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// Bound to a handle, not yet watching it.
    Idle,
    /// Watching the handle for inbound messages.
    Watching,
    /// Terminal. The handle has been released.
    Closed,
}

struct Inner {
    state: ConnectorState,
    handle: Option<MessagePipeHandle>,
    receiver: Option<Box<dyn MessageReceiver>>,
    error_handler: Option<Box<dyn ConnectionErrorHandler>>,
    watch: Option<WatchId>,
    encountered_error: bool,
    run_loop: RunLoop,
}

/// Binds one message-pipe endpoint to a receiver and an error handler.
///
/// Inbound messages and faults are only delivered from the dispatch step of
/// the run loop the connector was created with, and never after `close`.
pub struct Connector {
    inner: Rc<RefCell<Inner>>,
}

impl Connector {
    /// Take exclusive ownership of `handle`. Nothing is read until `start`.
    pub fn new(handle: MessagePipeHandle, run_loop: &RunLoop) -> Self {
        debug!(handle = %handle.id(), "connector bound");
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: ConnectorState::Idle,
                handle: Some(handle),
                receiver: None,
                error_handler: None,
                watch: None,
                encountered_error: false,
                run_loop: run_loop.clone(),
            })),
        }
    }

    /// Register the sole consumer of inbound messages, replacing any prior one.
    pub fn set_incoming_message_receiver(&self, receiver: Box<dyn MessageReceiver>) {
        let mut inner = self.inner.borrow_mut();
        if inner.state != ConnectorState::Closed {
            inner.receiver = Some(receiver);
        }
    }

    /// Register the sole consumer of terminal faults, replacing any prior one.
    pub fn set_error_handler(&self, handler: Box<dyn ConnectionErrorHandler>) {
        let mut inner = self.inner.borrow_mut();
        if inner.state != ConnectorState::Closed {
            inner.error_handler = Some(handler);
        }
    }

    /// Start watching the handle for inbound messages.
    ///
    /// Only the first call from `Idle` has an effect.
    pub fn start(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state != ConnectorState::Idle {
            return;
        }
        let Some(handle) = inner.handle.as_ref() else {
            return;
        };

        let weak = Rc::downgrade(&self.inner);
        let registered = inner
            .run_loop
            .watch(handle, HandleSignals::READABLE, move |result| {
                if let Some(inner) = weak.upgrade() {
                    on_handle_ready(&inner, result);
                }
            });

        inner.state = ConnectorState::Watching;
        match registered {
            Ok(id) => {
                debug!(watch = %id, "connector watching");
                inner.watch = Some(id);
            }
            Err(err) => {
                warn!(error = %err, "connector could not watch its handle");
                inner.encountered_error = true;
            }
        }
    }

    /// Write `message` to the pipe without waiting for the peer to read it.
    ///
    /// Returns false after `close` or if the pipe rejected the write. A
    /// vanished peer is reported to the error handler by the watch, not here.
    pub fn accept(&self, message: Message) -> bool {
        write_message(&self.inner, message)
    }

    /// Stop watching, release the handle and drop the receiver and error
    /// handler. Never reports an error. Idempotent.
    pub fn close(&self) {
        if let Some(mut handle) = self.shutdown() {
            handle.close();
        }
    }

    /// Like `close`, but hand the still-open endpoint back to the caller.
    pub fn pass_handle(&self) -> Option<MessagePipeHandle> {
        self.shutdown()
    }

    pub fn state(&self) -> ConnectorState {
        self.inner.borrow().state
    }

    /// True once a fault has been reported to the error handler.
    pub fn encountered_error(&self) -> bool {
        self.inner.borrow().encountered_error
    }

    /// A weak writer that receivers can hold to send on this connector.
    pub fn sender(&self) -> ConnectorSender {
        ConnectorSender {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn shutdown(&self) -> Option<MessagePipeHandle> {
        let (watch, handle, receiver, handler, run_loop) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == ConnectorState::Closed {
                return None;
            }
            inner.state = ConnectorState::Closed;
            (
                inner.watch.take(),
                inner.handle.take(),
                inner.receiver.take(),
                inner.error_handler.take(),
                inner.run_loop.clone(),
            )
        };

        if let Some(id) = watch {
            run_loop.cancel(id);
        }
        if let Some(mut receiver) = receiver {
            receiver.close();
        }
        drop(handler);
        debug!("connector closed");
        handle
    }
}

impl MessageReceiver for Connector {
    fn accept(&mut self, message: Message) -> bool {
        Connector::accept(self, message)
    }

    fn close(&mut self) {
        Connector::close(self);
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        Connector::close(self);
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Connector")
            .field("state", &inner.state)
            .field("handle", &inner.handle)
            .field("encountered_error", &inner.encountered_error)
            .finish()
    }
}

/// Weak writer for a [`Connector`]. Sends fail once the connector is gone
/// or closed.
#[derive(Clone)]
pub struct ConnectorSender {
    inner: Weak<RefCell<Inner>>,
}

impl ConnectorSender {
    pub fn send(&self, message: Message) -> bool {
        match self.inner.upgrade() {
            Some(inner) => write_message(&inner, message),
            None => false,
        }
    }
}

impl MessageReceiver for ConnectorSender {
    fn accept(&mut self, message: Message) -> bool {
        self.send(message)
    }
}

impl fmt::Debug for ConnectorSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorSender")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

fn write_message(inner: &RefCell<Inner>, message: Message) -> bool {
    let inner = inner.borrow();
    if inner.state == ConnectorState::Closed {
        return false;
    }
    let Some(handle) = inner.handle.as_ref() else {
        return false;
    };

    let (buffer, handles) = message.into_parts();
    match handle.write_message(&buffer, handles, WriteFlags::empty()) {
        Ok(()) => {
            trace!(size = buffer.len(), "connector sent message");
            true
        }
        Err(err) => {
            debug!(error = %err, code = %err.code(), "connector write failed");
            false
        }
    }
}

fn on_handle_ready(inner: &Rc<RefCell<Inner>>, result: ResultCode) {
    match result {
        ResultCode::Ok => read_all(inner),
        // The handle was closed underneath the watch; `close` already ran.
        ResultCode::Cancelled => {}
        code => report_error(inner, code),
    }
}

/// Drain every queued message into the receiver, oldest first.
fn read_all(inner: &Rc<RefCell<Inner>>) {
    loop {
        let read = {
            let inner = inner.borrow();
            if inner.state != ConnectorState::Watching || inner.encountered_error {
                return;
            }
            match inner.handle.as_ref() {
                Some(handle) => handle.read_message(ReadFlags::empty()),
                None => return,
            }
        };

        match read {
            Ok(raw) => dispatch(inner, Message::from(raw)),
            Err(SystemError::ShouldWait) => return,
            Err(err) => {
                report_error(inner, err.code());
                return;
            }
        }
    }
}

fn dispatch(inner: &Rc<RefCell<Inner>>, message: Message) {
    let receiver = inner.borrow_mut().receiver.take();
    let Some(mut receiver) = receiver else {
        warn!(size = message.len(), "no incoming message receiver; dropping message");
        return;
    };

    trace!(size = message.len(), handles = message.handles().len(), "delivering message");
    if !receiver.accept(message) {
        warn!("incoming message receiver declined message");
    }

    // The receiver may have closed the connector or installed a replacement.
    let closed = {
        let mut inner = inner.borrow_mut();
        if inner.state == ConnectorState::Closed {
            true
        } else {
            if inner.receiver.is_none() {
                inner.receiver = Some(receiver);
                return;
            }
            false
        }
    };
    if closed {
        receiver.close();
    }
}

/// Report a terminal fault once and stop watching.
fn report_error(inner: &Rc<RefCell<Inner>>, code: ResultCode) {
    let (handler, watch, run_loop) = {
        let mut inner = inner.borrow_mut();
        if inner.state == ConnectorState::Closed || inner.encountered_error {
            return;
        }
        inner.encountered_error = true;
        (
            inner.error_handler.take(),
            inner.watch.take(),
            inner.run_loop.clone(),
        )
    };

    if let Some(id) = watch {
        run_loop.cancel(id);
    }
    debug!(%code, "connector encountered error");

    let Some(mut handler) = handler else {
        warn!(%code, "connection error with no error handler");
        return;
    };
    handler.on_connection_error(ConnectionError::new(code));

    let mut inner = inner.borrow_mut();
    if inner.state != ConnectorState::Closed && inner.error_handler.is_none() {
        inner.error_handler = Some(handler);
    }
}
