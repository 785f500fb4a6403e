//! Observable receivers for tests and tools.
//!
//! Both types are cheap handles over shared state: keep one clone, hand the
//! other to a connector, and inspect what arrived after pumping the loop.

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use crate::error::ConnectionError;
use crate::message::Message;
use crate::receiver::{ConnectionErrorHandler, MessageReceiver};

/// Appends every accepted message to a shared list.
#[derive(Debug, Clone, Default)]
pub struct RecordingMessageReceiver {
    messages: Rc<RefCell<Vec<Message>>>,
    closed: Rc<Cell<bool>>,
}

impl RecordingMessageReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.borrow_mut())
    }

    pub fn messages(&self) -> Ref<'_, [Message]> {
        Ref::map(self.messages.borrow(), |messages| messages.as_slice())
    }

    /// True once the owning connector released this receiver.
    pub fn was_closed(&self) -> bool {
        self.closed.get()
    }
}

impl MessageReceiver for RecordingMessageReceiver {
    fn accept(&mut self, message: Message) -> bool {
        self.messages.borrow_mut().push(message);
        true
    }

    fn close(&mut self) {
        self.closed.set(true);
    }
}

/// Stores the most recent connection error and counts reports.
#[derive(Debug, Clone, Default)]
pub struct CapturingErrorHandler {
    error: Rc<Cell<Option<ConnectionError>>>,
    count: Rc<Cell<usize>>,
}

impl CapturingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self) -> Option<ConnectionError> {
        self.error.get()
    }

    pub fn error_count(&self) -> usize {
        self.count.get()
    }
}

impl ConnectionErrorHandler for CapturingErrorHandler {
    fn on_connection_error(&mut self, error: ConnectionError) {
        self.error.set(Some(error));
        self.count.set(self.count.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use msgpipe_system::ResultCode;

    use super::*;

    #[test]
    fn recorder_shares_state_between_clones() {
        let recorder = RecordingMessageReceiver::new();
        let mut sink = recorder.clone();
        assert!(sink.accept(Message::from_bytes(&b"one"[..])));
        assert!(sink.accept(Message::from_bytes(&b"two"[..])));

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.messages()[1].buffer().as_ref(), b"two");
        assert_eq!(recorder.take().len(), 2);
        assert!(recorder.is_empty());

        sink.close();
        assert!(recorder.was_closed());
    }

    #[test]
    fn error_handler_counts_reports() {
        let handler = CapturingErrorHandler::new();
        assert!(handler.error().is_none());

        let mut sink = handler.clone();
        sink.on_connection_error(ConnectionError::new(ResultCode::Aborted));
        assert_eq!(handler.error().unwrap().code(), ResultCode::Aborted);
        assert_eq!(handler.error_count(), 1);
    }
}
