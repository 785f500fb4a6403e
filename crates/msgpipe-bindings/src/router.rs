use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use msgpipe_system::{MessagePipeHandle, RunLoop};
use tracing::{debug, warn};

use crate::connector::{Connector, ConnectorSender};
use crate::error::ConnectionError;
use crate::header::MessageHeader;
use crate::message::{Message, MessageWithHeader};
use crate::receiver::{ConnectionErrorHandler, MessageReceiver, MessageReceiverWithResponder};

struct RouterInner {
    next_request_id: u64,
    pending: HashMap<u64, Box<dyn MessageReceiver>>,
    incoming: Option<Box<dyn MessageReceiverWithResponder>>,
    error_handler: Option<Box<dyn ConnectionErrorHandler>>,
}

impl RouterInner {
    fn drain_pending(&mut self) -> Vec<Box<dyn MessageReceiver>> {
        self.pending.drain().map(|(_, responder)| responder).collect()
    }
}

/// Request/response routing over a [`Connector`].
///
/// Outgoing requests get a fresh request id and their responder is parked
/// until a message flagged as the matching response arrives. Incoming
/// requests reach the incoming receiver together with a responder that
/// stamps the request id onto the reply.
pub struct Router {
    connector: Connector,
    inner: Rc<RefCell<RouterInner>>,
}

impl Router {
    pub fn new(handle: MessagePipeHandle, run_loop: &RunLoop) -> Self {
        let inner = Rc::new(RefCell::new(RouterInner {
            next_request_id: 1,
            pending: HashMap::new(),
            incoming: None,
            error_handler: None,
        }));
        let connector = Connector::new(handle, run_loop);
        connector.set_incoming_message_receiver(Box::new(Dispatch {
            inner: Rc::downgrade(&inner),
            sender: connector.sender(),
        }));
        connector.set_error_handler(Box::new(ForwardError {
            inner: Rc::downgrade(&inner),
        }));
        Self { connector, inner }
    }

    /// Receiver for inbound requests and one-way messages.
    pub fn set_incoming_receiver(&self, receiver: Box<dyn MessageReceiverWithResponder>) {
        self.inner.borrow_mut().incoming = Some(receiver);
    }

    pub fn set_error_handler(&self, handler: Box<dyn ConnectionErrorHandler>) {
        self.inner.borrow_mut().error_handler = Some(handler);
    }

    pub fn start(&self) {
        self.connector.start();
    }

    pub fn close(&self) {
        self.connector.close();
        let (pending, incoming) = {
            let mut inner = self.inner.borrow_mut();
            inner.error_handler = None;
            (inner.drain_pending(), inner.incoming.take())
        };
        for mut responder in pending {
            responder.close();
        }
        if let Some(mut incoming) = incoming {
            incoming.close();
        }
    }

    pub fn encountered_error(&self) -> bool {
        self.connector.encountered_error()
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    pub fn sender(&self) -> ConnectorSender {
        self.connector.sender()
    }
}

impl MessageReceiver for Router {
    /// Send a one-way message. Requests must go through
    /// [`accept_with_responder`](MessageReceiverWithResponder::accept_with_responder).
    fn accept(&mut self, message: Message) -> bool {
        let message = match MessageWithHeader::new(message) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "router refused malformed outgoing message");
                return false;
            }
        };
        if message.header().expects_response() {
            warn!("request sent without a responder");
            return false;
        }
        self.connector.accept(message.into_message())
    }

    fn close(&mut self) {
        Router::close(self);
    }
}

impl MessageReceiverWithResponder for Router {
    fn accept_with_responder(
        &mut self,
        message: Message,
        responder: Box<dyn MessageReceiver>,
    ) -> bool {
        let mut message = match MessageWithHeader::new(message) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "router refused malformed request");
                return false;
            }
        };
        if !message.header().expects_response() {
            warn!("message with responder is not a request");
            return false;
        }

        let request_id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_request_id;
            inner.next_request_id = id.wrapping_add(1).max(1);
            id
        };
        if message.set_request_id(request_id).is_err() {
            return false;
        }

        self.inner
            .borrow_mut()
            .pending
            .insert(request_id, responder);
        if self.connector.accept(message.into_message()) {
            debug!(request_id, "request sent");
            true
        } else {
            self.inner.borrow_mut().pending.remove(&request_id);
            false
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        Router::close(self);
    }
}

/// Connector-side receiver that routes by header flags.
struct Dispatch {
    inner: Weak<RefCell<RouterInner>>,
    sender: ConnectorSender,
}

impl MessageReceiver for Dispatch {
    fn accept(&mut self, message: Message) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let message = match MessageWithHeader::new(message) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping malformed incoming message");
                return false;
            }
        };
        let header = *message.header();

        if header.is_response() {
            let request_id = header.request_id.unwrap_or_default();
            let responder = inner.borrow_mut().pending.remove(&request_id);
            return match responder {
                Some(mut responder) => responder.accept(message.into_message()),
                None => {
                    warn!(request_id, "response for unknown request");
                    false
                }
            };
        }

        let incoming = inner.borrow_mut().incoming.take();
        let Some(mut incoming) = incoming else {
            warn!(message_type = header.message_type, "no incoming receiver on router");
            return false;
        };
        let accepted = if header.expects_response() {
            let responder = Responder {
                request_id: header.request_id.unwrap_or_default(),
                sender: self.sender.clone(),
            };
            incoming.accept_with_responder(message.into_message(), Box::new(responder))
        } else {
            incoming.accept(message.into_message())
        };

        let mut inner = inner.borrow_mut();
        if inner.incoming.is_none() {
            inner.incoming = Some(incoming);
        }
        accepted
    }
}

/// Sends one reply tagged with the originating request id.
struct Responder {
    request_id: u64,
    sender: ConnectorSender,
}

impl MessageReceiver for Responder {
    fn accept(&mut self, message: Message) -> bool {
        let mut message = match MessageWithHeader::new(message) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "malformed response");
                return false;
            }
        };
        if !message.header().is_response() {
            warn!(request_id = self.request_id, "reply is not flagged as a response");
            return false;
        }
        if message.set_request_id(self.request_id).is_err() {
            return false;
        }
        self.sender.send(message.into_message())
    }
}

struct ForwardError {
    inner: Weak<RefCell<RouterInner>>,
}

impl ConnectionErrorHandler for ForwardError {
    fn on_connection_error(&mut self, error: ConnectionError) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let (pending, handler) = {
            let mut inner = inner.borrow_mut();
            (inner.drain_pending(), inner.error_handler.take())
        };
        for mut responder in pending {
            responder.close();
        }
        if let Some(mut handler) = handler {
            handler.on_connection_error(error);
            let mut inner = inner.borrow_mut();
            if inner.error_handler.is_none() {
                inner.error_handler = Some(handler);
            }
        }
    }
}

/// Build a request message with an unassigned request id.
pub fn request(message_type: u32, payload: &[u8]) -> Message {
    MessageWithHeader::build(MessageHeader::request(message_type), payload, Vec::new()).into_message()
}

/// Build a response message; the responder fills in the request id.
pub fn response(message_type: u32, payload: &[u8]) -> Message {
    MessageWithHeader::build(MessageHeader::response(message_type, 0), payload, Vec::new())
        .into_message()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use msgpipe_system::{Core, CreateOptions, ReadFlags, WriteFlags};

    use super::*;
    use crate::capture::{CapturingErrorHandler, RecordingMessageReceiver};

    struct Doubler;

    impl MessageReceiver for Doubler {
        fn accept(&mut self, _message: Message) -> bool {
            true
        }
    }

    impl MessageReceiverWithResponder for Doubler {
        fn accept_with_responder(
            &mut self,
            message: Message,
            mut responder: Box<dyn MessageReceiver>,
        ) -> bool {
            let Ok(request) = MessageWithHeader::new(message) else {
                return false;
            };
            let doubled: Vec<u8> = request.payload().iter().map(|b| b.wrapping_mul(2)).collect();
            responder.accept(response(request.header().message_type, &doubled))
        }
    }

    fn pair(run_loop: &RunLoop) -> (Router, Router) {
        let (a, b) = Core::new()
            .create_message_pipe(&CreateOptions::default())
            .unwrap();
        (Router::new(a, run_loop), Router::new(b, run_loop))
    }

    #[test]
    fn request_gets_matching_response() {
        let run_loop = RunLoop::new();
        let (mut client, server) = pair(&run_loop);
        server.set_incoming_receiver(Box::new(Doubler));
        client.start();
        server.start();

        let replies = RecordingMessageReceiver::new();
        assert!(client.accept_with_responder(request(5, &[1, 2, 3]), Box::new(replies.clone())));
        assert_eq!(client.pending_count(), 1);
        run_loop.run_until_idle();

        assert_eq!(client.pending_count(), 0);
        let reply = MessageWithHeader::new(replies.take().remove(0)).unwrap();
        assert!(reply.header().is_response());
        assert_eq!(reply.header().request_id, Some(1));
        assert_eq!(reply.payload().as_ref(), &[2, 4, 6]);
    }

    #[test]
    fn request_ids_increase() {
        let run_loop = RunLoop::new();
        let (a, peer) = Core::new()
            .create_message_pipe(&CreateOptions::default())
            .unwrap();
        let mut client = Router::new(a, &run_loop);
        let sink = RecordingMessageReceiver::new();
        for _ in 0..3 {
            assert!(client.accept_with_responder(request(1, b""), Box::new(sink.clone())));
        }

        let ids: Vec<u64> = (0..3)
            .map(|_| {
                let raw = peer.read_message(ReadFlags::empty()).unwrap();
                MessageHeader::decode(&raw.bytes).unwrap().0.request_id.unwrap()
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn plain_send_rejects_requests() {
        let run_loop = RunLoop::new();
        let (mut client, _server) = pair(&run_loop);
        assert!(!client.accept(request(1, b"needs responder")));
        assert!(!client.accept(Message::from_bytes(&b"no header"[..])));
        let one_way = MessageWithHeader::build(MessageHeader::simple(1), b"ok", Vec::new());
        assert!(client.accept(one_way.into_message()));
    }

    #[test]
    fn one_way_messages_reach_incoming_receiver() {
        struct Sink(RecordingMessageReceiver);
        impl MessageReceiver for Sink {
            fn accept(&mut self, message: Message) -> bool {
                self.0.accept(message)
            }
        }
        impl MessageReceiverWithResponder for Sink {
            fn accept_with_responder(&mut self, _: Message, _: Box<dyn MessageReceiver>) -> bool {
                false
            }
        }

        let run_loop = RunLoop::new();
        let (mut client, server) = pair(&run_loop);
        let seen = RecordingMessageReceiver::new();
        server.set_incoming_receiver(Box::new(Sink(seen.clone())));
        server.start();

        let one_way = MessageWithHeader::build(MessageHeader::simple(9), b"hi", Vec::new());
        assert!(client.accept(one_way.into_message()));
        run_loop.run_until_idle();
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn peer_close_drops_pending_and_reports() {
        let run_loop = RunLoop::new();
        let (a, mut peer) = Core::new()
            .create_message_pipe(&CreateOptions::default())
            .unwrap();
        let mut client = Router::new(a, &run_loop);
        let errors = CapturingErrorHandler::new();
        client.set_error_handler(Box::new(errors.clone()));
        client.start();

        let replies = RecordingMessageReceiver::new();
        assert!(client.accept_with_responder(request(1, b"?"), Box::new(replies.clone())));
        peer.close();
        run_loop.run_for(Duration::from_millis(25));

        assert_eq!(errors.error_count(), 1);
        assert!(errors.error().unwrap().is_peer_closed());
        assert_eq!(client.pending_count(), 0);
        assert!(replies.was_closed());
        assert!(client.encountered_error());
    }

    #[test]
    fn unknown_response_is_dropped() {
        let run_loop = RunLoop::new();
        let (a, peer) = Core::new()
            .create_message_pipe(&CreateOptions::default())
            .unwrap();
        let client = Router::new(a, &run_loop);
        let errors = CapturingErrorHandler::new();
        client.set_error_handler(Box::new(errors.clone()));
        client.start();

        let mut stray = MessageWithHeader::build(MessageHeader::response(1, 0), b"", Vec::new());
        stray.set_request_id(77).unwrap();
        let (bytes, _) = stray.into_message().into_parts();
        peer.write_message(&bytes, Vec::new(), WriteFlags::empty())
            .unwrap();
        run_loop.run_until_idle();

        assert!(errors.error().is_none());
        assert_eq!(client.pending_count(), 0);
    }
}
