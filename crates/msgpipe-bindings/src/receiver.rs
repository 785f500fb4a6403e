use crate::error::ConnectionError;
use crate::message::Message;

/// Consumer of messages.
pub trait MessageReceiver {
    /// Take ownership of `message`. Returns false if it was not handled.
    fn accept(&mut self, message: Message) -> bool;

    /// Release any resources held by the receiver.
    fn close(&mut self) {}
}

/// Consumer of requests that expect a reply.
///
/// The responder writes the reply back to whoever sent the request.
pub trait MessageReceiverWithResponder: MessageReceiver {
    fn accept_with_responder(&mut self, message: Message, responder: Box<dyn MessageReceiver>) -> bool;
}

/// Consumer of terminal connection faults.
pub trait ConnectionErrorHandler {
    fn on_connection_error(&mut self, error: ConnectionError);
}
