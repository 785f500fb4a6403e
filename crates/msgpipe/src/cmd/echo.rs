use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use msgpipe_bindings::router::response;
use msgpipe_bindings::{
    CapturingErrorHandler, ConnectorSender, Message, MessageReceiver,
    MessageReceiverWithResponder, MessageWithHeader, Router,
};
use msgpipe_bridge::BridgeListener;
use msgpipe_system::{MessagePipeHandle, RunLoop};

use crate::cmd::{install_ctrlc_handler, peer_label, EchoArgs};
use crate::exit::{bridge_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

const POLL: Duration = Duration::from_millis(50);

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let listener =
        BridgeListener::bind(&args.path).map_err(|err| bridge_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let bridge = listener
            .accept_bridge()
            .map_err(|err| bridge_error("accept failed", err))?;
        let peer = peer_label(bridge.peer_credentials(), listener.accepted());
        let (handle, pumps) = bridge.into_parts();

        let echoed = serve(handle, &running);
        tracing::info!(peer = %peer, echoed, "client finished");
        pumps.join();
    }

    Ok(SUCCESS)
}

/// Echo on one connection until the client goes away or we are interrupted.
fn serve(handle: MessagePipeHandle, running: &AtomicBool) -> usize {
    let run_loop = RunLoop::new();
    let router = Router::new(handle, &run_loop);
    let echoed = Rc::new(Cell::new(0));
    let errors = CapturingErrorHandler::new();
    router.set_incoming_receiver(Box::new(EchoService {
        sender: router.sender(),
        echoed: echoed.clone(),
    }));
    router.set_error_handler(Box::new(errors.clone()));
    router.start();

    while running.load(Ordering::SeqCst) && errors.error().is_none() {
        run_loop.run_for(POLL);
    }
    if let Some(err) = errors.error() {
        tracing::debug!(code = %err.code(), "connection ended");
    }
    router.close();
    echoed.get()
}

/// Answers requests with a response of the same type and payload and sends
/// one-way messages back unchanged.
struct EchoService {
    sender: ConnectorSender,
    echoed: Rc<Cell<usize>>,
}

impl EchoService {
    fn count(&self, sent: bool) -> bool {
        if sent {
            self.echoed.set(self.echoed.get() + 1);
        }
        sent
    }
}

impl MessageReceiver for EchoService {
    fn accept(&mut self, message: Message) -> bool {
        tracing::info!(size = message.len(), "echoing message");
        let sent = self.sender.send(message);
        self.count(sent)
    }
}

impl MessageReceiverWithResponder for EchoService {
    fn accept_with_responder(
        &mut self,
        message: Message,
        mut responder: Box<dyn MessageReceiver>,
    ) -> bool {
        let reply = match echo_reply(message) {
            Some(reply) => reply,
            None => return false,
        };
        tracing::info!(size = reply.len(), "answering request");
        let sent = responder.accept(reply);
        self.count(sent)
    }
}

/// The response to an echoed request: same type, same payload.
fn echo_reply(request: Message) -> Option<Message> {
    let request = MessageWithHeader::new(request).ok()?;
    Some(response(request.header().message_type, &request.payload()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use msgpipe_bindings::router::request;
    use msgpipe_bindings::MessageHeader;
    use msgpipe_system::{Core, ReadFlags, WriteFlags};

    use super::*;

    #[test]
    fn reply_keeps_type_and_payload() {
        let reply = echo_reply(request(9, b"ping")).unwrap();
        let reply = MessageWithHeader::new(reply).unwrap();
        assert!(reply.header().is_response());
        assert_eq!(reply.header().message_type, 9);
        assert_eq!(reply.payload().as_ref(), b"ping");
    }

    #[test]
    fn headerless_request_gets_no_reply() {
        assert!(echo_reply(Message::from_bytes(&b"no header"[..])).is_none());
    }

    #[test]
    fn service_answers_requests_and_echoes_messages() {
        let (client, server) = Core::new().create_message_pipe(&Default::default()).unwrap();
        let run_loop = RunLoop::new();
        let router = Router::new(server, &run_loop);
        let echoed = Rc::new(Cell::new(0));
        router.set_incoming_receiver(Box::new(EchoService {
            sender: router.sender(),
            echoed: echoed.clone(),
        }));
        router.start();

        let mut ask = MessageWithHeader::new(request(3, b"question")).unwrap();
        ask.set_request_id(11).unwrap();
        let ask = ask.into_message();
        client
            .write_message(ask.buffer(), Vec::new(), WriteFlags::empty())
            .unwrap();
        let note =
            MessageWithHeader::build(MessageHeader::simple(5), b"note", Vec::new()).into_message();
        client
            .write_message(note.buffer(), Vec::new(), WriteFlags::empty())
            .unwrap();
        run_loop.run_for(Duration::from_millis(25));

        let answer = MessageWithHeader::new(Message::from(
            client.read_message(ReadFlags::empty()).unwrap(),
        ))
        .unwrap();
        assert!(answer.header().is_response());
        assert_eq!(answer.header().request_id, Some(11));
        assert_eq!(answer.payload().as_ref(), b"question");

        let back = client.read_message(ReadFlags::empty()).unwrap();
        assert_eq!(back.bytes, note.buffer().clone());
        assert_eq!(echoed.get(), 2);

        // Raw bytes without a header are not routable.
        client
            .write_message(b"raw", Vec::new(), WriteFlags::empty())
            .unwrap();
        run_loop.run_for(Duration::from_millis(25));
        assert_eq!(echoed.get(), 2);
    }
}
