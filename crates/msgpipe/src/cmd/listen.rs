use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use msgpipe_bindings::{CapturingErrorHandler, Connector, RecordingMessageReceiver};
use msgpipe_bridge::BridgeListener;
use msgpipe_system::RunLoop;

use crate::cmd::{install_ctrlc_handler, peer_label, ListenArgs};
use crate::exit::{bridge_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

const POLL: Duration = Duration::from_millis(50);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        BridgeListener::bind(&args.path).map_err(|err| bridge_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let bridge = listener
            .accept_bridge()
            .map_err(|err| bridge_error("accept failed", err))?;
        let peer = peer_label(bridge.peer_credentials(), listener.accepted());
        let (handle, pumps) = bridge.into_parts();

        let run_loop = RunLoop::new();
        let connector = Connector::new(handle, &run_loop);
        let received = RecordingMessageReceiver::new();
        let errors = CapturingErrorHandler::new();
        connector.set_incoming_message_receiver(Box::new(received.clone()));
        connector.set_error_handler(Box::new(errors.clone()));
        connector.start();

        let mut done = false;
        while running.load(Ordering::SeqCst) && !done {
            run_loop.run_for(POLL);

            for message in received.take() {
                print_message(&message, &peer, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    done = true;
                    break;
                }
            }

            if let Some(err) = errors.error() {
                tracing::debug!(peer = %peer, code = %err.code(), "client disconnected");
                break;
            }
        }

        connector.close();
        pumps.join();

        if done {
            return Ok(SUCCESS);
        }
    }

    Ok(SUCCESS)
}
