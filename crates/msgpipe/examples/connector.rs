//! In-process connector: one pipe, a run loop, and a writer thread.
//!
//! Run with:
//!   cargo run --example connector

use std::thread;
use std::time::Duration;

use msgpipe::bindings::{CapturingErrorHandler, Connector, RecordingMessageReceiver};
use msgpipe::system::{Core, CreateOptions, RunLoop, WriteFlags};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (writer, bound) = Core::global().create_message_pipe(&CreateOptions::default())?;

    let run_loop = RunLoop::new();
    let connector = Connector::new(bound, &run_loop);
    let received = RecordingMessageReceiver::new();
    let errors = CapturingErrorHandler::new();
    connector.set_incoming_message_receiver(Box::new(received.clone()));
    connector.set_error_handler(Box::new(errors.clone()));
    connector.start();

    let producer = thread::spawn(move || {
        for i in 0..5 {
            let body = format!("message {i}");
            if writer
                .write_message(body.as_bytes(), Vec::new(), WriteFlags::empty())
                .is_err()
            {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        // Dropping `writer` closes the pipe.
    });

    while errors.error().is_none() {
        run_loop.run_for(Duration::from_millis(25));
    }
    let _ = producer.join();

    for message in received.messages().iter() {
        println!("{}", String::from_utf8_lossy(message.buffer()));
    }
    if let Some(err) = errors.error() {
        println!("connection ended: {err}");
    }
    Ok(())
}
