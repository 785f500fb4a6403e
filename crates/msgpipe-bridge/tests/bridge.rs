#![cfg(unix)]

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use msgpipe_bindings::{CapturingErrorHandler, Connector, Message, RecordingMessageReceiver};
use msgpipe_bridge::{connect, BridgeListener};
use msgpipe_system::{HandleSignals, ReadFlags, ResultCode, RunLoop, SystemError, WriteFlags};
use rand::Rng;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn make_sock_path(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/msgpipe-bridge-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir.join("bridge.sock")
}

/// Serve one connection, echoing each message until the client closes.
fn spawn_echo(listener: BridgeListener) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let handle = listener.accept().expect("accept");
        let mut echoed = 0;
        loop {
            match handle.wait(HandleSignals::READABLE, WAIT) {
                Ok(_) => {}
                Err(SystemError::Unsatisfiable) => return echoed,
                Err(err) => panic!("wait failed: {err}"),
            }
            let message = handle.read_message(ReadFlags::empty()).expect("read");
            handle
                .write_message(&message.bytes, Vec::new(), WriteFlags::empty())
                .expect("echo");
            echoed += 1;
        }
    })
}

#[test]
fn blocking_round_trip_preserves_order() {
    let sock_path = make_sock_path("order");
    let server = spawn_echo(BridgeListener::bind(&sock_path).expect("bind"));

    let mut client = connect(&sock_path).expect("connect");
    let mut rng = rand::thread_rng();
    let sent: Vec<Vec<u8>> = (0..50)
        .map(|_| {
            let mut body = vec![0u8; rng.gen_range(0..4096)];
            rng.fill(body.as_mut_slice());
            body
        })
        .collect();

    for body in &sent {
        client
            .write_message(body, Vec::new(), WriteFlags::empty())
            .expect("write");
    }
    for body in &sent {
        client.wait(HandleSignals::READABLE, WAIT).expect("reply");
        let reply = client.read_message(ReadFlags::empty()).expect("read");
        assert_eq!(reply.bytes.as_ref(), body.as_slice());
    }

    client.close();
    assert_eq!(server.join().expect("server thread"), sent.len());
    let _ = std::fs::remove_dir_all(sock_path.parent().expect("parent"));
}

#[test]
fn connector_over_bridge_sees_remote_close() {
    let sock_path = make_sock_path("connector");
    let listener = BridgeListener::bind(&sock_path).expect("bind");
    let server = thread::spawn(move || {
        let mut handle = listener.accept().expect("accept");
        handle.wait(HandleSignals::READABLE, WAIT).expect("request");
        let request = handle.read_message(ReadFlags::empty()).expect("read");
        handle
            .write_message(&request.bytes, Vec::new(), WriteFlags::empty())
            .expect("reply");
        handle.close();
    });

    let run_loop = RunLoop::new();
    let connector = Connector::new(connect(&sock_path).expect("connect"), &run_loop);
    let receiver = RecordingMessageReceiver::new();
    let errors = CapturingErrorHandler::new();
    connector.set_incoming_message_receiver(Box::new(receiver.clone()));
    connector.set_error_handler(Box::new(errors.clone()));
    connector.start();

    assert!(connector.accept(Message::from_bytes(&b"across processes"[..])));

    let deadline = Instant::now() + Duration::from_secs(5);
    while errors.error().is_none() && Instant::now() < deadline {
        run_loop.run_for(Duration::from_millis(25));
    }

    server.join().expect("server thread");
    assert_eq!(receiver.len(), 1);
    assert_eq!(receiver.messages()[0].buffer().as_ref(), b"across processes");
    assert_eq!(errors.error().expect("error").code(), ResultCode::FailedPrecondition);
    assert_eq!(errors.error_count(), 1);
    let _ = std::fs::remove_dir_all(sock_path.parent().expect("parent"));
}

#[test]
fn listener_counts_connections() {
    let sock_path = make_sock_path("count");
    let listener = BridgeListener::bind(&sock_path).expect("bind");
    assert_eq!(listener.path(), sock_path.as_path());

    let path = sock_path.clone();
    let client = thread::spawn(move || {
        let first = connect(&path).expect("first");
        let second = connect(&path).expect("second");
        (first, second)
    });
    let a = listener.accept_bridge().expect("accept first");
    let b = listener.accept_bridge().expect("accept second");
    assert_eq!(listener.accepted(), 2);
    assert_ne!(a.handle().id(), b.handle().id());

    drop(client.join().expect("client thread"));
    drop(listener);
    assert!(!sock_path.exists());
    let _ = std::fs::remove_dir_all(sock_path.parent().expect("parent"));
}

#[test]
fn connect_without_listener_fails() {
    let sock_path = make_sock_path("absent");
    assert!(connect(&sock_path).is_err());
    let _ = std::fs::remove_dir_all(sock_path.parent().expect("parent"));
}
