use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use msgpipe_system::{
    Core, CreateOptions, HandleSignals, ReadFlags, ResultCode, RunLoop, WriteFlags,
};
use rand::Rng;

fn random_payloads(count: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let len = rng.gen_range(0..2048);
            let mut payload = vec![0u8; len];
            rng.fill(payload.as_mut_slice());
            payload
        })
        .collect()
}

#[test]
fn writer_thread_messages_arrive_in_order_on_loop() {
    let (writer, reader) = Core::global()
        .create_message_pipe(&CreateOptions::default())
        .expect("pipe should be created");
    let payloads = random_payloads(64);
    let expected = payloads.clone();

    let run_loop = RunLoop::new();
    let quit = run_loop.quit_handle();
    let reader = Rc::new(reader);
    let received = Rc::new(RefCell::new(Vec::new()));
    let errors = Rc::new(RefCell::new(Vec::new()));
    {
        let reader_ref = Rc::clone(&reader);
        let received = Rc::clone(&received);
        let errors = Rc::clone(&errors);
        run_loop
            .watch(&reader, HandleSignals::READABLE, move |code| {
                if code != ResultCode::Ok {
                    errors.borrow_mut().push(code);
                    quit.quit();
                    return;
                }
                while let Ok(message) = reader_ref.read_message(ReadFlags::empty()) {
                    received.borrow_mut().push(message.bytes.to_vec());
                }
            })
            .expect("watch should register");
    }

    let producer = thread::spawn(move || {
        for payload in payloads {
            writer
                .write_message(&payload, Vec::new(), WriteFlags::empty())
                .expect("write should succeed");
        }
        // Dropping the writer ends the watch with FAILED_PRECONDITION.
    });

    run_loop.run_for(Duration::from_secs(5));
    producer.join().expect("producer should finish");

    assert_eq!(*received.borrow(), expected);
    assert_eq!(*errors.borrow(), vec![ResultCode::FailedPrecondition]);
}

#[test]
fn blocking_wait_sees_transferred_endpoint() {
    let core = Core::new();
    let (a, b) = core
        .create_message_pipe(&CreateOptions::default())
        .expect("pipe should be created");
    let (c, d) = core
        .create_message_pipe(&CreateOptions::default())
        .expect("pipe should be created");

    a.write_message(b"endpoint", vec![d.into()], WriteFlags::empty())
        .expect("write should succeed");

    let consumer = thread::spawn(move || {
        b.wait(HandleSignals::READABLE, Some(Duration::from_secs(5)))
            .expect("message should arrive");
        let mut message = b.read_message(ReadFlags::empty()).expect("read should succeed");
        let d = message
            .handles
            .pop()
            .and_then(|handle| handle.into_message_pipe())
            .expect("message should carry a pipe");
        d.wait(HandleSignals::READABLE, Some(Duration::from_secs(5)))
            .expect("inner message should arrive");
        d.read_message(ReadFlags::empty())
            .expect("inner read should succeed")
            .bytes
    });

    c.write_message(b"inner", Vec::new(), WriteFlags::empty())
        .expect("inner write should succeed");
    let inner = consumer.join().expect("consumer should finish");
    assert_eq!(inner.as_ref(), b"inner");
}
