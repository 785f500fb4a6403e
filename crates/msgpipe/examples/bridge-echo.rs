//! Bridge echo server: accepts one client and echoes each message back.
//!
//! Run with:
//!   cargo run --example bridge-echo
//!
//! In another terminal:
//!   cargo run --features cli -- send <printed socket path> --data hello --wait

use std::fs;
use std::time::Duration;

use msgpipe::bridge::BridgeListener;
use msgpipe::system::{HandleSignals, ReadFlags, SystemError, WriteFlags};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("msgpipe-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = BridgeListener::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let handle = listener.accept()?;
    eprintln!("Client connected");

    loop {
        match handle.wait(HandleSignals::READABLE, Some(Duration::from_secs(60))) {
            Ok(_) => {}
            Err(SystemError::Unsatisfiable) => {
                eprintln!("Client disconnected");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        let message = handle.read_message(ReadFlags::empty())?;
        eprintln!("Received {} bytes", message.bytes.len());
        handle.write_message(&message.bytes, Vec::new(), WriteFlags::empty())?;
    }

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
