use std::fs;
use std::time::{Duration, Instant};

use msgpipe_bindings::router::request;
use msgpipe_bindings::{
    CapturingErrorHandler, Message, MessageHeader, MessageReceiverWithResponder,
    MessageWithHeader, RecordingMessageReceiver, Router,
};
use msgpipe_bridge::{connect_with_config, BridgeConfig};
use msgpipe_system::{MessagePipeHandle, RunLoop, WriteFlags};

use crate::cmd::SendArgs;
use crate::exit::{bridge_error, system_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

const POLL: Duration = Duration::from_millis(25);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let bridge = connect_with_config(&args.path, &BridgeConfig::default())
        .map_err(|err| bridge_error("connect failed", err))?;
    let peer = args.path.display().to_string();
    let (mut handle, pumps) = bridge.into_parts();

    let result = if args.wait {
        request_reply(handle, args.message_type, &payload, wait_timeout).map(|reply| {
            print_message(&reply, &peer, format);
        })
    } else {
        let bytes = if args.raw {
            payload
        } else {
            MessageWithHeader::build(MessageHeader::simple(args.message_type), &payload, Vec::new())
                .into_message()
                .buffer()
                .to_vec()
        };
        let sent = handle
            .write_message(&bytes, Vec::new(), WriteFlags::empty())
            .map_err(|err| system_error("send failed", err));
        handle.close();
        sent
    };

    // Closing the endpoint lets the outbound pump flush before we exit.
    pumps.join();
    result.map(|()| SUCCESS)
}

/// Send one request through a router and pump until the response arrives.
fn request_reply(
    handle: MessagePipeHandle,
    message_type: u32,
    payload: &[u8],
    timeout: Duration,
) -> CliResult<Message> {
    let run_loop = RunLoop::new();
    let mut router = Router::new(handle, &run_loop);
    let errors = CapturingErrorHandler::new();
    let reply = RecordingMessageReceiver::new();
    router.set_error_handler(Box::new(errors.clone()));
    router.start();

    if !router.accept_with_responder(request(message_type, payload), Box::new(reply.clone())) {
        router.close();
        return Err(CliError::new(FAILURE, "send failed: connection is closed"));
    }

    let deadline = Instant::now() + timeout;
    while reply.is_empty() && errors.error().is_none() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        run_loop.run_for(POLL.min(deadline - now));
    }
    router.close();

    if let Some(message) = reply.take().into_iter().next() {
        return Ok(message);
    }
    match errors.error() {
        Some(err) => Err(CliError::new(
            FAILURE,
            format!("connection closed before a response arrived: {err}"),
        )),
        None => Err(CliError::new(
            TIMEOUT,
            format!("no response within {}ms", timeout.as_millis()),
        )),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    if let Some(hex) = &args.hex {
        return decode_hex(hex);
    }
    Ok(Vec::new())
}

/// Hex payload, optionally `0x`-prefixed. Whitespace between digits is ignored.
fn decode_hex(input: &str) -> CliResult<Vec<u8>> {
    let input = input.trim();
    let digits: String = input
        .strip_prefix("0x")
        .unwrap_or(input)
        .split_whitespace()
        .collect();
    hex::decode(digits)
        .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
