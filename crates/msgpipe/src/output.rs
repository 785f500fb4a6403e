use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use msgpipe_bindings::{Message, MessageHeader};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// What the CLI knows about one received message.
#[derive(Debug, Serialize)]
pub struct MessageOutput {
    pub size: usize,
    pub handles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub kind: &'static str,
    pub payload: String,
    pub peer: String,
    pub timestamp: String,
    #[serde(skip)]
    body: Vec<u8>,
}

impl MessageOutput {
    pub fn new(message: &Message, peer: &str) -> Self {
        let buffer = message.buffer();
        let (header, body) = match MessageHeader::decode(buffer) {
            Ok((header, len)) => (Some(header), buffer[len..].to_vec()),
            Err(_) => (None, buffer.to_vec()),
        };
        Self {
            size: buffer.len(),
            handles: message.handles().len(),
            message_type: header.map(|h| h.message_type),
            request_id: header.and_then(|h| h.request_id),
            kind: kind_name(header.as_ref()),
            payload: payload_preview(&body),
            peer: peer.to_string(),
            timestamp: now_unix_seconds(),
            body,
        }
    }
}

pub fn print_message(message: &Message, peer: &str, format: OutputFormat) {
    let out = MessageOutput::new(message, peer);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "TYPE", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    out.kind.to_string(),
                    out.message_type
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    out.size.to_string(),
                    out.peer.clone(),
                    out.payload.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            print!("kind={} size={} peer={}", out.kind, out.size, out.peer);
            if let Some(message_type) = out.message_type {
                print!(" type={message_type}");
            }
            if let Some(request_id) = out.request_id {
                print!(" request_id={request_id}");
            }
            println!(" payload={}", out.payload);
        }
        OutputFormat::Raw => print_raw(&out.body),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn kind_name(header: Option<&MessageHeader>) -> &'static str {
    match header {
        None => "raw",
        Some(h) if h.is_response() => "response",
        Some(h) if h.expects_response() => "request",
        Some(_) => "message",
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
