use std::time::Duration;

use msgpipe_frame::FrameConfig;
use msgpipe_system::{CreateOptions, PipeConfig};

/// Settings for one bridged connection.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Limits for the local pipe pair.
    pub pipe: PipeConfig,
    /// Write timeout for the stream. Reads block until the remote closes.
    pub write_timeout: Option<Duration>,
    /// How often the outbound pump rechecks for shutdown while idle.
    pub poll_interval: Duration,
}

impl BridgeConfig {
    /// Frame limits matching the pipe, so anything framed fits the pipe.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.pipe.max_message_bytes,
            read_timeout: None,
            write_timeout: self.write_timeout,
        }
    }

    pub fn create_options(&self) -> CreateOptions {
        CreateOptions {
            config: self.pipe.clone(),
            ..CreateOptions::default()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pipe: PipeConfig::default(),
            write_timeout: Some(Duration::from_secs(5)),
            poll_interval: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_limit_follows_pipe_limit() {
        let config = BridgeConfig {
            pipe: PipeConfig {
                max_message_bytes: 1024,
                ..PipeConfig::default()
            },
            ..BridgeConfig::default()
        };
        assert_eq!(config.frame_config().max_payload_size, 1024);
        assert_eq!(config.create_options().config.max_message_bytes, 1024);
        assert!(config.frame_config().read_timeout.is_none());
    }
}
