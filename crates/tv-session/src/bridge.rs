//! Content bridge abstraction supplying stream URLs just in time.
//!
//! Implementations resolve the next stream or channel from whatever backend
//! hosts the catalog; the controller treats every call as fallible.

use std::fmt;

use async_trait::async_trait;
use tv_bridge_types::{ChannelSwitchPayload, StreamPayload};

/// Error from a bridge request, carrying a user-presentable message.
#[derive(Debug, Clone)]
pub struct BridgeError {
    pub message: String,
}

impl BridgeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BridgeError {}

/// Request surface of the content bridge.
#[async_trait]
pub trait ContentBridge: Send + Sync {
    /// Resolve the next stream on the current channel.
    async fn advance_stream(&self) -> Result<StreamPayload, BridgeError>;
    /// Switch to the next channel (wrapping) and resolve its first stream.
    async fn advance_channel(&self) -> Result<ChannelSwitchPayload, BridgeError>;
    /// Switch to a specific channel and resolve its first stream.
    async fn select_channel(&self, channel_id: &str) -> Result<ChannelSwitchPayload, BridgeError>;
    /// One-shot notification that playback ended for good.
    fn playback_finished(&self);
}
