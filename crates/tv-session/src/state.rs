//! Single mutable session record.
//!
//! Owned by the session controller; nothing else writes these fields.

use tv_bridge_types::Provider;

/// Live state of the playback session.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    /// URL currently loaded into the engine.
    pub active_url: Option<String>,
    /// Display title of the current stream.
    pub active_title: Option<String>,
    /// Provider serving the current stream.
    pub active_provider: Option<Provider>,
    /// Tuned channel id, if channel-based playback is active.
    pub channel_id: Option<String>,
    /// Tuned channel number.
    pub channel_number: Option<u32>,
    /// Tuned channel name.
    pub channel_name: Option<String>,
    /// Streams started during this session.
    pub played_count: u64,
    /// An advance request is outstanding at the bridge.
    pub is_requesting_advance: bool,
    /// Terminal flag; the event loop exits once set.
    pub ended: bool,
}
