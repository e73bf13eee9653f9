//! Playback engine abstraction for the session controller.
//!
//! Implementations wrap a concrete renderer; the controller owns exactly one
//! engine handle and is responsible for releasing it on teardown.

use std::fmt;

use tv_bridge_types::{BufferTarget, PlaybackState};

/// Errors surfaced by engine commands.
#[derive(Debug)]
pub enum EngineError {
    /// The engine refused to load the given source.
    LoadRejected { reason: String },
    /// The engine handle was already released.
    Released,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::LoadRejected { reason } => write!(f, "load rejected: {reason}"),
            EngineError::Released => write!(f, "engine released"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Asynchronous notifications pushed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Playback state transition (buffering/ready/ended).
    StateChanged(PlaybackState),
    /// Updated throughput measurement in bits per second.
    BandwidthSample(u64),
    /// The available track list changed (first load or source switch).
    TracksChanged,
}

/// Command surface of the playback engine.
///
/// Mirrors the subset of a real renderer the session depends on; state
/// queries are synchronous snapshots, notifications arrive on the event
/// channel handed to the controller at construction.
pub trait PlaybackEngine {
    /// Load a source and prepare it for playback.
    fn load(&mut self, url: &str, title: Option<&str>) -> Result<(), EngineError>;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to(&mut self, position_ms: u64);
    fn position_ms(&self) -> u64;
    /// Media duration once known; `None` while metadata is unavailable.
    fn duration_ms(&self) -> Option<u64>;
    fn playback_state(&self) -> PlaybackState;
    fn is_playing(&self) -> bool;
    /// Current bandwidth estimate in bits per second; 0 when unknown.
    fn bandwidth_estimate_bps(&self) -> u64;
    /// Tear down and rebuild the underlying renderer with new buffer
    /// durations. The current source is dropped; callers reload after.
    fn rebuild(&mut self, target: BufferTarget);
    /// Apply the preferred subtitle selection to the current track list.
    fn select_default_subtitle(&mut self);
    /// Release the engine. Further commands are no-ops.
    fn release(&mut self);
}
