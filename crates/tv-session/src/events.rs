//! In-process event bus for session updates.
//!
//! Front ends subscribe here for notices, overlay transitions, and status
//! changes; publishing is fire-and-forget and slow subscribers drop events.

use tokio::sync::broadcast;

use crate::input::OverlayKind;

/// Session event payloads published by the controller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Transient user-visible message (toast counterpart).
    Notice { message: String },
    /// The active overlay changed.
    OverlayChanged { overlay: OverlayKind },
    /// Playback status changed (play/pause, new stream, seek).
    StatusChanged,
    /// Channel badge update after a switch.
    ChannelBadge {
        number: Option<u32>,
        name: String,
    },
    /// Cold-storage reactivation progress (1-based attempt counter).
    RetryProgress { attempt: u32, total: u32 },
    /// Quick-seek feedback (signed offset applied).
    SeekFeedback { offset_ms: i64 },
    /// The session ended and the engine was released.
    SessionEnded,
}

#[derive(Clone)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish a transient notice.
    pub fn notice(&self, message: impl Into<String>) {
        let _ = self.sender.send(SessionEvent::Notice {
            message: message.into(),
        });
    }

    /// Publish an overlay transition.
    pub fn overlay_changed(&self, overlay: OverlayKind) {
        let _ = self.sender.send(SessionEvent::OverlayChanged { overlay });
    }

    /// Publish a playback status change.
    pub fn status_changed(&self) {
        let _ = self.sender.send(SessionEvent::StatusChanged);
    }

    /// Publish a channel badge update.
    pub fn channel_badge(&self, number: Option<u32>, name: impl Into<String>) {
        let _ = self.sender.send(SessionEvent::ChannelBadge {
            number,
            name: name.into(),
        });
    }

    /// Publish cold-storage retry progress.
    pub fn retry_progress(&self, attempt: u32, total: u32) {
        let _ = self.sender.send(SessionEvent::RetryProgress { attempt, total });
    }

    /// Publish quick-seek feedback.
    pub fn seek_feedback(&self, offset_ms: i64) {
        let _ = self.sender.send(SessionEvent::SeekFeedback { offset_ms });
    }

    /// Publish session end.
    pub fn session_ended(&self) {
        let _ = self.sender.send(SessionEvent::SessionEnded);
    }
}
