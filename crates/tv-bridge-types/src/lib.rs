use serde::{Deserialize, Serialize};

/// Remote-control keys the session interprets.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKey {
    /// Center/OK/confirm key.
    Center,
    Up,
    Down,
    Left,
    Right,
    Back,
    /// Numeric key 0-9.
    Digit(u8),
}

/// Key phase with the OS-supplied auto-repeat count.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    /// Key pressed; `repeat` is 0 for the initial press and increments while held.
    Down { repeat: u32 },
    /// Key released.
    Up,
}

/// A single remote-control key event.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteKeyEvent {
    pub key: RemoteKey,
    pub action: KeyAction,
}

impl RemoteKeyEvent {
    /// Initial key-down event (repeat 0).
    pub fn down(key: RemoteKey) -> Self {
        Self {
            key,
            action: KeyAction::Down { repeat: 0 },
        }
    }

    /// Auto-repeated key-down event.
    pub fn repeat(key: RemoteKey, repeat: u32) -> Self {
        Self {
            key,
            action: KeyAction::Down { repeat },
        }
    }

    /// Key-up event.
    pub fn up(key: RemoteKey) -> Self {
        Self {
            key,
            action: KeyAction::Up,
        }
    }
}

/// Playback engine state as reported by the renderer.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No media loaded or playback stopped.
    #[default]
    Idle,
    /// Media loaded, waiting for enough data to start.
    Buffering,
    /// Metadata loaded and playback can proceed.
    Ready,
    /// End of the current media was reached.
    Ended,
}

/// Upstream provider serving the current stream.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Torbox,
    RealDebrid,
    /// Cold-storage provider; files may need tens of seconds to reactivate.
    PikPak,
    Unknown,
}

impl Provider {
    /// `true` when sources from this provider may need a warm-up period
    /// before their metadata becomes available.
    pub fn is_cold_storage(self) -> bool {
        matches!(self, Provider::PikPak)
    }
}

/// Response payload for a stream-advance request.
///
/// A missing or empty `url` means the bridge has no more content.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamPayload {
    /// Playable stream URL, if any content remains.
    pub url: Option<String>,
    /// Display title for the stream.
    pub title: Option<String>,
    /// Provider hint used to pick the playback strategy.
    pub provider: Option<Provider>,
}

/// Response payload for a channel-advance or channel-select request.
///
/// A missing or empty `first_url` means the channel has no playable content.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSwitchPayload {
    /// Stable channel id.
    pub channel_id: Option<String>,
    /// Channel number shown in the directory, if assigned.
    pub channel_number: Option<u32>,
    /// Channel display name.
    pub channel_name: Option<String>,
    /// First stream URL of the new channel.
    pub first_url: Option<String>,
    /// Title of the first stream.
    pub first_title: Option<String>,
    /// Provider hint for the first stream.
    pub provider: Option<Provider>,
}

/// One entry of the channel directory.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelEntry {
    /// Stable channel id used for select requests.
    pub id: String,
    /// Channel number; 0 when unassigned.
    pub number: u32,
    /// Display name.
    pub name: String,
    /// `true` for the channel currently tuned.
    pub is_current: bool,
}

impl ChannelEntry {
    /// Case-insensitive directory search: name substring match, or digit
    /// substring match against the plain or zero-padded channel number.
    pub fn matches(&self, normalized_query: &str, digits_query: &str) -> bool {
        if normalized_query.is_empty() && digits_query.is_empty() {
            return true;
        }
        if !normalized_query.is_empty()
            && self.name.to_lowercase().contains(normalized_query)
        {
            return true;
        }
        if !digits_query.is_empty() && self.number > 0 {
            let plain = self.number.to_string();
            let padded = format!("{:02}", self.number);
            return plain.contains(digits_query) || padded.contains(digits_query);
        }
        false
    }
}

/// Buffer durations selected for the playback engine.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufferTarget {
    /// Minimum buffered media before playback may start or resume.
    pub min_buffer_ms: u64,
    /// Buffered media the engine tries to maintain.
    pub target_buffer_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(number: u32, name: &str) -> ChannelEntry {
        ChannelEntry {
            id: format!("ch-{number}"),
            number,
            name: name.to_string(),
            is_current: false,
        }
    }

    #[test]
    fn matches_name_case_insensitive() {
        let e = entry(7, "Classic Movies");
        assert!(e.matches("movie", ""));
        assert!(!e.matches("sports", ""));
    }

    #[test]
    fn matches_number_plain_and_padded() {
        let e = entry(7, "Classic Movies");
        assert!(e.matches("", "7"));
        assert!(e.matches("", "07"));
        assert!(!e.matches("", "8"));
    }

    #[test]
    fn unassigned_number_never_matches_digits() {
        let e = entry(0, "Pop-up");
        assert!(!e.matches("", "0"));
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(entry(3, "News").matches("", ""));
    }

    #[test]
    fn cold_storage_flag_only_for_pikpak() {
        assert!(Provider::PikPak.is_cold_storage());
        assert!(!Provider::Torbox.is_cold_storage());
        assert!(!Provider::RealDebrid.is_cold_storage());
        assert!(!Provider::Unknown.is_cold_storage());
    }
}
