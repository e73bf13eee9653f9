//! Demo wiring: a scripted playback engine and an in-memory content bridge.
//!
//! Stands in for a real renderer and catalog so the binary can exercise the
//! whole session loop from a terminal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tv_bridge_types::{
    BufferTarget, ChannelEntry, ChannelSwitchPayload, PlaybackState, Provider, StreamPayload,
};

use crate::bridge::{BridgeError, ContentBridge};
use crate::engine::{EngineError, EngineEvent, PlaybackEngine};

const WARM_READY_DELAY: Duration = Duration::from_millis(400);
const COLD_READY_DELAY: Duration = Duration::from_secs(25);
const SIM_DURATION_MS: u64 = 5_400_000;

/// Playback engine that becomes ready after a scripted delay; sources with
/// "pikpak" in the URL behave like cold storage.
pub(crate) struct SimulatedEngine {
    events: mpsc::UnboundedSender<EngineEvent>,
    load_seq: Arc<AtomicU64>,
    loaded_at: Option<Instant>,
    ready_delay: Duration,
    playing: bool,
    base_position_ms: u64,
    resumed_at: Option<Instant>,
    bandwidth_bps: u64,
    released: bool,
}

impl SimulatedEngine {
    pub(crate) fn new(events: mpsc::UnboundedSender<EngineEvent>, bandwidth_bps: u64) -> Self {
        Self {
            events,
            load_seq: Arc::new(AtomicU64::new(0)),
            loaded_at: None,
            ready_delay: WARM_READY_DELAY,
            playing: false,
            base_position_ms: 0,
            resumed_at: None,
            bandwidth_bps,
            released: false,
        }
    }

    fn ready(&self) -> bool {
        self.loaded_at
            .map_or(false, |at| at.elapsed() >= self.ready_delay)
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn load(&mut self, url: &str, _title: Option<&str>) -> Result<(), EngineError> {
        if self.released {
            return Err(EngineError::Released);
        }
        if url.is_empty() {
            return Err(EngineError::LoadRejected {
                reason: "empty url".to_string(),
            });
        }
        let seq = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.ready_delay = if url.contains("pikpak") {
            COLD_READY_DELAY
        } else {
            WARM_READY_DELAY
        };
        self.loaded_at = Some(Instant::now());
        self.base_position_ms = 0;
        self.resumed_at = None;
        self.playing = false;
        let _ = self.events.send(EngineEvent::StateChanged(PlaybackState::Buffering));

        let events = self.events.clone();
        let load_seq = self.load_seq.clone();
        let delay = self.ready_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A newer load owns the engine now; stay quiet.
            if load_seq.load(Ordering::SeqCst) != seq {
                return;
            }
            let _ = events.send(EngineEvent::StateChanged(PlaybackState::Ready));
            let _ = events.send(EngineEvent::TracksChanged);
        });
        Ok(())
    }

    fn play(&mut self) {
        if !self.playing {
            self.playing = true;
            self.resumed_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if self.playing {
            self.base_position_ms = self.position_ms();
            self.playing = false;
            self.resumed_at = None;
        }
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.base_position_ms = position_ms.min(SIM_DURATION_MS);
        if self.playing {
            self.resumed_at = Some(Instant::now());
        }
    }

    fn position_ms(&self) -> u64 {
        let running = self
            .resumed_at
            .filter(|_| self.playing)
            .map_or(0, |at| at.elapsed().as_millis() as u64);
        (self.base_position_ms + running).min(SIM_DURATION_MS)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.ready().then_some(SIM_DURATION_MS)
    }

    fn playback_state(&self) -> PlaybackState {
        if self.released || self.loaded_at.is_none() {
            PlaybackState::Idle
        } else if self.ready() {
            PlaybackState::Ready
        } else {
            PlaybackState::Buffering
        }
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn bandwidth_estimate_bps(&self) -> u64 {
        self.bandwidth_bps
    }

    fn rebuild(&mut self, target: BufferTarget) {
        tracing::debug!(
            target_buffer_ms = target.target_buffer_ms,
            min_buffer_ms = target.min_buffer_ms,
            "simulated engine rebuilt"
        );
        self.loaded_at = None;
        self.playing = false;
        self.base_position_ms = 0;
        self.resumed_at = None;
    }

    fn select_default_subtitle(&mut self) {
        tracing::debug!("default subtitle selected");
    }

    fn release(&mut self) {
        self.released = true;
        self.loaded_at = None;
        self.playing = false;
    }
}

struct BridgeCursor {
    channel: usize,
    stream: u64,
}

/// In-memory catalog serving synthetic stream URLs per channel. Every fourth
/// stream is served from a cold-storage provider.
pub(crate) struct StaticBridge {
    channels: Vec<ChannelEntry>,
    cursor: Mutex<BridgeCursor>,
    finished: AtomicBool,
}

impl StaticBridge {
    pub(crate) fn new(channels: Vec<ChannelEntry>) -> Self {
        let current = channels.iter().position(|c| c.is_current).unwrap_or(0);
        Self {
            channels,
            cursor: Mutex::new(BridgeCursor {
                channel: current,
                stream: 0,
            }),
            finished: AtomicBool::new(false),
        }
    }

    fn stream_for(&self, channel: usize, stream: u64) -> (String, String, Provider) {
        let entry = &self.channels[channel];
        let (suffix, provider) = if stream % 4 == 3 {
            ("-pikpak", Provider::PikPak)
        } else {
            ("", Provider::Torbox)
        };
        (
            format!("https://vod.example/{}/{}{}.mkv", entry.id, stream, suffix),
            format!("{} #{}", entry.name, stream + 1),
            provider,
        )
    }

    fn switch_payload(&self, channel: usize) -> ChannelSwitchPayload {
        let entry = &self.channels[channel];
        let (url, title, provider) = self.stream_for(channel, 0);
        ChannelSwitchPayload {
            channel_id: Some(entry.id.clone()),
            channel_number: Some(entry.number),
            channel_name: Some(entry.name.clone()),
            first_url: Some(url),
            first_title: Some(title),
            provider: Some(provider),
        }
    }
}

#[async_trait]
impl ContentBridge for StaticBridge {
    async fn advance_stream(&self) -> Result<StreamPayload, BridgeError> {
        tokio::time::sleep(Duration::from_millis(120)).await;
        let (channel, stream) = {
            let mut cursor = self.cursor.lock().unwrap();
            let at = (cursor.channel, cursor.stream);
            cursor.stream += 1;
            at
        };
        let (url, title, provider) = self.stream_for(channel, stream);
        Ok(StreamPayload {
            url: Some(url),
            title: Some(title),
            provider: Some(provider),
        })
    }

    async fn advance_channel(&self) -> Result<ChannelSwitchPayload, BridgeError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let channel = {
            let mut cursor = self.cursor.lock().unwrap();
            cursor.channel = (cursor.channel + 1) % self.channels.len();
            cursor.stream = 1;
            cursor.channel
        };
        Ok(self.switch_payload(channel))
    }

    async fn select_channel(&self, channel_id: &str) -> Result<ChannelSwitchPayload, BridgeError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let Some(index) = self.channels.iter().position(|c| c.id == channel_id) else {
            return Err(BridgeError::new(format!("unknown channel {channel_id}")));
        };
        {
            let mut cursor = self.cursor.lock().unwrap();
            cursor.channel = index;
            cursor.stream = 1;
        }
        Ok(self.switch_payload(index))
    }

    fn playback_finished(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            tracing::info!("content bridge notified of session end");
        }
    }
}

/// Built-in channel list used when the config supplies none.
pub(crate) fn demo_channels() -> Vec<ChannelEntry> {
    [
        (2, "Action"),
        (7, "Classics"),
        (22, "Documentaries"),
        (23, "Music"),
    ]
    .into_iter()
    .map(|(number, name)| ChannelEntry {
        id: format!("ch-{number}"),
        number,
        name: name.to_string(),
        is_current: false,
    })
    .collect()
}
