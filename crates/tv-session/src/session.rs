//! Session orchestration event loop.
//!
//! Owns the playback engine, drives the retry protocol and input dispatcher,
//! and serializes every session mutation on one task. Bridge calls run as
//! detached futures that post their reply (tagged with an epoch) back into
//! the loop; stale-epoch replies and stale-token timers become no-ops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tv_bridge_types::{
    BufferTarget, ChannelEntry, ChannelSwitchPayload, PlaybackState, Provider, RemoteKeyEvent,
    StreamPayload,
};

use crate::bridge::{BridgeError, ContentBridge};
use crate::buffer;
use crate::config::SessionFeatures;
use crate::engine::{EngineEvent, PlaybackEngine};
use crate::events::SessionEventBus;
use crate::input::{DispatchContext, Directive, InputDispatcher, MenuAction, SwitchCooldown};
use crate::retry::{
    ADVANCE_AFTER_FAILURE_DELAY, PollVerdict, RETRY_POLL_INTERVAL, RetryConfig, RetryProtocol,
};
use crate::state::SessionState;
use crate::timers::{TimerPurpose, TimerWheel};

/// Window granted to the first track-list event of every load.
const TRACK_SELECT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// External inputs accepted by the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    Key(RemoteKeyEvent),
    Menu(MenuAction),
    AdvanceStream,
    AdvanceChannel,
    SelectChannel(String),
    Shutdown,
}

enum BridgeReply {
    Stream {
        epoch: u64,
        result: Result<StreamPayload, BridgeError>,
    },
    Channel {
        epoch: u64,
        result: Result<ChannelSwitchPayload, BridgeError>,
        requested_id: Option<String>,
    },
}

enum Wake {
    Command(Option<SessionCommand>),
    Engine(EngineEvent),
    Reply(BridgeReply),
    Timer(TimerPurpose),
}

pub struct SessionController<E, B> {
    engine: E,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    bridge: Arc<B>,
    dispatcher: InputDispatcher,
    retry: RetryProtocol,
    timers: TimerWheel,
    events: SessionEventBus,
    state: SessionState,
    cooldown: SwitchCooldown,
    current_target: BufferTarget,
    advance_epoch: u64,
    load_seq: u64,
    track_select_pending: bool,
    finished_notified: bool,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    reply_tx: mpsc::UnboundedSender<BridgeReply>,
    reply_rx: mpsc::UnboundedReceiver<BridgeReply>,
}

impl<E, B> SessionController<E, B>
where
    E: PlaybackEngine,
    B: ContentBridge + 'static,
{
    /// Build a controller and the command handle used to drive it.
    pub fn new(
        engine: E,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        bridge: Arc<B>,
        features: SessionFeatures,
        retry_config: RetryConfig,
        channels: Vec<ChannelEntry>,
        events: SessionEventBus,
    ) -> (Self, mpsc::UnboundedSender<SessionCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let mut dispatcher = InputDispatcher::new(features);
        let mut state = SessionState::default();
        if let Some(current) = channels.iter().find(|c| c.is_current) {
            state.channel_id = Some(current.id.clone());
            state.channel_number = Some(current.number);
            state.channel_name = Some(current.name.clone());
        }
        dispatcher.set_channels(channels);
        let controller = Self {
            engine,
            engine_events,
            bridge,
            dispatcher,
            retry: RetryProtocol::new(retry_config),
            timers: TimerWheel::new(),
            events,
            state,
            cooldown: SwitchCooldown::default(),
            current_target: BufferTarget::default(),
            advance_epoch: 0,
            load_seq: 0,
            track_select_pending: false,
            finished_notified: false,
            cmd_rx,
            reply_tx,
            reply_rx,
        };
        (controller, cmd_tx)
    }

    /// Run the session until it ends, then release the engine.
    pub async fn run(mut self, initial: Option<StreamPayload>) {
        let target = buffer::select_target(self.engine.bandwidth_estimate_bps());
        self.engine.rebuild(target);
        self.current_target = target;
        tracing::info!(
            target_buffer_ms = target.target_buffer_ms,
            min_buffer_ms = target.min_buffer_ms,
            "engine configured"
        );
        if let Some(payload) = initial {
            self.start_payload(payload);
        }
        while !self.state.ended {
            let wake = {
                let cmd_rx = &mut self.cmd_rx;
                let engine_events = &mut self.engine_events;
                let reply_rx = &mut self.reply_rx;
                let timers = &mut self.timers;
                tokio::select! {
                    cmd = cmd_rx.recv() => Wake::Command(cmd),
                    Some(event) = engine_events.recv() => Wake::Engine(event),
                    Some(reply) = reply_rx.recv() => Wake::Reply(reply),
                    Some(purpose) = timers.next() => Wake::Timer(purpose),
                }
            };
            match wake {
                Wake::Command(None) => break,
                Wake::Command(Some(cmd)) => self.handle_command(cmd),
                Wake::Engine(event) => self.handle_engine_event(event),
                Wake::Reply(reply) => self.handle_bridge_reply(reply),
                Wake::Timer(purpose) => self.handle_timer(purpose),
            }
        }
        self.teardown();
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Key(event) => {
                let before = self.dispatcher.overlay_kind();
                let ctx = self.dispatch_context();
                let directives = self.dispatcher.handle_key(event, &ctx);
                self.apply(directives);
                self.publish_overlay_change(before);
            }
            SessionCommand::Menu(action) => {
                let before = self.dispatcher.overlay_kind();
                let ctx = self.dispatch_context();
                let directives = self.dispatcher.handle_menu_action(action, &ctx);
                self.apply(directives);
                self.publish_overlay_change(before);
            }
            SessionCommand::AdvanceStream => self.advance_stream(),
            SessionCommand::AdvanceChannel => self.advance_channel(),
            SessionCommand::SelectChannel(id) => self.select_channel(id),
            SessionCommand::Shutdown => self.state.ended = true,
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StateChanged(PlaybackState::Ended) => {
                tracing::info!("stream ended; requesting the next one");
                self.advance_stream();
            }
            EngineEvent::StateChanged(state) => {
                tracing::debug!(?state, "engine state changed");
                self.events.status_changed();
            }
            EngineEvent::BandwidthSample(bps) => {
                tracing::debug!(bps, "bandwidth sample");
            }
            EngineEvent::TracksChanged => {
                if self.track_select_pending {
                    self.track_select_pending = false;
                    self.timers.cancel(&TimerPurpose::TrackSelectTimeout {
                        load_seq: self.load_seq,
                    });
                    self.engine.select_default_subtitle();
                }
            }
        }
    }

    fn handle_timer(&mut self, purpose: TimerPurpose) {
        match purpose {
            TimerPurpose::MenuAutoHide | TimerPurpose::LongPress(_) => {
                let before = self.dispatcher.overlay_kind();
                let ctx = self.dispatch_context();
                let directives = self.dispatcher.handle_timer(purpose, &ctx);
                self.apply(directives);
                self.publish_overlay_change(before);
            }
            TimerPurpose::RetryPoll { retry_id } => self.handle_retry_poll(retry_id),
            TimerPurpose::AdvanceAfterFailure { retry_id } => {
                if self.retry.token_is_current(retry_id) {
                    self.advance_stream();
                }
            }
            TimerPurpose::TrackSelectTimeout { load_seq } => {
                if load_seq == self.load_seq && self.track_select_pending {
                    self.track_select_pending = false;
                    tracing::debug!("track list never arrived; skipping subtitle selection");
                }
            }
        }
    }

    fn handle_retry_poll(&mut self, retry_id: u64) {
        let ready = matches!(self.engine.playback_state(), PlaybackState::Ready)
            || self.engine.duration_ms().is_some_and(|d| d > 0);
        match self.retry.on_poll(retry_id, Instant::now(), ready) {
            PollVerdict::Cancelled => {}
            PollVerdict::KeepWaiting => {
                self.timers
                    .arm(TimerPurpose::RetryPoll { retry_id }, RETRY_POLL_INTERVAL);
            }
            PollVerdict::NextAttempt {
                attempt,
                max_retries,
            } => {
                tracing::info!(attempt, max_retries, "source still cold; widening window");
                self.events.retry_progress(attempt + 1, max_retries + 1);
                self.timers
                    .arm(TimerPurpose::RetryPoll { retry_id }, RETRY_POLL_INTERVAL);
            }
            PollVerdict::Succeeded { attempt } => {
                tracing::info!(attempt, "cold source became ready");
                self.events.status_changed();
            }
            PollVerdict::Exhausted => {
                tracing::warn!("retries exhausted; scheduling automatic advance");
                self.events
                    .notice("Video failed to load. Skipping to next...");
                self.timers.arm(
                    TimerPurpose::AdvanceAfterFailure { retry_id },
                    ADVANCE_AFTER_FAILURE_DELAY,
                );
            }
        }
    }

    fn handle_bridge_reply(&mut self, reply: BridgeReply) {
        match reply {
            BridgeReply::Stream { epoch, result } => {
                if epoch != self.advance_epoch {
                    tracing::debug!(epoch, "dropping stale stream reply");
                    return;
                }
                self.state.is_requesting_advance = false;
                match result {
                    Ok(payload) => self.start_payload(payload),
                    Err(e) => {
                        tracing::warn!(error = %e, "stream advance failed");
                        self.events.notice(e.message);
                    }
                }
            }
            BridgeReply::Channel {
                epoch,
                result,
                requested_id,
            } => {
                if epoch != self.advance_epoch {
                    tracing::debug!(epoch, "dropping stale channel reply");
                    return;
                }
                self.state.is_requesting_advance = false;
                match result {
                    Ok(payload) => self.apply_channel_payload(payload, requested_id),
                    Err(e) => {
                        tracing::warn!(error = %e, "channel switch failed");
                        self.events.notice(e.message);
                    }
                }
            }
        }
    }

    fn apply(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::TogglePlayPause => {
                    if self.engine.is_playing() {
                        self.engine.pause();
                    } else {
                        self.engine.play();
                    }
                    self.events.status_changed();
                }
                Directive::SeekBy(offset_ms) => self.seek_by(offset_ms),
                Directive::CommitSeek(position_ms) => {
                    self.engine.seek_to(position_ms);
                    self.events.status_changed();
                }
                Directive::PausePlayback => self.engine.pause(),
                Directive::ResumePlayback => {
                    if !self.engine.is_playing() {
                        self.engine.play();
                    }
                }
                Directive::AdvanceStream => self.advance_stream(),
                Directive::AdvanceChannel => self.advance_channel(),
                Directive::SelectChannel(id) => self.select_channel(id),
                Directive::Notice(message) => self.events.notice(message),
                Directive::EndSession => self.state.ended = true,
                Directive::ArmTimer(purpose, delay) => self.timers.arm(purpose, delay),
                Directive::CancelTimer(purpose) => self.timers.cancel(&purpose),
            }
        }
    }

    fn seek_by(&mut self, offset_ms: i64) {
        let position = self.engine.position_ms();
        let mut target = position.saturating_add_signed(offset_ms);
        if let Some(duration) = self.engine.duration_ms() {
            target = target.min(duration);
        }
        self.engine.seek_to(target);
        self.events.seek_feedback(offset_ms);
    }

    fn advance_stream(&mut self) {
        if self.state.is_requesting_advance {
            tracing::debug!("advance already in flight; ignoring");
            return;
        }
        tracing::debug!(
            provider = ?self.state.active_provider,
            "requesting next stream"
        );
        // An accepted advance supersedes any in-flight retry sequence.
        self.retry.cancel();
        self.state.is_requesting_advance = true;
        self.advance_epoch += 1;
        let epoch = self.advance_epoch;
        let bridge = self.bridge.clone();
        let tx = self.reply_tx.clone();
        tokio::spawn(async move {
            let result = bridge.advance_stream().await;
            let _ = tx.send(BridgeReply::Stream { epoch, result });
        });
    }

    fn advance_channel(&mut self) {
        let now = Instant::now();
        if !self.cooldown.allow(now) {
            self.events.notice("Please wait...");
            return;
        }
        if self.state.is_requesting_advance {
            tracing::debug!("advance already in flight; ignoring channel switch");
            return;
        }
        self.retry.cancel();
        self.cooldown.mark(now);
        self.state.is_requesting_advance = true;
        self.advance_epoch += 1;
        let epoch = self.advance_epoch;
        let bridge = self.bridge.clone();
        let tx = self.reply_tx.clone();
        tokio::spawn(async move {
            let result = bridge.advance_channel().await;
            let _ = tx.send(BridgeReply::Channel {
                epoch,
                result,
                requested_id: None,
            });
        });
    }

    fn select_channel(&mut self, channel_id: String) {
        let now = Instant::now();
        if !self.cooldown.allow(now) {
            self.events.notice("Please wait...");
            return;
        }
        if self.state.is_requesting_advance {
            tracing::debug!("advance already in flight; ignoring channel select");
            return;
        }
        self.retry.cancel();
        self.cooldown.mark(now);
        self.state.is_requesting_advance = true;
        self.advance_epoch += 1;
        let epoch = self.advance_epoch;
        let bridge = self.bridge.clone();
        let tx = self.reply_tx.clone();
        tokio::spawn(async move {
            let result = bridge.select_channel(&channel_id).await;
            let _ = tx.send(BridgeReply::Channel {
                epoch,
                result,
                requested_id: Some(channel_id),
            });
        });
    }

    fn start_payload(&mut self, payload: StreamPayload) {
        match payload.url.filter(|u| !u.is_empty()) {
            Some(url) => self.start_stream(url, payload.title, payload.provider),
            None => self.no_more_streams(),
        }
    }

    fn apply_channel_payload(
        &mut self,
        payload: ChannelSwitchPayload,
        requested_id: Option<String>,
    ) {
        let Some(url) = payload.first_url.filter(|u| !u.is_empty()) else {
            self.events.notice("Channel has no streams");
            return;
        };
        self.state.channel_id = payload.channel_id.or(requested_id);
        if let Some(number) = payload.channel_number {
            self.state.channel_number = Some(number);
        }
        if let Some(name) = payload.channel_name {
            self.state.channel_name = Some(name);
        }
        self.dispatcher
            .mark_current_channel(self.state.channel_id.as_deref(), payload.channel_number);
        self.events.channel_badge(
            self.state.channel_number,
            self.state.channel_name.clone().unwrap_or_default(),
        );
        tracing::info!(
            channel = self.state.channel_name.as_deref().unwrap_or("?"),
            number = ?self.state.channel_number,
            "switched channel"
        );
        self.start_stream(url, payload.first_title, payload.provider);
    }

    fn start_stream(&mut self, url: String, title: Option<String>, provider: Option<Provider>) {
        // A new source supersedes every scheduled retry callback.
        self.retry.cancel();

        let desired = buffer::select_target(self.engine.bandwidth_estimate_bps());
        if buffer::needs_rebuild(self.current_target, desired) {
            tracing::info!(
                from_ms = self.current_target.target_buffer_ms,
                to_ms = desired.target_buffer_ms,
                "rebuilding engine for bandwidth change"
            );
            self.engine.rebuild(desired);
            self.current_target = desired;
        }

        if let Err(e) = self.engine.load(&url, title.as_deref()) {
            tracing::warn!(error = %e, "engine rejected load");
            self.events.notice("Failed to start playback");
            return;
        }
        self.engine.play();

        self.state.active_url = Some(url);
        self.state.active_title = title;
        self.state.active_provider = provider;
        self.state.played_count += 1;
        self.load_seq += 1;
        self.track_select_pending = true;
        self.timers.arm(
            TimerPurpose::TrackSelectTimeout {
                load_seq: self.load_seq,
            },
            TRACK_SELECT_TIMEOUT,
        );
        self.events.status_changed();

        let cold = provider.is_some_and(Provider::is_cold_storage);
        if cold {
            let retry_id = self.retry.start_sequence(Instant::now());
            self.timers
                .arm(TimerPurpose::RetryPoll { retry_id }, RETRY_POLL_INTERVAL);
            tracing::info!(retry_id, "cold-storage source; watching for readiness");
        }
        tracing::info!(
            title = self.state.active_title.as_deref().unwrap_or("?"),
            provider = ?provider,
            played = self.state.played_count,
            "started stream"
        );
    }

    fn no_more_streams(&mut self) {
        tracing::info!("bridge has no more streams; ending session");
        self.events.notice("No more streams available");
        self.state.ended = true;
    }

    fn teardown(&mut self) {
        self.retry.cancel();
        self.advance_epoch += 1;
        self.state.is_requesting_advance = false;
        self.timers.clear();
        if !self.finished_notified {
            self.finished_notified = true;
            self.bridge.playback_finished();
        }
        self.engine.release();
        self.events.session_ended();
        tracing::info!(
            played = self.state.played_count,
            last_url = ?self.state.active_url,
            "session ended"
        );
    }

    fn publish_overlay_change(&mut self, before: crate::input::OverlayKind) {
        let after = self.dispatcher.overlay_kind();
        if before != after {
            self.events.overlay_changed(after);
        }
    }

    fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            position_ms: self.engine.position_ms(),
            duration_ms: self.engine.duration_ms(),
            is_playing: self.engine.is_playing(),
            now: Instant::now(),
        }
    }
}
