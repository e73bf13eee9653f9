//! Remote-control input dispatch and overlay ownership.
//!
//! Routes key events among mutually exclusive overlay modes. The dispatcher
//! mutates only its own overlay state and returns directives; the session
//! controller owns every side effect and the named timer wheel. Entering any
//! overlay forcibly exits the previous one, so no two overlays ever interpret
//! the same key stream.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tv_bridge_types::{ChannelEntry, KeyAction, RemoteKey, RemoteKeyEvent};

use crate::config::{GuideStyle, SessionFeatures};
use crate::timers::TimerPurpose;

pub(crate) const SEEK_STEP_MS: u64 = 10_000;
const SEEK_OVERLAY_REPEAT_THRESHOLD: u32 = 3;
const SEEK_ACCELERATION_MS: u64 = 2_000;
const SEEK_MAX_STEP_MS: u64 = 120_000;
pub(crate) const MENU_AUTO_HIDE_DELAY: Duration = Duration::from_millis(4_000);
const LONG_PRESS_TIMEOUT: Duration = Duration::from_millis(450);
const CHANNEL_JUMP_MAX_DIGITS: usize = 10;
pub(crate) const CHANNEL_SWITCH_COOLDOWN: Duration = Duration::from_millis(2_000);
const BACK_EXIT_WINDOW: Duration = Duration::from_millis(2_000);

/// Which overlay currently owns key interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayKind {
    Normal,
    ControlsMenu,
    SeekOverlay,
    ChannelDirectory,
    ChannelJump,
    SubtitleSettings,
}

/// Overlay-mode state; exactly one variant is active at a time.
#[derive(Debug)]
pub(crate) enum OverlayState {
    Normal,
    ControlsMenu,
    SeekOverlay {
        /// Return into the controls menu on close.
        reopen_menu_after: bool,
        /// Resume playback on close (the overlay paused it on entry).
        resume_playback_after: bool,
        /// Not-yet-committed scrub position.
        staged_position_ms: u64,
        duration_ms: u64,
    },
    ChannelDirectory {
        query: String,
        /// Indices into the channel list matching the query.
        filtered: Vec<usize>,
        /// Position within `filtered`.
        selected: usize,
    },
    ChannelJump {
        digit_buffer: String,
    },
    SubtitleSettings,
}

impl OverlayState {
    pub(crate) fn kind(&self) -> OverlayKind {
        match self {
            OverlayState::Normal => OverlayKind::Normal,
            OverlayState::ControlsMenu => OverlayKind::ControlsMenu,
            OverlayState::SeekOverlay { .. } => OverlayKind::SeekOverlay,
            OverlayState::ChannelDirectory { .. } => OverlayKind::ChannelDirectory,
            OverlayState::ChannelJump { .. } => OverlayKind::ChannelJump,
            OverlayState::SubtitleSettings => OverlayKind::SubtitleSettings,
        }
    }
}

/// Controls-menu actions forwarded from the focused button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    Scrub,
    Guide,
    NextChannel,
    NextStream,
    Subtitles,
}

/// Side effects requested from the session controller.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Directive {
    TogglePlayPause,
    /// Relative seek by a signed offset.
    SeekBy(i64),
    /// Absolute seek committed from the scrub overlay.
    CommitSeek(u64),
    PausePlayback,
    ResumePlayback,
    AdvanceStream,
    AdvanceChannel,
    SelectChannel(String),
    Notice(String),
    EndSession,
    ArmTimer(TimerPurpose, Duration),
    CancelTimer(TimerPurpose),
}

/// Player facts the dispatcher needs to interpret a key.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DispatchContext {
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub is_playing: bool,
    pub now: Instant,
}

/// Rate limiter for channel-advancing actions. Rejected requests are
/// dropped, not deferred.
#[derive(Debug, Default)]
pub(crate) struct SwitchCooldown {
    last_switch: Option<Instant>,
}

impl SwitchCooldown {
    pub(crate) fn allow(&self, now: Instant) -> bool {
        self.last_switch
            .map_or(true, |at| now.duration_since(at) >= CHANNEL_SWITCH_COOLDOWN)
    }

    pub(crate) fn mark(&mut self, now: Instant) {
        self.last_switch = Some(now);
    }
}

struct HeldKey {
    long_press_fired: bool,
}

pub(crate) struct InputDispatcher {
    features: SessionFeatures,
    overlay: OverlayState,
    channels: Vec<ChannelEntry>,
    held: HashMap<RemoteKey, HeldKey>,
    last_back_press: Option<Instant>,
}

impl InputDispatcher {
    pub(crate) fn new(features: SessionFeatures) -> Self {
        Self {
            features,
            overlay: OverlayState::Normal,
            channels: Vec::new(),
            held: HashMap::new(),
            last_back_press: None,
        }
    }

    pub(crate) fn overlay_kind(&self) -> OverlayKind {
        self.overlay.kind()
    }

    /// Install the channel directory. Called once from the initial payload.
    pub(crate) fn set_channels(&mut self, channels: Vec<ChannelEntry>) {
        self.channels = channels;
    }

    /// Update `is_current` flags after a switch, applying re-numbering from
    /// the switch response when present.
    pub(crate) fn mark_current_channel(&mut self, channel_id: Option<&str>, number: Option<u32>) {
        for entry in &mut self.channels {
            entry.is_current = channel_id.map_or(false, |id| entry.id == id);
            if entry.is_current {
                if let Some(n) = number {
                    entry.number = n;
                }
            }
        }
    }

    /// Route one key event through the active overlay.
    pub(crate) fn handle_key(
        &mut self,
        event: RemoteKeyEvent,
        ctx: &DispatchContext,
    ) -> Vec<Directive> {
        // Releases of tracked keys resolve long-press state first, wherever
        // the overlay ended up in the meantime.
        if event.action == KeyAction::Up {
            if let Some(held) = self.held.remove(&event.key) {
                if held.long_press_fired {
                    return Vec::new();
                }
                let mut out = vec![Directive::CancelTimer(TimerPurpose::LongPress(event.key))];
                if self.overlay.kind() == OverlayKind::Normal {
                    out.extend(self.short_press_action(event.key));
                }
                return out;
            }
        }
        match self.overlay.kind() {
            OverlayKind::Normal => self.handle_normal_key(event, ctx),
            OverlayKind::ControlsMenu => self.handle_menu_key(event),
            OverlayKind::SeekOverlay => self.handle_seek_key(event),
            OverlayKind::ChannelDirectory => self.handle_directory_key(event),
            OverlayKind::ChannelJump => self.handle_jump_key(event),
            OverlayKind::SubtitleSettings => self.handle_subtitle_key(event),
        }
    }

    /// Route a controls-menu button action. Ignored while the menu is closed.
    pub(crate) fn handle_menu_action(
        &mut self,
        action: MenuAction,
        ctx: &DispatchContext,
    ) -> Vec<Directive> {
        if self.overlay.kind() != OverlayKind::ControlsMenu {
            return Vec::new();
        }
        // The menu closes before the action runs, matching the original
        // controller behavior.
        let mut out = self.enter(OverlayState::Normal);
        match action {
            MenuAction::Scrub => out.extend(self.open_seek_overlay(true, true, ctx)),
            MenuAction::Guide => out.extend(self.open_guide()),
            MenuAction::NextChannel => out.push(Directive::AdvanceChannel),
            MenuAction::NextStream => out.push(Directive::AdvanceStream),
            MenuAction::Subtitles => out.extend(self.enter(OverlayState::SubtitleSettings)),
        }
        out
    }

    /// Apply a timer expiration owned by the dispatcher.
    pub(crate) fn handle_timer(
        &mut self,
        purpose: TimerPurpose,
        ctx: &DispatchContext,
    ) -> Vec<Directive> {
        match purpose {
            TimerPurpose::MenuAutoHide => {
                if self.overlay.kind() == OverlayKind::ControlsMenu {
                    self.overlay = OverlayState::Normal;
                }
                Vec::new()
            }
            TimerPurpose::LongPress(key) => {
                let fire = match self.held.get_mut(&key) {
                    Some(held) if !held.long_press_fired => {
                        held.long_press_fired = true;
                        true
                    }
                    _ => false,
                };
                if fire {
                    self.long_press_action(key, ctx)
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    fn handle_normal_key(&mut self, event: RemoteKeyEvent, ctx: &DispatchContext) -> Vec<Directive> {
        let RemoteKeyEvent { key, action } = event;
        if self.features.long_press
            && matches!(
                key,
                RemoteKey::Center | RemoteKey::Up | RemoteKey::Down | RemoteKey::Right
            )
        {
            return self.handle_tracked_press(key, action);
        }
        match (key, action) {
            (RemoteKey::Back, KeyAction::Down { repeat: 0 }) => self.handle_back_in_normal(ctx),
            (RemoteKey::Center, KeyAction::Down { repeat: 0 }) => self.center_action(),
            (RemoteKey::Down, KeyAction::Down { repeat: 0 }) => self.open_menu(),
            (RemoteKey::Up, KeyAction::Down { repeat: 0 }) => self.open_guide(),
            (RemoteKey::Digit(d), KeyAction::Down { repeat: 0 })
                if self.features.guide_style == GuideStyle::NumericJump =>
            {
                let mut out = self.enter(OverlayState::ChannelJump {
                    digit_buffer: String::new(),
                });
                out.extend(self.jump_push_digit(d));
                out
            }
            (RemoteKey::Left, KeyAction::Down { repeat }) => self.seek_key(-1, repeat, ctx),
            (RemoteKey::Right, KeyAction::Down { repeat }) => self.seek_key(1, repeat, ctx),
            _ => Vec::new(),
        }
    }

    fn handle_menu_key(&mut self, event: RemoteKeyEvent) -> Vec<Directive> {
        match (event.key, event.action) {
            (RemoteKey::Back, KeyAction::Down { repeat: 0 }) => self.enter(OverlayState::Normal),
            // Focus navigation is delegated; every interaction keeps the
            // menu alive.
            (
                RemoteKey::Up | RemoteKey::Down | RemoteKey::Left | RemoteKey::Right
                | RemoteKey::Center,
                KeyAction::Down { .. },
            ) => vec![Directive::ArmTimer(
                TimerPurpose::MenuAutoHide,
                MENU_AUTO_HIDE_DELAY,
            )],
            _ => Vec::new(),
        }
    }

    fn handle_seek_key(&mut self, event: RemoteKeyEvent) -> Vec<Directive> {
        match (event.key, event.action) {
            (RemoteKey::Left, KeyAction::Down { repeat }) => {
                self.nudge_staged(-(accelerated_seek_step(repeat) as i64));
                Vec::new()
            }
            (RemoteKey::Right, KeyAction::Down { repeat }) => {
                self.nudge_staged(accelerated_seek_step(repeat) as i64);
                Vec::new()
            }
            (RemoteKey::Center, KeyAction::Down { repeat: 0 }) => {
                let staged = match &self.overlay {
                    OverlayState::SeekOverlay {
                        staged_position_ms, ..
                    } => *staged_position_ms,
                    _ => return Vec::new(),
                };
                let mut out = vec![Directive::CommitSeek(staged)];
                out.extend(self.close_seek_overlay());
                out
            }
            (RemoteKey::Back, KeyAction::Down { repeat: 0 }) => self.close_seek_overlay(),
            _ => Vec::new(),
        }
    }

    fn handle_directory_key(&mut self, event: RemoteKeyEvent) -> Vec<Directive> {
        match (event.key, event.action) {
            (RemoteKey::Back, KeyAction::Down { repeat: 0 }) => self.enter(OverlayState::Normal),
            (RemoteKey::Digit(d), KeyAction::Down { repeat: 0 }) => {
                if let OverlayState::ChannelDirectory { query, .. } = &mut self.overlay {
                    query.push((b'0' + d) as char);
                }
                self.refresh_directory_filter();
                Vec::new()
            }
            (RemoteKey::Up, KeyAction::Down { .. }) => {
                self.directory_move(-1);
                Vec::new()
            }
            (RemoteKey::Down, KeyAction::Down { .. }) => {
                self.directory_move(1);
                Vec::new()
            }
            (RemoteKey::Center, KeyAction::Down { repeat: 0 }) => self.directory_commit(),
            _ => Vec::new(),
        }
    }

    fn handle_jump_key(&mut self, event: RemoteKeyEvent) -> Vec<Directive> {
        match (event.key, event.action) {
            (RemoteKey::Back, KeyAction::Down { repeat: 0 }) => self.enter(OverlayState::Normal),
            (RemoteKey::Digit(d), KeyAction::Down { repeat: 0 }) => self.jump_push_digit(d),
            (RemoteKey::Center, KeyAction::Down { repeat: 0 }) => self.jump_commit_exact(),
            _ => Vec::new(),
        }
    }

    fn handle_subtitle_key(&mut self, event: RemoteKeyEvent) -> Vec<Directive> {
        match (event.key, event.action) {
            (RemoteKey::Back, KeyAction::Down { repeat: 0 }) => self.enter(OverlayState::Normal),
            // Value cycling is delegated to the subtitle renderer.
            _ => Vec::new(),
        }
    }

    fn handle_back_in_normal(&mut self, ctx: &DispatchContext) -> Vec<Directive> {
        if !self.features.double_back_exit {
            return vec![Directive::EndSession];
        }
        match self.last_back_press {
            Some(at) if ctx.now.duration_since(at) < BACK_EXIT_WINDOW => {
                vec![Directive::EndSession]
            }
            _ => {
                self.last_back_press = Some(ctx.now);
                vec![Directive::Notice("Press back again to exit".into())]
            }
        }
    }

    fn handle_tracked_press(&mut self, key: RemoteKey, action: KeyAction) -> Vec<Directive> {
        match action {
            KeyAction::Down { repeat: 0 } => {
                self.held.insert(
                    key,
                    HeldKey {
                        long_press_fired: false,
                    },
                );
                vec![Directive::ArmTimer(
                    TimerPurpose::LongPress(key),
                    LONG_PRESS_TIMEOUT,
                )]
            }
            // Auto-repeats while held carry no meaning; the timer decides.
            KeyAction::Down { .. } => Vec::new(),
            KeyAction::Up => Vec::new(),
        }
    }

    fn short_press_action(&mut self, key: RemoteKey) -> Vec<Directive> {
        match key {
            RemoteKey::Center => self.center_action(),
            RemoteKey::Down => self.open_menu(),
            RemoteKey::Up => self.open_guide(),
            RemoteKey::Right => vec![Directive::SeekBy(SEEK_STEP_MS as i64)],
            _ => Vec::new(),
        }
    }

    fn long_press_action(&mut self, key: RemoteKey, ctx: &DispatchContext) -> Vec<Directive> {
        match key {
            RemoteKey::Center => vec![Directive::AdvanceStream],
            RemoteKey::Up => vec![Directive::AdvanceChannel],
            RemoteKey::Down => self.enter(OverlayState::SubtitleSettings),
            RemoteKey::Right => self.open_seek_overlay(false, false, ctx),
            _ => Vec::new(),
        }
    }

    fn center_action(&mut self) -> Vec<Directive> {
        let mut out = vec![Directive::TogglePlayPause];
        out.extend(self.open_menu());
        out
    }

    fn open_menu(&mut self) -> Vec<Directive> {
        let mut out = self.enter(OverlayState::ControlsMenu);
        out.push(Directive::ArmTimer(
            TimerPurpose::MenuAutoHide,
            MENU_AUTO_HIDE_DELAY,
        ));
        out
    }

    fn open_guide(&mut self) -> Vec<Directive> {
        match self.features.guide_style {
            GuideStyle::NumericJump => self.enter(OverlayState::ChannelJump {
                digit_buffer: String::new(),
            }),
            GuideStyle::Directory => {
                if self.channels.is_empty() {
                    return vec![Directive::Notice("Channel guide unavailable".into())];
                }
                let filtered: Vec<usize> = (0..self.channels.len()).collect();
                let selected = self
                    .channels
                    .iter()
                    .position(|c| c.is_current)
                    .unwrap_or(0);
                self.enter(OverlayState::ChannelDirectory {
                    query: String::new(),
                    filtered,
                    selected,
                })
            }
        }
    }

    fn seek_key(&mut self, direction: i64, repeat: u32, ctx: &DispatchContext) -> Vec<Directive> {
        if repeat >= SEEK_OVERLAY_REPEAT_THRESHOLD {
            // Sustained hold escalates from discrete stepping to the scrub
            // overlay.
            self.open_seek_overlay(false, false, ctx)
        } else {
            vec![Directive::SeekBy(direction * SEEK_STEP_MS as i64)]
        }
    }

    fn open_seek_overlay(
        &mut self,
        pause: bool,
        reopen_menu: bool,
        ctx: &DispatchContext,
    ) -> Vec<Directive> {
        let Some(duration_ms) = ctx.duration_ms.filter(|d| *d > 0) else {
            return vec![Directive::Notice("Seeking not available".into())];
        };
        let resume_playback_after = pause && ctx.is_playing;
        let mut out = self.enter(OverlayState::SeekOverlay {
            reopen_menu_after: reopen_menu,
            resume_playback_after,
            staged_position_ms: ctx.position_ms.min(duration_ms),
            duration_ms,
        });
        if resume_playback_after {
            out.push(Directive::PausePlayback);
        }
        out
    }

    fn close_seek_overlay(&mut self) -> Vec<Directive> {
        match std::mem::replace(&mut self.overlay, OverlayState::Normal) {
            OverlayState::SeekOverlay {
                reopen_menu_after,
                resume_playback_after,
                ..
            } => {
                let mut out = Vec::new();
                if resume_playback_after {
                    out.push(Directive::ResumePlayback);
                }
                if reopen_menu_after {
                    out.extend(self.open_menu());
                }
                out
            }
            other => {
                self.overlay = other;
                Vec::new()
            }
        }
    }

    fn nudge_staged(&mut self, delta: i64) {
        if let OverlayState::SeekOverlay {
            staged_position_ms,
            duration_ms,
            ..
        } = &mut self.overlay
        {
            *staged_position_ms = staged_position_ms
                .saturating_add_signed(delta)
                .min(*duration_ms);
        }
    }

    fn refresh_directory_filter(&mut self) {
        let query = match &self.overlay {
            OverlayState::ChannelDirectory { query, .. } => query.clone(),
            _ => return,
        };
        let normalized = query.trim().to_lowercase();
        let digits: String = query.chars().filter(|c| c.is_ascii_digit()).collect();
        let matching: Vec<usize> = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.matches(&normalized, &digits))
            .map(|(i, _)| i)
            .collect();
        if let OverlayState::ChannelDirectory {
            filtered, selected, ..
        } = &mut self.overlay
        {
            *filtered = matching;
            *selected = 0;
        }
    }

    fn directory_move(&mut self, delta: i64) {
        if let OverlayState::ChannelDirectory {
            filtered, selected, ..
        } = &mut self.overlay
        {
            if filtered.is_empty() {
                return;
            }
            let last = filtered.len() - 1;
            *selected = selected
                .saturating_add_signed(delta as isize)
                .min(last);
        }
    }

    fn directory_commit(&mut self) -> Vec<Directive> {
        let id = match &self.overlay {
            OverlayState::ChannelDirectory {
                filtered, selected, ..
            } => filtered
                .get(*selected)
                .map(|i| self.channels[*i].id.clone()),
            _ => None,
        };
        match id {
            Some(id) => {
                let mut out = self.enter(OverlayState::Normal);
                out.push(Directive::SelectChannel(id));
                out
            }
            None => vec![Directive::Notice("No matching channels".into())],
        }
    }

    fn jump_push_digit(&mut self, digit: u8) -> Vec<Directive> {
        let buffer = match &self.overlay {
            OverlayState::ChannelJump { digit_buffer } => digit_buffer.clone(),
            _ => return Vec::new(),
        };
        if buffer.len() >= CHANNEL_JUMP_MAX_DIGITS {
            return Vec::new();
        }
        let mut candidate = buffer;
        candidate.push((b'0' + digit) as char);
        let prefix_matches: Vec<usize> = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.number > 0 && c.number.to_string().starts_with(&candidate))
            .map(|(i, _)| i)
            .collect();
        match prefix_matches.len() {
            // Digit rejected; the buffer stays as typed so far.
            0 => vec![Directive::Notice(format!("No channel {candidate}"))],
            // Unique prefix with no longer extension possible: commit now.
            1 => {
                let id = self.channels[prefix_matches[0]].id.clone();
                let mut out = self.enter(OverlayState::Normal);
                out.push(Directive::SelectChannel(id));
                out
            }
            _ => {
                if let OverlayState::ChannelJump { digit_buffer } = &mut self.overlay {
                    *digit_buffer = candidate;
                }
                Vec::new()
            }
        }
    }

    fn jump_commit_exact(&mut self) -> Vec<Directive> {
        let buffer = match &self.overlay {
            OverlayState::ChannelJump { digit_buffer } => digit_buffer.clone(),
            _ => return Vec::new(),
        };
        if buffer.is_empty() {
            return Vec::new();
        }
        let id = self
            .channels
            .iter()
            .find(|c| c.number > 0 && c.number.to_string() == buffer)
            .map(|c| c.id.clone());
        match id {
            Some(id) => {
                let mut out = self.enter(OverlayState::Normal);
                out.push(Directive::SelectChannel(id));
                out
            }
            None => vec![Directive::Notice(format!("No channel {buffer}"))],
        }
    }

    /// Switch overlays, forcibly exiting the current one first.
    fn enter(&mut self, next: OverlayState) -> Vec<Directive> {
        let mut out = self.exit_current();
        self.overlay = next;
        out
    }

    fn exit_current(&mut self) -> Vec<Directive> {
        match std::mem::replace(&mut self.overlay, OverlayState::Normal) {
            OverlayState::ControlsMenu => {
                vec![Directive::CancelTimer(TimerPurpose::MenuAutoHide)]
            }
            OverlayState::SeekOverlay {
                resume_playback_after: true,
                ..
            } => vec![Directive::ResumePlayback],
            _ => Vec::new(),
        }
    }
}

fn accelerated_seek_step(repeat: u32) -> u64 {
    (SEEK_STEP_MS + u64::from(repeat) * SEEK_ACCELERATION_MS).min(SEEK_MAX_STEP_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DispatchContext {
        DispatchContext {
            position_ms: 60_000,
            duration_ms: Some(600_000),
            is_playing: true,
            now: Instant::now(),
        }
    }

    fn channels(numbers: &[u32]) -> Vec<ChannelEntry> {
        numbers
            .iter()
            .map(|n| ChannelEntry {
                id: format!("ch-{n}"),
                number: *n,
                name: format!("Channel {n}"),
                is_current: false,
            })
            .collect()
    }

    fn dispatcher(features: SessionFeatures, numbers: &[u32]) -> InputDispatcher {
        let mut d = InputDispatcher::new(features);
        d.set_channels(channels(numbers));
        d
    }

    fn jump_features() -> SessionFeatures {
        SessionFeatures {
            guide_style: GuideStyle::NumericJump,
            ..SessionFeatures::default()
        }
    }

    #[test]
    fn center_toggles_playback_and_opens_menu() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx());
        assert_eq!(
            out,
            vec![
                Directive::TogglePlayPause,
                Directive::ArmTimer(TimerPurpose::MenuAutoHide, MENU_AUTO_HIDE_DELAY),
            ]
        );
        assert_eq!(d.overlay_kind(), OverlayKind::ControlsMenu);
    }

    #[test]
    fn back_closes_any_overlay_and_is_consumed() {
        let mut d = dispatcher(SessionFeatures::default(), &[2, 22]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Down), &ctx());
        assert_eq!(d.overlay_kind(), OverlayKind::ControlsMenu);

        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Back), &ctx());
        assert_eq!(
            out,
            vec![Directive::CancelTimer(TimerPurpose::MenuAutoHide)]
        );
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn entering_an_overlay_exits_the_previous_one() {
        let mut d = dispatcher(SessionFeatures::default(), &[2, 22]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Down), &ctx());
        assert_eq!(d.overlay_kind(), OverlayKind::ControlsMenu);

        // Up from the menu is focus navigation, not a guide trigger; use the
        // menu's guide action instead.
        let out = d.handle_menu_action(MenuAction::Guide, &ctx());
        assert!(out.contains(&Directive::CancelTimer(TimerPurpose::MenuAutoHide)));
        assert_eq!(d.overlay_kind(), OverlayKind::ChannelDirectory);

        // Opening the menu from the directory would stack; the dispatcher
        // never allows it: Back first, then reopen.
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Back), &ctx());
        assert_eq!(out, vec![]);
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn menu_actions_are_ignored_while_menu_is_closed() {
        let mut d = dispatcher(SessionFeatures::default(), &[2]);
        assert_eq!(d.handle_menu_action(MenuAction::NextStream, &ctx()), vec![]);
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn stale_menu_auto_hide_is_a_no_op() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        // Menu never opened; a stray expiry must not disturb Normal.
        let out = d.handle_timer(TimerPurpose::MenuAutoHide, &ctx());
        assert_eq!(out, vec![]);
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);

        d.handle_key(RemoteKeyEvent::down(RemoteKey::Down), &ctx());
        d.handle_timer(TimerPurpose::MenuAutoHide, &ctx());
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn menu_interaction_reschedules_auto_hide() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Down), &ctx());
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Left), &ctx());
        assert_eq!(
            out,
            vec![Directive::ArmTimer(
                TimerPurpose::MenuAutoHide,
                MENU_AUTO_HIDE_DELAY
            )]
        );
        assert_eq!(d.overlay_kind(), OverlayKind::ControlsMenu);
    }

    #[test]
    fn short_seek_steps_then_escalates_to_overlay() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Right), &ctx());
        assert_eq!(out, vec![Directive::SeekBy(10_000)]);

        // Early auto-repeats keep stepping discretely.
        assert_eq!(
            d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Right, 1), &ctx()),
            vec![Directive::SeekBy(10_000)]
        );
        assert_eq!(
            d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Right, 2), &ctx()),
            vec![Directive::SeekBy(10_000)]
        );
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);

        d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Right, 3), &ctx());
        assert_eq!(d.overlay_kind(), OverlayKind::SeekOverlay);
    }

    #[test]
    fn seek_overlay_needs_a_known_duration() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        let no_duration = DispatchContext {
            duration_ms: None,
            ..ctx()
        };
        let out = d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Right, 3), &no_duration);
        assert_eq!(
            out,
            vec![Directive::Notice("Seeking not available".into())]
        );
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn scrub_steps_accelerate_up_to_the_cap() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        let base = DispatchContext {
            position_ms: 100_000,
            duration_ms: Some(3_600_000),
            ..ctx()
        };
        d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Right, 3), &base);

        // repeat 10 -> 10s + 20s = 30s.
        d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Right, 10), &base);
        match &d.overlay {
            OverlayState::SeekOverlay {
                staged_position_ms, ..
            } => assert_eq!(*staged_position_ms, 130_000),
            other => panic!("unexpected overlay {other:?}"),
        }

        // repeat 60 -> capped at 120s.
        d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Right, 60), &base);
        match &d.overlay {
            OverlayState::SeekOverlay {
                staged_position_ms, ..
            } => assert_eq!(*staged_position_ms, 250_000),
            other => panic!("unexpected overlay {other:?}"),
        }
    }

    #[test]
    fn staged_position_clamps_to_media_bounds() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        let near_start = DispatchContext {
            position_ms: 5_000,
            duration_ms: Some(60_000),
            ..ctx()
        };
        d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Left, 3), &near_start);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Left), &near_start);
        match &d.overlay {
            OverlayState::SeekOverlay {
                staged_position_ms, ..
            } => assert_eq!(*staged_position_ms, 0),
            other => panic!("unexpected overlay {other:?}"),
        }
        for _ in 0..20 {
            d.handle_key(RemoteKeyEvent::down(RemoteKey::Right), &near_start);
        }
        match &d.overlay {
            OverlayState::SeekOverlay {
                staged_position_ms, ..
            } => assert_eq!(*staged_position_ms, 60_000),
            other => panic!("unexpected overlay {other:?}"),
        }
    }

    #[test]
    fn scrub_from_menu_pauses_and_returns_to_menu_on_confirm() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Down), &ctx());
        let out = d.handle_menu_action(MenuAction::Scrub, &ctx());
        assert!(out.contains(&Directive::PausePlayback));
        assert_eq!(d.overlay_kind(), OverlayKind::SeekOverlay);

        d.handle_key(RemoteKeyEvent::down(RemoteKey::Right), &ctx());
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx());
        assert_eq!(out[0], Directive::CommitSeek(70_000));
        assert!(out.contains(&Directive::ResumePlayback));
        assert!(out.contains(&Directive::ArmTimer(
            TimerPurpose::MenuAutoHide,
            MENU_AUTO_HIDE_DELAY
        )));
        assert_eq!(d.overlay_kind(), OverlayKind::ControlsMenu);
    }

    #[test]
    fn back_abandons_the_staged_seek_but_still_resumes() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Down), &ctx());
        d.handle_menu_action(MenuAction::Scrub, &ctx());
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Right), &ctx());

        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Back), &ctx());
        assert!(!out.iter().any(|d| matches!(d, Directive::CommitSeek(_))));
        assert!(out.contains(&Directive::ResumePlayback));
        assert_eq!(d.overlay_kind(), OverlayKind::ControlsMenu);
    }

    #[test]
    fn hold_entry_does_not_pause_or_reopen_menu() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        let out = d.handle_key(RemoteKeyEvent::repeat(RemoteKey::Right, 3), &ctx());
        assert!(!out.contains(&Directive::PausePlayback));

        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx());
        assert!(matches!(out[0], Directive::CommitSeek(_)));
        assert!(!out.contains(&Directive::ResumePlayback));
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn jump_prefix_with_extensions_does_not_commit() {
        let mut d = dispatcher(jump_features(), &[2, 22, 23]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Up), &ctx());
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(2)), &ctx());
        assert_eq!(out, vec![]);
        assert_eq!(d.overlay_kind(), OverlayKind::ChannelJump);
    }

    #[test]
    fn jump_auto_commits_once_the_prefix_is_unique() {
        let mut d = dispatcher(jump_features(), &[2, 22]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Up), &ctx());
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(2)), &ctx());
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(2)), &ctx());
        assert_eq!(out, vec![Directive::SelectChannel("ch-22".into())]);
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn jump_confirm_commits_an_exact_match() {
        let mut d = dispatcher(jump_features(), &[2, 22, 23]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Up), &ctx());
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(2)), &ctx());
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx());
        assert_eq!(out, vec![Directive::SelectChannel("ch-2".into())]);
    }

    #[test]
    fn jump_rejects_dead_digits_and_preserves_the_buffer() {
        let mut d = dispatcher(jump_features(), &[2, 22]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Up), &ctx());
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(2)), &ctx());

        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(9)), &ctx());
        assert_eq!(out, vec![Directive::Notice("No channel 29".into())]);
        match &d.overlay {
            OverlayState::ChannelJump { digit_buffer } => assert_eq!(digit_buffer, "2"),
            other => panic!("unexpected overlay {other:?}"),
        }

        // The preserved buffer still completes.
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(2)), &ctx());
        assert_eq!(out, vec![Directive::SelectChannel("ch-22".into())]);
    }

    #[test]
    fn digits_in_normal_mode_open_the_jump_overlay() {
        let mut d = dispatcher(jump_features(), &[31, 32]);
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(3)), &ctx());
        assert_eq!(out, vec![]);
        assert_eq!(d.overlay_kind(), OverlayKind::ChannelJump);
    }

    #[test]
    fn directory_filters_and_commits_the_selection() {
        let mut d = dispatcher(SessionFeatures::default(), &[2, 22, 30]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Up), &ctx());
        assert_eq!(d.overlay_kind(), OverlayKind::ChannelDirectory);

        d.handle_key(RemoteKeyEvent::down(RemoteKey::Digit(2)), &ctx());
        match &d.overlay {
            OverlayState::ChannelDirectory { filtered, .. } => {
                // "2" matches 2 and 22 by number and "Channel 2x" names.
                assert!(filtered.contains(&0));
                assert!(filtered.contains(&1));
            }
            other => panic!("unexpected overlay {other:?}"),
        }

        d.handle_key(RemoteKeyEvent::down(RemoteKey::Down), &ctx());
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx());
        assert_eq!(out, vec![Directive::SelectChannel("ch-22".into())]);
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn directory_opens_focused_on_the_current_channel() {
        let mut d = InputDispatcher::new(SessionFeatures::default());
        let mut list = channels(&[2, 22, 30]);
        list[2].is_current = true;
        d.set_channels(list);

        d.handle_key(RemoteKeyEvent::down(RemoteKey::Up), &ctx());
        match &d.overlay {
            OverlayState::ChannelDirectory { selected, .. } => assert_eq!(*selected, 2),
            other => panic!("unexpected overlay {other:?}"),
        }
    }

    #[test]
    fn double_back_exits_only_inside_the_window() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        let t0 = Instant::now();
        let first = DispatchContext { now: t0, ..ctx() };
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Back), &first);
        assert_eq!(
            out,
            vec![Directive::Notice("Press back again to exit".into())]
        );

        // Outside the window the press re-arms instead of exiting.
        let late = DispatchContext {
            now: t0 + Duration::from_millis(2_500),
            ..ctx()
        };
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Back), &late);
        assert_eq!(
            out,
            vec![Directive::Notice("Press back again to exit".into())]
        );

        let inside = DispatchContext {
            now: t0 + Duration::from_millis(3_000),
            ..ctx()
        };
        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Back), &inside);
        assert_eq!(out, vec![Directive::EndSession]);
    }

    #[test]
    fn long_press_short_release_runs_the_short_action() {
        let features = SessionFeatures {
            long_press: true,
            ..SessionFeatures::default()
        };
        let mut d = dispatcher(features, &[]);

        let out = d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx());
        assert_eq!(
            out,
            vec![Directive::ArmTimer(
                TimerPurpose::LongPress(RemoteKey::Center),
                LONG_PRESS_TIMEOUT
            )]
        );

        let out = d.handle_key(RemoteKeyEvent::up(RemoteKey::Center), &ctx());
        assert_eq!(
            out[0],
            Directive::CancelTimer(TimerPurpose::LongPress(RemoteKey::Center))
        );
        assert!(out.contains(&Directive::TogglePlayPause));
    }

    #[test]
    fn long_press_timer_fires_the_long_action_and_release_is_inert() {
        let features = SessionFeatures {
            long_press: true,
            ..SessionFeatures::default()
        };
        let mut d = dispatcher(features, &[]);

        d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx());
        let out = d.handle_timer(TimerPurpose::LongPress(RemoteKey::Center), &ctx());
        assert_eq!(out, vec![Directive::AdvanceStream]);

        let out = d.handle_key(RemoteKeyEvent::up(RemoteKey::Center), &ctx());
        assert_eq!(out, vec![]);
    }

    #[test]
    fn long_press_tracks_each_key_independently() {
        let features = SessionFeatures {
            long_press: true,
            ..SessionFeatures::default()
        };
        let mut d = dispatcher(features, &[]);

        d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx());
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Up), &ctx());

        // Only Up's timer fires; Center release still runs its short action.
        let out = d.handle_timer(TimerPurpose::LongPress(RemoteKey::Up), &ctx());
        assert_eq!(out, vec![Directive::AdvanceChannel]);
        assert_eq!(d.handle_key(RemoteKeyEvent::up(RemoteKey::Up), &ctx()), vec![]);

        let out = d.handle_key(RemoteKeyEvent::up(RemoteKey::Center), &ctx());
        assert!(out.contains(&Directive::TogglePlayPause));
    }

    #[test]
    fn stale_long_press_timer_after_release_is_a_no_op() {
        let features = SessionFeatures {
            long_press: true,
            ..SessionFeatures::default()
        };
        let mut d = dispatcher(features, &[]);

        d.handle_key(RemoteKeyEvent::down(RemoteKey::Right), &ctx());
        d.handle_key(RemoteKeyEvent::up(RemoteKey::Right), &ctx());
        // The wheel already dropped the timer, but a raced expiry must be
        // harmless.
        let out = d.handle_timer(TimerPurpose::LongPress(RemoteKey::Right), &ctx());
        assert_eq!(out, vec![]);
    }

    #[test]
    fn overlay_stays_exclusive_across_a_mixed_sequence() {
        let mut d = dispatcher(SessionFeatures::default(), &[2, 22, 23]);
        let script = [
            RemoteKeyEvent::down(RemoteKey::Down),
            RemoteKeyEvent::down(RemoteKey::Center),
            RemoteKeyEvent::down(RemoteKey::Back),
            RemoteKeyEvent::down(RemoteKey::Up),
            RemoteKeyEvent::down(RemoteKey::Digit(2)),
            RemoteKeyEvent::down(RemoteKey::Back),
            RemoteKeyEvent::repeat(RemoteKey::Left, 4),
            RemoteKeyEvent::down(RemoteKey::Center),
            RemoteKeyEvent::down(RemoteKey::Down),
        ];
        let mut seen = Vec::new();
        for event in script {
            d.handle_key(event, &ctx());
            seen.push(d.overlay_kind());
        }
        assert_eq!(
            seen,
            vec![
                OverlayKind::ControlsMenu,
                OverlayKind::ControlsMenu,
                OverlayKind::Normal,
                OverlayKind::ChannelDirectory,
                OverlayKind::ChannelDirectory,
                OverlayKind::Normal,
                OverlayKind::SeekOverlay,
                OverlayKind::Normal,
                OverlayKind::ControlsMenu,
            ]
        );
    }

    #[test]
    fn subtitle_settings_consume_keys_until_back() {
        let mut d = dispatcher(SessionFeatures::default(), &[]);
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Down), &ctx());
        d.handle_menu_action(MenuAction::Subtitles, &ctx());
        assert_eq!(d.overlay_kind(), OverlayKind::SubtitleSettings);

        assert_eq!(d.handle_key(RemoteKeyEvent::down(RemoteKey::Up), &ctx()), vec![]);
        assert_eq!(
            d.handle_key(RemoteKeyEvent::down(RemoteKey::Center), &ctx()),
            vec![]
        );
        d.handle_key(RemoteKeyEvent::down(RemoteKey::Back), &ctx());
        assert_eq!(d.overlay_kind(), OverlayKind::Normal);
    }

    #[test]
    fn cooldown_allows_only_outside_the_window() {
        let mut cooldown = SwitchCooldown::default();
        let t0 = Instant::now();
        assert!(cooldown.allow(t0));
        cooldown.mark(t0);
        assert!(!cooldown.allow(t0 + Duration::from_millis(500)));
        assert!(!cooldown.allow(t0 + Duration::from_millis(1_999)));
        assert!(cooldown.allow(t0 + Duration::from_millis(2_000)));
    }

    #[test]
    fn mark_current_channel_renumbers_from_the_switch_response() {
        let mut d = dispatcher(SessionFeatures::default(), &[2, 22]);
        d.mark_current_channel(Some("ch-22"), Some(5));
        let entries = &d.channels;
        assert!(!entries[0].is_current);
        assert!(entries[1].is_current);
        assert_eq!(entries[1].number, 5);
    }
}
