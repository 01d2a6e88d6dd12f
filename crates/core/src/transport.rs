//! Audio/video transport state machine
//!
//! ```text
//! idle -> loading -> ready <-> playing <-> paused -> ended
//!                      \_________ any non-idle ________/ -> error
//! ```
//!
//! The controller tracks what the media element should be doing; it does not
//! decode anything. Errors are terminal for the resource instance and only a
//! fresh resolution recovers.

use docket_preview_scheduler::IdleTimer;
use std::time::{Duration, Instant};

/// Allowed playback rates, ascending
pub const PLAYBACK_RATES: [f32; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackPhase::Idle => "idle",
            PlaybackPhase::Loading => "loading",
            PlaybackPhase::Ready => "ready",
            PlaybackPhase::Playing => "playing",
            PlaybackPhase::Paused => "paused",
            PlaybackPhase::Ended => "ended",
            PlaybackPhase::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("cannot {action} while {}", .phase.as_str())]
    InvalidState { action: &'static str, phase: PlaybackPhase },

    #[error("unsupported playback rate {0}")]
    UnsupportedRate(f32),

    #[error("seek target {0} is not a finite time")]
    InvalidSeekTarget(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    /// Seconds from the start
    pub current_time: f64,
    /// Seconds; `None` until metadata reports a finite duration
    pub duration: Option<f64>,
    /// Stored level in `[0, 1]`, untouched by muting
    pub volume: f32,
    pub muted: bool,
    pub rate: f32,
    pub playing: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: None,
            volume: 1.0,
            muted: false,
            rate: 1.0,
            playing: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportController {
    kind: MediaKind,
    phase: PlaybackPhase,
    state: PlaybackState,
    looping: bool,
    fullscreen: bool,
    picture_in_picture: bool,
    failure: Option<String>,
}

impl TransportController {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            phase: PlaybackPhase::Idle,
            state: PlaybackState::default(),
            looping: false,
            fullscreen: false,
            picture_in_picture: false,
            failure: None,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Cause recorded by [`Self::fail`]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_picture_in_picture(&self) -> bool {
        self.picture_in_picture
    }

    fn invalid(&self, action: &'static str) -> TransportError {
        TransportError::InvalidState {
            action,
            phase: self.phase,
        }
    }

    fn enter(&mut self, phase: PlaybackPhase) {
        if self.phase != phase {
            tracing::debug!(from = self.phase.as_str(), to = phase.as_str(), "transport transition");
        }
        self.phase = phase;
        self.state.playing = phase == PlaybackPhase::Playing;
    }

    /// Resource handed to the media element
    pub fn begin_loading(&mut self) -> Result<(), TransportError> {
        match self.phase {
            PlaybackPhase::Idle | PlaybackPhase::Loading => {
                self.enter(PlaybackPhase::Loading);
                Ok(())
            }
            _ => Err(self.invalid("load")),
        }
    }

    /// Metadata arrived; a non-finite or negative duration stays unknown
    pub fn on_metadata(&mut self, duration: Option<f64>) -> Result<(), TransportError> {
        if matches!(self.phase, PlaybackPhase::Idle | PlaybackPhase::Error) {
            return Err(self.invalid("accept metadata"));
        }

        self.state.duration = duration.filter(|d| d.is_finite() && *d >= 0.0);
        if let Some(duration) = self.state.duration {
            self.state.current_time = self.state.current_time.min(duration);
        }
        if self.phase == PlaybackPhase::Loading {
            self.enter(PlaybackPhase::Ready);
        }
        Ok(())
    }

    /// No-op while playing; restarts from 0 after the end
    pub fn play(&mut self) -> Result<(), TransportError> {
        match self.phase {
            PlaybackPhase::Playing => Ok(()),
            PlaybackPhase::Ready | PlaybackPhase::Paused => {
                self.enter(PlaybackPhase::Playing);
                Ok(())
            }
            PlaybackPhase::Ended => {
                self.state.current_time = 0.0;
                self.enter(PlaybackPhase::Playing);
                Ok(())
            }
            _ => Err(self.invalid("play")),
        }
    }

    pub fn pause(&mut self) -> Result<(), TransportError> {
        match self.phase {
            PlaybackPhase::Playing => {
                self.enter(PlaybackPhase::Paused);
                Ok(())
            }
            PlaybackPhase::Ready | PlaybackPhase::Paused | PlaybackPhase::Ended => Ok(()),
            _ => Err(self.invalid("pause")),
        }
    }

    pub fn toggle_play(&mut self) -> Result<(), TransportError> {
        if self.phase == PlaybackPhase::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Seek to `time`, clamped to `[0, duration]` (`[0, inf)` when unknown)
    ///
    /// Non-finite targets are rejected. Seeking back from the end leaves the
    /// transport paused at the new time.
    pub fn seek(&mut self, time: f64) -> Result<f64, TransportError> {
        if matches!(self.phase, PlaybackPhase::Idle | PlaybackPhase::Error) {
            return Err(self.invalid("seek"));
        }
        if !time.is_finite() {
            return Err(TransportError::InvalidSeekTarget(time));
        }

        let upper = self.state.duration.unwrap_or(f64::INFINITY);
        let target = time.clamp(0.0, upper);
        self.state.current_time = target;

        if self.phase == PlaybackPhase::Ended && target < upper {
            self.enter(PlaybackPhase::Paused);
        }
        Ok(target)
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<(), TransportError> {
        let allowed = PLAYBACK_RATES
            .iter()
            .copied()
            .find(|candidate| (candidate - rate).abs() < f32::EPSILON)
            .ok_or(TransportError::UnsupportedRate(rate))?;
        self.state.rate = allowed;
        Ok(())
    }

    /// Move one entry along [`PLAYBACK_RATES`]; stays put at either end
    pub fn step_rate(&mut self, faster: bool) -> f32 {
        let current = self.state.rate;
        let next = if faster {
            PLAYBACK_RATES.iter().copied().find(|rate| *rate > current)
        } else {
            PLAYBACK_RATES.iter().rev().copied().find(|rate| *rate < current)
        };
        if let Some(rate) = next {
            self.state.rate = rate;
        }
        self.state.rate
    }

    /// Store a new level in `[0, 1]`; the mute flag is left alone
    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_finite() {
            self.state.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn mute(&mut self) {
        self.state.muted = true;
    }

    pub fn unmute(&mut self) {
        self.state.muted = false;
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.state.muted = !self.state.muted;
        self.state.muted
    }

    /// Level the output should use
    pub fn effective_volume(&self) -> f32 {
        if self.state.muted {
            0.0
        } else {
            self.state.volume
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Position reported by the media element
    pub fn on_time_update(&mut self, time: f64) {
        if matches!(self.phase, PlaybackPhase::Idle | PlaybackPhase::Error) || !time.is_finite() {
            return;
        }
        let upper = self.state.duration.unwrap_or(f64::INFINITY);
        self.state.current_time = time.clamp(0.0, upper);
    }

    /// Media element reached the end; looping restarts from 0
    pub fn on_ended(&mut self) {
        if !matches!(self.phase, PlaybackPhase::Playing | PlaybackPhase::Paused) {
            return;
        }
        if self.looping {
            self.state.current_time = 0.0;
            return;
        }
        if let Some(duration) = self.state.duration {
            self.state.current_time = duration;
        }
        self.enter(PlaybackPhase::Ended);
    }

    /// Decode or network failure; terminal for this instance
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TransportError> {
        match self.phase {
            PlaybackPhase::Idle => Err(self.invalid("fail")),
            PlaybackPhase::Error => Ok(()),
            _ => {
                let reason = reason.into();
                tracing::error!(%reason, "playback failed");
                self.failure = Some(reason);
                self.fullscreen = false;
                self.picture_in_picture = false;
                self.enter(PlaybackPhase::Error);
                Ok(())
            }
        }
    }

    pub fn set_fullscreen(&mut self, on: bool) -> Result<(), TransportError> {
        self.require_video("toggle fullscreen")?;
        self.fullscreen = on;
        Ok(())
    }

    pub fn set_picture_in_picture(&mut self, on: bool) -> Result<(), TransportError> {
        self.require_video("toggle picture-in-picture")?;
        self.picture_in_picture = on;
        Ok(())
    }

    fn require_video(&self, action: &'static str) -> Result<(), TransportError> {
        if self.kind != MediaKind::Video || self.phase == PlaybackPhase::Error {
            return Err(self.invalid(action));
        }
        Ok(())
    }
}

/// Hides video controls after pointer inactivity while playing
///
/// Pure timer side effect; it never changes the transport phase.
#[derive(Debug, Clone)]
pub struct ControlsAutoHide {
    timer: IdleTimer,
    visible: bool,
}

impl ControlsAutoHide {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timer: IdleTimer::new(timeout),
            visible: true,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Pointer moved over the player
    pub fn on_activity(&mut self, now: Instant, playing: bool) {
        self.visible = true;
        if playing {
            self.timer.reset(now);
        } else {
            self.timer.clear();
        }
    }

    /// Playback started or stopped
    pub fn on_playing_changed(&mut self, now: Instant, playing: bool) {
        self.on_activity(now, playing);
    }

    /// Advance to `now`; returns whether controls are visible
    pub fn tick(&mut self, now: Instant, playing: bool) -> bool {
        if !playing {
            self.timer.clear();
            self.visible = true;
        } else if self.timer.has_fired(now) {
            self.timer.clear();
            self.visible = false;
        }
        self.visible
    }

    /// Disarm on teardown
    pub fn clear(&mut self) {
        self.timer.clear();
        self.visible = true;
    }
}
