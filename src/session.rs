use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, EngineFactory, FrameData, MediaEngine};
use crate::history::HistoryEntry;

pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(5);
pub const SEEK_STEP_SECONDS: f64 = 10.0;

/// The concrete episode a session plays, with enough context to record it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackTarget {
    pub title_id: String,
    pub display_name: String,
    pub poster_ref: Option<String>,
    pub server_label: String,
    pub episode_label: String,
    pub stream_url: String,
}

/// A position to seek to once the stream's metadata is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub title_id: String,
    pub episode_label: String,
    pub position: f64,
}

impl ResumePoint {
    pub fn from_entry(entry: &HistoryEntry) -> Self {
        Self {
            title_id: entry.title_id.clone(),
            episode_label: entry.episode_label.clone(),
            position: entry.position_seconds,
        }
    }

    fn applies_to(&self, target: &PlaybackTarget) -> bool {
        self.title_id == target.title_id && self.episode_label == target.episode_label
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Attaching,
    Playing,
    Ended,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub target: PlaybackTarget,
    pub current_time: f64,
}

/// What happened during one tick, for the page to act on.
#[derive(Debug, Default)]
pub struct SessionUpdate {
    pub checkpoint: Option<Checkpoint>,
    pub frame: Option<FrameData>,
    pub ended: bool,
    pub failed: Option<String>,
}

/// Repeating deadline owned by one session.
#[derive(Debug, Clone)]
pub struct CheckpointTimer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl CheckpointTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Starts the timer unless it is already running.
    pub fn arm(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now + self.interval);
        }
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    /// True once per elapsed interval.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

/// Rewrites a manifest URL through the stream proxy, if one is configured.
pub fn stream_source(url: &str, proxy_base: Option<&str>) -> String {
    match proxy_base.map(str::trim).filter(|p| !p.is_empty()) {
        Some(base) => format!(
            "{}?url={}",
            base.trim_end_matches('?'),
            urlencoding::encode(url)
        ),
        None => url.to_string(),
    }
}

/// Owns the media engine for one playing target.
///
/// At most one engine is alive at any time: attaching a new target destroys
/// the current engine and cancels its checkpoint timer before the next engine
/// is created.
pub struct StreamingSession<F: EngineFactory> {
    factory: F,
    proxy_base: Option<String>,
    autoplay: bool,
    engine: Option<Box<dyn MediaEngine>>,
    target: Option<PlaybackTarget>,
    resume: Option<ResumePoint>,
    resume_applied: bool,
    state: SessionState,
    paused: bool,
    position: f64,
    duration: f64,
    volume: f64,
    muted: bool,
    timer: CheckpointTimer,
}

impl<F: EngineFactory> StreamingSession<F> {
    pub fn new(factory: F, checkpoint_interval: Duration) -> Self {
        Self {
            factory,
            proxy_base: None,
            autoplay: true,
            engine: None,
            target: None,
            resume: None,
            resume_applied: false,
            state: SessionState::Idle,
            paused: false,
            position: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            timer: CheckpointTimer::new(checkpoint_interval),
        }
    }

    pub fn with_proxy(mut self, proxy_base: Option<String>) -> Self {
        self.proxy_base = proxy_base;
        self
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn target(&self) -> Option<&PlaybackTarget> {
        self.target.as_ref()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_attached_to(&self, target: &PlaybackTarget) -> bool {
        self.engine.is_some() && self.target.as_ref() == Some(target)
    }

    /// Binds the session to `target`, tearing down whatever was playing.
    ///
    /// Returns the final checkpoint of the previous target, if it was playing.
    /// Attaching the target that is already live does nothing.
    pub fn attach(
        &mut self,
        target: PlaybackTarget,
        resume: Option<ResumePoint>,
    ) -> Option<Checkpoint> {
        if self.is_attached_to(&target) {
            return None;
        }
        let last = self.detach();

        let mut engine = self.factory.create();
        engine.set_volume(self.volume);
        engine.set_muted(self.muted);
        let source = stream_source(&target.stream_url, self.proxy_base.as_deref());
        info!(
            title = %target.title_id,
            episode = %target.episode_label,
            "attaching stream"
        );

        match engine.load(&source) {
            Ok(()) => {
                self.engine = Some(engine);
                self.state = SessionState::Attaching;
            }
            Err(e) => {
                warn!(error = %e, "failed to load stream");
                engine.destroy();
                self.state = SessionState::Failed(e.to_string());
            }
        }
        self.resume = resume.filter(|r| r.applies_to(&target));
        self.target = Some(target);
        last
    }

    /// Releases the engine and cancels the checkpoint timer.
    ///
    /// Returns a last checkpoint when the session was playing.
    pub fn detach(&mut self) -> Option<Checkpoint> {
        let last = match (&self.state, &self.target) {
            (SessionState::Playing, Some(target)) if self.position > 0.0 => Some(Checkpoint {
                target: target.clone(),
                current_time: self.position,
            }),
            _ => None,
        };
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
            debug!("stream detached");
        }
        self.timer.cancel();
        self.target = None;
        self.resume = None;
        self.resume_applied = false;
        self.state = SessionState::Idle;
        self.paused = false;
        self.position = 0.0;
        self.duration = 0.0;
        last
    }

    /// Drains engine events and fires the checkpoint timer.
    pub fn tick(&mut self, now: Instant) -> SessionUpdate {
        let mut update = SessionUpdate::default();
        let Some(engine) = self.engine.as_mut() else {
            return update;
        };
        let events = engine.poll_events();
        update.frame = engine.take_frame();

        for event in events {
            self.handle_event(event, now, &mut update);
        }

        if self.state == SessionState::Playing && !self.paused && self.timer.poll(now) {
            if let Some(target) = &self.target {
                update.checkpoint = Some(Checkpoint {
                    target: target.clone(),
                    current_time: self.position,
                });
            }
        }
        update
    }

    fn handle_event(&mut self, event: EngineEvent, now: Instant, update: &mut SessionUpdate) {
        match event {
            EngineEvent::ManifestParsed => {
                if self.autoplay {
                    if let Some(engine) = self.engine.as_mut() {
                        if let Err(e) = engine.play() {
                            debug!(error = %e, "autoplay refused");
                        }
                    }
                }
            }
            EngineEvent::MetadataLoaded { duration } => {
                self.duration = duration;
                self.apply_resume();
            }
            EngineEvent::TimeUpdate { position } => {
                self.position = position;
            }
            EngineEvent::Playing => {
                self.state = SessionState::Playing;
                self.paused = false;
                self.timer.arm(now);
            }
            EngineEvent::Paused => {
                self.paused = true;
                self.timer.cancel();
            }
            EngineEvent::Ended => {
                info!("stream ended");
                self.state = SessionState::Ended;
                self.timer.cancel();
                update.ended = true;
            }
            EngineEvent::Error(reason) => {
                warn!(%reason, "playback failed");
                self.timer.cancel();
                if let Some(mut engine) = self.engine.take() {
                    engine.destroy();
                }
                self.state = SessionState::Failed(reason.clone());
                update.failed = Some(reason);
            }
        }
    }

    fn apply_resume(&mut self) {
        if self.resume_applied {
            return;
        }
        self.resume_applied = true;
        let Some(resume) = self.resume.take() else {
            return;
        };
        let matches = self.target.as_ref().is_some_and(|t| resume.applies_to(t));
        if matches && resume.position > 0.0 {
            if let Some(engine) = self.engine.as_mut() {
                debug!(position = resume.position, "resuming");
                engine.seek(resume.position);
                self.position = resume.position;
            }
        }
    }

    pub fn toggle_pause(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if self.paused || self.state != SessionState::Playing {
            if let Err(e) = engine.play() {
                warn!(error = %e, "failed to resume playback");
            }
        } else {
            engine.pause();
            self.paused = true;
            self.timer.cancel();
        }
    }

    pub fn seek(&mut self, seconds: f64) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let upper = if self.duration > 0.0 {
            self.duration
        } else {
            f64::MAX
        };
        let target = seconds.clamp(0.0, upper);
        engine.seek(target);
        self.position = target;
    }

    pub fn seek_relative(&mut self, delta: f64) {
        self.seek(self.position + delta);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_volume(self.volume);
        }
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        if let Some(engine) = self.engine.as_mut() {
            engine.set_muted(self.muted);
        }
    }
}

impl<F: EngineFactory> Drop for StreamingSession<F> {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }
}
