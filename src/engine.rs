use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rodio::Sink;
use thiserror::Error;
use tracing::{debug, info, warn};

const AV_TIME_BASE: f64 = 1_000_000.0;
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_POLL: Duration = Duration::from_millis(50);
const MAX_FRAME_WAIT: Duration = Duration::from_millis(500);
const MAX_LATENESS_SECS: f64 = 0.5;
const MAX_QUEUED_AUDIO: usize = 8;
/// Network reads give up after this many microseconds.
const IO_TIMEOUT_MICROS: &str = "10000000";
/// How long teardown waits for the decoder before detaching it.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(750);

#[derive(Clone)]
pub struct FrameData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameData")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Notifications raised by a media engine, drained by the session on every tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ManifestParsed,
    MetadataLoaded { duration: f64 },
    TimeUpdate { position: f64 },
    Playing,
    Paused,
    Ended,
    Error(String),
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("media backend failed to initialise: {0}")]
    Init(String),
    #[error("no stream loaded")]
    NotLoaded,
    #[error("playback refused: {0}")]
    Refused(String),
}

/// An adaptive-streaming pipeline bound to at most one source at a time.
pub trait MediaEngine: Send {
    fn load(&mut self, url: &str) -> Result<(), EngineError>;
    fn play(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64);
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
    fn poll_events(&mut self) -> Vec<EngineEvent>;
    fn take_frame(&mut self) -> Option<FrameData>;
    /// Releases every resource held by the engine. Safe to call twice.
    fn destroy(&mut self);
}

pub trait EngineFactory {
    fn create(&self) -> Box<dyn MediaEngine>;
}

impl EngineFactory for Box<dyn EngineFactory> {
    fn create(&self) -> Box<dyn MediaEngine> {
        (**self).create()
    }
}

enum DecoderCommand {
    Play,
    Pause,
    Seek(f64),
    SetVolume(f32),
    Shutdown,
}

/// A decoder thread plus the handles needed to stop it without blocking
/// the caller for longer than a grace period.
struct DecoderWorker {
    handle: thread::JoinHandle<()>,
    stop: Arc<AtomicBool>,
    done: crossbeam_channel::Receiver<()>,
}

impl DecoderWorker {
    fn spawn<F>(f: F) -> std::io::Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = crossbeam_channel::bounded::<()>(0);
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name(String::from("phimx-decoder"))
            .spawn(move || {
                // Dropped on exit, which disconnects `done`.
                let _done = done_tx;
                f(flag);
            })?;
        Ok(Self { handle, stop, done })
    }

    /// Raises the stop flag and waits up to `grace` for the thread to exit.
    /// A thread still blocked in network I/O is detached; it exits on its own
    /// once the read times out. Returns whether the thread was joined.
    fn shutdown(self, grace: Duration) -> bool {
        self.stop.store(true, Ordering::Relaxed);
        match self.done.recv_timeout(grace) {
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                warn!("decoder still blocked after shutdown, detaching");
                false
            }
            _ => {
                if self.handle.join().is_err() {
                    warn!("decoder thread panicked");
                }
                true
            }
        }
    }
}

pub struct FfmpegEngine {
    target_width: u32,
    target_height: u32,
    volume: f32,
    muted: bool,
    commands: Option<crossbeam_channel::Sender<DecoderCommand>>,
    events: Option<crossbeam_channel::Receiver<EngineEvent>>,
    frames: Option<crossbeam_channel::Receiver<FrameData>>,
    worker: Option<DecoderWorker>,
}

impl FfmpegEngine {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
            volume: 1.0,
            muted: false,
            commands: None,
            events: None,
            frames: None,
            worker: None,
        }
    }

    fn send(&self, command: DecoderCommand) -> Result<(), EngineError> {
        let sender = self.commands.as_ref().ok_or(EngineError::NotLoaded)?;
        sender
            .send(command)
            .map_err(|_| EngineError::Refused(String::from("decoder has stopped")))
    }

    fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

impl MediaEngine for FfmpegEngine {
    fn load(&mut self, url: &str) -> Result<(), EngineError> {
        self.destroy();
        ffmpeg_next::init().map_err(|e| EngineError::Init(e.to_string()))?;

        let (frame_tx, frame_rx) = crossbeam_channel::bounded(4);
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let config = DecoderConfig {
            url: url.to_string(),
            target_width: self.target_width,
            target_height: self.target_height,
            volume: self.effective_volume(),
        };

        let worker = DecoderWorker::spawn(move |stop| {
            run_decoder(config, stop, frame_tx, event_tx, cmd_rx)
        })
        .map_err(|e| EngineError::Init(e.to_string()))?;

        info!(url, "decoder started");
        self.commands = Some(cmd_tx);
        self.events = Some(event_rx);
        self.frames = Some(frame_rx);
        self.worker = Some(worker);
        Ok(())
    }

    fn play(&mut self) -> Result<(), EngineError> {
        self.send(DecoderCommand::Play)
    }

    fn pause(&mut self) {
        let _ = self.send(DecoderCommand::Pause);
    }

    fn seek(&mut self, seconds: f64) {
        let _ = self.send(DecoderCommand::Seek(seconds.max(0.0)));
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0) as f32;
        let _ = self.send(DecoderCommand::SetVolume(self.effective_volume()));
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        let _ = self.send(DecoderCommand::SetVolume(self.effective_volume()));
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        self.events
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default()
    }

    fn take_frame(&mut self) -> Option<FrameData> {
        self.frames.as_ref()?.try_iter().last()
    }

    fn destroy(&mut self) {
        if let Some(sender) = self.commands.take() {
            let _ = sender.send(DecoderCommand::Shutdown);
        }
        // Dropping the receivers first unblocks a decoder stuck on a full channel.
        self.frames = None;
        self.events = None;
        if let Some(worker) = self.worker.take() {
            if worker.shutdown(SHUTDOWN_GRACE) {
                debug!("decoder stopped");
            }
        }
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub struct FfmpegEngineFactory {
    pub target_width: u32,
    pub target_height: u32,
}

impl Default for FfmpegEngineFactory {
    fn default() -> Self {
        Self {
            target_width: 1280,
            target_height: 720,
        }
    }
}

impl EngineFactory for FfmpegEngineFactory {
    fn create(&self) -> Box<dyn MediaEngine> {
        Box::new(FfmpegEngine::new(self.target_width, self.target_height))
    }
}

struct DecoderConfig {
    url: String,
    target_width: u32,
    target_height: u32,
    volume: f32,
}

/// Presentation clock driven by decoded timestamps.
///
/// Positions are media seconds measured from the stream's first timestamp, so
/// streams whose timestamps start above zero still report from 0. The reported
/// position only moves when a frame is presented, and never advances through a
/// network stall.
struct PresentationClock {
    start_time: f64,
    /// Wall instant paired with the media time presented at that instant.
    anchor: Option<(Instant, f64)>,
    position: f64,
    /// Frames before this media time are decoded but not presented.
    skip_until: Option<f64>,
}

impl PresentationClock {
    fn new(start_time: f64) -> Self {
        Self {
            start_time,
            anchor: None,
            position: 0.0,
            skip_until: None,
        }
    }

    fn position(&self) -> f64 {
        self.position
    }

    /// Converts a timestamp in seconds into media time.
    fn media_time(&self, timestamp: f64) -> f64 {
        (timestamp - self.start_time).max(0.0)
    }

    /// Container timestamp, in `AV_TIME_BASE` units, for a media-time seek.
    fn seek_timestamp(&self, target: f64) -> i64 {
        ((target + self.start_time) * AV_TIME_BASE) as i64
    }

    /// True when a frame at `at` is pre-roll left over from the last seek.
    fn skips(&self, at: f64) -> bool {
        self.skip_until.is_some_and(|until| at + 0.001 < until)
    }

    /// How long to wait before presenting the frame at media time `at`. Late
    /// frames and timestamp discontinuities re-anchor the clock instead of
    /// racing or stalling.
    fn delay_for(&mut self, at: f64, now: Instant) -> Duration {
        if let Some((wall, media)) = self.anchor {
            let due = at - media - now.saturating_duration_since(wall).as_secs_f64();
            if (-MAX_LATENESS_SECS..=MAX_FRAME_WAIT.as_secs_f64()).contains(&due) {
                return Duration::from_secs_f64(due.max(0.0));
            }
        }
        self.anchor = Some((now, at));
        Duration::ZERO
    }

    fn presented(&mut self, at: f64) {
        self.position = at;
        self.skip_until = None;
    }

    /// Pauses pacing; the next presented frame starts a new anchor.
    fn suspend(&mut self) {
        self.anchor = None;
    }

    fn jump(&mut self, target: f64) {
        self.anchor = None;
        self.position = target;
        self.skip_until = Some(target);
    }
}

fn stream_start(stream: &ffmpeg_next::format::stream::Stream<'_>) -> Option<f64> {
    let start = stream.start_time();
    (start != i64::MIN && start > 0).then(|| start as f64 * f64::from(stream.time_base()))
}

fn open_input(url: &str) -> Result<ffmpeg_next::format::context::Input, ffmpeg_next::Error> {
    let mut options = ffmpeg_next::Dictionary::new();
    options.set("rw_timeout", IO_TIMEOUT_MICROS);
    options.set("timeout", IO_TIMEOUT_MICROS);
    options.set("reconnect", "1");
    ffmpeg_next::format::input_with_dictionary(&url, options)
}

fn run_decoder(
    config: DecoderConfig,
    stop: Arc<AtomicBool>,
    frame_sender: crossbeam_channel::Sender<FrameData>,
    events: crossbeam_channel::Sender<EngineEvent>,
    commands: crossbeam_channel::Receiver<DecoderCommand>,
) {
    let emit = |event: EngineEvent| {
        let _ = events.send(event);
    };
    let stopped = || stop.load(Ordering::Relaxed);

    let opened = open_input(&config.url);
    if stopped() {
        return;
    }
    let mut ictx = match opened {
        Ok(ctx) => ctx,
        Err(e) => {
            emit(EngineEvent::Error(format!("failed to open stream: {}", e)));
            return;
        }
    };
    emit(EngineEvent::ManifestParsed);

    let video_stream = ictx.streams().best(ffmpeg_next::media::Type::Video);
    let audio_stream = ictx.streams().best(ffmpeg_next::media::Type::Audio);
    let video_index = video_stream.as_ref().map(|s| s.index());
    let audio_index = audio_stream.as_ref().map(|s| s.index());
    let video_time_base = video_stream.as_ref().map(|s| f64::from(s.time_base()));
    let audio_time_base = audio_stream.as_ref().map(|s| f64::from(s.time_base()));
    let start_time = video_stream
        .as_ref()
        .and_then(stream_start)
        .or_else(|| audio_stream.as_ref().and_then(stream_start))
        .unwrap_or(0.0);

    let mut video_decoder = video_stream.and_then(|s| {
        ffmpeg_next::codec::context::Context::from_parameters(s.parameters())
            .ok()?
            .decoder()
            .video()
            .ok()
    });
    let mut audio_decoder = audio_stream.and_then(|s| {
        ffmpeg_next::codec::context::Context::from_parameters(s.parameters())
            .ok()?
            .decoder()
            .audio()
            .ok()
    });

    if video_decoder.is_none() && audio_decoder.is_none() {
        emit(EngineEvent::Error(String::from("stream has no decodable tracks")));
        return;
    }

    let mut scaler = video_decoder.as_ref().and_then(|dec| {
        ffmpeg_next::software::scaling::Context::get(
            dec.format(),
            dec.width(),
            dec.height(),
            ffmpeg_next::format::Pixel::RGBA,
            config.target_width,
            config.target_height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .ok()
    });
    let mut resampler = audio_decoder.as_ref().and_then(|dec| {
        ffmpeg_next::software::resampling::Context::get(
            dec.format(),
            dec.channel_layout(),
            dec.rate(),
            ffmpeg_next::format::Sample::I16(ffmpeg_next::format::sample::Type::Packed),
            ffmpeg_next::ChannelLayout::STEREO,
            44100,
        )
        .ok()
    });
    let paced_by_video = video_decoder.is_some() && scaler.is_some();

    let duration = if ictx.duration() > 0 {
        ictx.duration() as f64 / AV_TIME_BASE
    } else {
        0.0
    };
    emit(EngineEvent::MetadataLoaded { duration });
    debug!(start_time, duration, "stream opened");

    let audio = create_audio_output();
    let sink = audio.as_ref().map(|(_, sink)| sink);
    if let Some(sink) = sink {
        sink.set_volume(config.volume);
        sink.pause();
    } else {
        debug!("no audio output device, playing video only");
    }

    let mut clock = PresentationClock::new(start_time);
    let mut paused = true;
    let mut drained = false;
    let mut last_update = Instant::now();

    loop {
        if stopped() {
            return;
        }
        while let Ok(cmd) = commands.try_recv() {
            match cmd {
                DecoderCommand::Shutdown => return,
                DecoderCommand::Play => {
                    paused = false;
                    if let Some(sink) = sink {
                        sink.play();
                    }
                    emit(EngineEvent::Playing);
                }
                DecoderCommand::Pause => {
                    paused = true;
                    clock.suspend();
                    if let Some(sink) = sink {
                        sink.pause();
                    }
                    emit(EngineEvent::Paused);
                }
                DecoderCommand::Seek(target) => {
                    let ts = clock.seek_timestamp(target);
                    match ictx.seek(ts, ..ts) {
                        Ok(()) => {
                            if let Some(ref mut dec) = video_decoder {
                                dec.flush();
                            }
                            if let Some(ref mut dec) = audio_decoder {
                                dec.flush();
                            }
                            if let Some(sink) = sink {
                                sink.clear();
                                if !paused {
                                    sink.play();
                                }
                            }
                            clock.jump(target);
                            drained = false;
                            emit(EngineEvent::TimeUpdate { position: target });
                        }
                        Err(e) => warn!(target, error = %e, "seek failed"),
                    }
                }
                DecoderCommand::SetVolume(volume) => {
                    if let Some(sink) = sink {
                        sink.set_volume(volume);
                    }
                }
            }
        }

        if paused {
            thread::sleep(IDLE_POLL);
            continue;
        }

        if last_update.elapsed() >= TIME_UPDATE_INTERVAL {
            emit(EngineEvent::TimeUpdate {
                position: clock.position(),
            });
            last_update = Instant::now();
        }

        if drained {
            if sink.map_or(true, |s| s.empty()) {
                emit(EngineEvent::Ended);
                return;
            }
            thread::sleep(IDLE_POLL);
            continue;
        }

        if !paced_by_video && sink.is_some_and(|s| s.len() >= MAX_QUEUED_AUDIO) {
            thread::sleep(Duration::from_millis(10));
            continue;
        }

        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(&mut ictx) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Eof) => {
                drained = true;
                continue;
            }
            Err(ffmpeg_next::Error::Other {
                errno: ffmpeg_next::error::EAGAIN,
            }) => {
                thread::sleep(Duration::from_millis(10));
                continue;
            }
            Err(e) => {
                if !stopped() {
                    emit(EngineEvent::Error(format!("stream read failed: {}", e)));
                }
                return;
            }
        }
        let stream_index = packet.stream();

        if Some(stream_index) == audio_index {
            if let (Some(sink), Some(ref mut decoder), Some(ref mut resamp)) =
                (sink, &mut audio_decoder, &mut resampler)
            {
                if decoder.send_packet(&packet).is_ok() {
                    let mut decoded = ffmpeg_next::frame::Audio::empty();
                    while decoder.receive_frame(&mut decoded).is_ok() {
                        let at = match (audio_time_base, decoded.pts()) {
                            (Some(tb), Some(pts)) => Some(clock.media_time(pts as f64 * tb)),
                            _ => None,
                        };
                        if at.is_some_and(|at| clock.skips(at)) {
                            continue;
                        }
                        let mut resampled = ffmpeg_next::frame::Audio::empty();
                        if resamp.run(&decoded, &mut resampled).is_ok() {
                            let samples: Vec<f32> = resampled
                                .data(0)
                                .chunks_exact(2)
                                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
                                .collect();
                            sink.append(rodio::buffer::SamplesBuffer::new(2, 44100, samples));
                            if !paced_by_video {
                                if let Some(at) = at {
                                    clock.presented(at);
                                }
                            }
                        }
                    }
                }
            }
        }

        if Some(stream_index) == video_index {
            if let (Some(ref mut decoder), Some(ref mut sc)) = (&mut video_decoder, &mut scaler) {
                if decoder.send_packet(&packet).is_ok() {
                    let mut decoded = ffmpeg_next::frame::Video::empty();
                    while decoder.receive_frame(&mut decoded).is_ok() {
                        let at = match (video_time_base, decoded.pts()) {
                            (Some(tb), Some(pts)) => Some(clock.media_time(pts as f64 * tb)),
                            _ => None,
                        };
                        if at.is_some_and(|at| clock.skips(at)) {
                            continue;
                        }
                        let mut rgba = ffmpeg_next::frame::Video::empty();
                        if sc.run(&decoded, &mut rgba).is_err() {
                            continue;
                        }
                        if let Some(at) = at {
                            let wait = clock.delay_for(at, Instant::now());
                            if !wait.is_zero() {
                                thread::sleep(wait);
                            }
                        }
                        let frame = FrameData {
                            width: config.target_width,
                            height: config.target_height,
                            data: rgba.data(0).to_vec(),
                        };
                        if let Err(crossbeam_channel::TrySendError::Disconnected(_)) =
                            frame_sender.try_send(frame)
                        {
                            return;
                        }
                        if let Some(at) = at {
                            clock.presented(at);
                        }
                    }
                }
            }
        }
    }
}

/// The stream is owned by the decoder thread and closed when it exits.
fn create_audio_output() -> Option<(rodio::OutputStream, Sink)> {
    let mut stream = rodio::OutputStreamBuilder::open_default_stream().ok()?;
    stream.log_on_drop(false);
    let sink = Sink::connect_new(stream.mixer());
    Some((stream, sink))
}


#[cfg(test)]
mod tests {
    use super::mock::MockFactory;
    use super::*;

    #[test]
    fn clock_reports_media_time_from_stream_start() {
        let mut clock = PresentationClock::new(1.4);
        assert_eq!(clock.media_time(1.4), 0.0);
        assert!((clock.media_time(11.4) - 10.0).abs() < 1e-9);
        assert_eq!(clock.seek_timestamp(10.0), 11_400_000);
        assert_eq!(clock.position(), 0.0);
        clock.presented(clock.media_time(6.4));
        assert!((clock.position() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn clock_position_holds_while_no_frame_is_presented() {
        let mut clock = PresentationClock::new(0.0);
        let start = Instant::now();
        clock.delay_for(2.0, start);
        clock.presented(2.0);
        // A stall: wall time moves on but nothing new is presented.
        let later = start + Duration::from_secs(30);
        assert_eq!(clock.position(), 2.0);
        // The first frame after the stall re-anchors instead of racing.
        assert_eq!(clock.delay_for(2.04, later), Duration::ZERO);
        let wait = clock.delay_for(2.08, later);
        assert!((wait.as_secs_f64() - 0.04).abs() < 1e-6);
    }

    #[test]
    fn first_frame_is_presented_without_waiting() {
        let mut clock = PresentationClock::new(10.0);
        let at = clock.media_time(10.0);
        assert_eq!(clock.delay_for(at, Instant::now()), Duration::ZERO);
    }

    #[test]
    fn seek_skips_pre_roll_until_a_frame_lands() {
        let mut clock = PresentationClock::new(0.0);
        clock.jump(30.0);
        assert_eq!(clock.position(), 30.0);
        assert!(clock.skips(28.0));
        assert!(!clock.skips(30.0));
        clock.presented(30.0);
        assert!(!clock.skips(1.0));
    }

    #[test]
    fn shutdown_detaches_a_worker_that_never_yields() {
        let worker = DecoderWorker::spawn(|_stop| {
            thread::sleep(Duration::from_secs(5));
        })
        .unwrap();
        let started = Instant::now();
        assert!(!worker.shutdown(Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn shutdown_joins_a_worker_that_honours_the_stop_flag() {
        let worker = DecoderWorker::spawn(|stop| {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        assert!(worker.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn destroy_returns_while_stream_is_still_opening() {
        let mut engine = FfmpegEngine::new(64, 36);
        engine.load("http://10.255.255.1/live/index.m3u8").unwrap();
        let started = Instant::now();
        engine.destroy();
        assert!(started.elapsed() < SHUTDOWN_GRACE + Duration::from_millis(500));
        assert!(matches!(engine.play(), Err(EngineError::NotLoaded)));
    }

    #[test]
    fn mock_destroy_counts_once() {
        let factory = MockFactory::new();
        let mut engine = factory.create();
        engine.destroy();
        engine.destroy();
        assert_eq!(factory.constructed(), 1);
        assert_eq!(factory.destroyed(), 1);
        assert_eq!(factory.live(), 0);
    }

    #[test]
    fn unloaded_ffmpeg_engine_refuses_play() {
        let mut engine = FfmpegEngine::new(320, 180);
        assert!(matches!(engine.play(), Err(EngineError::NotLoaded)));
        assert!(engine.poll_events().is_empty());
        assert!(engine.take_frame().is_none());
        engine.destroy();
    }
}
