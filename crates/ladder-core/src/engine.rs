//! Media engine boundary
//!
//! The decode/render engine is external. A session drives it through
//! [`MediaEngine`] and hears back through an [`EngineEvent`] channel that the
//! session drains in its own event loop.

use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Event reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Playing flag flipped
    PlayingChanged(bool),
    /// Position advanced
    Progress { position: Duration, duration: Duration },
    /// Reached the end of the media
    Completed,
    /// Engine failure
    Error(String),
}

pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Create the channel an engine reports on
pub fn event_channel() -> (EngineEventSender, EngineEventReceiver) {
    mpsc::unbounded_channel()
}

/// Commands accepted by a media engine
#[async_trait]
pub trait MediaEngine: Send {
    /// Open `uri`, optionally seeked to `start`, playing or not
    async fn open(&mut self, uri: &str, start: Option<Duration>, play: bool) -> Result<()>;

    /// Attach a secondary audio track to the open media
    async fn attach_audio_track(&mut self, uri: &str) -> Result<()>;

    async fn set_rate(&mut self, rate: f64) -> Result<()>;

    /// Currently effective playback rate
    fn rate(&self) -> f64;

    async fn play(&mut self) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    async fn seek(&mut self, position: Duration) -> Result<()>;

    fn position(&self) -> Duration;

    fn is_playing(&self) -> bool;

    /// Close the media and free engine resources
    async fn release(&mut self) -> Result<()>;
}

#[derive(Debug)]
struct Clock {
    base: Duration,
    resumed_at: Option<Instant>,
    rate: f64,
    duration: Duration,
}

impl Clock {
    fn position(&self) -> Duration {
        let running = self
            .resumed_at
            .map(|t| t.elapsed().mul_f64(self.rate))
            .unwrap_or_default();
        (self.base + running).min(self.duration)
    }

    fn freeze(&mut self) {
        self.base = self.position();
        self.resumed_at = None;
    }
}

/// Engine without any output.
///
/// Keeps a wall clock for the open media and reports progress on a timer,
/// which is enough to drive a session from a terminal.
pub struct HeadlessEngine {
    events: Option<EngineEventSender>,
    clock: Arc<Mutex<Clock>>,
    video_uri: Option<String>,
    audio_uri: Option<String>,
    tick: Duration,
    ticker: Option<JoinHandle<()>>,
}

impl HeadlessEngine {
    /// Engine whose media lasts `duration`
    pub fn new(duration: Duration) -> Self {
        Self {
            events: None,
            clock: Arc::new(Mutex::new(Clock {
                base: Duration::ZERO,
                resumed_at: None,
                rate: 1.0,
                duration,
            })),
            video_uri: None,
            audio_uri: None,
            tick: Duration::from_millis(250),
            ticker: None,
        }
    }

    pub fn with_events(mut self, events: EngineEventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn video_uri(&self) -> Option<&str> {
        self.video_uri.as_deref()
    }

    pub fn audio_uri(&self) -> Option<&str> {
        self.audio_uri.as_deref()
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn spawn_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        let Some(events) = self.events.clone() else {
            return;
        };
        let clock = Arc::clone(&self.clock);
        let tick = self.tick;

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                let (position, duration, finished) = {
                    let mut clock = clock.lock();
                    let position = clock.position();
                    let finished = clock.resumed_at.is_some() && position >= clock.duration;
                    if finished {
                        clock.freeze();
                    }
                    (position, clock.duration, finished)
                };
                if events.send(EngineEvent::Progress { position, duration }).is_err() {
                    break;
                }
                if finished {
                    let _ = events.send(EngineEvent::PlayingChanged(false));
                    let _ = events.send(EngineEvent::Completed);
                }
            }
        }));
    }

    fn ensure_open(&self) -> Result<()> {
        if self.video_uri.is_none() {
            return Err(Error::Engine("no media open".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for HeadlessEngine {
    async fn open(&mut self, uri: &str, start: Option<Duration>, play: bool) -> Result<()> {
        if uri.is_empty() {
            return Err(Error::EngineOpen {
                uri: uri.to_string(),
                reason: "empty uri".into(),
            });
        }
        info!(uri, start = ?start, play, "Headless engine opening media");
        {
            let mut clock = self.clock.lock();
            clock.base = start.unwrap_or_default().min(clock.duration);
            clock.resumed_at = play.then(Instant::now);
        }
        self.video_uri = Some(uri.to_string());
        self.audio_uri = None;
        self.spawn_ticker();
        if play {
            self.emit(EngineEvent::PlayingChanged(true));
        }
        Ok(())
    }

    async fn attach_audio_track(&mut self, uri: &str) -> Result<()> {
        self.ensure_open()?;
        debug!(uri, "Headless engine attaching audio");
        self.audio_uri = Some(uri.to_string());
        Ok(())
    }

    async fn set_rate(&mut self, rate: f64) -> Result<()> {
        if rate <= 0.0 || !rate.is_finite() {
            return Err(Error::Engine(format!("unsupported rate {}", rate)));
        }
        let mut clock = self.clock.lock();
        let running = clock.resumed_at.is_some();
        clock.freeze();
        clock.rate = rate;
        if running {
            clock.resumed_at = Some(Instant::now());
        }
        Ok(())
    }

    fn rate(&self) -> f64 {
        self.clock.lock().rate
    }

    async fn play(&mut self) -> Result<()> {
        self.ensure_open()?;
        let started = {
            let mut clock = self.clock.lock();
            if clock.resumed_at.is_none() {
                if clock.position() >= clock.duration {
                    clock.base = Duration::ZERO;
                }
                clock.resumed_at = Some(Instant::now());
                true
            } else {
                false
            }
        };
        if started {
            self.emit(EngineEvent::PlayingChanged(true));
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.ensure_open()?;
        let paused = {
            let mut clock = self.clock.lock();
            let running = clock.resumed_at.is_some();
            clock.freeze();
            running
        };
        if paused {
            self.emit(EngineEvent::PlayingChanged(false));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.pause().await
    }

    async fn seek(&mut self, position: Duration) -> Result<()> {
        self.ensure_open()?;
        let mut clock = self.clock.lock();
        let running = clock.resumed_at.is_some();
        clock.base = position.min(clock.duration);
        clock.resumed_at = running.then(Instant::now);
        Ok(())
    }

    fn position(&self) -> Duration {
        self.clock.lock().position()
    }

    fn is_playing(&self) -> bool {
        self.clock.lock().resumed_at.is_some()
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.clock.lock().freeze();
        self.video_uri = None;
        self.audio_uri = None;
        debug!("Headless engine released");
        Ok(())
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
