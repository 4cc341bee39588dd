//! Test doubles shared by the session tests

#![allow(dead_code)]

use async_trait::async_trait;
use ladder_core::{
    catalog::content_id_from_url, event_channel, BandwidthProbe, Catalog, CatalogClient, ContentId,
    EngineEvent, EngineEventReceiver, EngineEventSender, Error, MediaEngine, Result, SessionConfig,
    StreamVariant,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Open {
        uri: String,
        start: Option<Duration>,
        play: bool,
    },
    AttachAudio(String),
    SetRate(f64),
    Play,
    Pause,
    Stop,
    Seek(Duration),
    Release,
}

struct EngineState {
    calls: Vec<EngineCall>,
    position: Duration,
    playing: bool,
    rate: f64,
    fail_open: HashSet<String>,
    fail_attach: bool,
    error_after_open: Option<String>,
}

/// Engine that records every command it receives
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
    events: EngineEventSender,
}

/// Test-side view of a [`MockEngine`]
#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<Mutex<EngineState>>,
    events: EngineEventSender,
}

impl MockEngine {
    pub fn new() -> (Self, EngineHandle, EngineEventReceiver) {
        let (tx, rx) = event_channel();
        let state = Arc::new(Mutex::new(EngineState {
            calls: Vec::new(),
            position: Duration::ZERO,
            playing: false,
            rate: 1.0,
            fail_open: HashSet::new(),
            fail_attach: false,
            error_after_open: None,
        }));
        let engine = Self {
            state: Arc::clone(&state),
            events: tx.clone(),
        };
        (engine, EngineHandle { state, events: tx }, rx)
    }

    fn record(&self, call: EngineCall) {
        self.state.lock().calls.push(call);
    }
}

impl EngineHandle {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn opened_uris(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Open { uri, .. } => Some(uri),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn set_position(&self, position: Duration) {
        self.state.lock().position = position;
    }

    pub fn fail_open_on(&self, uri: &str) {
        self.state.lock().fail_open.insert(uri.to_string());
    }

    pub fn fail_attach(&self) {
        self.state.lock().fail_attach = true;
    }

    /// Accept the next opens but report `message` as an engine error
    pub fn report_error_after_open(&self, message: &str) {
        self.state.lock().error_after_open = Some(message.to_string());
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn open(&mut self, uri: &str, start: Option<Duration>, play: bool) -> Result<()> {
        self.record(EngineCall::Open {
            uri: uri.to_string(),
            start,
            play,
        });
        let mut state = self.state.lock();
        if state.fail_open.contains(uri) {
            return Err(Error::EngineOpen {
                uri: uri.to_string(),
                reason: "refused by mock".into(),
            });
        }
        state.position = start.unwrap_or_default();
        state.playing = play;
        if let Some(message) = state.error_after_open.clone() {
            let _ = self.events.send(EngineEvent::Error(message));
        }
        Ok(())
    }

    async fn attach_audio_track(&mut self, uri: &str) -> Result<()> {
        self.record(EngineCall::AttachAudio(uri.to_string()));
        if self.state.lock().fail_attach {
            return Err(Error::Engine("audio attach refused by mock".into()));
        }
        Ok(())
    }

    async fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.record(EngineCall::SetRate(rate));
        self.state.lock().rate = rate;
        Ok(())
    }

    fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    async fn play(&mut self) -> Result<()> {
        self.record(EngineCall::Play);
        self.state.lock().playing = true;
        let _ = self.events.send(EngineEvent::PlayingChanged(true));
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.record(EngineCall::Pause);
        self.state.lock().playing = false;
        let _ = self.events.send(EngineEvent::PlayingChanged(false));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.record(EngineCall::Stop);
        self.state.lock().playing = false;
        let _ = self.events.send(EngineEvent::PlayingChanged(false));
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> Result<()> {
        self.record(EngineCall::Seek(position));
        self.state.lock().position = position;
        Ok(())
    }

    fn position(&self) -> Duration {
        self.state.lock().position
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    async fn release(&mut self) -> Result<()> {
        self.record(EngineCall::Release);
        self.state.lock().playing = false;
        Ok(())
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// In-memory catalog source counting fetches
#[derive(Default)]
pub struct MockCatalogClient {
    catalogs: HashMap<ContentId, Vec<StreamVariant>>,
    fetches: AtomicUsize,
}

impl MockCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, id: &str, variants: Vec<StreamVariant>) -> Self {
        self.catalogs.insert(ContentId::new(id), variants);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogClient for MockCatalogClient {
    async fn resolve(&self, url: &str) -> Result<ContentId> {
        content_id_from_url(url)
    }

    async fn fetch_catalog(&self, id: &ContentId) -> Result<Catalog> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let variants = self
            .catalogs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let catalog = Catalog::new(id.clone(), variants);
        catalog.ensure_playable()?;
        Ok(catalog)
    }
}

// =============================================================================
// Bandwidth
// =============================================================================

/// Probe answering after a delay
pub struct SlowProbe {
    pub delay: Duration,
    pub estimate: Option<u64>,
}

#[async_trait]
impl BandwidthProbe for SlowProbe {
    async fn estimate(&self, _sample_uri: &str) -> Option<u64> {
        tokio::time::sleep(self.delay).await;
        self.estimate
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn ladder() -> Vec<StreamVariant> {
    vec![
        StreamVariant::video(1_000_000, 480, "https://cdn.test/v480.mp4"),
        StreamVariant::video(2_500_000, 720, "https://cdn.test/v720.mp4"),
        StreamVariant::video(5_000_000, 1080, "https://cdn.test/v1080.mp4"),
        StreamVariant::audio(64_000, "https://cdn.test/a-orig.m4a"),
        StreamVariant::audio(128_000, "https://cdn.test/a-hi.m4a"),
    ]
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        audio_attach_delay_ms: 0,
        ..Default::default()
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
