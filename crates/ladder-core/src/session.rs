//! Playback Session - orchestrator for one player
//!
//! Coordinates:
//! - Catalog resolution through the shared manifest cache
//! - Variant selection and quality changes at the current position
//! - Background bandwidth refinement
//! - Status transitions and progress notifications
//!
//! All state lives in a single actor task. API calls and engine events land
//! in the same loop, so state is only ever mutated from one place. Calls are
//! applied in the order they were made; a call issued while another is still
//! loading waits for it instead of being dropped.

use crate::{
    cache::ManifestCache,
    catalog::CatalogClient,
    engine::{EngineEvent, EngineEventReceiver, MediaEngine},
    probe::{BandwidthProbe, HttpBandwidthProbe},
    selector,
    types::*,
    Error, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Callback invoked on every status change
pub type StatusCallback = Box<dyn Fn(PlaybackStatus) + Send + Sync>;
/// Callback invoked on every progress report
pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

type Reply = oneshot::Sender<()>;

enum Command {
    Initialize {
        url: String,
        options: InitializeOptions,
        reply: Reply,
    },
    SetQuality {
        height: u32,
        reply: Reply,
    },
    Play {
        reply: Reply,
    },
    Pause {
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    SetSpeed {
        rate: f64,
        reply: Reply,
    },
    Dispose {
        reply: Reply,
    },
    /// Result of a background bandwidth probe started at `epoch`
    ApplyBandwidthChoice {
        epoch: u64,
        height: u32,
    },
}

/// Fields readers may look at while the actor is busy
#[derive(Debug, Clone)]
struct Snapshot {
    catalog: Option<Arc<Catalog>>,
    content_id: Option<ContentId>,
    quality_height: u32,
    playback_rate: f64,
    media_open: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            catalog: None,
            content_id: None,
            quality_height: QualityOption::AUTO_HEIGHT,
            playback_rate: 1.0,
            media_open: false,
        }
    }
}

/// Builder for [`PlaybackSession`]
pub struct SessionBuilder {
    config: SessionConfig,
    cache: Option<Arc<ManifestCache>>,
    catalog_client: Option<Arc<dyn CatalogClient>>,
    probe: Option<Arc<dyn BandwidthProbe>>,
    engine: Option<(Box<dyn MediaEngine>, Option<EngineEventReceiver>)>,
    on_status: Option<StatusCallback>,
    on_progress: Option<ProgressCallback>,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            cache: None,
            catalog_client: None,
            probe: None,
            engine: None,
            on_status: None,
            on_progress: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a catalog cache with other sessions
    pub fn cache(mut self, cache: Arc<ManifestCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn catalog_client(mut self, client: Arc<dyn CatalogClient>) -> Self {
        self.catalog_client = Some(client);
        self
    }

    pub fn bandwidth_probe(mut self, probe: Arc<dyn BandwidthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Engine to drive and the channel it reports events on
    pub fn engine(mut self, engine: impl MediaEngine + 'static, events: EngineEventReceiver) -> Self {
        let engine: Box<dyn MediaEngine> = Box::new(engine);
        self.engine = Some((engine, Some(events)));
        self
    }

    /// Engine that reports no events
    pub fn silent_engine(mut self, engine: impl MediaEngine + 'static) -> Self {
        let engine: Box<dyn MediaEngine> = Box::new(engine);
        self.engine = Some((engine, None));
        self
    }

    pub fn on_status_changed(mut self, callback: impl Fn(PlaybackStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Box::new(callback));
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Start the session task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> Result<PlaybackSession> {
        self.config.validate()?;

        let catalog_client = self
            .catalog_client
            .ok_or_else(|| Error::InvalidConfig("a catalog client is required".into()))?;
        let (engine, engine_events) = self
            .engine
            .ok_or_else(|| Error::InvalidConfig("a media engine is required".into()))?;
        let probe = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpBandwidthProbe::new(&self.config)?),
        };
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ManifestCache::with_capacity(self.config.cache_capacity)));

        let id = SessionId::new();
        let (commands_tx, commands_rx) = mpsc::channel(self.config.mailbox_capacity);
        let (status_tx, status_rx) = watch::channel(PlaybackStatus::Initial);
        let (progress_tx, progress_rx) = watch::channel(Progress::default());
        let snapshot = Arc::new(RwLock::new(Snapshot::default()));

        let actor = SessionActor {
            id,
            config: self.config,
            engine,
            engine_events,
            catalog_client,
            probe,
            cache,
            mailbox: commands_tx.downgrade(),
            status_tx,
            progress_tx,
            on_status: self.on_status,
            on_progress: self.on_progress,
            snapshot: Arc::clone(&snapshot),
            status: PlaybackStatus::Initial,
            catalog: None,
            content_id: None,
            quality_height: QualityOption::AUTO_HEIGHT,
            force_original_audio: false,
            last_url: None,
            video_uri: None,
            media_open: false,
            epoch: 0,
            progress: Progress::default(),
        };

        info!(session_id = %id, "Playback session started");
        let task = tokio::spawn(actor.run(commands_rx));

        Ok(PlaybackSession {
            id,
            commands: commands_tx,
            status_rx,
            progress_rx,
            snapshot,
            task,
        })
    }
}

/// Handle to a playback session.
///
/// Failures inside `initialize` and `set_quality` are reported through the
/// status channel (status becomes `Error`); the calls themselves only fail
/// with [`Error::AlreadyDisposed`].
pub struct PlaybackSession {
    id: SessionId,
    commands: mpsc::Sender<Command>,
    status_rx: watch::Receiver<PlaybackStatus>,
    progress_rx: watch::Receiver<Progress>,
    snapshot: Arc<RwLock<Snapshot>>,
    task: JoinHandle<()>,
}

impl PlaybackSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::AlreadyDisposed)?;
        done.await.map_err(|_| Error::AlreadyDisposed)
    }

    /// Load `url` and open the selected variants
    pub async fn initialize(&self, url: impl Into<String>, options: InitializeOptions) -> Result<()> {
        let url = url.into();
        self.request(|reply| Command::Initialize { url, options, reply })
            .await
    }

    /// Switch to `height` (0 = Auto) at the current position
    pub async fn set_quality(&self, height: u32) -> Result<()> {
        self.request(|reply| Command::SetQuality { height, reply }).await
    }

    pub async fn play(&self) -> Result<()> {
        self.request(|reply| Command::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Stop playback and rewind to the start
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn set_speed(&self, rate: f64) -> Result<()> {
        self.request(|reply| Command::SetSpeed { rate, reply }).await
    }

    /// Release the engine and end the session. Safe to call repeatedly.
    pub async fn dispose(&self) -> Result<()> {
        match self.request(|reply| Command::Dispose { reply }).await {
            Err(Error::AlreadyDisposed) => Ok(()),
            other => other,
        }
    }

    /// Whether the session task has exited
    pub fn is_disposed(&self) -> bool {
        self.task.is_finished() || self.commands.is_closed()
    }

    /// Get current status
    pub fn status(&self) -> PlaybackStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes made from now on
    pub fn subscribe_status(&self) -> watch::Receiver<PlaybackStatus> {
        let mut rx = self.status_rx.clone();
        rx.borrow_and_update();
        rx
    }

    /// Subscribe to progress reports made from now on
    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        let mut rx = self.progress_rx.clone();
        rx.borrow_and_update();
        rx
    }

    /// Get current position
    pub fn position(&self) -> Duration {
        self.progress_rx.borrow().position
    }

    /// Get media duration as last reported by the engine
    pub fn duration(&self) -> Duration {
        self.progress_rx.borrow().duration
    }

    /// Catalog loaded and media open in the engine
    pub async fn is_initialized(&self) -> bool {
        let snapshot = self.snapshot.read().await;
        snapshot.catalog.is_some() && snapshot.media_open
    }

    /// Requested height (0 = Auto), even when a fallback stream is playing
    pub async fn current_quality_height(&self) -> u32 {
        self.snapshot.read().await.quality_height
    }

    pub async fn available_quality_options(&self) -> Vec<QualityOption> {
        match &self.snapshot.read().await.catalog {
            Some(catalog) => selector::list_quality_options(catalog),
            None => Vec::new(),
        }
    }

    pub async fn playback_rate(&self) -> f64 {
        self.snapshot.read().await.playback_rate
    }

    pub async fn content_id(&self) -> Option<ContentId> {
        self.snapshot.read().await.content_id.clone()
    }

    pub async fn current_catalog(&self) -> Option<Arc<Catalog>> {
        self.snapshot.read().await.catalog.clone()
    }
}

struct SessionActor {
    id: SessionId,
    config: SessionConfig,
    engine: Box<dyn MediaEngine>,
    engine_events: Option<EngineEventReceiver>,
    catalog_client: Arc<dyn CatalogClient>,
    probe: Arc<dyn BandwidthProbe>,
    cache: Arc<ManifestCache>,
    /// Weak so that dropping every handle ends the session
    mailbox: mpsc::WeakSender<Command>,
    status_tx: watch::Sender<PlaybackStatus>,
    progress_tx: watch::Sender<Progress>,
    on_status: Option<StatusCallback>,
    on_progress: Option<ProgressCallback>,
    snapshot: Arc<RwLock<Snapshot>>,

    status: PlaybackStatus,
    catalog: Option<Arc<Catalog>>,
    content_id: Option<ContentId>,
    quality_height: u32,
    force_original_audio: bool,
    last_url: Option<String>,
    /// Video stream currently open in the engine
    video_uri: Option<String>,
    media_open: bool,
    /// Bumped by every initialize/quality change/dispose
    epoch: u64,
    progress: Progress,
}

async fn next_engine_event(events: &mut Option<EngineEventReceiver>) -> Option<EngineEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Dispose { reply }) => {
                        self.dispose().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!(session_id = %self.id, "All handles dropped");
                        self.dispose().await;
                        break;
                    }
                },
                event = next_engine_event(&mut self.engine_events) => match event {
                    Some(event) => self.handle_engine_event(event),
                    None => {
                        debug!(session_id = %self.id, "Engine event channel closed");
                        self.engine_events = None;
                    }
                },
            }
        }
        info!(session_id = %self.id, "Playback session ended");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initialize { url, options, reply } => {
                self.initialize(url, options).await;
                let _ = reply.send(());
            }
            Command::SetQuality { height, reply } => {
                self.set_quality(height).await;
                let _ = reply.send(());
            }
            Command::Play { reply } => {
                self.play().await;
                let _ = reply.send(());
            }
            Command::Pause { reply } => {
                self.pause().await;
                let _ = reply.send(());
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::SetSpeed { rate, reply } => {
                self.set_speed(rate).await;
                let _ = reply.send(());
            }
            Command::ApplyBandwidthChoice { epoch, height } => {
                self.apply_bandwidth_choice(epoch, height).await;
            }
            Command::Dispose { reply } => {
                // Handled by the run loop
                let _ = reply.send(());
            }
        }
    }

    /// Transition to new status, notifying only on actual changes
    fn set_status(&mut self, new_status: PlaybackStatus) {
        let current = self.status;
        if current == new_status {
            return;
        }
        if !current.can_transition_to(new_status) {
            warn!(from = %current, to = %new_status, "Ignoring invalid status transition");
            return;
        }

        self.status = new_status;
        self.status_tx.send_replace(new_status);
        if let Some(callback) = &self.on_status {
            callback(new_status);
        }

        info!(session_id = %self.id, from = %current, to = %new_status, "Status transition");
    }

    fn set_progress(&mut self, progress: Progress) {
        if self.progress == progress {
            return;
        }
        self.progress = progress;
        self.progress_tx.send_replace(progress);
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }

    async fn publish(&mut self) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.catalog = self.catalog.clone();
        snapshot.content_id = self.content_id.clone();
        snapshot.quality_height = self.quality_height;
        snapshot.media_open = self.media_open;
    }

    #[instrument(skip(self, options), fields(session_id = %self.id))]
    async fn initialize(&mut self, url: String, options: InitializeOptions) {
        if self.last_url.as_deref() == Some(url.as_str())
            && self.catalog.is_some()
            && self.status != PlaybackStatus::Error
        {
            debug!("Already initialized with this URL");
            return;
        }

        info!(url = %url, "Initializing");
        self.epoch += 1;
        self.set_status(PlaybackStatus::Loading);

        match self.load_content(&url, &options).await {
            Ok(catalog) => {
                self.last_url = Some(url);
                self.publish().await;
                self.set_status(if options.auto_play {
                    PlaybackStatus::Playing
                } else {
                    PlaybackStatus::Paused
                });
                if options.choose_best_quality {
                    self.spawn_bandwidth_refinement(catalog);
                }
            }
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Initialization failed");
                self.release_engine().await;
                self.publish().await;
                self.set_status(PlaybackStatus::Error);
            }
        }
    }

    /// Resolve, select and open; commits session fields only on success
    async fn load_content(&mut self, url: &str, options: &InitializeOptions) -> Result<Arc<Catalog>> {
        let id = self.catalog_client.resolve(url).await?;

        let catalog = match self.cache.get(&id) {
            Some(catalog) => catalog,
            None => {
                let fetched = self.catalog_client.fetch_catalog(&id).await?;
                self.cache.put(id.clone(), fetched)
            }
        };

        let height = options.quality.unwrap_or(self.quality_height);
        let video = selector::select_video(&catalog, height)?.clone();
        let audio = selector::select_audio(&catalog, options.force_original_audio)?.clone();

        info!(
            content_id = %id,
            height,
            video_bitrate = video.bitrate,
            video_height = video.height,
            audio_bitrate = audio.bitrate,
            "Variants selected"
        );

        self.release_engine().await;
        self.open_media(&video.uri, &audio.uri, None, options.auto_play)
            .await?;

        self.catalog = Some(Arc::clone(&catalog));
        self.content_id = Some(id);
        self.quality_height = height;
        self.force_original_audio = options.force_original_audio;
        self.video_uri = Some(video.uri);

        Ok(catalog)
    }

    /// Open video, let it settle, attach audio, optionally play
    async fn open_media(
        &mut self,
        video_uri: &str,
        audio_uri: &str,
        start: Option<Duration>,
        play: bool,
    ) -> Result<()> {
        self.discard_stale_events();
        self.engine
            .open(video_uri, start, false)
            .await
            .map_err(|e| match e {
                Error::EngineOpen { .. } => e,
                other => Error::EngineOpen {
                    uri: video_uri.to_string(),
                    reason: other.to_string(),
                },
            })?;
        self.media_open = true;

        let delay = self.config.audio_attach_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.engine.attach_audio_track(audio_uri).await?;

        if play {
            self.engine.play().await?;
        }

        Ok(())
    }

    /// Drop playing/completed/error events still queued from the stream that
    /// is about to be replaced. Events raised once the new stream is open go
    /// through the run loop.
    fn discard_stale_events(&mut self) {
        let mut latest_progress = None;
        if let Some(events) = self.engine_events.as_mut() {
            while let Ok(event) = events.try_recv() {
                if let EngineEvent::Progress { position, duration } = event {
                    latest_progress = Some(Progress { position, duration });
                }
            }
        }
        if let Some(progress) = latest_progress {
            self.set_progress(progress);
        }
    }

    async fn release_engine(&mut self) {
        if !self.media_open {
            return;
        }
        if let Err(e) = self.engine.release().await {
            warn!(error = %e, "Engine release failed");
        }
        self.media_open = false;
        self.video_uri = None;
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    async fn set_quality(&mut self, height: u32) {
        let Some(catalog) = self.catalog.clone() else {
            debug!("No catalog loaded, ignoring quality change");
            return;
        };
        if self.status == PlaybackStatus::Loading {
            debug!("Load in progress, ignoring quality change");
            return;
        }
        if height == self.quality_height {
            debug!("Quality already active");
            return;
        }

        self.epoch += 1;
        let prior = self.status;
        self.set_status(PlaybackStatus::Loading);

        let position = self.engine.position();
        let was_playing = self.engine.is_playing();

        match self.switch_variant(&catalog, height, position, was_playing).await {
            Ok(reopened) => {
                self.quality_height = height;
                self.publish().await;
                let next = if !reopened {
                    prior
                } else if was_playing {
                    PlaybackStatus::Playing
                } else {
                    PlaybackStatus::Paused
                };
                info!(height, reopened, position_ms = position.as_millis() as u64, "Quality changed");
                self.set_status(next);
            }
            Err(e) => {
                error!(error = %e, code = e.error_code(), height, "Quality change failed");
                self.release_engine().await;
                self.publish().await;
                self.set_status(PlaybackStatus::Error);
            }
        }
    }

    /// Returns false when the selected stream is already open
    async fn switch_variant(
        &mut self,
        catalog: &Catalog,
        height: u32,
        position: Duration,
        was_playing: bool,
    ) -> Result<bool> {
        let video = selector::select_video(catalog, height)?.clone();
        let audio = selector::select_audio(catalog, self.force_original_audio)?.clone();

        if self.media_open && self.video_uri.as_deref() == Some(video.uri.as_str()) {
            debug!(uri = %video.uri, "Selected stream already open");
            return Ok(false);
        }

        if self.media_open {
            self.engine.stop().await?;
        }
        self.open_media(&video.uri, &audio.uri, Some(position), was_playing)
            .await?;
        self.video_uri = Some(video.uri);
        Ok(true)
    }

    fn spawn_bandwidth_refinement(&self, catalog: Arc<Catalog>) {
        let Some(sample) = selector::probe_sample(&catalog).map(|v| v.uri.clone()) else {
            return;
        };
        let probe = Arc::clone(&self.probe);
        let mailbox = self.mailbox.clone();
        let epoch = self.epoch;
        let safety_factor = self.config.safety_factor;
        let session_id = self.id;

        debug!(session_id = %session_id, epoch, sample = %sample, "Starting bandwidth refinement");
        tokio::spawn(async move {
            let estimate = probe.estimate(&sample).await;
            let height = selector::choose_quality_with_margin(&catalog, estimate, safety_factor);

            let Some(mailbox) = mailbox.upgrade() else {
                debug!(session_id = %session_id, "Session gone, dropping bandwidth choice");
                return;
            };
            let _ = mailbox
                .send(Command::ApplyBandwidthChoice { epoch, height })
                .await;
        });
    }

    async fn apply_bandwidth_choice(&mut self, epoch: u64, height: u32) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "Stale bandwidth choice dropped");
            return;
        }
        if height == self.quality_height {
            debug!(height, "Bandwidth choice matches current quality");
            return;
        }
        info!(height, "Applying quality chosen for bandwidth");
        self.set_quality(height).await;
    }

    async fn play(&mut self) {
        if !self.media_open {
            warn!("Play requested without open media");
            return;
        }
        match self.engine.play().await {
            Ok(()) => self.set_status(PlaybackStatus::Playing),
            Err(e) => warn!(error = %e, "Engine play failed"),
        }
    }

    async fn pause(&mut self) {
        if !self.media_open {
            return;
        }
        match self.engine.pause().await {
            Ok(()) => self.set_status(PlaybackStatus::Paused),
            Err(e) => warn!(error = %e, "Engine pause failed"),
        }
    }

    async fn stop(&mut self) {
        if !self.media_open {
            return;
        }
        if let Err(e) = self.engine.stop().await {
            warn!(error = %e, "Engine stop failed");
            return;
        }
        if let Err(e) = self.engine.seek(Duration::ZERO).await {
            warn!(error = %e, "Rewind after stop failed");
        }
        let duration = self.progress.duration;
        self.set_progress(Progress {
            position: Duration::ZERO,
            duration,
        });
        self.set_status(PlaybackStatus::Stopped);
    }

    async fn set_speed(&mut self, rate: f64) {
        if (self.engine.rate() - rate).abs() < f64::EPSILON {
            return;
        }
        match self.engine.set_rate(rate).await {
            Ok(()) => {
                debug!(rate, "Playback rate changed");
                self.snapshot.write().await.playback_rate = rate;
            }
            Err(e) => warn!(error = %e, rate, "Engine rejected playback rate"),
        }
    }

    async fn dispose(&mut self) {
        self.epoch += 1;
        self.release_engine().await;
        self.publish().await;
        if self.status.is_active() {
            self.set_status(PlaybackStatus::Stopped);
        }
        info!(session_id = %self.id, stats = ?self.cache.stats(), "Session disposed");
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::PlayingChanged(true) => {
                if matches!(self.status, PlaybackStatus::Paused | PlaybackStatus::Stopped) {
                    self.set_status(PlaybackStatus::Playing);
                }
            }
            EngineEvent::PlayingChanged(false) => {
                if self.status == PlaybackStatus::Playing {
                    self.set_status(PlaybackStatus::Paused);
                }
            }
            EngineEvent::Progress { position, duration } => {
                self.set_progress(Progress { position, duration });
            }
            EngineEvent::Completed => {
                if self.status.is_active() {
                    self.set_status(PlaybackStatus::Stopped);
                }
            }
            EngineEvent::Error(message) => {
                if self.media_open {
                    error!(session_id = %self.id, error = %message, "Engine reported an error");
                    self.set_status(PlaybackStatus::Error);
                }
            }
        }
    }
}
