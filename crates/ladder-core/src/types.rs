//! Core types for Ladder

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a piece of media, derived from its source URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Kind of an elementary stream variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Video without an audio track
    #[serde(alias = "video")]
    VideoOnly,
    /// Audio without a video track
    #[serde(alias = "audio")]
    AudioOnly,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::VideoOnly => write!(f, "video"),
            StreamKind::AudioOnly => write!(f, "audio"),
        }
    }
}

/// One encoded stream option at a specific bitrate/resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    pub kind: StreamKind,
    /// Bitrate in bits per second
    pub bitrate: u64,
    /// Resolution height in pixels (0 for audio)
    #[serde(default)]
    pub height: u32,
    /// Location of the stream
    pub uri: String,
}

impl StreamVariant {
    pub fn video(bitrate: u64, height: u32, uri: impl Into<String>) -> Self {
        Self {
            kind: StreamKind::VideoOnly,
            bitrate,
            height,
            uri: uri.into(),
        }
    }

    pub fn audio(bitrate: u64, uri: impl Into<String>) -> Self {
        Self {
            kind: StreamKind::AudioOnly,
            bitrate,
            height: 0,
            uri: uri.into(),
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == StreamKind::VideoOnly
    }

    pub fn is_audio(&self) -> bool {
        self.kind == StreamKind::AudioOnly
    }
}

/// Full set of variants available for one piece of content, in provider order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub content_id: ContentId,
    pub variants: Vec<StreamVariant>,
}

impl Catalog {
    pub fn new(content_id: ContentId, variants: Vec<StreamVariant>) -> Self {
        Self {
            content_id,
            variants,
        }
    }

    /// Video-only variants in catalog order
    pub fn video_variants(&self) -> impl Iterator<Item = &StreamVariant> {
        self.variants.iter().filter(|v| v.is_video())
    }

    /// Audio-only variants in catalog order
    pub fn audio_variants(&self) -> impl Iterator<Item = &StreamVariant> {
        self.variants.iter().filter(|v| v.is_audio())
    }

    /// Distinct positive video heights, descending
    pub fn distinct_heights(&self) -> Vec<u32> {
        let mut heights: Vec<u32> = self
            .video_variants()
            .map(|v| v.height)
            .filter(|h| *h > 0)
            .collect();
        heights.sort_unstable_by(|a, b| b.cmp(a));
        heights.dedup();
        heights
    }

    /// Fails with `EmptyCatalog` unless both a video and an audio variant exist
    pub fn ensure_playable(&self) -> Result<()> {
        if self.video_variants().next().is_none() {
            return Err(Error::no_video());
        }
        if self.audio_variants().next().is_none() {
            return Err(Error::no_audio());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Entry in the quality menu. Height 0 is the "Auto" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityOption {
    pub height: u32,
    pub label: String,
}

impl QualityOption {
    pub const AUTO_HEIGHT: u32 = 0;

    pub fn auto() -> Self {
        Self {
            height: Self::AUTO_HEIGHT,
            label: "Auto".to_string(),
        }
    }

    pub fn for_height(height: u32) -> Self {
        Self {
            height,
            label: format!("{}p", height),
        }
    }

    pub fn is_auto(&self) -> bool {
        self.height == Self::AUTO_HEIGHT
    }
}

/// Playback lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// Nothing loaded yet
    Initial,
    /// Resolving catalog or (re)opening the engine
    Loading,
    /// Media is playing
    Playing,
    /// Media is open but paused
    Paused,
    /// Playback stopped or completed
    Stopped,
    /// Initialization or quality change failed
    Error,
}

impl PlaybackStatus {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackStatus) -> bool {
        use PlaybackStatus::*;
        if *self == target {
            return false;
        }
        matches!(
            (self, target),
            // Any state may fail
            (_, Error) |
            // Loading is entered from everywhere except itself
            (Initial | Playing | Paused | Stopped | Error, Loading) |
            // From Loading
            (Loading, Playing) | (Loading, Paused) | (Loading, Stopped) |
            // Playing <-> Paused
            (Playing, Paused) | (Paused, Playing) |
            // Stop
            (Playing | Paused, Stopped) |
            // Play again after stop
            (Stopped, Playing) | (Stopped, Paused)
        )
    }

    /// Whether media is open in the engine
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackStatus::Playing | PlaybackStatus::Paused)
    }
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackStatus::Initial => write!(f, "initial"),
            PlaybackStatus::Loading => write!(f, "loading"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
            PlaybackStatus::Stopped => write!(f, "stopped"),
            PlaybackStatus::Error => write!(f, "error"),
        }
    }
}

/// Playback progress as last reported by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub position: Duration,
    pub duration: Duration,
}

/// Options for `PlaybackSession::initialize`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeOptions {
    /// Start playing as soon as the media is open
    pub auto_play: bool,
    /// Preferred height; `None` keeps the session's current preference
    pub quality: Option<u32>,
    /// Probe the network after opening and switch to the best fitting height
    pub choose_best_quality: bool,
    /// Prefer the first audio track in provider order
    pub force_original_audio: bool,
}

impl InitializeOptions {
    pub fn auto_play() -> Self {
        Self {
            auto_play: true,
            ..Default::default()
        }
    }

    pub fn with_quality(mut self, height: u32) -> Self {
        self.quality = Some(height);
        self
    }

    pub fn with_best_quality(mut self, enabled: bool) -> Self {
        self.choose_best_quality = enabled;
        self
    }

    pub fn with_original_audio(mut self, enabled: bool) -> Self {
        self.force_original_audio = enabled;
        self
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of catalogs kept by the manifest cache
    pub cache_capacity: usize,
    /// Bytes requested by the bandwidth probe
    pub probe_bytes: u64,
    /// Upper bound on a single probe in milliseconds
    pub probe_timeout_ms: u64,
    /// Fraction of the estimated bandwidth a variant may use
    pub safety_factor: f64,
    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Delay between opening video and attaching audio in milliseconds
    pub audio_attach_delay_ms: u64,
    /// Pending commands a session accepts before callers wait
    pub mailbox_capacity: usize,
    /// User agent sent by the HTTP clients
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 20,
            probe_bytes: 512 * 1024,
            probe_timeout_ms: 10_000,
            safety_factor: 0.8,
            request_timeout_ms: 15_000,
            audio_attach_delay_ms: 500,
            mailbox_capacity: 64,
            user_agent: format!("ladder/{}", crate::VERSION),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::InvalidConfig("cache_capacity must be > 0".into()));
        }
        if self.probe_bytes == 0 {
            return Err(Error::InvalidConfig("probe_bytes must be > 0".into()));
        }
        if self.mailbox_capacity == 0 {
            return Err(Error::InvalidConfig("mailbox_capacity must be > 0".into()));
        }
        if !(self.safety_factor > 0.0 && self.safety_factor <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "safety_factor must be in (0, 1], got {}",
                self.safety_factor
            )));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn audio_attach_delay(&self) -> Duration {
        Duration::from_millis(self.audio_attach_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_heights() {
        let catalog = Catalog::new(
            ContentId::new("abc"),
            vec![
                StreamVariant::video(1_000_000, 480, "v480a"),
                StreamVariant::audio(128_000, "a"),
                StreamVariant::video(2_500_000, 720, "v720"),
                StreamVariant::video(900_000, 480, "v480b"),
                StreamVariant::video(100_000, 0, "v0"),
            ],
        );
        assert_eq!(catalog.distinct_heights(), vec![720, 480]);
    }

    #[test]
    fn test_ensure_playable() {
        let video_only = Catalog::new(
            ContentId::new("abc"),
            vec![StreamVariant::video(1_000_000, 480, "v")],
        );
        assert!(matches!(
            video_only.ensure_playable(),
            Err(Error::EmptyCatalog { kind: "audio" })
        ));
    }

    #[test]
    fn test_status_transitions() {
        use PlaybackStatus::*;
        assert!(Initial.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Paused));
        assert!(Stopped.can_transition_to(Loading));
        assert!(Error.can_transition_to(Loading));
        assert!(Paused.can_transition_to(Error));

        assert!(!Loading.can_transition_to(Loading));
        assert!(!Initial.can_transition_to(Playing));
        assert!(!Error.can_transition_to(Playing));
    }

    #[test]
    fn test_config_validation() {
        assert!(SessionConfig::default().validate().is_ok());

        let config = SessionConfig {
            safety_factor: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_config_partial_json() {
        let config: SessionConfig = serde_json::from_str(r#"{"cache_capacity": 5}"#).unwrap();
        assert_eq!(config.cache_capacity, 5);
        assert_eq!(config.probe_bytes, 512 * 1024);
    }

    #[test]
    fn test_config_from_json_file() {
        let path = std::env::temp_dir().join(format!("ladder-config-{}.json", Uuid::new_v4()));
        std::fs::write(&path, r#"{"safety_factor": 0.5, "audio_attach_delay_ms": 0}"#).unwrap();
        let config = SessionConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.safety_factor, 0.5);
        assert_eq!(config.audio_attach_delay(), Duration::ZERO);

        std::fs::write(&path, r#"{"mailbox_capacity": 0}"#).unwrap();
        let result = SessionConfig::from_json_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_variant_kind_aliases() {
        let v: StreamVariant =
            serde_json::from_str(r#"{"kind":"video","bitrate":1,"height":360,"uri":"u"}"#).unwrap();
        assert!(v.is_video());
        let a: StreamVariant =
            serde_json::from_str(r#"{"kind":"audio","bitrate":1,"uri":"u"}"#).unwrap();
        assert_eq!(a.height, 0);
        assert!(a.is_audio());
    }
}
