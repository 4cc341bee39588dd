//! Ladder Core - adaptive quality controller for media playback
//!
//! This crate decides which streams a player should open:
//! - Catalog resolution from a content URL (JSON catalog service or HLS)
//! - Bounded LRU cache of catalogs shared across sessions
//! - Video/audio variant selection by height and bitrate
//! - Bandwidth estimation from a partial download
//! - Playback session orchestration on top of an external media engine
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Ladder Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Catalog    │  │   Manifest   │  │  Bandwidth   │           │
//! │  │   Client     │  │    Cache     │  │    Probe     │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │   Variant    │──│  Playback   │──│    Media     │            │
//! │  │   Selector   │  │   Session   │  │   Engine     │            │
//! │  └──────────────┘  └──────┬──────┘  └──────────────┘            │
//! │                           │                                     │
//! │                 status / progress watch                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod cache;
pub mod catalog;
pub mod selector;
pub mod probe;
pub mod engine;
pub mod session;

pub use error::{Error, Result};
pub use types::*;
pub use cache::{CacheStats, ManifestCache};
#[cfg(feature = "hls")]
pub use catalog::HlsCatalogClient;
pub use catalog::{CatalogClient, JsonCatalogClient};
pub use probe::{BandwidthProbe, FixedBandwidth, HttpBandwidthProbe};
pub use engine::{event_channel, EngineEvent, EngineEventReceiver, EngineEventSender, HeadlessEngine, MediaEngine};
pub use session::{PlaybackSession, SessionBuilder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log library start-up
pub fn init() {
    tracing::info!(version = VERSION, "Ladder Core initialized");
}
