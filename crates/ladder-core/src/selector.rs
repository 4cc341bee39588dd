//! Variant selection
//!
//! Pure functions that pick the audio/video pair to play from a catalog:
//! - explicit height requests with fallback to the best stream
//! - "Auto" (height 0) picks the highest bitrate
//! - bandwidth-driven height choice with a safety margin

use crate::{
    types::{Catalog, QualityOption, StreamVariant},
    Error, Result,
};
use tracing::debug;

/// Fraction of the estimated bandwidth a variant may consume
pub const SAFETY_FACTOR: f64 = 0.8;

/// Highest-bitrate variant; ties keep the first one encountered
fn highest_bitrate<'a>(variants: impl Iterator<Item = &'a StreamVariant>) -> Option<&'a StreamVariant> {
    variants.fold(None::<&'a StreamVariant>, |best, v| match best {
        Some(b) if b.bitrate >= v.bitrate => Some(b),
        _ => Some(v),
    })
}

/// Choose the video stream for `requested_height` (0 = Auto).
///
/// An exact height match wins, highest bitrate first. Heights absent from
/// the catalog fall back to the highest-bitrate video stream overall.
pub fn select_video(catalog: &Catalog, requested_height: u32) -> Result<&StreamVariant> {
    if requested_height != QualityOption::AUTO_HEIGHT {
        let exact = highest_bitrate(
            catalog
                .video_variants()
                .filter(|v| v.height == requested_height),
        );
        if let Some(variant) = exact {
            return Ok(variant);
        }
        debug!(
            requested_height,
            content_id = %catalog.content_id,
            "Requested height not in catalog, falling back to best stream"
        );
    }

    highest_bitrate(catalog.video_variants()).ok_or_else(Error::no_video)
}

/// Choose the audio stream.
///
/// With `force_original` the first audio stream in provider order is taken
/// as the original track. Otherwise the highest bitrate wins.
pub fn select_audio(catalog: &Catalog, force_original: bool) -> Result<&StreamVariant> {
    let original = if force_original {
        catalog.audio_variants().next()
    } else {
        None
    };

    original
        .or_else(|| highest_bitrate(catalog.audio_variants()))
        .ok_or_else(Error::no_audio)
}

/// Quality menu: "Auto" first, then distinct heights descending
pub fn list_quality_options(catalog: &Catalog) -> Vec<QualityOption> {
    std::iter::once(QualityOption::auto())
        .chain(
            catalog
                .distinct_heights()
                .into_iter()
                .map(QualityOption::for_height),
        )
        .collect()
}

/// Height to use for an estimated bandwidth, with the default safety margin
pub fn choose_quality_for_bandwidth(catalog: &Catalog, estimated_bps: Option<u64>) -> u32 {
    choose_quality_with_margin(catalog, estimated_bps, SAFETY_FACTOR)
}

/// Largest height whose bitrate fits in `estimated_bps * safety_factor`.
///
/// Returns 0 (Auto) when there is no estimate or nothing fits.
pub fn choose_quality_with_margin(
    catalog: &Catalog,
    estimated_bps: Option<u64>,
    safety_factor: f64,
) -> u32 {
    let Some(estimated) = estimated_bps else {
        return QualityOption::AUTO_HEIGHT;
    };
    let safe_bps = estimated as f64 * safety_factor;

    let mut ladder: Vec<&StreamVariant> = catalog.video_variants().collect();
    ladder.sort_by_key(|v| v.bitrate);

    let height = ladder
        .iter()
        .filter(|v| v.bitrate as f64 <= safe_bps)
        .map(|v| v.height)
        .max()
        .unwrap_or(QualityOption::AUTO_HEIGHT);

    debug!(
        estimated_bps = estimated,
        safe_bps = safe_bps as u64,
        height,
        "Quality chosen for bandwidth"
    );

    height
}

/// Mid-ladder video stream used as the bandwidth probe target
pub fn probe_sample(catalog: &Catalog) -> Option<&StreamVariant> {
    let mut ladder: Vec<&StreamVariant> = catalog.video_variants().collect();
    ladder.sort_by_key(|v| v.bitrate);
    ladder.get(ladder.len() / 2).copied()
}
