//! CLI command implementations

use crate::output::{format_bitrate, print_json, OutputFormat};
use ladder_core::{
    event_channel, selector, BandwidthProbe, Catalog, CatalogClient, HeadlessEngine,
    HttpBandwidthProbe, InitializeOptions, PlaybackSession, QualityOption, SessionConfig,
    StreamVariant,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

async fn load_catalog(client: &dyn CatalogClient, url: &str) -> anyhow::Result<Catalog> {
    let id = client.resolve(url).await?;
    Ok(client.fetch_catalog(&id).await?)
}

/// Print the quality menu for a content URL
pub async fn qualities(client: &dyn CatalogClient, url: &str, format: &str) -> anyhow::Result<()> {
    let catalog = load_catalog(client, url).await?;
    let options = selector::list_quality_options(&catalog);

    if OutputFormat::from(format) == OutputFormat::Json {
        return print_json(&options);
    }

    println!("Content: {}", catalog.content_id);
    println!("  Video variants: {}", catalog.video_variants().count());
    println!("  Audio variants: {}", catalog.audio_variants().count());
    println!("\nQualities:");
    for option in &options {
        println!("  {:>6}  {}", option.height, option.label);
    }

    Ok(())
}

#[derive(Serialize)]
struct Selection<'a> {
    requested_height: u32,
    video: &'a StreamVariant,
    audio: &'a StreamVariant,
}

/// Print the variants a session would open
pub async fn select(
    client: &dyn CatalogClient,
    url: &str,
    height: u32,
    force_original_audio: bool,
    format: &str,
) -> anyhow::Result<()> {
    let catalog = load_catalog(client, url).await?;
    let video = selector::select_video(&catalog, height)?;
    let audio = selector::select_audio(&catalog, force_original_audio)?;

    if OutputFormat::from(format) == OutputFormat::Json {
        return print_json(&Selection {
            requested_height: height,
            video,
            audio,
        });
    }

    let requested = if height == QualityOption::AUTO_HEIGHT {
        QualityOption::auto().label
    } else {
        QualityOption::for_height(height).label
    };
    println!("Requested: {}", requested);
    if height != QualityOption::AUTO_HEIGHT && video.height != height {
        println!("  (no {}p stream, falling back)", height);
    }
    println!("  Video: {}p {} {}", video.height, format_bitrate(video.bitrate), video.uri);
    println!("  Audio: {} {}", format_bitrate(audio.bitrate), audio.uri);

    Ok(())
}

#[derive(Serialize)]
struct ProbeReport {
    sample_uri: String,
    estimated_bps: Option<u64>,
    chosen_height: Option<u32>,
}

/// Measure bandwidth and, with a catalog, the height it affords
pub async fn probe(
    client: &dyn CatalogClient,
    config: &SessionConfig,
    uri: Option<&str>,
    catalog_url: Option<&str>,
    format: &str,
) -> anyhow::Result<()> {
    let catalog = match catalog_url {
        Some(url) => Some(load_catalog(client, url).await?),
        None => None,
    };

    let sample_uri = match (uri, &catalog) {
        (Some(uri), _) => uri.to_string(),
        (None, Some(catalog)) => selector::probe_sample(catalog)
            .map(|v| v.uri.clone())
            .ok_or_else(|| anyhow::anyhow!("catalog has no video stream to probe"))?,
        (None, None) => anyhow::bail!("pass a stream URI or --catalog"),
    };

    let probe = HttpBandwidthProbe::new(config)?;
    let estimated_bps = probe.estimate(&sample_uri).await;
    let chosen_height = catalog
        .as_ref()
        .map(|c| selector::choose_quality_with_margin(c, estimated_bps, config.safety_factor));

    let report = ProbeReport {
        sample_uri,
        estimated_bps,
        chosen_height,
    };

    if OutputFormat::from(format) == OutputFormat::Json {
        return print_json(&report);
    }

    println!("Probed: {}", report.sample_uri);
    match report.estimated_bps {
        Some(bps) => println!("  Estimate: {}", format_bitrate(bps)),
        None => println!("  Estimate: unavailable"),
    }
    if let Some(height) = report.chosen_height {
        if height == QualityOption::AUTO_HEIGHT {
            println!("  Quality: Auto");
        } else {
            println!("  Quality: {}p", height);
        }
    }

    Ok(())
}

/// Settings for [`play`]
pub struct PlayOptions {
    pub height: Option<u32>,
    pub auto_quality: bool,
    pub seconds: u64,
    pub media_duration: u64,
}

/// Run a session on the headless engine for a while, printing what happens
pub async fn play(
    client: Arc<dyn CatalogClient>,
    config: SessionConfig,
    url: &str,
    options: PlayOptions,
    format: &str,
) -> anyhow::Result<()> {
    let json = OutputFormat::from(format) == OutputFormat::Json;
    let (events_tx, events_rx) = event_channel();
    let engine = HeadlessEngine::new(Duration::from_secs(options.media_duration))
        .with_events(events_tx)
        .with_tick(Duration::from_secs(1));

    let session = PlaybackSession::builder()
        .config(config)
        .catalog_client(client)
        .engine(engine, events_rx)
        .on_status_changed(move |status| {
            if json {
                println!("{}", serde_json::json!({ "status": status }));
            } else {
                println!("[status] {}", status);
            }
        })
        .on_progress(move |progress| {
            if json {
                println!("{}", serde_json::json!({ "progress": progress }));
            } else {
                println!(
                    "[progress] {:>7.1}s / {:.1}s",
                    progress.position.as_secs_f64(),
                    progress.duration.as_secs_f64()
                );
            }
        })
        .spawn()?;

    let mut init = InitializeOptions::auto_play().with_best_quality(options.auto_quality);
    init.quality = options.height;
    session.initialize(url, init).await?;

    if !json {
        let heights: Vec<String> = session
            .available_quality_options()
            .await
            .into_iter()
            .map(|o| o.label)
            .collect();
        println!("Qualities: {}", heights.join(", "));
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(options.seconds)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("Interrupted");
        }
    }

    let height = session.current_quality_height().await;
    session.dispose().await?;

    if !json {
        println!("Final quality: {}", if height == 0 { "Auto".to_string() } else { format!("{}p", height) });
    }

    Ok(())
}
