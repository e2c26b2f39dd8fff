//! track-cli: drive one audio track on the headless host from the command line.
//!
//! The track loads (fetch + Symphonia decode, element readiness, or a stream handle),
//! builds its node graph and plays for `--seconds` of host time or until Ctrl-C.
//! Lifecycle events are printed as they arrive; the final status is printed as JSON.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use audio_track::config::TrackSettings;
use audio_track::fetch::DefaultFetcher;
use audio_track::headless::{HeadlessContext, HeadlessElementFactory};
use audio_track::host::MediaStream;
use audio_track::{Track, TrackOptions};
use audio_track_types::{SourceMode, TrackEvent};
use clap::Parser;
use crossbeam_channel::{Receiver, select};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,audio_track=info")),
        )
        .init();

    match args.cmd {
        cli::Command::Play(play) => play_one(play),
    }
}

fn play_one(args: cli::PlayArgs) -> Result<()> {
    let settings = match &args.config {
        Some(path) => TrackSettings::load(path)?,
        None => TrackSettings::default(),
    };

    let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    let _enter = rt.enter();

    let context = HeadlessContext::new(args.dialect.into());
    let fetcher = Arc::new(DefaultFetcher::from_settings(&settings.fetch)?);
    let elements = Arc::new(HeadlessElementFactory::new(rt.handle().clone(), fetcher.clone()));

    let mut options = TrackOptions::from_settings(&settings)?
        .context(context.clone())
        .fetcher(fetcher)
        .element_factory(elements);
    if let Some(mode) = &args.mode {
        options = options.source_mode(mode.clone());
    }
    if args.autoplay {
        options = options.autoplay(true);
    }
    if let Some(volume) = args.volume {
        options = options.volume(volume);
    }
    if let Some(pan) = args.pan {
        options = options.pan(pan);
    }

    let stream_mode = options.source_mode.as_deref() == Some(SourceMode::Stream.as_str());
    options = if stream_mode {
        options.src(MediaStream::new(args.src.clone(), ()))
    } else {
        options.src(args.src.clone())
    };
    let autoplay = options.autoplay;

    let (options, events) = forward_events(options);
    let track = Track::new(options)?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("install ctrl-c handler")?;

    if !autoplay {
        track.play();
    }
    let ready = rt.block_on(track.ready());
    print_pending(&events);
    if let Err(e) = ready {
        print_status(&track)?;
        return Err(e.into());
    }

    tracing::info!(
        seconds = args.seconds,
        dialect = ?context.dialect(),
        "playing"
    );
    let deadline = crossbeam_channel::after(Duration::from_secs_f64(args.seconds.max(0.0)));
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => println!("event: {event}"),
                Err(_) => break,
            },
            recv(stop_rx) -> _ => {
                tracing::info!("interrupted");
                break;
            }
            recv(deadline) -> _ => break,
        }
    }

    track.stop();
    print_pending(&events);
    tracing::info!(running_sources = context.running_sources(), "stopped");
    print_status(&track)
}

/// Relay every track event to the main thread, subscribed before an autoplay load starts.
fn forward_events(mut options: TrackOptions) -> (TrackOptions, Receiver<TrackEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    for event in TrackEvent::ALL {
        let tx = tx.clone();
        options = options.on(event, move || {
            let _ = tx.send(event);
        });
    }
    (options, rx)
}

fn print_pending(events: &Receiver<TrackEvent>) {
    for event in events.try_iter() {
        println!("event: {event}");
    }
}

fn print_status(track: &Track) -> Result<()> {
    let status = serde_json::to_string_pretty(&track.status()).context("encode status")?;
    println!("{status}");
    Ok(())
}
