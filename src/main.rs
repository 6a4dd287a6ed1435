use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Arg, ArgAction, Command, value_parser};
use framepace::config::{StreamConfig, app_name, version};
use framepace::utils::sos::SignalOfStop;
use framepace::{IncomingVideoStream, SinkRef, StreamId, VideoFrame};
use log::{debug, info};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use std::{panic, process, thread};

const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 240;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("stream-id")
                .long("stream-id")
                .value_parser(value_parser!(u32))
                .default_value("1")
                .help("Id reported to the sink for every frame."),
        )
        .arg(
            Arg::new("bypass")
                .long("bypass")
                .action(ArgAction::SetTrue)
                .help("Deliver frames on arrival instead of pacing them."),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_parser(value_parser!(u32).range(1..=240))
                .default_value("30")
                .help("Nominal frame rate of the synthetic source."),
        )
        .arg(
            Arg::new("jitter-ms")
                .long("jitter-ms")
                .value_parser(value_parser!(u32))
                .default_value("15")
                .help("Maximum arrival jitter in milliseconds."),
        )
        .arg(
            Arg::new("seconds")
                .long("seconds")
                .value_parser(value_parser!(u64))
                .default_value("5")
                .help("How long to run."),
        )
        .arg(
            Arg::new("render-delay-ms")
                .long("render-delay-ms")
                .value_parser(value_parser!(u32))
                .help("Render delay applied before starting."),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON stream configuration."),
        )
        .get_matches();

    let stream_id = StreamId(*matches.get_one::<u32>("stream-id").unwrap_or(&1));
    let bypass = matches.get_flag("bypass");
    let fps = *matches.get_one::<u32>("fps").unwrap_or(&30);
    let jitter_ms = *matches.get_one::<u32>("jitter-ms").unwrap_or(&15);
    let seconds = *matches.get_one::<u64>("seconds").unwrap_or(&5);

    let config = match matches.get_one::<String>("config") {
        Some(path) => StreamConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => StreamConfig::default(),
    };

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    let sos = SignalOfStop::new();
    {
        let sos = sos.clone();
        ctrlc::set_handler(move || sos.cancel()).context("failed to set Ctrl-C handler")?;
    }

    let stream = Arc::new(IncomingVideoStream::with_config(stream_id, bypass, config));
    if let Some(delay) = matches.get_one::<u32>("render-delay-ms") {
        stream
            .set_expected_render_delay(*delay)
            .context("failed to set render delay")?;
    }
    stream.set_render_callback(Some(gap_logging_sink()));
    stream.start().context("failed to start stream")?;

    let producer = {
        let stream = stream.clone();
        let sos = sos.clone();
        thread::Builder::new()
            .name("frame-producer".into())
            .spawn(move || produce(&stream, &sos, fps, jitter_ms))
            .context("failed to spawn producer thread")?
    };

    let run_until = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < run_until {
        if sos.wait_cancellation_timeout(Duration::from_secs(1)) {
            break;
        }
        info!(
            "{}: {} fps incoming, {} queued | {}",
            stream_id,
            stream.incoming_rate(),
            stream.queued_frames(),
            stream.health()
        );
    }

    sos.cancel();
    let _ = producer.join();
    stream.stop()?;
    info!("{}: finished | {}", stream_id, stream.health());
    Ok(())
}

/// Sink that logs the gap between consecutive deliveries
fn gap_logging_sink() -> SinkRef {
    let last_delivery = Mutex::new(None::<Instant>);
    Arc::new(move |id: StreamId, frame: &VideoFrame| {
        let now = Instant::now();
        let mut last = last_delivery.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = last.replace(now) {
            debug!(
                "{}: frame {} delivered, gap {:?}",
                id,
                frame.render_time,
                now.duration_since(previous)
            );
        }
    })
}

/// Emit frames at `fps` with deterministic arrival jitter until cancelled
fn produce(stream: &IncomingVideoStream, sos: &SignalOfStop, fps: u32, jitter_ms: u32) {
    let clock = stream.clock();
    let playout = Duration::from_millis(jitter_ms as u64 + 20);
    let base = clock.now();
    let started = Instant::now();

    for index in 0u64.. {
        let nominal = nominal_offset(index, fps);
        let arrival = nominal.as_millis() as i64 + arrival_jitter(index, jitter_ms);
        let arrive_at = started + Duration::from_millis(arrival.max(0) as u64);

        if sos.wait_cancellation_timeout(arrive_at.saturating_duration_since(Instant::now())) {
            break;
        }

        let frame = VideoFrame::new(
            Bytes::from(vec![(index % 256) as u8; 16]),
            FRAME_WIDTH,
            FRAME_HEIGHT,
            base.add(nominal + playout),
        );
        if let Err(e) = stream.render_frame(stream.stream_id(), frame) {
            debug!("producer: {e}");
            break;
        }
    }
}

/// Offset of frame `index` from the first frame at `fps`
fn nominal_offset(index: u64, fps: u32) -> Duration {
    Duration::from_millis(index.saturating_mul(1000) / fps.max(1) as u64)
}

/// Pseudo-random offset in `[-max_ms, max_ms]`, stable for a given index
fn arrival_jitter(index: u64, max_ms: u32) -> i64 {
    if max_ms == 0 {
        return 0;
    }
    let span = 2 * max_ms as u64 + 1;
    ((index.wrapping_mul(2_654_435_761) >> 7) % span) as i64 - max_ms as i64
}
