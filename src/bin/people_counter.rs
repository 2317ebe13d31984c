//! people_counter - count people from per-frame detections and publish occupancy events.
//!
//! This binary:
//! 1. Loads counting + MQTT configuration (file, environment, then flags)
//! 2. Opens a detection source (JSON-lines replay or `stub://` script)
//! 3. Runs every frame through filter, denoiser and occupancy state machine
//! 4. Publishes `person` and `person/duration` events (MQTT, stdout, or nowhere)
//! 5. Logs a session summary on exit or Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use people_counter::{
    open_source, CounterConfig, EventPublisher, JsonLinesPublisher, MqttEndpoint, MqttPublisher,
    MqttSettings, PeopleCounter, TlsMaterials, Transition,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Count people from per-frame detections and publish occupancy events"
)]
struct Args {
    /// Detection log (JSON lines) or a `stub://0,1,1,0` count script.
    #[arg(short, long)]
    input: String,

    /// Detections below this confidence are discarded [default: 0.5].
    #[arg(long)]
    prob_threshold: Option<f32>,

    /// Nominal frame rate used to convert episode frames to seconds [default: 10].
    #[arg(long)]
    fps: Option<f64>,

    /// Denoising window length in frames [default: 10].
    #[arg(long)]
    window_size: Option<usize>,

    /// Reject frames whose index skips or repeats.
    #[arg(long)]
    strict_sequence: bool,

    /// Sleep 1/fps between frames to emulate a live stream.
    #[arg(long)]
    pace: bool,

    /// MQTT broker address [default: 127.0.0.1:3001].
    #[arg(long, env = "MQTT_BROKER_ADDR")]
    mqtt_broker_addr: Option<String>,

    /// Allow non-loopback MQTT brokers.
    #[arg(long, env = "ALLOW_REMOTE_MQTT")]
    allow_remote_mqtt: bool,

    /// MQTT username for authentication.
    #[arg(long, env = "MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password for authentication.
    #[arg(long, env = "MQTT_PASSWORD")]
    mqtt_password: Option<String>,

    /// Enable TLS for MQTT (implied by mqtts:// addresses).
    #[arg(long, env = "MQTT_USE_TLS")]
    mqtt_use_tls: bool,

    /// PEM-encoded CA certificate for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CA_PATH")]
    mqtt_tls_ca_path: Option<PathBuf>,

    /// PEM-encoded client certificate for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CLIENT_CERT_PATH")]
    mqtt_tls_client_cert_path: Option<PathBuf>,

    /// PEM-encoded client private key for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CLIENT_KEY_PATH")]
    mqtt_tls_client_key_path: Option<PathBuf>,

    /// Topic prefix, e.g. `lobby` publishes to `lobby/person`.
    #[arg(long, env = "MQTT_TOPIC_PREFIX")]
    mqtt_topic_prefix: Option<String>,

    /// Write events as JSON lines to stdout instead of MQTT.
    #[arg(long, conflicts_with = "no_publish")]
    stdout: bool,

    /// Count without publishing anywhere.
    #[arg(long)]
    no_publish: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = CounterConfig::load()?;
    apply_args(&mut cfg, &args);
    cfg.validate()?;

    let publisher = build_publisher(&args, &cfg)?;
    let mut counter = PeopleCounter::new(cfg.counting.clone())?;
    if let Some(publisher) = publisher {
        log::info!("publishing occupancy events via {}", publisher.name());
        counter = counter.with_publisher(publisher);
    } else {
        log::info!("publishing disabled");
    }

    let mut source = open_source(&args.input)
        .with_context(|| format!("failed to open input {}", args.input))?;
    log::info!(
        "counting from {} source (threshold={}, fps={}, window={}, strict={})",
        source.name(),
        cfg.counting.prob_threshold,
        cfg.counting.fps,
        cfg.counting.window_size,
        cfg.counting.strict_sequence
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    }

    let frame_interval = Duration::try_from_secs_f64(1.0 / cfg.counting.fps).unwrap_or_default();
    let started = Instant::now();
    let mut last_health_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        let frame_started = Instant::now();
        let Some(frame) = source.next_frame()? else {
            break;
        };
        let report = counter.process_frame(&frame)?;

        match report.transition {
            Transition::Increase { entered } => log::info!(
                "frame {}: {} entered, count={} total={}",
                report.frame_index,
                entered,
                report.stable_count,
                report.total
            ),
            Transition::Decrease { left } => log::info!(
                "frame {}: {} left, count={} duration={:.2}s",
                report.frame_index,
                left,
                report.stable_count,
                report.duration.unwrap_or_default()
            ),
            Transition::Steady => {}
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let summary = counter.summary();
            log::info!(
                "frames={} count={} total={} publish_failures={}",
                summary.frames_processed,
                summary.current_count,
                summary.total,
                summary.publish_failures
            );
            last_health_log = Instant::now();
        }

        if args.pace {
            if let Some(remaining) = frame_interval.checked_sub(frame_started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
    }

    if !running.load(Ordering::SeqCst) {
        log::warn!("interrupted; stopping after current frame");
    }

    let summary = counter.finish()?;
    log::info!(
        "session done in {:.1}s: frames={} final_count={} total={} episodes={} publish_failures={}",
        started.elapsed().as_secs_f64(),
        summary.frames_processed,
        summary.current_count,
        summary.total,
        summary.episodes_closed,
        summary.publish_failures
    );
    Ok(())
}

fn apply_args(cfg: &mut CounterConfig, args: &Args) {
    if let Some(threshold) = args.prob_threshold {
        cfg.counting.prob_threshold = threshold;
    }
    if let Some(fps) = args.fps {
        cfg.counting.fps = fps;
    }
    if let Some(window_size) = args.window_size {
        cfg.counting.window_size = window_size;
    }
    if args.strict_sequence {
        cfg.counting.strict_sequence = true;
    }
    if let Some(addr) = &args.mqtt_broker_addr {
        cfg.mqtt.addr = addr.clone();
    }
    if let Some(prefix) = &args.mqtt_topic_prefix {
        cfg.mqtt.topic_prefix = Some(prefix.clone()).filter(|p| !p.trim().is_empty());
    }
}

fn build_publisher(args: &Args, cfg: &CounterConfig) -> Result<Option<Box<dyn EventPublisher>>> {
    if args.no_publish {
        return Ok(None);
    }
    if args.stdout {
        let publisher: Box<dyn EventPublisher> = Box::new(JsonLinesPublisher::new(
            std::io::stdout(),
            cfg.mqtt.topic_prefix.as_deref(),
        ));
        return Ok(Some(publisher));
    }

    let endpoint = MqttEndpoint::parse(&cfg.mqtt.addr, args.mqtt_use_tls)?;
    endpoint.ensure_allowed(args.allow_remote_mqtt)?;
    let tls = TlsMaterials::load(
        args.mqtt_tls_ca_path.as_deref(),
        args.mqtt_tls_client_cert_path.as_deref(),
        args.mqtt_tls_client_key_path.as_deref(),
    )?;
    let settings = MqttSettings {
        endpoint,
        tls,
        client_id: cfg.mqtt.client_id.clone(),
        username: args.mqtt_username.clone(),
        password: args.mqtt_password.clone(),
        keep_alive: cfg.mqtt.keep_alive,
        topic_prefix: cfg.mqtt.topic_prefix.clone(),
    };
    let publisher: Box<dyn EventPublisher> = Box::new(MqttPublisher::connect(&settings)?);
    Ok(Some(publisher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_loaded_config() {
        let args = Args::parse_from([
            "people_counter",
            "--input",
            "stub://0,1",
            "--prob-threshold",
            "0.7",
            "--fps",
            "25",
            "--window-size",
            "5",
            "--strict-sequence",
            "--mqtt-topic-prefix",
            "lobby",
        ]);
        let mut cfg = CounterConfig::default();
        apply_args(&mut cfg, &args);
        assert_eq!(cfg.counting.prob_threshold, 0.7);
        assert_eq!(cfg.counting.fps, 25.0);
        assert_eq!(cfg.counting.window_size, 5);
        assert!(cfg.counting.strict_sequence);
        assert_eq!(cfg.mqtt.topic_prefix.as_deref(), Some("lobby"));
    }

    #[test]
    fn absent_flags_keep_config() {
        let args = Args::parse_from(["people_counter", "-i", "frames.jsonl"]);
        let mut cfg = CounterConfig::default();
        apply_args(&mut cfg, &args);
        assert_eq!(cfg.counting, CounterConfig::default().counting);
    }

    #[test]
    fn stdout_and_no_publish_conflict() {
        let result =
            Args::try_parse_from(["people_counter", "-i", "x", "--stdout", "--no-publish"]);
        assert!(result.is_err());
    }

    #[test]
    fn no_publish_skips_publisher() {
        let args = Args::parse_from(["people_counter", "-i", "x", "--no-publish"]);
        let publisher = build_publisher(&args, &CounterConfig::default()).unwrap();
        assert!(publisher.is_none());
    }
}
