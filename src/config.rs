use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PROB_THRESHOLD: f32 = 0.5;
pub const DEFAULT_FPS: f64 = 10.0;
pub const DEFAULT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_MQTT_ADDR: &str = "127.0.0.1:3001";
pub const DEFAULT_MQTT_CLIENT_ID: &str = "people_counter";
const DEFAULT_MQTT_KEEP_ALIVE_SECS: u64 = 60;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CounterConfigFile {
    counting: Option<CountingConfigFile>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CountingConfigFile {
    prob_threshold: Option<f32>,
    fps: Option<f64>,
    window_size: Option<usize>,
    strict_sequence: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MqttConfigFile {
    addr: Option<String>,
    client_id: Option<String>,
    keep_alive_secs: Option<u64>,
    topic_prefix: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CounterConfig {
    pub counting: CountingSettings,
    pub mqtt: MqttConfig,
}

/// Parameters of the counting core.
#[derive(Debug, Clone, PartialEq)]
pub struct CountingSettings {
    /// Detections scoring below this are discarded. Must lie in [0, 1].
    pub prob_threshold: f32,
    /// Nominal frame rate for converting frame counts to seconds. Must be > 0.
    pub fps: f64,
    /// Denoising window length in frames. Must be >= 1.
    pub window_size: usize,
    /// Reject frames whose index does not follow the previous one.
    pub strict_sequence: bool,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub addr: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub topic_prefix: Option<String>,
}

impl Default for CountingSettings {
    fn default() -> Self {
        Self {
            prob_threshold: DEFAULT_PROB_THRESHOLD,
            fps: DEFAULT_FPS,
            window_size: DEFAULT_WINDOW_SIZE,
            strict_sequence: false,
        }
    }
}

impl CountingSettings {
    /// Build validated settings with strict sequencing disabled.
    pub fn new(prob_threshold: f32, fps: f64, window_size: usize) -> Result<Self> {
        let settings = Self {
            prob_threshold,
            fps,
            window_size,
            strict_sequence: false,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_strict_sequence(mut self, strict: bool) -> Self {
        self.strict_sequence = strict;
        self
    }

    /// Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.prob_threshold) {
            return Err(anyhow!(
                "prob_threshold must be within [0, 1], got {}",
                self.prob_threshold
            ));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(anyhow!(
                "fps must be a finite value greater than zero, got {}",
                self.fps
            ));
        }
        if self.window_size == 0 {
            return Err(anyhow!("window_size must be at least 1"));
        }
        Ok(())
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_MQTT_ADDR.to_string(),
            client_id: DEFAULT_MQTT_CLIENT_ID.to_string(),
            keep_alive: Duration::from_secs(DEFAULT_MQTT_KEEP_ALIVE_SECS),
            topic_prefix: None,
        }
    }
}

impl CounterConfig {
    /// Load from `PEOPLE_COUNTER_CONFIG` (if set), apply environment overrides, validate.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var_os("PEOPLE_COUNTER_CONFIG") {
            Some(path) => read_config_file(Path::new(&path))?,
            None => CounterConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path without consulting the environment.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path.as_ref())?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Self {
        let counting_file = file.counting.unwrap_or_default();
        let counting = CountingSettings {
            prob_threshold: counting_file
                .prob_threshold
                .unwrap_or(DEFAULT_PROB_THRESHOLD),
            fps: counting_file.fps.unwrap_or(DEFAULT_FPS),
            window_size: counting_file.window_size.unwrap_or(DEFAULT_WINDOW_SIZE),
            strict_sequence: counting_file.strict_sequence.unwrap_or(false),
        };

        let mqtt_file = file.mqtt.unwrap_or_default();
        let mqtt = MqttConfig {
            addr: mqtt_file
                .addr
                .unwrap_or_else(|| DEFAULT_MQTT_ADDR.to_string()),
            client_id: mqtt_file
                .client_id
                .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
            keep_alive: Duration::from_secs(
                mqtt_file
                    .keep_alive_secs
                    .unwrap_or(DEFAULT_MQTT_KEEP_ALIVE_SECS),
            ),
            topic_prefix: mqtt_file.topic_prefix.filter(|p| !p.trim().is_empty()),
        };

        Self { counting, mqtt }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_value("PEOPLE_COUNTER_PROB_THRESHOLD") {
            self.counting.prob_threshold = value.parse().map_err(|_| {
                anyhow!("PEOPLE_COUNTER_PROB_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        if let Some(value) = env_value("PEOPLE_COUNTER_FPS") {
            self.counting.fps = value
                .parse()
                .map_err(|_| anyhow!("PEOPLE_COUNTER_FPS must be a number"))?;
        }
        if let Some(value) = env_value("PEOPLE_COUNTER_WINDOW_SIZE") {
            self.counting.window_size = value
                .parse()
                .map_err(|_| anyhow!("PEOPLE_COUNTER_WINDOW_SIZE must be a positive integer"))?;
        }
        if let Some(value) = env_value("PEOPLE_COUNTER_STRICT_SEQUENCE") {
            self.counting.strict_sequence = parse_bool(&value).ok_or_else(|| {
                anyhow!("PEOPLE_COUNTER_STRICT_SEQUENCE must be true/false/1/0")
            })?;
        }
        if let Some(addr) = env_value("PEOPLE_COUNTER_MQTT_ADDR") {
            self.mqtt.addr = addr;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.counting.validate()?;
        if self.mqtt.client_id.trim().is_empty() {
            return Err(anyhow!("mqtt client_id must not be empty"));
        }
        if self.mqtt.keep_alive.as_secs() == 0 {
            return Err(anyhow!("mqtt keep_alive_secs must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
