use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::game::constants::{net, progress, timing, track, vehicle};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to accept client connections on
    pub port: u16,
    /// Port of the metrics endpoint
    pub metrics_port: u16,
    /// Events buffered per client before new ones are dropped
    pub mailbox_capacity: usize,
    /// Simulation tunables
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: net::PORT,
            metrics_port: net::METRICS_PORT,
            mailbox_capacity: net::MAILBOX_CAPACITY,
            game: GameConfig::default(),
        }
    }
}

/// Every tunable of a race session, threaded into the session at construction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub timing: TimingConfig,
    pub track: TrackConfig,
    pub vehicle: VehicleConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub countdown_interval_ms: u64,
    pub rest_interval_ms: u64,
    pub countdown_start: u32,
    pub closedown_start: u32,
    pub rest_start: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: timing::TICK_INTERVAL_MS,
            countdown_interval_ms: timing::COUNTDOWN_INTERVAL_MS,
            rest_interval_ms: timing::REST_INTERVAL_MS,
            countdown_start: timing::COUNTDOWN_START,
            closedown_start: timing::CLOSEDOWN_START,
            rest_start: timing::REST_START,
        }
    }
}

impl TimingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_interval_ms)
    }

    pub fn rest_interval(&self) -> Duration {
        Duration::from_millis(self.rest_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub point_count: usize,
    pub max_width: f64,
    pub max_height: f64,
    pub min_distance: f64,
    pub spacing_passes: usize,
    pub sharpen_passes: usize,
    pub difficulty: f64,
    pub max_displacement: f64,
    pub spline_step: f64,
    pub track_width: f64,
    pub max_attempts: usize,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            point_count: track::POINT_COUNT,
            max_width: track::MAX_WIDTH,
            max_height: track::MAX_HEIGHT,
            min_distance: track::MIN_DISTANCE,
            spacing_passes: track::SPACING_PASSES,
            sharpen_passes: track::SHARPEN_PASSES,
            difficulty: track::DIFFICULTY,
            max_displacement: track::MAX_DISPLACEMENT,
            spline_step: track::SPLINE_STEP,
            track_width: track::TRACK_WIDTH,
            max_attempts: track::MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub turn_rate: f64,
    pub wheelbase: f64,
    pub engine_power: f64,
    pub brake_power: f64,
    pub on_track_friction: f64,
    pub off_track_friction: f64,
    pub drag: f64,
    pub traction: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            turn_rate: vehicle::TURN_RATE,
            wheelbase: vehicle::WHEELBASE,
            engine_power: vehicle::ENGINE_POWER,
            brake_power: vehicle::BRAKE_POWER,
            on_track_friction: vehicle::ON_TRACK_FRICTION,
            off_track_friction: vehicle::OFF_TRACK_FRICTION,
            drag: vehicle::DRAG,
            traction: vehicle::TRACTION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub max_skip: usize,
    pub contact_radius: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            max_skip: progress::MAX_SKIP,
            contact_radius: progress::CONTACT_RADIUS,
        }
    }
}

/// Rejected tunables
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("{0} must be finite")]
    NotFinite(&'static str),
    #[error("track point count must be at least 3, got {0}")]
    TooFewPoints(usize),
    #[error("traction must be within [0, 1], got {0}")]
    TractionOutOfRange(f64),
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
    #[error("mailbox capacity must be at least 1")]
    EmptyMailbox,
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.track.validate()?;
        self.vehicle.validate()?;
        self.progress.validate()
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::NotPositive("tick_interval_ms"));
        }
        if self.countdown_interval_ms == 0 {
            return Err(ConfigError::NotPositive("countdown_interval_ms"));
        }
        if self.rest_interval_ms == 0 {
            return Err(ConfigError::NotPositive("rest_interval_ms"));
        }
        if self.countdown_start == 0 {
            return Err(ConfigError::NotPositive("countdown_start"));
        }
        if self.closedown_start == 0 {
            return Err(ConfigError::NotPositive("closedown_start"));
        }
        if self.rest_start == 0 {
            return Err(ConfigError::NotPositive("rest_start"));
        }
        Ok(())
    }
}

impl TrackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.point_count < 3 {
            return Err(ConfigError::TooFewPoints(self.point_count));
        }
        for (name, value) in [
            ("max_width", self.max_width),
            ("max_height", self.max_height),
            ("spline_step", self.spline_step),
            ("track_width", self.track_width),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
            if value <= 0.0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        for (name, value) in [
            ("min_distance", self.min_distance),
            ("difficulty", self.difficulty),
            ("max_displacement", self.max_displacement),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
        }
        if self.spline_step > 1.0 {
            return Err(ConfigError::OutOfRange("spline_step"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NotPositive("max_attempts"));
        }
        Ok(())
    }
}

impl VehicleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("turn_rate", self.turn_rate),
            ("wheelbase", self.wheelbase),
            ("engine_power", self.engine_power),
            ("brake_power", self.brake_power),
            ("on_track_friction", self.on_track_friction),
            ("off_track_friction", self.off_track_friction),
            ("drag", self.drag),
            ("traction", self.traction),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
        }
        if self.wheelbase <= 0.0 {
            return Err(ConfigError::NotPositive("wheelbase"));
        }
        if !(0.0..=1.0).contains(&self.traction) {
            return Err(ConfigError::TractionOutOfRange(self.traction));
        }
        Ok(())
    }
}

impl ProgressConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.contact_radius.is_finite() {
            return Err(ConfigError::NotFinite("contact_radius"));
        }
        if self.contact_radius <= 0.0 {
            return Err(ConfigError::NotPositive("contact_radius"));
        }
        Ok(())
    }
}

/// Parse an environment variable, warning and returning `None` when it is malformed
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_parse("BIND_ADDRESS") {
            config.bind_address = addr;
        }

        if let Some(port) = env_parse::<u16>("PORT") {
            if port > 0 {
                config.port = port;
            } else {
                tracing::warn!("PORT must be > 0, using default");
            }
        }

        if let Some(port) = env_parse::<u16>("METRICS_PORT") {
            config.metrics_port = port;
        }

        if let Some(capacity) = env_parse::<usize>("MAILBOX_CAPACITY") {
            if capacity > 0 {
                config.mailbox_capacity = capacity;
            } else {
                tracing::warn!("MAILBOX_CAPACITY must be > 0, using default");
            }
        }

        let game = &mut config.game;
        if let Some(ms) = env_parse("TICK_INTERVAL_MS") {
            game.timing.tick_interval_ms = ms;
        }
        if let Some(start) = env_parse("COUNTDOWN_START") {
            game.timing.countdown_start = start;
        }
        if let Some(start) = env_parse("CLOSEDOWN_START") {
            game.timing.closedown_start = start;
        }
        if let Some(start) = env_parse("REST_START") {
            game.timing.rest_start = start;
        }
        if let Some(count) = env_parse("TRACK_POINT_COUNT") {
            game.track.point_count = count;
        }
        if let Some(width) = env_parse("TRACK_WIDTH") {
            game.track.track_width = width;
            game.progress.contact_radius = width;
        }

        if let Err(e) = config.game.validate() {
            tracing::warn!("Invalid game configuration ({}), using defaults", e);
            config.game = GameConfig::default();
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::NotPositive("port"));
        }
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::EmptyMailbox);
        }
        self.game.validate()
    }
}
